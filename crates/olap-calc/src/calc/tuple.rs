use crate::error::{CalcResult, EvalError};
use crate::evaluator::Evaluator;
use olap_model::MemberId;
use smallvec::SmallVec;
use std::sync::Arc;

/// One member per position. Most tuples in practice have at most a handful of positions.
pub type Tuple = SmallVec<[MemberId; 4]>;

/// An ordered list of tuples of fixed arity.
///
/// Storage is shared between clones; every mutator copies the storage first if anyone else holds
/// it, so a mutation is never visible through another handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TupleList {
    arity: usize,
    tuples: Arc<Vec<Tuple>>,
}

impl TupleList {
    pub fn new(arity: usize) -> Self {
        Self {
            arity,
            tuples: Arc::new(Vec::new()),
        }
    }

    pub fn with_tuples(arity: usize, tuples: Vec<Tuple>) -> Self {
        debug_assert!(tuples.iter().all(|t| t.len() == arity));
        Self {
            arity,
            tuples: Arc::new(tuples),
        }
    }

    pub fn from_members(members: impl IntoIterator<Item = MemberId>) -> Self {
        Self::with_tuples(
            1,
            members
                .into_iter()
                .map(|m| SmallVec::from_slice(&[m]))
                .collect(),
        )
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Tuple> {
        self.tuples.get(idx)
    }

    pub fn as_slice(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    /// First member of each tuple; for arity-1 lists this is the member list.
    pub fn members(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.tuples.iter().filter_map(|t| t.first().copied())
    }

    /// Mutable access to the tuples. Copies the storage first if it is shared.
    pub fn tuples_mut(&mut self) -> &mut Vec<Tuple> {
        Arc::make_mut(&mut self.tuples)
    }

    pub fn push(&mut self, tuple: Tuple) {
        debug_assert_eq!(tuple.len(), self.arity);
        self.tuples_mut().push(tuple);
    }

    /// Whether another handle currently shares this list's storage.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.tuples) > 1
    }

    pub fn shares_storage_with(&self, other: &TupleList) -> bool {
        Arc::ptr_eq(&self.tuples, &other.tuples)
    }

    /// Take exclusive ownership of the storage, copying only if it is shared.
    pub fn into_unique(mut self) -> Self {
        Arc::make_mut(&mut self.tuples);
        self
    }

    /// Copy the storage unconditionally.
    pub fn deep_copy(&self) -> Self {
        Self {
            arity: self.arity,
            tuples: Arc::new(self.tuples.as_ref().clone()),
        }
    }
}

impl<'a> IntoIterator for &'a TupleList {
    type Item = &'a Tuple;
    type IntoIter = std::slice::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Pull-based iteration over a set. The evaluator is passed on every step so that consumers can
/// use it between steps (e.g. to evaluate an expression at each tuple).
pub trait TupleCursor {
    fn next_tuple(&mut self, ev: &mut dyn Evaluator) -> CalcResult<Option<Tuple>>;
}

/// Cursor over an already materialized list.
#[derive(Debug)]
pub struct ListCursor {
    list: TupleList,
    pos: usize,
}

impl ListCursor {
    pub fn new(list: TupleList) -> Self {
        Self { list, pos: 0 }
    }
}

impl TupleCursor for ListCursor {
    fn next_tuple(&mut self, _ev: &mut dyn Evaluator) -> CalcResult<Option<Tuple>> {
        let next = self.list.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        Ok(next)
    }
}

/// Materialize the whole remaining sequence into a fresh list.
pub fn drain_cursor(
    mut cursor: Box<dyn TupleCursor + '_>,
    ev: &mut dyn Evaluator,
    arity: usize,
) -> CalcResult<TupleList> {
    let mut tuples = Vec::new();
    while let Some(tuple) = cursor.next_tuple(ev)? {
        if tuple.len() != arity {
            return Err(EvalError::Internal(format!(
                "iterable produced a tuple of arity {} where {arity} was declared",
                tuple.len()
            )));
        }
        tuples.push(tuple);
    }
    Ok(TupleList::with_tuples(arity, tuples))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_never_leaks_into_clones() {
        let original = TupleList::new(0);
        let mut copy = original.clone();
        assert!(copy.shares_storage_with(&original));

        copy.push(Tuple::new());
        assert!(original.is_empty());
        assert_eq!(copy.len(), 1);
        assert!(!copy.shares_storage_with(&original));
    }
}
