use crate::error::CalcResult;
use ahash::AHashMap;
use olap_model::{MemberId, MemberKind, Schema, Value};

/// Source of stored cell values.
pub trait CellReader: Send + Sync {
    /// Value at `coordinates`, one member per hierarchy in hierarchy order.
    fn cell_value(&self, schema: &Schema, coordinates: &[MemberId]) -> CalcResult<Value>;
}

/// Sparse in-memory cell store.
///
/// Cells are addressed by their non-all members; a coordinate that leaves a hierarchy at its all
/// member matches a cell stored without a member of that hierarchy. Missing cells are null.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCells {
    cells: AHashMap<Vec<MemberId>, Value>,
}

impl InMemoryCells {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schema: &Schema, members: &[MemberId], value: impl Into<Value>) {
        self.cells.insert(cell_key(schema, members), value.into());
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

fn cell_key(schema: &Schema, members: &[MemberId]) -> Vec<MemberId> {
    let mut key: Vec<MemberId> = members
        .iter()
        .copied()
        .filter(|m| schema.member(*m).kind() != MemberKind::All)
        .collect();
    key.sort_unstable();
    key.dedup();
    key
}

impl CellReader for InMemoryCells {
    fn cell_value(&self, schema: &Schema, coordinates: &[MemberId]) -> CalcResult<Value> {
        if coordinates.iter().any(|m| schema.member(*m).is_null()) {
            return Ok(Value::Null);
        }
        Ok(self
            .cells
            .get(&cell_key(schema, coordinates))
            .cloned()
            .unwrap_or_default())
    }
}
