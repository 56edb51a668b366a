//! The evaluation context consumed by calcs.
//!
//! An [`Evaluator`] is a mutable cursor over the cube: one current member per hierarchy. Calcs
//! that change the context must take a [`Savepoint`] first and restore it on every exit path;
//! [`ContextGuard`] does both.

mod cells;
mod context;

pub use cells::{CellReader, InMemoryCells};
pub use context::ContextEvaluator;

use crate::error::CalcResult;
use olap_model::{HierarchyId, MemberId, Schema, Value};
use std::ops::{Deref, DerefMut};

/// Opaque marker of a context state, returned by [`Evaluator::savepoint`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Savepoint(usize);

impl Savepoint {
    pub fn new(depth: usize) -> Self {
        Self(depth)
    }

    pub fn depth(self) -> usize {
        self.0
    }
}

pub trait Evaluator {
    fn schema(&self) -> &Schema;

    /// Current member of `hierarchy`.
    fn context_member(&self, hierarchy: HierarchyId) -> MemberId;

    /// Current member of every hierarchy, in hierarchy order.
    fn context(&self) -> Vec<MemberId>;

    /// Make `member` current for its hierarchy. Returns the member it replaced.
    fn set_context(&mut self, member: MemberId) -> MemberId;

    fn set_context_members(&mut self, members: &[MemberId]) {
        for member in members {
            self.set_context(*member);
        }
    }

    fn savepoint(&mut self) -> Savepoint;

    /// Return to the context as it was when `savepoint` was taken.
    fn restore(&mut self, savepoint: Savepoint);

    /// Value of the cell at the current context.
    fn evaluate_current(&mut self) -> CalcResult<Value>;

    /// Whether a cell at `members` must be null because one of them belongs to a dimension the
    /// current cube does not join to.
    fn need_to_return_null_for_unrelated_dimension(&self, members: &[MemberId]) -> bool;

    /// Whether [`Evaluator::need_to_return_null_for_unrelated_dimension`] can ever return `true`.
    /// Queried once at compile time.
    fn might_return_null_for_unrelated_dimension(&self) -> bool;
}

/// Savepoint that restores itself when dropped, on success, error and unwind alike.
///
/// Derefs to the evaluator so the context can be changed and read through the guard.
pub struct ContextGuard<'a> {
    ev: &'a mut dyn Evaluator,
    savepoint: Savepoint,
}

impl<'a> ContextGuard<'a> {
    pub fn new(ev: &'a mut dyn Evaluator) -> Self {
        let savepoint = ev.savepoint();
        Self { ev, savepoint }
    }
}

impl<'a> Deref for ContextGuard<'a> {
    type Target = dyn Evaluator + 'a;

    fn deref(&self) -> &Self::Target {
        self.ev
    }
}

impl<'a> DerefMut for ContextGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ev
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.ev.restore(self.savepoint);
    }
}
