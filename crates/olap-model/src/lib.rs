#![forbid(unsafe_code)]

//! Dimensional metadata and scalar values shared by the OLAP calc engine.
//!
//! A [`Schema`] is an arena: dimensions, hierarchies, levels and members live in flat vectors and
//! are addressed through small copyable handles ([`DimensionId`], [`HierarchyId`], [`LevelId`],
//! [`MemberId`]). Handles are only meaningful for the schema that minted them.
//!
//! Upward navigation (member → level → hierarchy → dimension) goes through the schema, so the
//! metadata graph never needs reference cycles.

mod error;
mod schema;
mod value;

pub use crate::error::{ModelError, ModelResult};
pub use crate::schema::{
    Dimension, DimensionId, DimensionKind, Hierarchy, HierarchyId, Level, LevelId, Member,
    MemberId, MemberKind, Schema,
};
pub use crate::value::Value;
