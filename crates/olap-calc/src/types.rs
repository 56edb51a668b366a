//! Static types carried by expressions and calcs.
//!
//! Dimensional types may pin the dimension, hierarchy and/or level they range over. The compiler
//! uses pinned metadata to resolve coercions (e.g. dimension → hierarchy) at compile time.

use olap_model::{DimensionId, HierarchyId, LevelId, MemberId, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Boolean,
    /// Double precision number.
    Numeric,
    Integer,
    Decimal { precision: u8, scale: u8 },
    String,
    DateTime,
    /// A scalar whose category is only known at evaluation time (e.g. a cell value).
    Value,
}

impl ScalarType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ScalarType::Numeric | ScalarType::Integer | ScalarType::Decimal { .. }
        )
    }

    /// Integer-valued and guaranteed to fit in 32 bits.
    pub fn is_int32(self) -> bool {
        match self {
            ScalarType::Integer => true,
            ScalarType::Decimal { precision, scale } => scale == 0 && precision <= 9,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MemberType {
    pub dimension: Option<DimensionId>,
    pub hierarchy: Option<HierarchyId>,
    pub level: Option<LevelId>,
}

impl MemberType {
    pub fn for_member(schema: &Schema, member: MemberId) -> Self {
        let m = schema.member(member);
        Self {
            dimension: Some(schema.hierarchy(m.hierarchy()).dimension()),
            hierarchy: Some(m.hierarchy()),
            level: m.level(),
        }
    }

    pub fn for_hierarchy(schema: &Schema, hierarchy: HierarchyId) -> Self {
        Self {
            dimension: Some(schema.hierarchy(hierarchy).dimension()),
            hierarchy: Some(hierarchy),
            level: None,
        }
    }

    pub fn for_level(schema: &Schema, level: LevelId) -> Self {
        let hierarchy = schema.level(level).hierarchy();
        Self {
            dimension: Some(schema.hierarchy(hierarchy).dimension()),
            hierarchy: Some(hierarchy),
            level: Some(level),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LevelType {
    pub dimension: Option<DimensionId>,
    pub hierarchy: Option<HierarchyId>,
    pub level: Option<LevelId>,
}

impl LevelType {
    pub fn for_level(schema: &Schema, level: LevelId) -> Self {
        let member = MemberType::for_level(schema, level);
        Self {
            dimension: member.dimension,
            hierarchy: member.hierarchy,
            level: Some(level),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct HierarchyType {
    pub dimension: Option<DimensionId>,
    pub hierarchy: Option<HierarchyId>,
}

impl HierarchyType {
    pub fn for_hierarchy(schema: &Schema, hierarchy: HierarchyId) -> Self {
        Self {
            dimension: Some(schema.hierarchy(hierarchy).dimension()),
            hierarchy: Some(hierarchy),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DimensionType {
    pub dimension: Option<DimensionId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Scalar(ScalarType),
    Member(MemberType),
    Level(LevelType),
    Hierarchy(HierarchyType),
    Dimension(DimensionType),
    /// Element types are member types, one per tuple position.
    Tuple(Vec<Type>),
    /// Element type is a member or tuple type.
    Set(Box<Type>),
    Null,
}

impl Type {
    pub const BOOLEAN: Type = Type::Scalar(ScalarType::Boolean);
    pub const NUMERIC: Type = Type::Scalar(ScalarType::Numeric);
    pub const INTEGER: Type = Type::Scalar(ScalarType::Integer);
    pub const STRING: Type = Type::Scalar(ScalarType::String);
    pub const DATE_TIME: Type = Type::Scalar(ScalarType::DateTime);
    pub const VALUE: Type = Type::Scalar(ScalarType::Value);

    pub fn member() -> Type {
        Type::Member(MemberType::default())
    }

    pub fn hierarchy() -> Type {
        Type::Hierarchy(HierarchyType::default())
    }

    pub fn set_of(element: Type) -> Type {
        Type::Set(Box::new(element))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Scalar(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Scalar(s) if s.is_numeric())
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Type::Set(_))
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Set(element) => Some(element),
            _ => None,
        }
    }

    /// Number of members per tuple for set and tuple types; 1 for members.
    pub fn arity(&self) -> usize {
        match self {
            Type::Set(element) => element.arity(),
            Type::Tuple(elements) => elements.len(),
            _ => 1,
        }
    }

    /// The hierarchy this type is pinned to, if any.
    pub fn pinned_hierarchy(&self) -> Option<HierarchyId> {
        match self {
            Type::Member(t) => t.hierarchy,
            Type::Level(t) => t.hierarchy,
            Type::Hierarchy(t) => t.hierarchy,
            _ => None,
        }
    }

    /// The dimension this type is pinned to, if any.
    pub fn pinned_dimension(&self) -> Option<DimensionId> {
        match self {
            Type::Member(t) => t.dimension,
            Type::Level(t) => t.dimension,
            Type::Hierarchy(t) => t.dimension,
            Type::Dimension(t) => t.dimension,
            _ => None,
        }
    }

    /// The member type of each tuple position, for member, tuple and set types.
    pub fn member_types(&self) -> Vec<Type> {
        match self {
            Type::Set(element) => element.member_types(),
            Type::Tuple(elements) => elements.clone(),
            Type::Member(_) => vec![self.clone()],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Boolean => f.write_str("BOOLEAN"),
            ScalarType::Numeric => f.write_str("NUMERIC"),
            ScalarType::Integer => f.write_str("INTEGER"),
            ScalarType::Decimal { precision, scale } => write!(f, "DECIMAL({precision}, {scale})"),
            ScalarType::String => f.write_str("STRING"),
            ScalarType::DateTime => f.write_str("DATETIME"),
            ScalarType::Value => f.write_str("SCALAR"),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Scalar(s) => write!(f, "{s}"),
            Type::Member(_) => f.write_str("MEMBER"),
            Type::Level(_) => f.write_str("LEVEL"),
            Type::Hierarchy(_) => f.write_str("HIERARCHY"),
            Type::Dimension(_) => f.write_str("DIMENSION"),
            Type::Tuple(elements) => {
                f.write_str("TUPLE(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str(")")
            }
            Type::Set(element) => write!(f, "SET<{element}>"),
            Type::Null => f.write_str("NULL"),
        }
    }
}
