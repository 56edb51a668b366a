//! Typed input expressions.
//!
//! Expressions arrive fully validated: every node carries its static [`Type`] and function calls
//! carry the resolved [`FunDef`]. The compiler only reads them.

use crate::error::CompileResult;
use crate::funs::{FunDef, Syntax};
use crate::types::{
    DimensionType, HierarchyType, LevelType, MemberType, ScalarType, Type,
};
use chrono::NaiveDateTime;
use olap_model::{DimensionId, HierarchyId, LevelId, MemberId, Schema};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    DateTime(NaiveDateTime),
}

impl Literal {
    /// Integer literals are zero-scale decimals whose precision is their digit count.
    pub fn static_type(&self) -> Type {
        match self {
            Literal::Null => Type::Null,
            Literal::Boolean(_) => Type::BOOLEAN,
            Literal::Integer(i) => {
                let digits = i.unsigned_abs().checked_ilog10().map_or(1, |d| d + 1);
                Type::Scalar(ScalarType::Decimal {
                    precision: digits as u8,
                    scale: 0,
                })
            }
            Literal::Double(_) => Type::NUMERIC,
            Literal::String(_) => Type::STRING,
            Literal::DateTime(_) => Type::DATE_TIME,
        }
    }
}

/// Reference to a query parameter by name. The definition lives in the compiler's parameter
/// definitions; see [`crate::parameter`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParameterRef {
    name: Arc<str>,
}

impl ParameterRef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug)]
pub struct FunCall {
    fun: Arc<dyn FunDef>,
    args: Vec<Exp>,
}

impl FunCall {
    pub fn fun(&self) -> &Arc<dyn FunDef> {
        &self.fun
    }

    pub fn args(&self) -> &[Exp] {
        &self.args
    }

    pub fn arg(&self, idx: usize) -> &Exp {
        &self.args[idx]
    }
}

#[derive(Clone, Debug)]
pub enum ExpKind {
    Literal(Literal),
    Dimension(DimensionId),
    Hierarchy(HierarchyId),
    Level(LevelId),
    Member(MemberId),
    Parameter(ParameterRef),
    Call(FunCall),
}

#[derive(Clone, Debug)]
pub struct Exp {
    kind: ExpKind,
    ty: Type,
}

impl Exp {
    /// Build an expression with an externally computed type. Validators use this; the typed
    /// constructors below cover the common cases.
    pub fn new(kind: ExpKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    pub fn literal(literal: Literal) -> Self {
        let ty = literal.static_type();
        Self::new(ExpKind::Literal(literal), ty)
    }

    pub fn null() -> Self {
        Self::literal(Literal::Null)
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(Literal::Boolean(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::literal(Literal::Integer(value))
    }

    pub fn double(value: f64) -> Self {
        Self::literal(Literal::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(Literal::String(value.into()))
    }

    pub fn date_time(value: NaiveDateTime) -> Self {
        Self::literal(Literal::DateTime(value))
    }

    pub fn dimension(id: DimensionId) -> Self {
        let ty = Type::Dimension(DimensionType {
            dimension: Some(id),
        });
        Self::new(ExpKind::Dimension(id), ty)
    }

    pub fn hierarchy(schema: &Schema, id: HierarchyId) -> Self {
        let ty = Type::Hierarchy(HierarchyType::for_hierarchy(schema, id));
        Self::new(ExpKind::Hierarchy(id), ty)
    }

    pub fn level(schema: &Schema, id: LevelId) -> Self {
        let ty = Type::Level(LevelType::for_level(schema, id));
        Self::new(ExpKind::Level(id), ty)
    }

    pub fn member(schema: &Schema, id: MemberId) -> Self {
        let ty = Type::Member(MemberType::for_member(schema, id));
        Self::new(ExpKind::Member(id), ty)
    }

    pub fn parameter(name: &str, ty: Type) -> Self {
        Self::new(
            ExpKind::Parameter(ParameterRef {
                name: Arc::from(name),
            }),
            ty,
        )
    }

    /// Build a call, asking the function for its result type.
    pub fn call(schema: &Schema, fun: Arc<dyn FunDef>, args: Vec<Exp>) -> CompileResult<Self> {
        let ty = fun.result_type(schema, &args)?;
        Ok(Self::new(ExpKind::Call(FunCall { fun, args }), ty))
    }

    pub fn kind(&self) -> &ExpKind {
        &self.kind
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn is_constant(&self) -> bool {
        !matches!(self.kind, ExpKind::Parameter(_) | ExpKind::Call(_))
    }

    pub fn display<'a>(&'a self, schema: &'a Schema) -> ExpDisplay<'a> {
        ExpDisplay { exp: self, schema }
    }
}

/// Renders an expression in MDX-like syntax, resolving metadata names through the schema.
pub struct ExpDisplay<'a> {
    exp: &'a Exp,
    schema: &'a Schema,
}

impl ExpDisplay<'_> {
    fn child<'b>(&'b self, exp: &'b Exp) -> ExpDisplay<'b> {
        ExpDisplay {
            exp,
            schema: self.schema,
        }
    }

    fn write_list(&self, f: &mut fmt::Formatter<'_>, args: &[Exp]) -> fmt::Result {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.child(arg))?;
        }
        Ok(())
    }
}

impl fmt::Display for ExpDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exp.kind {
            ExpKind::Literal(lit) => match lit {
                Literal::Null => f.write_str("NULL"),
                Literal::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
                Literal::Integer(i) => write!(f, "{i}"),
                Literal::Double(d) => write!(f, "{d:?}"),
                Literal::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
                Literal::DateTime(dt) => write!(f, "CDate(\"{}\")", dt.format("%Y-%m-%d %H:%M:%S")),
            },
            ExpKind::Dimension(id) => f.write_str(self.schema.dimension(*id).unique_name()),
            ExpKind::Hierarchy(id) => f.write_str(self.schema.hierarchy(*id).unique_name()),
            ExpKind::Level(id) => f.write_str(self.schema.level(*id).unique_name()),
            ExpKind::Member(id) => f.write_str(self.schema.member(*id).unique_name()),
            ExpKind::Parameter(p) => write!(f, "ParamRef(\"{}\")", p.name()),
            ExpKind::Call(call) => {
                let name = call.fun.name();
                let args = call.args();
                match call.fun.syntax() {
                    Syntax::Function => {
                        write!(f, "{name}(")?;
                        self.write_list(f, args)?;
                        f.write_str(")")
                    }
                    Syntax::Property => match args.first() {
                        Some(target) => write!(f, "{}.{name}", self.child(target)),
                        None => f.write_str(name),
                    },
                    Syntax::Method => match args.split_first() {
                        Some((target, rest)) => {
                            write!(f, "{}.{name}(", self.child(target))?;
                            self.write_list(f, rest)?;
                            f.write_str(")")
                        }
                        None => write!(f, "{name}()"),
                    },
                    Syntax::Infix => match args {
                        [l, r] => write!(f, "({} {name} {})", self.child(l), self.child(r)),
                        _ => {
                            write!(f, "{name}(")?;
                            self.write_list(f, args)?;
                            f.write_str(")")
                        }
                    },
                    Syntax::Prefix => match args {
                        [operand] => write!(f, "{name} {}", self.child(operand)),
                        _ => {
                            write!(f, "{name}(")?;
                            self.write_list(f, args)?;
                            f.write_str(")")
                        }
                    },
                    Syntax::Braces => {
                        f.write_str("{")?;
                        self.write_list(f, args)?;
                        f.write_str("}")
                    }
                    Syntax::Parentheses => {
                        f.write_str("(")?;
                        self.write_list(f, args)?;
                        f.write_str(")")
                    }
                }
            }
        }
    }
}
