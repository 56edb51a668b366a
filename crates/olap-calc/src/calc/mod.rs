//! Compiled calculators.
//!
//! A [`Calc`] is one node of a compiled expression tree. The set of node *kinds* is closed (one
//! [`Calc`] variant per kind of result); each kind is a trait so that bridging calcs, constants and
//! function implementations can all provide nodes of that kind.
//!
//! Calc trees are immutable once built and are shared across threads; everything that varies per
//! evaluation lives in the [`Evaluator`].

mod bridge;
mod constant;
mod convert;
mod explain;
mod tuple;

pub use bridge::{
    CopyList, CopyOnWriteList, DefaultMemberTuple, HierarchyCurrentMember,
    HierarchyCurrentMemberFixed, IterToList, LevelHierarchy, MemberArrayValue, MemberTuple,
    MemberValue, TupleValue,
};
pub use constant::ConstantCalc;
pub use convert::{
    double_to_integer, value_to_boolean, value_to_date_time, value_to_double, value_to_integer,
    value_to_string, CastToNumeric, DoubleToBoolean, DoubleToInteger, IntegerToBoolean,
    IntegerToDouble, ScalarToValue, ValueToBoolean, ValueToDateTime, ValueToDouble,
    ValueToInteger, ValueToString,
};
pub use tuple::{drain_cursor, ListCursor, Tuple, TupleCursor, TupleList};

use crate::error::{CalcResult, CompileError, CompileResult, EvalError};
use crate::evaluator::Evaluator;
use crate::types::{ScalarType, Type};
use chrono::NaiveDateTime;
use olap_model::{DimensionId, HierarchyId, LevelId, MemberId, Value};
use std::fmt;
use std::sync::Arc;

/// Physical representation a set-valued calc produces, or a request for one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResultStyle {
    /// Not a set: a member, scalar, tuple, ...
    Value,
    /// An immutable, possibly shared list.
    List,
    /// A list owned exclusively by the caller.
    MutableList,
    /// A lazily produced sequence.
    Iterable,
    /// Whatever is cheapest.
    Any,
}

impl ResultStyle {
    /// Whether a calc producing `self` serves a request for `requested`.
    ///
    /// A mutable list is also a list, and every list is also iterable.
    pub fn satisfies(self, requested: ResultStyle) -> bool {
        use ResultStyle::*;
        match (self, requested) {
            (_, Any) => true,
            (a, b) if a == b => true,
            (MutableList, List) => true,
            (List | MutableList, Iterable) => true,
            _ => false,
        }
    }

    fn bit(self) -> u8 {
        match self {
            ResultStyle::Value => 1,
            ResultStyle::List => 1 << 1,
            ResultStyle::MutableList => 1 << 2,
            ResultStyle::Iterable => 1 << 3,
            ResultStyle::Any => 1 << 4,
        }
    }
}

/// A set of acceptable [`ResultStyle`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultStyles(u8);

impl ResultStyles {
    pub const ANY: ResultStyles = ResultStyles(1 << 4);
    pub const LIST: ResultStyles = ResultStyles(1 << 1);
    pub const MUTABLE_LIST: ResultStyles = ResultStyles(1 << 2);
    pub const ITERABLE: ResultStyles = ResultStyles(1 << 3);
    pub const VALUE: ResultStyles = ResultStyles(1);

    pub fn of(styles: &[ResultStyle]) -> Self {
        ResultStyles(styles.iter().fold(0, |acc, s| acc | s.bit()))
    }

    pub fn contains(self, style: ResultStyle) -> bool {
        self.0 & style.bit() != 0
    }

    /// Whether a calc producing `style` satisfies at least one requested style.
    pub fn accepts(self, style: ResultStyle) -> bool {
        self.iter().any(|requested| style.satisfies(requested))
    }

    pub fn iter(self) -> impl Iterator<Item = ResultStyle> {
        [
            ResultStyle::Value,
            ResultStyle::List,
            ResultStyle::MutableList,
            ResultStyle::Iterable,
            ResultStyle::Any,
        ]
        .into_iter()
        .filter(move |s| self.contains(*s))
    }
}

impl fmt::Debug for ResultStyles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for ResultStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResultStyle::Value => "VALUE",
            ResultStyle::List => "LIST",
            ResultStyle::MutableList => "MUTABLE_LIST",
            ResultStyle::Iterable => "ITERABLE",
            ResultStyle::Any => "ANY",
        })
    }
}

/// Result of evaluating a calc of any kind.
#[derive(Clone, Debug, PartialEq)]
pub enum CalcValue {
    Member(MemberId),
    Level(LevelId),
    Hierarchy(HierarchyId),
    Dimension(DimensionId),
    Scalar(Value),
    Tuple(Tuple),
    List(TupleList),
}

impl From<Value> for CalcValue {
    fn from(value: Value) -> Self {
        CalcValue::Scalar(value)
    }
}

impl From<MemberId> for CalcValue {
    fn from(member: MemberId) -> Self {
        CalcValue::Member(member)
    }
}

/// Behaviour shared by every calc node, whatever its kind.
pub trait CalcNode: fmt::Debug + Send + Sync {
    /// Short node name used by [`Calc::explain`] and in diagnostics.
    fn name(&self) -> &'static str;

    fn result_type(&self) -> Type;

    fn children(&self) -> Vec<Calc> {
        Vec::new()
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::Value
    }

    /// The folded value, for nodes computed entirely at compile time.
    fn constant(&self) -> Option<&CalcValue> {
        None
    }

    /// Extra `key=value` annotations shown by [`Calc::explain`].
    fn annotations(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

pub trait MemberCalc: CalcNode {
    fn evaluate_member(&self, ev: &mut dyn Evaluator) -> CalcResult<MemberId>;
}

pub trait LevelCalc: CalcNode {
    fn evaluate_level(&self, ev: &mut dyn Evaluator) -> CalcResult<LevelId>;
}

pub trait HierarchyCalc: CalcNode {
    fn evaluate_hierarchy(&self, ev: &mut dyn Evaluator) -> CalcResult<HierarchyId>;
}

pub trait DimensionCalc: CalcNode {
    fn evaluate_dimension(&self, ev: &mut dyn Evaluator) -> CalcResult<DimensionId>;
}

/// Nulls evaluate to `false`.
pub trait BooleanCalc: CalcNode {
    fn evaluate_boolean(&self, ev: &mut dyn Evaluator) -> CalcResult<bool>;
}

pub trait IntegerCalc: CalcNode {
    fn evaluate_integer(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<i32>>;
}

pub trait DoubleCalc: CalcNode {
    fn evaluate_double(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<f64>>;
}

pub trait StringCalc: CalcNode {
    fn evaluate_string(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<String>>;
}

pub trait DateTimeCalc: CalcNode {
    fn evaluate_date_time(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<NaiveDateTime>>;
}

/// A scalar whose category is only known at evaluation time.
pub trait ValueCalc: CalcNode {
    fn evaluate_value(&self, ev: &mut dyn Evaluator) -> CalcResult<Value>;
}

pub trait TupleCalc: CalcNode {
    fn evaluate_tuple(&self, ev: &mut dyn Evaluator) -> CalcResult<Tuple>;

    /// For tuple constructors: the member calcs, one per position. Lets consumers evaluate the
    /// members directly instead of materializing the tuple.
    fn member_calcs(&self) -> Option<&[Arc<dyn MemberCalc>]> {
        None
    }
}

pub trait ListCalc: CalcNode {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList>;
}

pub trait IterCalc: CalcNode {
    fn evaluate_iterable<'a>(
        &'a self,
        ev: &mut dyn Evaluator,
    ) -> CalcResult<Box<dyn TupleCursor + 'a>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CalcKind {
    Member,
    Level,
    Hierarchy,
    Dimension,
    Boolean,
    Integer,
    Double,
    String,
    DateTime,
    Value,
    Tuple,
    List,
    Iterable,
}

/// A compiled node. The variant is the kind of result the node produces.
#[derive(Clone, Debug)]
pub enum Calc {
    Member(Arc<dyn MemberCalc>),
    Level(Arc<dyn LevelCalc>),
    Hierarchy(Arc<dyn HierarchyCalc>),
    Dimension(Arc<dyn DimensionCalc>),
    Boolean(Arc<dyn BooleanCalc>),
    Integer(Arc<dyn IntegerCalc>),
    Double(Arc<dyn DoubleCalc>),
    String(Arc<dyn StringCalc>),
    DateTime(Arc<dyn DateTimeCalc>),
    Value(Arc<dyn ValueCalc>),
    Tuple(Arc<dyn TupleCalc>),
    List(Arc<dyn ListCalc>),
    Iterable(Arc<dyn IterCalc>),
}

/// Run `$body` with `$c` bound to the node of whatever kind `$calc` holds.
macro_rules! with_node {
    ($calc:expr, $c:ident => $body:expr) => {
        match $calc {
            Calc::Member($c) => $body,
            Calc::Level($c) => $body,
            Calc::Hierarchy($c) => $body,
            Calc::Dimension($c) => $body,
            Calc::Boolean($c) => $body,
            Calc::Integer($c) => $body,
            Calc::Double($c) => $body,
            Calc::String($c) => $body,
            Calc::DateTime($c) => $body,
            Calc::Value($c) => $body,
            Calc::Tuple($c) => $body,
            Calc::List($c) => $body,
            Calc::Iterable($c) => $body,
        }
    };
}

/// The calc kind that produces values of `ty`.
///
/// Zero-scale decimals that fit in 32 bits are integers; every other numeric is a double.
pub fn kind_for_type(ty: &Type) -> CalcKind {
    match ty {
        Type::Scalar(s) => match s {
            ScalarType::Boolean => CalcKind::Boolean,
            s if s.is_int32() => CalcKind::Integer,
            ScalarType::Numeric | ScalarType::Integer | ScalarType::Decimal { .. } => {
                CalcKind::Double
            }
            ScalarType::String => CalcKind::String,
            ScalarType::DateTime => CalcKind::DateTime,
            ScalarType::Value => CalcKind::Value,
        },
        Type::Member(_) => CalcKind::Member,
        Type::Level(_) => CalcKind::Level,
        Type::Hierarchy(_) => CalcKind::Hierarchy,
        Type::Dimension(_) => CalcKind::Dimension,
        Type::Tuple(_) => CalcKind::Tuple,
        Type::Set(_) => CalcKind::List,
        Type::Null => CalcKind::Value,
    }
}

macro_rules! calc_conversions {
    ($($variant:ident: $trait:ident => $into:ident),* $(,)?) => {
        $(
            impl From<Arc<dyn $trait>> for Calc {
                fn from(calc: Arc<dyn $trait>) -> Self {
                    Calc::$variant(calc)
                }
            }
        )*

        impl Calc {
            $(
                /// Downcast to this kind. A mismatch is a compiler defect.
                pub fn $into(self) -> CompileResult<Arc<dyn $trait>> {
                    match self {
                        Calc::$variant(c) => Ok(c),
                        other => Err(CompileError::internal(format!(
                            "expected a {} calc, got {} calc {}",
                            stringify!($variant).to_ascii_lowercase(),
                            other.kind_name(),
                            other.name()
                        ))),
                    }
                }
            )*
        }
    };
}

calc_conversions! {
    Member: MemberCalc => into_member,
    Level: LevelCalc => into_level,
    Hierarchy: HierarchyCalc => into_hierarchy,
    Dimension: DimensionCalc => into_dimension,
    Boolean: BooleanCalc => into_boolean,
    Integer: IntegerCalc => into_integer,
    Double: DoubleCalc => into_double,
    String: StringCalc => into_string,
    DateTime: DateTimeCalc => into_date_time,
    Value: ValueCalc => into_value,
    Tuple: TupleCalc => into_tuple,
    List: ListCalc => into_list,
    Iterable: IterCalc => into_iterable,
}

impl Calc {
    /// A compile-time constant of type `ty`, wrapped in the variant matching that type.
    pub fn constant_of(value: CalcValue, ty: Type) -> Calc {
        let kind = kind_for_type(&ty);
        let c = Arc::new(ConstantCalc::new(value, ty));
        match kind {
            CalcKind::Member => Calc::Member(c),
            CalcKind::Level => Calc::Level(c),
            CalcKind::Hierarchy => Calc::Hierarchy(c),
            CalcKind::Dimension => Calc::Dimension(c),
            CalcKind::Boolean => Calc::Boolean(c),
            CalcKind::Integer => Calc::Integer(c),
            CalcKind::Double => Calc::Double(c),
            CalcKind::String => Calc::String(c),
            CalcKind::DateTime => Calc::DateTime(c),
            CalcKind::Value => Calc::Value(c),
            CalcKind::Tuple => Calc::Tuple(c),
            CalcKind::List => Calc::List(c),
            CalcKind::Iterable => Calc::Iterable(c),
        }
    }

    pub fn kind(&self) -> CalcKind {
        match self {
            Calc::Member(_) => CalcKind::Member,
            Calc::Level(_) => CalcKind::Level,
            Calc::Hierarchy(_) => CalcKind::Hierarchy,
            Calc::Dimension(_) => CalcKind::Dimension,
            Calc::Boolean(_) => CalcKind::Boolean,
            Calc::Integer(_) => CalcKind::Integer,
            Calc::Double(_) => CalcKind::Double,
            Calc::String(_) => CalcKind::String,
            Calc::DateTime(_) => CalcKind::DateTime,
            Calc::Value(_) => CalcKind::Value,
            Calc::Tuple(_) => CalcKind::Tuple,
            Calc::List(_) => CalcKind::List,
            Calc::Iterable(_) => CalcKind::Iterable,
        }
    }

    pub fn name(&self) -> &'static str {
        with_node!(self, c => c.name())
    }

    pub fn result_type(&self) -> Type {
        with_node!(self, c => c.result_type())
    }

    pub fn result_style(&self) -> ResultStyle {
        with_node!(self, c => c.result_style())
    }

    pub fn children(&self) -> Vec<Calc> {
        with_node!(self, c => c.children())
    }

    pub fn constant(&self) -> Option<&CalcValue> {
        with_node!(self, c => c.constant())
    }

    pub fn is_constant(&self) -> bool {
        self.constant().is_some()
    }

    pub fn annotations(&self) -> Vec<(&'static str, String)> {
        with_node!(self, c => c.annotations())
    }

    /// Identity of the underlying node, for comparing calcs without comparing behaviour.
    pub fn ptr_eq(&self, other: &Calc) -> bool {
        fn addr<T: ?Sized>(arc: &Arc<T>) -> *const () {
            Arc::as_ptr(arc) as *const ()
        }
        let a = with_node!(self, c => addr(c));
        let b = with_node!(other, c => addr(c));
        a == b
    }

    /// Evaluate regardless of kind. Iterables are drained into a list.
    pub fn evaluate(&self, ev: &mut dyn Evaluator) -> CalcResult<CalcValue> {
        Ok(match self {
            Calc::Member(c) => CalcValue::Member(c.evaluate_member(ev)?),
            Calc::Level(c) => CalcValue::Level(c.evaluate_level(ev)?),
            Calc::Hierarchy(c) => CalcValue::Hierarchy(c.evaluate_hierarchy(ev)?),
            Calc::Dimension(c) => CalcValue::Dimension(c.evaluate_dimension(ev)?),
            Calc::Tuple(c) => CalcValue::Tuple(c.evaluate_tuple(ev)?),
            Calc::List(c) => CalcValue::List(c.evaluate_list(ev)?),
            Calc::Iterable(c) => {
                let arity = c.result_type().arity();
                let cursor = c.evaluate_iterable(ev)?;
                CalcValue::List(drain_cursor(cursor, ev, arity)?)
            }
            scalar => CalcValue::Scalar(scalar.evaluate_scalar(ev)?),
        })
    }

    /// Evaluate a scalar-kind calc to a [`Value`].
    pub fn evaluate_scalar(&self, ev: &mut dyn Evaluator) -> CalcResult<Value> {
        match self {
            Calc::Boolean(c) => Ok(Value::Boolean(c.evaluate_boolean(ev)?)),
            Calc::Integer(c) => Ok(c.evaluate_integer(ev)?.into()),
            Calc::Double(c) => Ok(c.evaluate_double(ev)?.into()),
            Calc::String(c) => Ok(c.evaluate_string(ev)?.into()),
            Calc::DateTime(c) => Ok(c.evaluate_date_time(ev)?.into()),
            Calc::Value(c) => c.evaluate_value(ev),
            other => Err(EvalError::Internal(format!(
                "{} calc {} is not scalar",
                other.kind_name(),
                other.name()
            ))),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind() {
            CalcKind::Member => "member",
            CalcKind::Level => "level",
            CalcKind::Hierarchy => "hierarchy",
            CalcKind::Dimension => "dimension",
            CalcKind::Boolean => "boolean",
            CalcKind::Integer => "integer",
            CalcKind::Double => "double",
            CalcKind::String => "string",
            CalcKind::DateTime => "datetime",
            CalcKind::Value => "value",
            CalcKind::Tuple => "tuple",
            CalcKind::List => "list",
            CalcKind::Iterable => "iterable",
        }
    }

    /// Indented plan of the calc tree, one node per line.
    pub fn explain(&self) -> String {
        explain::explain(self)
    }
}

/// A set-valued calc: either a list or a lazy iterable. Both can be iterated.
#[derive(Clone, Debug)]
pub enum SetCalc {
    List(Arc<dyn ListCalc>),
    Iterable(Arc<dyn IterCalc>),
}

impl SetCalc {
    pub fn from_calc(calc: Calc) -> Option<Self> {
        match calc {
            Calc::List(c) => Some(SetCalc::List(c)),
            Calc::Iterable(c) => Some(SetCalc::Iterable(c)),
            _ => None,
        }
    }

    pub fn into_calc(self) -> Calc {
        match self {
            SetCalc::List(c) => Calc::List(c),
            SetCalc::Iterable(c) => Calc::Iterable(c),
        }
    }

    pub fn result_style(&self) -> ResultStyle {
        match self {
            SetCalc::List(c) => c.result_style(),
            SetCalc::Iterable(c) => c.result_style(),
        }
    }

    pub fn result_type(&self) -> Type {
        match self {
            SetCalc::List(c) => c.result_type(),
            SetCalc::Iterable(c) => c.result_type(),
        }
    }

    pub fn cursor<'a>(&'a self, ev: &mut dyn Evaluator) -> CalcResult<Box<dyn TupleCursor + 'a>> {
        match self {
            SetCalc::List(c) => Ok(Box::new(ListCursor::new(c.evaluate_list(ev)?))),
            SetCalc::Iterable(c) => c.evaluate_iterable(ev),
        }
    }

    /// Evaluate to a list, draining an iterable if necessary.
    pub fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        match self {
            SetCalc::List(c) => c.evaluate_list(ev),
            SetCalc::Iterable(c) => {
                let arity = c.result_type().arity();
                let cursor = c.evaluate_iterable(ev)?;
                drain_cursor(cursor, ev, arity)
            }
        }
    }
}
