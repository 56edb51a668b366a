//! Arithmetic, comparison and logical operators, `IIf` and `IsEmpty`.
//!
//! Empty operands follow the usual OLAP rules: `+` and `-` treat an empty operand as zero unless
//! both are empty, `*` and `/` are empty if either operand is, and division by zero is empty.

use super::{check_arity, invalid_arg, FunDef, FunTable, Syntax};
use crate::calc::{
    value_to_double, BooleanCalc, Calc, CalcNode, CalcValue, DateTimeCalc, DoubleCalc,
    IntegerCalc, MemberCalc, ResultStyles, ScalarToValue, StringCalc, ValueCalc,
};
use crate::compiler::CompileCx;
use crate::error::{CalcResult, CompileError, CompileResult};
use crate::evaluator::Evaluator;
use crate::exp::{Exp, FunCall};
use crate::types::{MemberType, ScalarType, Type};
use chrono::NaiveDateTime;
use olap_model::{MemberId, Schema, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub(super) fn register(table: &mut FunTable) {
    for op in [
        ArithOp::Add,
        ArithOp::Subtract,
        ArithOp::Multiply,
        ArithOp::Divide,
    ] {
        table.register(Arithmetic { op });
    }
    table.register(Negate);
    for op in [
        CmpOp::Eq,
        CmpOp::Ne,
        CmpOp::Lt,
        CmpOp::Le,
        CmpOp::Gt,
        CmpOp::Ge,
    ] {
        table.register(Comparison { op });
    }
    table.register(Logical { op: LogicOp::And });
    table.register(Logical { op: LogicOp::Or });
    table.register(Not);
    table.register(IIf);
    table.register(IsEmpty);
}

/// Members and tuples are accepted and read as their cell values.
fn is_numeric_operand(ty: &Type) -> bool {
    ty.is_numeric()
        || matches!(
            ty,
            Type::Scalar(ScalarType::Value) | Type::Null | Type::Member(_) | Type::Tuple(_)
        )
}

fn check_operands(fun: &str, args: &[Exp], accept: impl Fn(&Type) -> bool) -> CompileResult<()> {
    for (i, arg) in args.iter().enumerate() {
        if !accept(arg.ty()) {
            return Err(invalid_arg(
                fun,
                i,
                format!("operand of type {} is not allowed", arg.ty()),
            ));
        }
    }
    Ok(())
}

fn constant_double(calc: &Arc<dyn DoubleCalc>) -> Option<Option<f64>> {
    match calc.constant() {
        Some(CalcValue::Scalar(v)) => value_to_double(v).ok(),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Subtract => "-",
            ArithOp::Multiply => "*",
            ArithOp::Divide => "/",
        }
    }

    fn apply(self, l: Option<f64>, r: Option<f64>) -> Option<f64> {
        match self {
            ArithOp::Add | ArithOp::Subtract => {
                if l.is_none() && r.is_none() {
                    return None;
                }
                let (l, r) = (l.unwrap_or(0.0), r.unwrap_or(0.0));
                Some(if self == ArithOp::Add { l + r } else { l - r })
            }
            ArithOp::Multiply => Some(l? * r?),
            ArithOp::Divide => {
                let (l, r) = (l?, r?);
                if r == 0.0 {
                    None
                } else {
                    Some(l / r)
                }
            }
        }
    }
}

#[derive(Debug)]
struct Arithmetic {
    op: ArithOp,
}

impl FunDef for Arithmetic {
    fn name(&self) -> &str {
        self.op.symbol()
    }

    fn syntax(&self) -> Syntax {
        Syntax::Infix
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 2, 2)?;
        check_operands(self.name(), args, is_numeric_operand)?;
        Ok(Type::NUMERIC)
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let left = cx.compile_double(call.arg(0))?;
        let right = cx.compile_double(call.arg(1))?;
        if let (Some(l), Some(r)) = (constant_double(&left), constant_double(&right)) {
            let value = Value::from(self.op.apply(l, r));
            return Ok(Calc::constant_of(CalcValue::Scalar(value), ty.clone()));
        }
        Ok(Calc::Double(Arc::new(ArithmeticCalc {
            op: self.op,
            left,
            right,
        })))
    }
}

#[derive(Debug)]
struct ArithmeticCalc {
    op: ArithOp,
    left: Arc<dyn DoubleCalc>,
    right: Arc<dyn DoubleCalc>,
}

impl CalcNode for ArithmeticCalc {
    fn name(&self) -> &'static str {
        "Arithmetic"
    }

    fn result_type(&self) -> Type {
        Type::NUMERIC
    }

    fn children(&self) -> Vec<Calc> {
        vec![
            Calc::Double(self.left.clone()),
            Calc::Double(self.right.clone()),
        ]
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        vec![("op", self.op.symbol().to_string())]
    }
}

impl DoubleCalc for ArithmeticCalc {
    fn evaluate_double(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<f64>> {
        let l = self.left.evaluate_double(ev)?;
        let r = self.right.evaluate_double(ev)?;
        Ok(self.op.apply(l, r))
    }
}

/// Unary `-`.
#[derive(Debug)]
struct Negate;

impl FunDef for Negate {
    fn name(&self) -> &str {
        "-"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Prefix
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 1, 1)?;
        check_operands(self.name(), args, is_numeric_operand)?;
        Ok(Type::NUMERIC)
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let operand = cx.compile_double(call.arg(0))?;
        if let Some(v) = constant_double(&operand) {
            let value = Value::from(v.map(|x| -x));
            return Ok(Calc::constant_of(CalcValue::Scalar(value), ty.clone()));
        }
        Ok(Calc::Double(Arc::new(NegateCalc { operand })))
    }
}

#[derive(Debug)]
struct NegateCalc {
    operand: Arc<dyn DoubleCalc>,
}

impl CalcNode for NegateCalc {
    fn name(&self) -> &'static str {
        "Negate"
    }

    fn result_type(&self) -> Type {
        Type::NUMERIC
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Double(self.operand.clone())]
    }
}

impl DoubleCalc for NegateCalc {
    fn evaluate_double(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<f64>> {
        Ok(self.operand.evaluate_double(ev)?.map(|x| -x))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn test(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Comparison operands, compiled to the category both sides share.
#[derive(Debug)]
enum Operands {
    /// Empty compares as zero.
    Number(Arc<dyn DoubleCalc>, Arc<dyn DoubleCalc>),
    /// Empty compares as the empty string.
    Text(Arc<dyn StringCalc>, Arc<dyn StringCalc>),
    Boolean(Arc<dyn BooleanCalc>, Arc<dyn BooleanCalc>),
    /// Empty sorts before every date.
    DateTime(Arc<dyn DateTimeCalc>, Arc<dyn DateTimeCalc>),
}

#[derive(Debug)]
struct Comparison {
    op: CmpOp,
}

impl FunDef for Comparison {
    fn name(&self) -> &str {
        self.op.symbol()
    }

    fn syntax(&self) -> Syntax {
        Syntax::Infix
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 2, 2)?;
        check_operands(self.name(), args, |t| {
            t.is_scalar() || matches!(t, Type::Null | Type::Member(_) | Type::Tuple(_))
        })?;
        Ok(Type::BOOLEAN)
    }

    fn compile_call(&self, call: &FunCall, _ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let (l, r) = (call.arg(0), call.arg(1));
        let operands = match (l.ty(), r.ty()) {
            (Type::Scalar(ScalarType::String), Type::Scalar(ScalarType::String)) => {
                Operands::Text(cx.compile_string(l)?, cx.compile_string(r)?)
            }
            (Type::Scalar(ScalarType::Boolean), Type::Scalar(ScalarType::Boolean)) => {
                Operands::Boolean(cx.compile_boolean(l)?, cx.compile_boolean(r)?)
            }
            (Type::Scalar(ScalarType::DateTime), Type::Scalar(ScalarType::DateTime)) => {
                Operands::DateTime(cx.compile_date_time(l)?, cx.compile_date_time(r)?)
            }
            _ => Operands::Number(cx.compile_double(l)?, cx.compile_double(r)?),
        };
        Ok(Calc::Boolean(Arc::new(ComparisonCalc {
            op: self.op,
            operands,
        })))
    }
}

#[derive(Debug)]
struct ComparisonCalc {
    op: CmpOp,
    operands: Operands,
}

impl CalcNode for ComparisonCalc {
    fn name(&self) -> &'static str {
        "Comparison"
    }

    fn result_type(&self) -> Type {
        Type::BOOLEAN
    }

    fn children(&self) -> Vec<Calc> {
        match &self.operands {
            Operands::Number(l, r) => vec![Calc::Double(l.clone()), Calc::Double(r.clone())],
            Operands::Text(l, r) => vec![Calc::String(l.clone()), Calc::String(r.clone())],
            Operands::Boolean(l, r) => vec![Calc::Boolean(l.clone()), Calc::Boolean(r.clone())],
            Operands::DateTime(l, r) => {
                vec![Calc::DateTime(l.clone()), Calc::DateTime(r.clone())]
            }
        }
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        vec![("op", self.op.symbol().to_string())]
    }
}

impl BooleanCalc for ComparisonCalc {
    fn evaluate_boolean(&self, ev: &mut dyn Evaluator) -> CalcResult<bool> {
        let ordering = match &self.operands {
            Operands::Number(l, r) => {
                let l = l.evaluate_double(ev)?.unwrap_or(0.0);
                let r = r.evaluate_double(ev)?.unwrap_or(0.0);
                l.partial_cmp(&r)
            }
            Operands::Text(l, r) => {
                let l = l.evaluate_string(ev)?.unwrap_or_default();
                let r = r.evaluate_string(ev)?.unwrap_or_default();
                Some(l.cmp(&r))
            }
            Operands::Boolean(l, r) => {
                let l = l.evaluate_boolean(ev)?;
                let r = r.evaluate_boolean(ev)?;
                Some(l.cmp(&r))
            }
            Operands::DateTime(l, r) => {
                let l = l.evaluate_date_time(ev)?;
                let r = r.evaluate_date_time(ev)?;
                Some(l.cmp(&r))
            }
        };
        // NaN is unordered: every comparison with it is false.
        Ok(ordering.is_some_and(|o| self.op.test(o)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogicOp {
    And,
    Or,
}

/// `AND` / `OR`; the right operand is only evaluated when it decides the result.
#[derive(Debug)]
struct Logical {
    op: LogicOp,
}

impl FunDef for Logical {
    fn name(&self) -> &str {
        match self.op {
            LogicOp::And => "AND",
            LogicOp::Or => "OR",
        }
    }

    fn syntax(&self) -> Syntax {
        Syntax::Infix
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 2, 2)?;
        check_operands(self.name(), args, |t| !t.is_set())?;
        Ok(Type::BOOLEAN)
    }

    fn compile_call(&self, call: &FunCall, _ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        Ok(Calc::Boolean(Arc::new(LogicalCalc {
            op: self.op,
            left: cx.compile_boolean(call.arg(0))?,
            right: cx.compile_boolean(call.arg(1))?,
        })))
    }
}

#[derive(Debug)]
struct LogicalCalc {
    op: LogicOp,
    left: Arc<dyn BooleanCalc>,
    right: Arc<dyn BooleanCalc>,
}

impl CalcNode for LogicalCalc {
    fn name(&self) -> &'static str {
        match self.op {
            LogicOp::And => "And",
            LogicOp::Or => "Or",
        }
    }

    fn result_type(&self) -> Type {
        Type::BOOLEAN
    }

    fn children(&self) -> Vec<Calc> {
        vec![
            Calc::Boolean(self.left.clone()),
            Calc::Boolean(self.right.clone()),
        ]
    }
}

impl BooleanCalc for LogicalCalc {
    fn evaluate_boolean(&self, ev: &mut dyn Evaluator) -> CalcResult<bool> {
        let left = self.left.evaluate_boolean(ev)?;
        match (self.op, left) {
            (LogicOp::And, false) => Ok(false),
            (LogicOp::Or, true) => Ok(true),
            _ => self.right.evaluate_boolean(ev),
        }
    }
}

#[derive(Debug)]
struct Not;

impl FunDef for Not {
    fn name(&self) -> &str {
        "NOT"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Prefix
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 1, 1)?;
        check_operands(self.name(), args, |t| !t.is_set())?;
        Ok(Type::BOOLEAN)
    }

    fn compile_call(&self, call: &FunCall, _ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let operand = cx.compile_boolean(call.arg(0))?;
        Ok(Calc::Boolean(Arc::new(NotCalc { operand })))
    }
}

#[derive(Debug)]
struct NotCalc {
    operand: Arc<dyn BooleanCalc>,
}

impl CalcNode for NotCalc {
    fn name(&self) -> &'static str {
        "Not"
    }

    fn result_type(&self) -> Type {
        Type::BOOLEAN
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Boolean(self.operand.clone())]
    }
}

impl BooleanCalc for NotCalc {
    fn evaluate_boolean(&self, ev: &mut dyn Evaluator) -> CalcResult<bool> {
        Ok(!self.operand.evaluate_boolean(ev)?)
    }
}

/// `IIf(condition, then, else)` over scalars or members.
#[derive(Debug)]
struct IIf;

/// The type both branches convert to.
fn common_branch_type(a: &Type, b: &Type) -> Option<Type> {
    if a == b {
        return Some(a.clone());
    }
    match (a, b) {
        (Type::Null, t) | (t, Type::Null) if t.is_scalar() => Some(t.clone()),
        (Type::Scalar(x), Type::Scalar(y)) if x.is_int32() && y.is_int32() => Some(Type::INTEGER),
        (Type::Scalar(x), Type::Scalar(y)) if x.is_numeric() && y.is_numeric() => {
            Some(Type::NUMERIC)
        }
        (Type::Scalar(_), Type::Scalar(_)) => Some(Type::VALUE),
        (Type::Member(x), Type::Member(y)) => {
            fn same<T: PartialEq>(p: Option<T>, q: Option<T>) -> Option<T> {
                if p == q {
                    p
                } else {
                    None
                }
            }
            Some(Type::Member(MemberType {
                dimension: same(x.dimension, y.dimension),
                hierarchy: same(x.hierarchy, y.hierarchy),
                level: same(x.level, y.level),
            }))
        }
        _ => None,
    }
}

impl FunDef for IIf {
    fn name(&self) -> &str {
        "IIf"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Function
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 3, 3)?;
        if args[0].ty().is_set() {
            return Err(invalid_arg(self.name(), 0, "expected a condition, got a set"));
        }
        common_branch_type(args[1].ty(), args[2].ty()).ok_or_else(|| {
            invalid_arg(
                self.name(),
                2,
                format!(
                    "branches of type {} and {} have no common type",
                    args[1].ty(),
                    args[2].ty()
                ),
            )
        })
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let condition = cx.compile_boolean(call.arg(0))?;
        let branch = |exp: &Exp| -> CompileResult<Calc> {
            let calc = cx.compile_as(exp, Some(ty), ResultStyles::VALUE)?;
            // A SCALAR target accepts any scalar kind; unify both branches as values.
            if *ty == Type::VALUE && !matches!(calc, Calc::Value(_)) {
                return Ok(Calc::Value(Arc::new(ScalarToValue::new(calc))));
            }
            Ok(calc)
        };
        let then = branch(call.arg(1))?;
        let otherwise = branch(call.arg(2))?;
        if let Some(CalcValue::Scalar(Value::Boolean(b))) = condition.constant() {
            return Ok(if *b { then } else { otherwise });
        }
        iif(condition, then, otherwise, ty.clone())
    }
}

#[derive(Debug)]
struct IIfCalc<T: ?Sized> {
    condition: Arc<dyn BooleanCalc>,
    then: Arc<T>,
    otherwise: Arc<T>,
    ty: Type,
}

fn iif(
    condition: Arc<dyn BooleanCalc>,
    then: Calc,
    otherwise: Calc,
    ty: Type,
) -> CompileResult<Calc> {
    macro_rules! build {
        ($($variant:ident),*) => {
            match (then, otherwise) {
                $(
                    (Calc::$variant(then), Calc::$variant(otherwise)) => {
                        Ok(Calc::$variant(Arc::new(IIfCalc { condition, then, otherwise, ty })))
                    }
                )*
                (then, otherwise) => Err(CompileError::internal(format!(
                    "IIf branches compiled to {} and {} calcs",
                    then.kind_name(),
                    otherwise.kind_name()
                ))),
            }
        };
    }
    build!(Member, Boolean, Integer, Double, String, DateTime, Value)
}

impl<T> CalcNode for IIfCalc<T>
where
    T: fmt::Debug + Send + Sync + ?Sized,
    Arc<T>: Into<Calc>,
{
    fn name(&self) -> &'static str {
        "IIf"
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn children(&self) -> Vec<Calc> {
        vec![
            Calc::Boolean(self.condition.clone()),
            self.then.clone().into(),
            self.otherwise.clone().into(),
        ]
    }
}

macro_rules! iif_kind {
    ($($trait:ident :: $method:ident -> $ret:ty;)*) => {
        $(
            impl $trait for IIfCalc<dyn $trait> {
                fn $method(&self, ev: &mut dyn Evaluator) -> CalcResult<$ret> {
                    if self.condition.evaluate_boolean(ev)? {
                        self.then.$method(ev)
                    } else {
                        self.otherwise.$method(ev)
                    }
                }
            }
        )*
    };
}

iif_kind! {
    MemberCalc::evaluate_member -> MemberId;
    BooleanCalc::evaluate_boolean -> bool;
    IntegerCalc::evaluate_integer -> Option<i32>;
    DoubleCalc::evaluate_double -> Option<f64>;
    StringCalc::evaluate_string -> Option<String>;
    DateTimeCalc::evaluate_date_time -> Option<NaiveDateTime>;
    ValueCalc::evaluate_value -> Value;
}

/// `IsEmpty(exp)`: whether the value is empty.
#[derive(Debug)]
struct IsEmpty;

impl FunDef for IsEmpty {
    fn name(&self) -> &str {
        "IsEmpty"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Function
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 1, 1)?;
        check_operands(self.name(), args, |t| !t.is_set())?;
        Ok(Type::BOOLEAN)
    }

    fn compile_call(&self, call: &FunCall, _ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let operand = cx.compile_scalar(call.arg(0), false)?;
        Ok(Calc::Boolean(Arc::new(IsEmptyCalc { operand })))
    }
}

#[derive(Debug)]
struct IsEmptyCalc {
    operand: Calc,
}

impl CalcNode for IsEmptyCalc {
    fn name(&self) -> &'static str {
        "IsEmpty"
    }

    fn result_type(&self) -> Type {
        Type::BOOLEAN
    }

    fn children(&self) -> Vec<Calc> {
        vec![self.operand.clone()]
    }
}

impl BooleanCalc for IsEmptyCalc {
    fn evaluate_boolean(&self, ev: &mut dyn Evaluator) -> CalcResult<bool> {
        Ok(self.operand.evaluate_scalar(ev)?.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_operands() {
        assert_eq!(ArithOp::Add.apply(None, Some(2.0)), Some(2.0));
        assert_eq!(ArithOp::Subtract.apply(None, None), None);
        assert_eq!(ArithOp::Multiply.apply(Some(3.0), None), None);
        assert_eq!(ArithOp::Divide.apply(Some(1.0), Some(0.0)), None);
        assert_eq!(ArithOp::Divide.apply(Some(1.0), Some(4.0)), Some(0.25));
    }

    #[test]
    fn branch_types_widen() {
        let small = Type::Scalar(ScalarType::Decimal {
            precision: 1,
            scale: 0,
        });
        assert_eq!(
            common_branch_type(&small, &Type::INTEGER),
            Some(Type::INTEGER)
        );
        assert_eq!(
            common_branch_type(&small, &Type::NUMERIC),
            Some(Type::NUMERIC)
        );
        assert_eq!(
            common_branch_type(&Type::STRING, &Type::NUMERIC),
            Some(Type::VALUE)
        );
        assert_eq!(common_branch_type(&Type::STRING, &Type::member()), None);
    }
}
