//! Scalar conversions, at run time (the calcs) and at compile time (the `value_to_*` helpers used
//! for folding constants).

use super::{
    BooleanCalc, Calc, CalcNode, DateTimeCalc, DoubleCalc, IntegerCalc, StringCalc, ValueCalc,
};
use crate::error::{CalcResult, EvalError};
use crate::evaluator::Evaluator;
use crate::types::Type;
use chrono::{NaiveDate, NaiveDateTime};
use olap_model::Value;
use std::sync::Arc;

/// Truncate toward zero. Values outside the 32-bit range are an error rather than a wrap.
pub fn double_to_integer(d: f64) -> CalcResult<i32> {
    if d.is_nan() {
        return Err(EvalError::Type("NaN is not an integer".to_string()));
    }
    let t = d.trunc();
    if t < f64::from(i32::MIN) || t > f64::from(i32::MAX) {
        return Err(EvalError::IntegerOverflow(d));
    }
    Ok(t as i32)
}

pub fn value_to_double(value: &Value) -> CalcResult<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(f64::from(*i))),
        Value::Double(d) => Ok(Some(*d)),
        Value::Boolean(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| EvalError::Type(format!("cannot convert \"{s}\" to a number"))),
        Value::DateTime(_) => Err(EvalError::Type(format!(
            "cannot convert {} to a number",
            value.type_name()
        ))),
    }
}

pub fn value_to_integer(value: &Value) -> CalcResult<Option<i32>> {
    match value {
        Value::Integer(i) => Ok(Some(*i)),
        other => value_to_double(other)?.map(double_to_integer).transpose(),
    }
}

/// Nulls are false; numbers are true when nonzero.
pub fn value_to_boolean(value: &Value) -> CalcResult<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Boolean(b) => Ok(*b),
        Value::Integer(i) => Ok(*i != 0),
        Value::Double(d) => Ok(*d != 0.0),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(EvalError::Type(format!(
            "cannot convert {} to a boolean",
            other.type_name()
        ))),
    }
}

pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn value_to_date_time(value: &Value) -> CalcResult<Option<NaiveDateTime>> {
    match value {
        Value::Null => Ok(None),
        Value::DateTime(dt) => Ok(Some(*dt)),
        Value::String(s) => {
            let s = s.trim();
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
                })
                .map(Some)
                .map_err(|_| EvalError::Type(format!("cannot convert \"{s}\" to a date")))
        }
        other => Err(EvalError::Type(format!(
            "cannot convert {} to a date",
            other.type_name()
        ))),
    }
}

/// Implements [`CalcNode`] for a single-child conversion calc.
macro_rules! conversion_node {
    ($name:ident, $ty:expr) => {
        impl CalcNode for $name {
            fn name(&self) -> &'static str {
                stringify!($name)
            }

            fn result_type(&self) -> Type {
                $ty
            }

            fn children(&self) -> Vec<Calc> {
                vec![self.calc.clone().into()]
            }
        }
    };
}

#[derive(Debug)]
pub struct IntegerToDouble {
    calc: Arc<dyn IntegerCalc>,
}

impl IntegerToDouble {
    pub fn new(calc: Arc<dyn IntegerCalc>) -> Self {
        Self { calc }
    }
}

conversion_node!(IntegerToDouble, Type::NUMERIC);

impl DoubleCalc for IntegerToDouble {
    fn evaluate_double(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<f64>> {
        Ok(self.calc.evaluate_integer(ev)?.map(f64::from))
    }
}

#[derive(Debug)]
pub struct DoubleToInteger {
    calc: Arc<dyn DoubleCalc>,
}

impl DoubleToInteger {
    pub fn new(calc: Arc<dyn DoubleCalc>) -> Self {
        Self { calc }
    }
}

conversion_node!(DoubleToInteger, Type::INTEGER);

impl IntegerCalc for DoubleToInteger {
    fn evaluate_integer(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<i32>> {
        self.calc
            .evaluate_double(ev)?
            .map(double_to_integer)
            .transpose()
    }
}

#[derive(Debug)]
pub struct IntegerToBoolean {
    calc: Arc<dyn IntegerCalc>,
}

impl IntegerToBoolean {
    pub fn new(calc: Arc<dyn IntegerCalc>) -> Self {
        Self { calc }
    }
}

conversion_node!(IntegerToBoolean, Type::BOOLEAN);

impl BooleanCalc for IntegerToBoolean {
    fn evaluate_boolean(&self, ev: &mut dyn Evaluator) -> CalcResult<bool> {
        Ok(self.calc.evaluate_integer(ev)?.is_some_and(|i| i != 0))
    }
}

#[derive(Debug)]
pub struct DoubleToBoolean {
    calc: Arc<dyn DoubleCalc>,
}

impl DoubleToBoolean {
    pub fn new(calc: Arc<dyn DoubleCalc>) -> Self {
        Self { calc }
    }
}

conversion_node!(DoubleToBoolean, Type::BOOLEAN);

impl BooleanCalc for DoubleToBoolean {
    fn evaluate_boolean(&self, ev: &mut dyn Evaluator) -> CalcResult<bool> {
        Ok(self.calc.evaluate_double(ev)?.is_some_and(|d| d != 0.0))
    }
}

#[derive(Debug)]
pub struct ValueToDouble {
    calc: Arc<dyn ValueCalc>,
}

impl ValueToDouble {
    pub fn new(calc: Arc<dyn ValueCalc>) -> Self {
        Self { calc }
    }
}

conversion_node!(ValueToDouble, Type::NUMERIC);

impl DoubleCalc for ValueToDouble {
    fn evaluate_double(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<f64>> {
        value_to_double(&self.calc.evaluate_value(ev)?)
    }
}

#[derive(Debug)]
pub struct ValueToInteger {
    calc: Arc<dyn ValueCalc>,
}

impl ValueToInteger {
    pub fn new(calc: Arc<dyn ValueCalc>) -> Self {
        Self { calc }
    }
}

conversion_node!(ValueToInteger, Type::INTEGER);

impl IntegerCalc for ValueToInteger {
    fn evaluate_integer(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<i32>> {
        value_to_integer(&self.calc.evaluate_value(ev)?)
    }
}

#[derive(Debug)]
pub struct ValueToBoolean {
    calc: Arc<dyn ValueCalc>,
}

impl ValueToBoolean {
    pub fn new(calc: Arc<dyn ValueCalc>) -> Self {
        Self { calc }
    }
}

conversion_node!(ValueToBoolean, Type::BOOLEAN);

impl BooleanCalc for ValueToBoolean {
    fn evaluate_boolean(&self, ev: &mut dyn Evaluator) -> CalcResult<bool> {
        value_to_boolean(&self.calc.evaluate_value(ev)?)
    }
}

#[derive(Debug)]
pub struct ValueToString {
    calc: Arc<dyn ValueCalc>,
}

impl ValueToString {
    pub fn new(calc: Arc<dyn ValueCalc>) -> Self {
        Self { calc }
    }
}

conversion_node!(ValueToString, Type::STRING);

impl StringCalc for ValueToString {
    fn evaluate_string(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<String>> {
        Ok(value_to_string(&self.calc.evaluate_value(ev)?))
    }
}

#[derive(Debug)]
pub struct ValueToDateTime {
    calc: Arc<dyn ValueCalc>,
}

impl ValueToDateTime {
    pub fn new(calc: Arc<dyn ValueCalc>) -> Self {
        Self { calc }
    }
}

conversion_node!(ValueToDateTime, Type::DATE_TIME);

impl DateTimeCalc for ValueToDateTime {
    fn evaluate_date_time(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<NaiveDateTime>> {
        value_to_date_time(&self.calc.evaluate_value(ev)?)
    }
}

/// Any scalar kind seen as a [`Value`].
#[derive(Debug)]
pub struct ScalarToValue {
    calc: Calc,
}

impl ScalarToValue {
    pub fn new(calc: Calc) -> Self {
        Self { calc }
    }
}

conversion_node!(ScalarToValue, Type::VALUE);

impl ValueCalc for ScalarToValue {
    fn evaluate_value(&self, ev: &mut dyn Evaluator) -> CalcResult<Value> {
        self.calc.evaluate_scalar(ev)
    }
}

/// Numeric view of any scalar calc, parsing strings. Used for parameters declared numeric whose
/// default expression is not.
#[derive(Debug)]
pub struct CastToNumeric {
    calc: Calc,
}

impl CastToNumeric {
    pub fn new(calc: Calc) -> Self {
        Self { calc }
    }
}

conversion_node!(CastToNumeric, Type::NUMERIC);

impl DoubleCalc for CastToNumeric {
    fn evaluate_double(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<f64>> {
        value_to_double(&self.calc.evaluate_scalar(ev)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_toward_zero() {
        assert_eq!(double_to_integer(2.9), Ok(2));
        assert_eq!(double_to_integer(-2.9), Ok(-2));
        assert_eq!(
            double_to_integer(3e9),
            Err(EvalError::IntegerOverflow(3e9))
        );
    }

    #[test]
    fn strings_parse_as_dates() {
        let dt = value_to_date_time(&Value::from("1997-03-01")).unwrap();
        assert_eq!(
            dt.map(|d| d.to_string()),
            Some("1997-03-01 00:00:00".to_string())
        );
    }
}
