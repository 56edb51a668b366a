use super::convert::{
    value_to_boolean, value_to_date_time, value_to_double, value_to_integer, value_to_string,
};
use super::{
    BooleanCalc, CalcNode, CalcValue, DateTimeCalc, DimensionCalc, DoubleCalc, HierarchyCalc,
    IntegerCalc, IterCalc, LevelCalc, ListCalc, ListCursor, MemberCalc, ResultStyle, StringCalc,
    Tuple, TupleCalc, TupleCursor, TupleList, ValueCalc,
};
use crate::error::{CalcResult, EvalError};
use crate::evaluator::Evaluator;
use crate::types::Type;
use chrono::NaiveDateTime;
use olap_model::{DimensionId, HierarchyId, LevelId, MemberId, Value};
use smallvec::smallvec;

/// A value computed at compile time. Implements every kind; the [`super::Calc`] variant wrapping it
/// decides which one is used.
#[derive(Debug)]
pub struct ConstantCalc {
    value: CalcValue,
    ty: Type,
}

impl ConstantCalc {
    pub fn new(value: CalcValue, ty: Type) -> Self {
        Self { value, ty }
    }

    pub fn value(&self) -> &CalcValue {
        &self.value
    }

    fn mismatch(&self, wanted: &str) -> EvalError {
        EvalError::Internal(format!("constant {:?} is not a {wanted}", self.value))
    }

    fn scalar(&self) -> CalcResult<&Value> {
        match &self.value {
            CalcValue::Scalar(v) => Ok(v),
            _ => Err(self.mismatch("scalar")),
        }
    }
}

impl CalcNode for ConstantCalc {
    fn name(&self) -> &'static str {
        "Constant"
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn result_style(&self) -> ResultStyle {
        match self.value {
            // Every evaluation hands out the same storage.
            CalcValue::List(_) => ResultStyle::List,
            _ => ResultStyle::Value,
        }
    }

    fn constant(&self) -> Option<&CalcValue> {
        Some(&self.value)
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        let shown = match &self.value {
            CalcValue::Scalar(v) => v.to_string(),
            CalcValue::List(l) => format!("{} tuples", l.len()),
            other => format!("{other:?}"),
        };
        vec![("value", shown)]
    }
}

impl MemberCalc for ConstantCalc {
    fn evaluate_member(&self, _ev: &mut dyn Evaluator) -> CalcResult<MemberId> {
        match self.value {
            CalcValue::Member(m) => Ok(m),
            _ => Err(self.mismatch("member")),
        }
    }
}

impl LevelCalc for ConstantCalc {
    fn evaluate_level(&self, _ev: &mut dyn Evaluator) -> CalcResult<LevelId> {
        match self.value {
            CalcValue::Level(l) => Ok(l),
            _ => Err(self.mismatch("level")),
        }
    }
}

impl HierarchyCalc for ConstantCalc {
    fn evaluate_hierarchy(&self, _ev: &mut dyn Evaluator) -> CalcResult<HierarchyId> {
        match self.value {
            CalcValue::Hierarchy(h) => Ok(h),
            _ => Err(self.mismatch("hierarchy")),
        }
    }
}

impl DimensionCalc for ConstantCalc {
    fn evaluate_dimension(&self, _ev: &mut dyn Evaluator) -> CalcResult<DimensionId> {
        match self.value {
            CalcValue::Dimension(d) => Ok(d),
            _ => Err(self.mismatch("dimension")),
        }
    }
}

impl BooleanCalc for ConstantCalc {
    fn evaluate_boolean(&self, _ev: &mut dyn Evaluator) -> CalcResult<bool> {
        value_to_boolean(self.scalar()?)
    }
}

impl IntegerCalc for ConstantCalc {
    fn evaluate_integer(&self, _ev: &mut dyn Evaluator) -> CalcResult<Option<i32>> {
        value_to_integer(self.scalar()?)
    }
}

impl DoubleCalc for ConstantCalc {
    fn evaluate_double(&self, _ev: &mut dyn Evaluator) -> CalcResult<Option<f64>> {
        value_to_double(self.scalar()?)
    }
}

impl StringCalc for ConstantCalc {
    fn evaluate_string(&self, _ev: &mut dyn Evaluator) -> CalcResult<Option<String>> {
        Ok(value_to_string(self.scalar()?))
    }
}

impl DateTimeCalc for ConstantCalc {
    fn evaluate_date_time(&self, _ev: &mut dyn Evaluator) -> CalcResult<Option<NaiveDateTime>> {
        value_to_date_time(self.scalar()?)
    }
}

impl ValueCalc for ConstantCalc {
    fn evaluate_value(&self, _ev: &mut dyn Evaluator) -> CalcResult<Value> {
        self.scalar().cloned()
    }
}

impl TupleCalc for ConstantCalc {
    fn evaluate_tuple(&self, _ev: &mut dyn Evaluator) -> CalcResult<Tuple> {
        match &self.value {
            CalcValue::Tuple(t) => Ok(t.clone()),
            CalcValue::Member(m) => Ok(smallvec![*m]),
            _ => Err(self.mismatch("tuple")),
        }
    }
}

impl ListCalc for ConstantCalc {
    fn evaluate_list(&self, _ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        match &self.value {
            CalcValue::List(l) => Ok(l.clone()),
            _ => Err(self.mismatch("list")),
        }
    }
}

impl IterCalc for ConstantCalc {
    fn evaluate_iterable<'a>(
        &'a self,
        ev: &mut dyn Evaluator,
    ) -> CalcResult<Box<dyn TupleCursor + 'a>> {
        Ok(Box::new(ListCursor::new(self.evaluate_list(ev)?)))
    }
}
