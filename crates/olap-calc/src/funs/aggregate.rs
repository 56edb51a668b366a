use super::{check_arity, invalid_arg, require_set, FunDef, FunTable, Syntax};
use crate::calc::{
    value_to_double, Calc, CalcNode, DoubleCalc, IntegerCalc, SetCalc,
};
use crate::compiler::CompileCx;
use crate::error::{CalcResult, CompileResult, EvalError};
use crate::evaluator::{ContextGuard, Evaluator};
use crate::exp::{Exp, FunCall};
use crate::types::Type;
use olap_model::Schema;
use std::sync::Arc;

pub(super) fn register(table: &mut FunTable) {
    table.register(Count);
    table.register(Sum);
}

/// `Count(set)`
#[derive(Debug)]
struct Count;

impl FunDef for Count {
    fn name(&self) -> &str {
        "Count"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Function
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 1, 1)?;
        require_set(self.name(), args, 0)?;
        Ok(Type::INTEGER)
    }

    fn compile_call(&self, call: &FunCall, _ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let set = cx.compile_iter(call.arg(0))?;
        Ok(Calc::Integer(Arc::new(CountCalc { set })))
    }
}

#[derive(Debug)]
struct CountCalc {
    set: SetCalc,
}

impl CalcNode for CountCalc {
    fn name(&self) -> &'static str {
        "Count"
    }

    fn result_type(&self) -> Type {
        Type::INTEGER
    }

    fn children(&self) -> Vec<Calc> {
        vec![self.set.clone().into_calc()]
    }
}

impl IntegerCalc for CountCalc {
    fn evaluate_integer(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<i32>> {
        let count = match &self.set {
            SetCalc::List(list) => list.evaluate_list(ev)?.len(),
            SetCalc::Iterable(_) => {
                let mut cursor = self.set.cursor(ev)?;
                let mut count = 0usize;
                while cursor.next_tuple(ev)?.is_some() {
                    count += 1;
                }
                count
            }
        };
        i32::try_from(count)
            .map(Some)
            .map_err(|_| EvalError::IntegerOverflow(count as f64))
    }
}

/// `Sum(set[, numeric])`. Without a numeric expression, sums the cells at each tuple. Empty when
/// every summand is empty.
#[derive(Debug)]
struct Sum;

impl FunDef for Sum {
    fn name(&self) -> &str {
        "Sum"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Function
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 1, 2)?;
        require_set(self.name(), args, 0)?;
        if let Some(value) = args.get(1) {
            if !value.ty().is_scalar() && !matches!(value.ty(), Type::Member(_) | Type::Tuple(_))
            {
                return Err(invalid_arg(
                    self.name(),
                    1,
                    format!("expected a numeric expression, got {}", value.ty()),
                ));
            }
        }
        Ok(Type::NUMERIC)
    }

    fn compile_call(&self, call: &FunCall, _ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let set = cx.compile_iter(call.arg(0))?;
        let value = match call.args().get(1) {
            Some(arg) => Some(cx.compile_double(arg)?),
            None => None,
        };
        Ok(Calc::Double(Arc::new(SumCalc { set, value })))
    }
}

#[derive(Debug)]
struct SumCalc {
    set: SetCalc,
    value: Option<Arc<dyn DoubleCalc>>,
}

impl SumCalc {
    fn summand(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<f64>> {
        match &self.value {
            Some(value) => value.evaluate_double(ev),
            None => value_to_double(&ev.evaluate_current()?),
        }
    }
}

impl CalcNode for SumCalc {
    fn name(&self) -> &'static str {
        "Sum"
    }

    fn result_type(&self) -> Type {
        Type::NUMERIC
    }

    fn children(&self) -> Vec<Calc> {
        let mut children = vec![self.set.clone().into_calc()];
        children.extend(self.value.clone().map(Calc::Double));
        children
    }
}

impl DoubleCalc for SumCalc {
    fn evaluate_double(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<f64>> {
        let mut cursor = self.set.cursor(ev)?;
        let mut total: Option<f64> = None;
        while let Some(tuple) = cursor.next_tuple(ev)? {
            let summand = {
                let mut guard = ContextGuard::new(ev);
                guard.set_context_members(&tuple);
                self.summand(&mut *guard)?
            };
            if let Some(x) = summand {
                total = Some(total.unwrap_or(0.0) + x);
            }
        }
        Ok(total)
    }
}
