//! Evaluation profiling through an [`AfterCompile`] hook.

use super::AfterCompile;
use crate::calc::{
    BooleanCalc, Calc, CalcNode, CalcValue, DateTimeCalc, DimensionCalc, DoubleCalc,
    HierarchyCalc, IntegerCalc, IterCalc, LevelCalc, ListCalc, MemberCalc, ResultStyle,
    StringCalc, Tuple, TupleCalc, TupleCursor, TupleList, ValueCalc,
};
use crate::error::{CalcResult, CompileResult};
use crate::evaluator::Evaluator;
use crate::exp::Exp;
use crate::types::Type;
use chrono::NaiveDateTime;
use olap_model::{DimensionId, HierarchyId, LevelId, MemberId, Schema, Value};
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Counters for one compiled node.
#[derive(Debug)]
pub struct CalcProfile {
    expression: String,
    calc: &'static str,
    evaluations: AtomicU64,
    elapsed_nanos: AtomicU64,
}

impl CalcProfile {
    fn new(expression: String, calc: &'static str) -> Self {
        Self {
            expression,
            calc,
            evaluations: AtomicU64::new(0),
            elapsed_nanos: AtomicU64::new(0),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn calc_name(&self) -> &'static str {
        self.calc
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Total time spent evaluating the node, children included.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed))
    }

    fn record(&self, start: Instant) {
        let nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.elapsed_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

/// Profiles collected by a [`ProfilingHook`], in compilation order.
#[derive(Debug, Default)]
pub struct Profile {
    entries: Mutex<Vec<Arc<CalcProfile>>>,
}

impl Profile {
    pub fn entries(&self) -> Vec<Arc<CalcProfile>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// One line per profiled node: evaluations, total time, calc and expression.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for entry in self.entries() {
            let _ = writeln!(
                out,
                "{:>8} {:>12?} {} {}",
                entry.evaluations(),
                entry.elapsed(),
                entry.calc_name(),
                entry.expression()
            );
        }
        out
    }

    fn push(&self, entry: Arc<CalcProfile>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

/// Wraps every compiled node in a calc counting its evaluations and their duration.
#[derive(Debug, Clone)]
pub struct ProfilingHook {
    schema: Arc<Schema>,
    profile: Arc<Profile>,
}

impl ProfilingHook {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            profile: Arc::new(Profile::default()),
        }
    }

    pub fn profile(&self) -> &Arc<Profile> {
        &self.profile
    }
}

impl AfterCompile for ProfilingHook {
    fn after_compile(&self, exp: &Exp, calc: Calc, _mutable: bool) -> CompileResult<Calc> {
        let stats = Arc::new(CalcProfile::new(
            exp.display(&self.schema).to_string(),
            calc.name(),
        ));
        self.profile.push(stats.clone());
        Ok(profiled(calc, stats))
    }
}

#[derive(Debug)]
struct Profiled<T: ?Sized> {
    inner: Arc<T>,
    stats: Arc<CalcProfile>,
}

fn profiled(calc: Calc, stats: Arc<CalcProfile>) -> Calc {
    macro_rules! wrap {
        ($($variant:ident),*) => {
            match calc {
                $(Calc::$variant(inner) => Calc::$variant(Arc::new(Profiled { inner, stats })),)*
            }
        };
    }
    wrap!(
        Member, Level, Hierarchy, Dimension, Boolean, Integer, Double, String, DateTime, Value,
        Tuple, List, Iterable
    )
}

impl<T: CalcNode + ?Sized> CalcNode for Profiled<T> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn result_type(&self) -> Type {
        self.inner.result_type()
    }

    fn children(&self) -> Vec<Calc> {
        self.inner.children()
    }

    fn result_style(&self) -> ResultStyle {
        self.inner.result_style()
    }

    fn constant(&self) -> Option<&CalcValue> {
        self.inner.constant()
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        let mut annotations = self.inner.annotations();
        annotations.push(("evaluations", self.stats.evaluations().to_string()));
        annotations.push(("elapsed", format!("{:?}", self.stats.elapsed())));
        annotations
    }
}

macro_rules! profiled_kind {
    ($($trait:ident :: $method:ident -> $ret:ty;)*) => {
        $(
            impl $trait for Profiled<dyn $trait> {
                fn $method(&self, ev: &mut dyn Evaluator) -> CalcResult<$ret> {
                    let start = Instant::now();
                    let result = self.inner.$method(ev);
                    self.stats.record(start);
                    result
                }
            }
        )*
    };
}

profiled_kind! {
    MemberCalc::evaluate_member -> MemberId;
    LevelCalc::evaluate_level -> LevelId;
    HierarchyCalc::evaluate_hierarchy -> HierarchyId;
    DimensionCalc::evaluate_dimension -> DimensionId;
    BooleanCalc::evaluate_boolean -> bool;
    IntegerCalc::evaluate_integer -> Option<i32>;
    DoubleCalc::evaluate_double -> Option<f64>;
    StringCalc::evaluate_string -> Option<String>;
    DateTimeCalc::evaluate_date_time -> Option<NaiveDateTime>;
    ValueCalc::evaluate_value -> Value;
    ListCalc::evaluate_list -> TupleList;
}

impl TupleCalc for Profiled<dyn TupleCalc> {
    fn evaluate_tuple(&self, ev: &mut dyn Evaluator) -> CalcResult<Tuple> {
        let start = Instant::now();
        let result = self.inner.evaluate_tuple(ev);
        self.stats.record(start);
        result
    }

    fn member_calcs(&self) -> Option<&[Arc<dyn MemberCalc>]> {
        self.inner.member_calcs()
    }
}

impl IterCalc for Profiled<dyn IterCalc> {
    /// Times producing the cursor, not draining it.
    fn evaluate_iterable<'a>(
        &'a self,
        ev: &mut dyn Evaluator,
    ) -> CalcResult<Box<dyn TupleCursor + 'a>> {
        let start = Instant::now();
        let result = self.inner.evaluate_iterable(ev);
        self.stats.record(start);
        result
    }
}
