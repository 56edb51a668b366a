//! Query parameters and their per-session slots.
//!
//! A [`Parameter`] is a definition (name, type, default expression). The first time a compiler
//! sees a reference to it, it registers a [`ParameterSlot`]: the slot gets the next index, is
//! recorded, and only then is the default compiled, so defaults that reference parameters
//! (including their own) terminate.

use crate::calc::{Calc, CalcNode, CalcValue, MemberCalc, ValueCalc};
use crate::error::{CalcResult, CompileError, EvalError};
use crate::evaluator::Evaluator;
use crate::exp::Exp;
use crate::types::{MemberType, Type};
use ahash::AHashMap;
use olap_model::{MemberId, Value};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

#[derive(Clone, Debug)]
pub struct Parameter {
    name: String,
    ty: Type,
    default_exp: Exp,
    description: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type, default_exp: Exp) -> Self {
        Self {
            name: name.into(),
            ty,
            default_exp,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn default_exp(&self) -> &Exp {
        &self.default_exp
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

#[derive(Debug, Default)]
struct SlotState {
    value: Option<CalcValue>,
    cached_default: Option<CalcValue>,
}

/// Registration of one parameter in one compilation session.
#[derive(Debug)]
pub struct ParameterSlot {
    index: usize,
    parameter: Arc<Parameter>,
    default_calc: OnceLock<Calc>,
    default_error: OnceLock<CompileError>,
    state: Mutex<SlotState>,
}

impl ParameterSlot {
    fn new(index: usize, parameter: Arc<Parameter>) -> Self {
        Self {
            index,
            parameter,
            default_calc: OnceLock::new(),
            default_error: OnceLock::new(),
            state: Mutex::new(SlotState::default()),
        }
    }

    /// Position in registration order, starting at zero.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parameter(&self) -> &Arc<Parameter> {
        &self.parameter
    }

    /// The compiled default. `None` only while the default is still being compiled.
    pub fn default_calc(&self) -> Option<&Calc> {
        self.default_calc.get()
    }

    pub(crate) fn set_default_calc(&self, calc: Calc) {
        // A second registration returns the existing slot, so this runs once per slot.
        let _ = self.default_calc.set(calc);
    }

    /// Why the default failed to compile. Later registrations report the same error.
    pub fn default_error(&self) -> Option<&CompileError> {
        self.default_error.get()
    }

    pub(crate) fn set_default_error(&self, error: CompileError) {
        let _ = self.default_error.set(error);
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_value(&self, value: impl Into<CalcValue>) {
        self.state().value = Some(value.into());
    }

    pub fn unset_value(&self) {
        self.state().value = None;
    }

    pub fn is_assigned(&self) -> bool {
        self.state().value.is_some()
    }

    /// The assigned value, if any. Does not fall back to the default.
    pub fn value(&self) -> Option<CalcValue> {
        self.state().value.clone()
    }

    pub fn cached_default_value(&self) -> Option<CalcValue> {
        self.state().cached_default.clone()
    }

    pub fn set_cached_default_value(&self, value: impl Into<CalcValue>) {
        self.state().cached_default = Some(value.into());
    }

    /// Forget the memoized default, e.g. after the data it was computed from changed.
    pub fn invalidate_cached_default(&self) {
        self.state().cached_default = None;
    }

    /// Assigned value, else cached default, else the default evaluated now and cached.
    pub fn evaluate(&self, ev: &mut dyn Evaluator) -> CalcResult<CalcValue> {
        {
            let state = self.state();
            if let Some(value) = state.value.as_ref().or(state.cached_default.as_ref()) {
                return Ok(value.clone());
            }
        }
        let calc = self.default_calc().ok_or_else(|| {
            EvalError::Internal(format!(
                "parameter {} evaluated before its default was compiled",
                self.parameter.name()
            ))
        })?;
        let value = DEFAULT_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_DEFAULT_DEPTH {
                return Err(EvalError::Recursion(MAX_DEFAULT_DEPTH));
            }
            depth.set(current + 1);
            let value = calc.evaluate(ev);
            depth.set(current);
            value
        })?;
        self.set_cached_default_value(value.clone());
        Ok(value)
    }
}

/// Defaults that reference parameters nest; a cycle of unassigned parameters would not end.
const MAX_DEFAULT_DEPTH: usize = 64;

thread_local! {
    static DEFAULT_DEPTH: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Parameter definitions and slots of one compilation session.
#[derive(Debug, Default)]
pub struct ParameterSlotRegistry {
    definitions: AHashMap<String, Arc<Parameter>>,
    slots: Vec<Arc<ParameterSlot>>,
    by_name: AHashMap<String, usize>,
}

impl ParameterSlotRegistry {
    pub fn define(&mut self, parameter: Parameter) {
        self.definitions
            .insert(parameter.name().to_string(), Arc::new(parameter));
    }

    pub fn definition(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.definitions.get(name)
    }

    /// Slot of a registered parameter.
    pub fn slot(&self, name: &str) -> Option<Arc<ParameterSlot>> {
        self.by_name.get(name).map(|idx| self.slots[*idx].clone())
    }

    pub fn get(&self, index: usize) -> Option<&Arc<ParameterSlot>> {
        self.slots.get(index)
    }

    /// Slots in registration order.
    pub fn slots(&self) -> &[Arc<ParameterSlot>] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record a new slot with the next index. The default is attached by the caller.
    pub(crate) fn insert(&mut self, parameter: Arc<Parameter>) -> Arc<ParameterSlot> {
        let index = self.slots.len();
        let slot = Arc::new(ParameterSlot::new(index, parameter.clone()));
        self.slots.push(slot.clone());
        self.by_name.insert(parameter.name().to_string(), index);
        slot
    }
}

/// Reference to a scalar parameter.
#[derive(Debug)]
pub struct ParameterValueCalc {
    slot: Arc<ParameterSlot>,
}

impl ParameterValueCalc {
    pub fn new(slot: Arc<ParameterSlot>) -> Self {
        Self { slot }
    }
}

impl CalcNode for ParameterValueCalc {
    fn name(&self) -> &'static str {
        "Parameter"
    }

    fn result_type(&self) -> Type {
        Type::VALUE
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.slot.parameter().name().to_string()),
            ("slot", self.slot.index().to_string()),
        ]
    }
}

impl ValueCalc for ParameterValueCalc {
    fn evaluate_value(&self, ev: &mut dyn Evaluator) -> CalcResult<Value> {
        match self.slot.evaluate(ev)? {
            CalcValue::Scalar(v) => Ok(v),
            other => Err(EvalError::Type(format!(
                "parameter {} holds {other:?} where a scalar is required",
                self.slot.parameter().name()
            ))),
        }
    }
}

/// Reference to a member parameter.
#[derive(Debug)]
pub struct ParameterMemberCalc {
    slot: Arc<ParameterSlot>,
    ty: MemberType,
}

impl ParameterMemberCalc {
    pub fn new(slot: Arc<ParameterSlot>, ty: MemberType) -> Self {
        Self { slot, ty }
    }
}

impl CalcNode for ParameterMemberCalc {
    fn name(&self) -> &'static str {
        "Parameter"
    }

    fn result_type(&self) -> Type {
        Type::Member(self.ty)
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.slot.parameter().name().to_string()),
            ("slot", self.slot.index().to_string()),
        ]
    }
}

impl MemberCalc for ParameterMemberCalc {
    fn evaluate_member(&self, ev: &mut dyn Evaluator) -> CalcResult<MemberId> {
        match self.slot.evaluate(ev)? {
            CalcValue::Member(m) => Ok(m),
            other => Err(EvalError::Type(format!(
                "parameter {} holds {other:?} where a member is required",
                self.slot.parameter().name()
            ))),
        }
    }
}
