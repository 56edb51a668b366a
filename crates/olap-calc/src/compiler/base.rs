use super::{CompileCx, CompilerState, ExpCompiler};
use crate::calc::{
    value_to_boolean, value_to_date_time, value_to_double, value_to_integer, value_to_string,
    BooleanCalc, Calc, CalcValue, CastToNumeric, ConstantCalc, CopyList, CopyOnWriteList,
    DateTimeCalc, DimensionCalc, DoubleCalc, DoubleToBoolean, DoubleToInteger, HierarchyCalc,
    HierarchyCurrentMember, HierarchyCurrentMemberFixed, IntegerCalc, IntegerToBoolean,
    IntegerToDouble, IterToList, LevelCalc, LevelHierarchy, ListCalc, MemberArrayValue,
    MemberCalc, MemberValue, ResultStyle, ResultStyles, SetCalc, StringCalc, TupleCalc,
    TupleValue, ValueToBoolean, ValueToDateTime, ValueToDouble, ValueToInteger, ValueToString,
};
use crate::error::{CompileError, CompileResult};
use crate::evaluator::Evaluator;
use crate::exp::{Exp, ExpKind, Literal};
use crate::parameter::{Parameter, ParameterMemberCalc, ParameterSlot, ParameterValueCalc};
use crate::types::{HierarchyType, MemberType, ScalarType, Type};
use log::debug;
use olap_model::{HierarchyId, Schema, Value};
use std::sync::Arc;

/// What a compiler does when a caller asks for a list it may mutate and the expression produced a
/// plain list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CopyPolicy {
    /// Copy at evaluation time only if the list is shared.
    CopyOnWrite,
    /// Always copy, even lists that were already produced for the caller alone.
    Always,
}

/// The coercion cascade and result-style negotiation.
#[derive(Debug)]
pub struct BaseCompiler {
    state: CompilerState,
}

impl BaseCompiler {
    /// `evaluator` is asked once, here, whether cells can ever be null because of unrelated
    /// dimensions.
    pub fn new(schema: Arc<Schema>, evaluator: &dyn Evaluator) -> Self {
        Self {
            state: CompilerState::new(schema, evaluator),
        }
    }

    pub fn with_parameters(self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        for parameter in parameters {
            self.state.define_parameter(parameter);
        }
        self
    }

    pub(crate) fn negotiate_list(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        mutable: bool,
        copy: CopyPolicy,
    ) -> CompileResult<Arc<dyn ListCalc>> {
        if !exp.ty().is_set() {
            return Err(cx.static_type_error(exp, "SET"));
        }
        let policy = cx.policy();
        let requested = if mutable {
            ResultStyles::MUTABLE_LIST
        } else {
            ResultStyles::LIST
        };

        if let Calc::List(list) = policy.compile_as(cx, exp, None, requested)? {
            return Ok(adapt_list(list, mutable, copy));
        }

        debug!(
            "{} cannot produce {requested:?}; compiling with {:?}",
            cx.render(exp),
            ResultStyles::ANY
        );
        match policy.compile_as(cx, exp, None, ResultStyles::ANY)? {
            Calc::List(list) => Ok(adapt_list(list, mutable, copy)),
            Calc::Iterable(iter) => Ok(Arc::new(IterToList::new(iter))),
            other => Err(CompileError::internal(format!(
                "set expression {} compiled to {} calc {}, which is neither a list nor iterable",
                cx.render(exp),
                other.kind_name(),
                other.name()
            ))),
        }
    }
}

fn adapt_list(list: Arc<dyn ListCalc>, mutable: bool, copy: CopyPolicy) -> Arc<dyn ListCalc> {
    if !mutable {
        return list;
    }
    match (copy, list.result_style()) {
        (CopyPolicy::Always, _) => Arc::new(CopyList::new(list)),
        (CopyPolicy::CopyOnWrite, ResultStyle::MutableList) => list,
        (CopyPolicy::CopyOnWrite, _) => Arc::new(CopyOnWriteList::new(list)),
    }
}

fn compile_literal(literal: &Literal, ty: &Type) -> Calc {
    let value = match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Integer(i) => i32::try_from(*i)
            .map(Value::Integer)
            .unwrap_or(Value::Double(*i as f64)),
        Literal::Double(d) => Value::Double(*d),
        Literal::String(s) => Value::String(s.clone()),
        Literal::DateTime(dt) => Value::DateTime(*dt),
    };
    Calc::constant_of(CalcValue::Scalar(value), ty.clone())
}

fn constant_hierarchy(schema: &Schema, hierarchy: HierarchyId) -> Arc<dyn HierarchyCalc> {
    Arc::new(ConstantCalc::new(
        CalcValue::Hierarchy(hierarchy),
        Type::Hierarchy(HierarchyType::for_hierarchy(schema, hierarchy)),
    ))
}

/// Current member of `hierarchy`, with the hierarchy lookup skipped when it is constant.
pub(crate) fn current_member(
    schema: &Schema,
    hierarchy: Arc<dyn HierarchyCalc>,
) -> Arc<dyn MemberCalc> {
    if let Some(CalcValue::Hierarchy(h)) = hierarchy.constant() {
        return Arc::new(HierarchyCurrentMemberFixed::new(
            *h,
            MemberType::for_hierarchy(schema, *h),
        ));
    }
    let ty = match hierarchy.result_type() {
        Type::Hierarchy(t) => MemberType {
            dimension: t.dimension,
            hierarchy: t.hierarchy,
            level: None,
        },
        _ => MemberType::default(),
    };
    Arc::new(HierarchyCurrentMember::new(hierarchy, ty))
}

fn scalar_constant(calc: &Calc) -> Option<&Value> {
    match calc.constant() {
        Some(CalcValue::Scalar(v)) => Some(v),
        _ => None,
    }
}

fn folded(value: Value, ty: Type) -> Arc<ConstantCalc> {
    Arc::new(ConstantCalc::new(CalcValue::Scalar(value), ty))
}

fn to_integer(cx: CompileCx<'_>, exp: &Exp, calc: Calc) -> CompileResult<Arc<dyn IntegerCalc>> {
    if let Calc::Integer(c) = calc {
        return Ok(c);
    }
    if matches!(calc, Calc::Double(_) | Calc::Value(_)) {
        if let Some(v) = scalar_constant(&calc) {
            let i = value_to_integer(v).map_err(|_| cx.static_type_error(exp, "INTEGER"))?;
            return Ok(folded(i.into(), Type::INTEGER));
        }
    }
    match calc {
        Calc::Double(c) => Ok(Arc::new(DoubleToInteger::new(c))),
        Calc::Value(c) => Ok(Arc::new(ValueToInteger::new(c))),
        _ => Err(cx.static_type_error(exp, "INTEGER")),
    }
}

fn to_double(cx: CompileCx<'_>, exp: &Exp, calc: Calc) -> CompileResult<Arc<dyn DoubleCalc>> {
    if let Calc::Double(c) = calc {
        return Ok(c);
    }
    if matches!(calc, Calc::Integer(_) | Calc::Value(_)) {
        if let Some(v) = scalar_constant(&calc) {
            let d = value_to_double(v).map_err(|_| cx.static_type_error(exp, "NUMERIC"))?;
            return Ok(folded(d.into(), Type::NUMERIC));
        }
    }
    match calc {
        Calc::Integer(c) => Ok(Arc::new(IntegerToDouble::new(c))),
        Calc::Value(c) => Ok(Arc::new(ValueToDouble::new(c))),
        _ => Err(cx.static_type_error(exp, "NUMERIC")),
    }
}

/// Numbers are true when nonzero.
fn to_boolean(cx: CompileCx<'_>, exp: &Exp, calc: Calc) -> CompileResult<Arc<dyn BooleanCalc>> {
    if let Calc::Boolean(c) = calc {
        return Ok(c);
    }
    if matches!(calc, Calc::Integer(_) | Calc::Double(_) | Calc::Value(_)) {
        if let Some(v) = scalar_constant(&calc) {
            let b = value_to_boolean(v).map_err(|_| cx.static_type_error(exp, "BOOLEAN"))?;
            return Ok(folded(b.into(), Type::BOOLEAN));
        }
    }
    match calc {
        Calc::Integer(c) => Ok(Arc::new(IntegerToBoolean::new(c))),
        Calc::Double(c) => Ok(Arc::new(DoubleToBoolean::new(c))),
        Calc::Value(c) => Ok(Arc::new(ValueToBoolean::new(c))),
        _ => Err(cx.static_type_error(exp, "BOOLEAN")),
    }
}

fn to_string(cx: CompileCx<'_>, exp: &Exp, calc: Calc) -> CompileResult<Arc<dyn StringCalc>> {
    match calc {
        Calc::String(c) => Ok(c),
        Calc::Value(c) => match c.constant() {
            Some(CalcValue::Scalar(v)) => Ok(folded(value_to_string(v).into(), Type::STRING)),
            _ => Ok(Arc::new(ValueToString::new(c))),
        },
        _ => Err(cx.static_type_error(exp, "STRING")),
    }
}

fn to_date_time(
    cx: CompileCx<'_>,
    exp: &Exp,
    calc: Calc,
) -> CompileResult<Arc<dyn DateTimeCalc>> {
    match calc {
        Calc::DateTime(c) => Ok(c),
        Calc::Value(c) => match c.constant() {
            Some(CalcValue::Scalar(v)) => {
                let dt =
                    value_to_date_time(v).map_err(|_| cx.static_type_error(exp, "DATETIME"))?;
                Ok(folded(dt.into(), Type::DATE_TIME))
            }
            _ => Ok(Arc::new(ValueToDateTime::new(c))),
        },
        _ => Err(cx.static_type_error(exp, "DATETIME")),
    }
}

fn compile_parameter_default(cx: CompileCx<'_>, parameter: &Parameter) -> CompileResult<Calc> {
    let exp = parameter.default_exp();
    match parameter.ty() {
        Type::Member(_) => cx.compile_member(exp).map(Calc::Member),
        ty if ty.is_numeric() && !exp.ty().is_numeric() => {
            let calc = cx.compile_scalar(exp, false)?;
            Ok(Calc::Double(Arc::new(CastToNumeric::new(calc))))
        }
        _ => cx.compile_scalar(exp, true),
    }
}

impl ExpCompiler for BaseCompiler {
    fn state(&self) -> &CompilerState {
        &self.state
    }

    fn policy(&self) -> &dyn ExpCompiler {
        self
    }

    fn compile(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Calc> {
        let schema = cx.schema();
        match exp.kind() {
            ExpKind::Literal(literal) => Ok(compile_literal(literal, exp.ty())),
            ExpKind::Dimension(d) => Ok(Calc::constant_of(
                CalcValue::Dimension(*d),
                exp.ty().clone(),
            )),
            ExpKind::Hierarchy(h) => Ok(Calc::Hierarchy(constant_hierarchy(schema, *h))),
            ExpKind::Level(l) => Ok(Calc::constant_of(CalcValue::Level(*l), exp.ty().clone())),
            ExpKind::Member(m) => Ok(Calc::constant_of(CalcValue::Member(*m), exp.ty().clone())),
            ExpKind::Parameter(p) => {
                let slot = cx.register_parameter(p.name())?;
                Ok(match exp.ty() {
                    Type::Member(t) => Calc::Member(Arc::new(ParameterMemberCalc::new(slot, *t))),
                    _ => Calc::Value(Arc::new(ParameterValueCalc::new(slot))),
                })
            }
            ExpKind::Call(call) => call.fun().compile_call(call, exp.ty(), cx),
        }
    }

    fn compile_member(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn MemberCalc>> {
        let policy = cx.policy();
        match exp.ty() {
            Type::Member(_) => policy.compile(cx, exp)?.into_member(),
            Type::Hierarchy(_) | Type::Dimension(_) | Type::Level(_) => {
                let hierarchy = policy.compile_hierarchy(cx, exp)?;
                Ok(current_member(cx.schema(), hierarchy))
            }
            _ => Err(cx.static_type_error(exp, "MEMBER")),
        }
    }

    fn compile_level(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn LevelCalc>> {
        match exp.ty() {
            Type::Level(_) => cx.policy().compile(cx, exp)?.into_level(),
            _ => Err(cx.static_type_error(exp, "LEVEL")),
        }
    }

    fn compile_hierarchy(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn HierarchyCalc>> {
        let policy = cx.policy();
        let schema = cx.schema();
        match exp.ty() {
            Type::Hierarchy(_) => policy.compile(cx, exp)?.into_hierarchy(),
            Type::Dimension(t) => {
                let dimension = match t.dimension {
                    Some(d) => Some(d),
                    None => match policy.compile_dimension(cx, exp)?.constant() {
                        Some(CalcValue::Dimension(d)) => Some(*d),
                        _ => None,
                    },
                };
                // A dimension with several hierarchies is ambiguous; reject it now rather than
                // at evaluation time.
                match dimension.map(|d| schema.dimension(d).hierarchies()) {
                    Some([only]) => Ok(constant_hierarchy(schema, *only)),
                    _ => Err(cx.static_type_error(exp, "HIERARCHY")),
                }
            }
            Type::Level(t) => {
                if let Some(h) = t.hierarchy {
                    return Ok(constant_hierarchy(schema, h));
                }
                let level = policy.compile_level(cx, exp)?;
                if let Some(CalcValue::Level(l)) = level.constant() {
                    return Ok(constant_hierarchy(schema, schema.level(*l).hierarchy()));
                }
                let ty = HierarchyType {
                    dimension: t.dimension,
                    hierarchy: None,
                };
                Ok(Arc::new(LevelHierarchy::new(level, ty)))
            }
            _ => Err(cx.static_type_error(exp, "HIERARCHY")),
        }
    }

    fn compile_dimension(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DimensionCalc>> {
        match exp.ty() {
            Type::Dimension(_) => cx.policy().compile(cx, exp)?.into_dimension(),
            _ => Err(cx.static_type_error(exp, "DIMENSION")),
        }
    }

    fn compile_integer(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn IntegerCalc>> {
        let calc = cx.policy().compile_scalar(cx, exp, false)?;
        to_integer(cx, exp, calc)
    }

    fn compile_double(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn DoubleCalc>> {
        let calc = cx.policy().compile_scalar(cx, exp, false)?;
        to_double(cx, exp, calc)
    }

    fn compile_boolean(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn BooleanCalc>> {
        let calc = cx.policy().compile_scalar(cx, exp, false)?;
        to_boolean(cx, exp, calc)
    }

    fn compile_string(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn StringCalc>> {
        let calc = cx.policy().compile_scalar(cx, exp, false)?;
        to_string(cx, exp, calc)
    }

    fn compile_date_time(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DateTimeCalc>> {
        let calc = cx.policy().compile_scalar(cx, exp, false)?;
        to_date_time(cx, exp, calc)
    }

    fn compile_tuple(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn TupleCalc>> {
        match exp.ty() {
            Type::Tuple(_) => cx.policy().compile(cx, exp)?.into_tuple(),
            _ => Err(cx.static_type_error(exp, "TUPLE")),
        }
    }

    fn compile_scalar(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        specific: bool,
    ) -> CompileResult<Calc> {
        let policy = cx.policy();
        let null_check = cx.state().might_return_null_for_unrelated();
        match exp.ty() {
            Type::Scalar(s) if specific => match s {
                ScalarType::Boolean => policy.compile_boolean(cx, exp).map(Calc::Boolean),
                s if s.is_int32() => policy.compile_integer(cx, exp).map(Calc::Integer),
                ScalarType::Numeric | ScalarType::Integer | ScalarType::Decimal { .. } => {
                    policy.compile_double(cx, exp).map(Calc::Double)
                }
                ScalarType::String => policy.compile_string(cx, exp).map(Calc::String),
                ScalarType::DateTime => policy.compile_date_time(cx, exp).map(Calc::DateTime),
                ScalarType::Value => policy.compile(cx, exp),
            },
            Type::Scalar(_) | Type::Null => policy.compile(cx, exp),
            Type::Member(_) | Type::Hierarchy(_) | Type::Dimension(_) | Type::Level(_) => {
                let member = policy.compile_member(cx, exp)?;
                Ok(Calc::Value(Arc::new(MemberValue::new(member, null_check))))
            }
            Type::Tuple(_) => {
                let tuple = policy.compile_tuple(cx, exp)?;
                Ok(match tuple.member_calcs() {
                    Some(members) => Calc::Value(Arc::new(MemberArrayValue::new(
                        members.to_vec(),
                        null_check,
                    ))),
                    None => Calc::Value(Arc::new(TupleValue::new(tuple, null_check))),
                })
            }
            Type::Set(_) => Err(cx.static_type_error(exp, "SCALAR")),
        }
    }

    fn compile_list(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        mutable: bool,
    ) -> CompileResult<Arc<dyn ListCalc>> {
        self.negotiate_list(cx, exp, mutable, CopyPolicy::CopyOnWrite)
    }

    fn compile_iter(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<SetCalc> {
        if !exp.ty().is_set() {
            return Err(cx.static_type_error(exp, "SET"));
        }
        let policy = cx.policy();
        // Lists are iterable too, so anything set-valued serves.
        if let Some(set) = SetCalc::from_calc(policy.compile_as(
            cx,
            exp,
            None,
            ResultStyles::ITERABLE,
        )?) {
            return Ok(set);
        }
        debug!(
            "{} cannot produce {:?}; compiling with {:?}",
            cx.render(exp),
            ResultStyles::ITERABLE,
            ResultStyles::ANY
        );
        let calc = policy.compile_as(cx, exp, None, ResultStyles::ANY)?;
        let (kind, name) = (calc.kind_name(), calc.name());
        SetCalc::from_calc(calc).ok_or_else(|| {
            CompileError::internal(format!(
                "set expression {} compiled to {kind} calc {name}, which is not iterable",
                cx.render(exp)
            ))
        })
    }

    fn compile_as(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        target: Option<&Type>,
        styles: ResultStyles,
    ) -> CompileResult<Calc> {
        let policy = cx.policy();
        let _styles = cx.state().push_styles(styles);
        let target = match target {
            Some(t) if t != exp.ty() => t,
            // Same type: no coercion.
            _ => return policy.compile(cx, exp),
        };
        match target {
            Type::Member(_) => policy.compile_member(cx, exp).map(Calc::Member),
            Type::Level(_) => policy.compile_level(cx, exp).map(Calc::Level),
            Type::Hierarchy(_) => policy.compile_hierarchy(cx, exp).map(Calc::Hierarchy),
            Type::Dimension(_) => policy.compile_dimension(cx, exp).map(Calc::Dimension),
            Type::Tuple(_) => policy.compile_tuple(cx, exp).map(Calc::Tuple),
            Type::Set(_) if exp.ty().is_set() => policy.compile(cx, exp),
            Type::Set(_) => Err(cx.static_type_error(exp, target.to_string())),
            Type::Scalar(s) => match s {
                ScalarType::Boolean => policy.compile_boolean(cx, exp).map(Calc::Boolean),
                s if s.is_int32() => policy.compile_integer(cx, exp).map(Calc::Integer),
                ScalarType::Numeric | ScalarType::Integer | ScalarType::Decimal { .. } => {
                    policy.compile_double(cx, exp).map(Calc::Double)
                }
                ScalarType::String => policy.compile_string(cx, exp).map(Calc::String),
                ScalarType::DateTime => policy.compile_date_time(cx, exp).map(Calc::DateTime),
                ScalarType::Value => policy.compile_scalar(cx, exp, false),
            },
            Type::Null => policy.compile(cx, exp),
        }
    }

    fn register_parameter(
        &self,
        cx: CompileCx<'_>,
        name: &str,
    ) -> CompileResult<Arc<ParameterSlot>> {
        let (slot, parameter) = {
            let mut registry = cx.state().parameters_mut();
            if let Some(slot) = registry.slot(name) {
                return match slot.default_error() {
                    Some(error) => Err(error.clone()),
                    None => Ok(slot),
                };
            }
            let parameter = registry
                .definition(name)
                .cloned()
                .ok_or_else(|| CompileError::UnknownParameter(name.to_string()))?;
            (registry.insert(parameter.clone()), parameter)
        };
        // The slot is visible before its default compiles, so a default that refers back to this
        // parameter finds the slot instead of registering it again.
        let calc = match compile_parameter_default(cx, &parameter) {
            Ok(calc) => calc,
            Err(source) => {
                let error = CompileError::Parameter {
                    parameter: name.to_string(),
                    source: Box::new(source),
                };
                slot.set_default_error(error.clone());
                return Err(error);
            }
        };
        debug!(
            "registered parameter {name} in slot {} with default {}",
            slot.index(),
            calc.name()
        );
        slot.set_default_calc(calc);
        Ok(slot)
    }
}
