use super::{CompileCx, CompilerState, ExpCompiler};
use crate::calc::{
    BooleanCalc, Calc, DateTimeCalc, DimensionCalc, DoubleCalc, HierarchyCalc, IntegerCalc,
    LevelCalc, ListCalc, MemberCalc, ResultStyle, ResultStyles, SetCalc, StringCalc, TupleCalc,
};
use crate::error::{CompileError, CompileResult};
use crate::exp::Exp;
use crate::parameter::ParameterSlot;
use crate::types::Type;
use log::trace;
use olap_model::Schema;
use std::sync::Arc;

/// Post-processing applied to every calc a [`DecoratingCompiler`] returns.
///
/// The returned calc replaces the compiled one and must be of the same kind.
pub trait AfterCompile {
    fn after_compile(&self, exp: &Exp, calc: Calc, mutable: bool) -> CompileResult<Calc>;
}

impl<F> AfterCompile for F
where
    F: Fn(&Exp, Calc, bool) -> CompileResult<Calc>,
{
    fn after_compile(&self, exp: &Exp, calc: Calc, mutable: bool) -> CompileResult<Calc> {
        self(exp, calc, mutable)
    }
}

/// Wraps a compiler and runs a hook on every calc it produces, at every depth of the tree.
///
/// Delegates with the caller's [`CompileCx`] unchanged, so child expressions compiled by the
/// wrapped compiler come back through the outermost layer. Stacked decorators run their hooks
/// innermost first.
#[derive(Debug)]
pub struct DecoratingCompiler<C, H> {
    inner: C,
    hook: H,
}

impl<C, H> DecoratingCompiler<C, H> {
    pub fn new(inner: C, hook: H) -> Self {
        Self { inner, hook }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }
}

impl<C: ExpCompiler, H: AfterCompile> DecoratingCompiler<C, H> {
    fn decorate(&self, exp: &Exp, calc: Calc, mutable: bool) -> CompileResult<Calc> {
        let kind = calc.kind();
        let decorated = self.hook.after_compile(exp, calc, mutable)?;
        if decorated.kind() != kind {
            return Err(CompileError::internal(format!(
                "after-compile hook replaced a {kind:?} calc with a {:?} calc",
                decorated.kind()
            )));
        }
        Ok(decorated)
    }
}

impl<C: ExpCompiler, H: AfterCompile> ExpCompiler for DecoratingCompiler<C, H> {
    fn state(&self) -> &CompilerState {
        self.inner.state()
    }

    fn policy(&self) -> &dyn ExpCompiler {
        self.inner.policy()
    }

    fn compile(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Calc> {
        let calc = self.inner.compile(cx, exp)?;
        let mutable = cx.result_styles().contains(ResultStyle::MutableList);
        self.decorate(exp, calc, mutable)
    }

    fn compile_member(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn MemberCalc>> {
        let calc = self.inner.compile_member(cx, exp)?;
        self.decorate(exp, Calc::Member(calc), false)?.into_member()
    }

    fn compile_level(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn LevelCalc>> {
        let calc = self.inner.compile_level(cx, exp)?;
        self.decorate(exp, Calc::Level(calc), false)?.into_level()
    }

    fn compile_hierarchy(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn HierarchyCalc>> {
        let calc = self.inner.compile_hierarchy(cx, exp)?;
        self.decorate(exp, Calc::Hierarchy(calc), false)?
            .into_hierarchy()
    }

    fn compile_dimension(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DimensionCalc>> {
        let calc = self.inner.compile_dimension(cx, exp)?;
        self.decorate(exp, Calc::Dimension(calc), false)?
            .into_dimension()
    }

    fn compile_integer(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn IntegerCalc>> {
        let calc = self.inner.compile_integer(cx, exp)?;
        self.decorate(exp, Calc::Integer(calc), false)?.into_integer()
    }

    fn compile_double(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn DoubleCalc>> {
        let calc = self.inner.compile_double(cx, exp)?;
        self.decorate(exp, Calc::Double(calc), false)?.into_double()
    }

    fn compile_boolean(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn BooleanCalc>> {
        let calc = self.inner.compile_boolean(cx, exp)?;
        self.decorate(exp, Calc::Boolean(calc), false)?.into_boolean()
    }

    fn compile_string(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn StringCalc>> {
        let calc = self.inner.compile_string(cx, exp)?;
        self.decorate(exp, Calc::String(calc), false)?.into_string()
    }

    fn compile_date_time(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DateTimeCalc>> {
        let calc = self.inner.compile_date_time(cx, exp)?;
        self.decorate(exp, Calc::DateTime(calc), false)?
            .into_date_time()
    }

    fn compile_tuple(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn TupleCalc>> {
        let calc = self.inner.compile_tuple(cx, exp)?;
        self.decorate(exp, Calc::Tuple(calc), false)?.into_tuple()
    }

    fn compile_scalar(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        specific: bool,
    ) -> CompileResult<Calc> {
        let calc = self.inner.compile_scalar(cx, exp, specific)?;
        self.decorate(exp, calc, false)
    }

    fn compile_list(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        mutable: bool,
    ) -> CompileResult<Arc<dyn ListCalc>> {
        let calc = self.inner.compile_list(cx, exp, mutable)?;
        self.decorate(exp, Calc::List(calc), mutable)?.into_list()
    }

    fn compile_iter(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<SetCalc> {
        let calc = self.inner.compile_iter(cx, exp)?.into_calc();
        let decorated = self.decorate(exp, calc, false)?;
        SetCalc::from_calc(decorated)
            .ok_or_else(|| CompileError::internal("after-compile hook returned a non-set calc"))
    }

    fn compile_as(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        target: Option<&Type>,
        styles: ResultStyles,
    ) -> CompileResult<Calc> {
        let calc = self.inner.compile_as(cx, exp, target, styles)?;
        self.decorate(exp, calc, styles.contains(ResultStyle::MutableList))
    }

    fn register_parameter(
        &self,
        cx: CompileCx<'_>,
        name: &str,
    ) -> CompileResult<Arc<ParameterSlot>> {
        self.inner.register_parameter(cx, name)
    }
}

/// Logs every compiled node at `trace` level.
#[derive(Debug, Clone)]
pub struct TracingHook {
    schema: Arc<Schema>,
}

impl TracingHook {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }
}

impl AfterCompile for TracingHook {
    fn after_compile(&self, exp: &Exp, calc: Calc, mutable: bool) -> CompileResult<Calc> {
        trace!(
            "compiled {} : {} -> {} {} (style={}, mutable={mutable})",
            exp.display(&self.schema),
            exp.ty(),
            calc.kind_name(),
            calc.name(),
            calc.result_style()
        );
        Ok(calc)
    }
}
