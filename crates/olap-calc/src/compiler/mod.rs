//! Compilers turn typed [`Exp`] trees into [`Calc`] trees.
//!
//! All recursion goes through a [`CompileCx`], which names the *active* compiler: the outermost
//! layer of the compiler stack. A compiler that needs a child expression compiled asks the context,
//! never itself, so that every layer of a decorator chain sees every sub-expression. When a
//! compiler needs the *same* expression compiled another way (e.g. `compile_member` of a hierarchy
//! expression compiling it as a hierarchy first), it goes through
//! [`ExpCompiler::policy`] instead, which skips decorators so each decorator fires once per
//! expression and entry point.

mod base;
mod decorating;
mod profile;
mod refined;

pub use base::BaseCompiler;
pub(crate) use base::current_member;
pub use decorating::{AfterCompile, DecoratingCompiler, TracingHook};
pub use profile::{CalcProfile, Profile, ProfilingHook};
pub use refined::RefinedCompiler;

use crate::calc::{
    BooleanCalc, Calc, DateTimeCalc, DimensionCalc, DoubleCalc, HierarchyCalc, IntegerCalc,
    LevelCalc, ListCalc, MemberCalc, ResultStyles, SetCalc, StringCalc, TupleCalc,
};
use crate::error::{CompileError, CompileResult};
use crate::evaluator::Evaluator;
use crate::exp::Exp;
use crate::parameter::{Parameter, ParameterSlot, ParameterSlotRegistry};
use crate::types::Type;
use olap_model::Schema;
use std::cell::{Cell, Ref, RefCell};
use std::sync::Arc;

/// State shared by every layer of one compiler stack.
///
/// Holds the schema, the result styles the current caller accepts, the evaluator capability
/// queried at construction and the session's parameter slots. Not thread-safe: one compiler per
/// compilation episode.
#[derive(Debug)]
pub struct CompilerState {
    schema: Arc<Schema>,
    result_styles: Cell<ResultStyles>,
    might_return_null_for_unrelated: bool,
    parameters: RefCell<ParameterSlotRegistry>,
}

impl CompilerState {
    pub fn new(schema: Arc<Schema>, evaluator: &dyn Evaluator) -> Self {
        Self {
            schema,
            result_styles: Cell::new(ResultStyles::ANY),
            might_return_null_for_unrelated: evaluator.might_return_null_for_unrelated_dimension(),
            parameters: RefCell::new(ParameterSlotRegistry::default()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_arc(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn result_styles(&self) -> ResultStyles {
        self.result_styles.get()
    }

    /// Whether member and tuple values need the unrelated-dimension null check.
    pub fn might_return_null_for_unrelated(&self) -> bool {
        self.might_return_null_for_unrelated
    }

    /// Make a parameter definition available to expressions compiled by this stack.
    pub fn define_parameter(&self, parameter: Parameter) {
        self.parameters.borrow_mut().define(parameter);
    }

    pub fn parameters(&self) -> Ref<'_, ParameterSlotRegistry> {
        self.parameters.borrow()
    }

    pub(crate) fn parameters_mut(&self) -> std::cell::RefMut<'_, ParameterSlotRegistry> {
        self.parameters.borrow_mut()
    }

    /// Accept `styles` until the returned guard is dropped.
    pub(crate) fn push_styles(&self, styles: ResultStyles) -> StylesGuard<'_> {
        let saved = self.result_styles.replace(styles);
        StylesGuard {
            cell: &self.result_styles,
            saved,
        }
    }
}

pub(crate) struct StylesGuard<'a> {
    cell: &'a Cell<ResultStyles>,
    saved: ResultStyles,
}

impl Drop for StylesGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.saved);
    }
}

/// A compiler layer. Every method receives the [`CompileCx`] of the stack it runs in.
pub trait ExpCompiler {
    fn state(&self) -> &CompilerState;

    /// The innermost non-decorating layer, used to compile the same expression another way.
    fn policy(&self) -> &dyn ExpCompiler;

    /// Compile using the result styles currently accepted.
    fn compile(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Calc>;

    fn compile_member(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn MemberCalc>>;

    fn compile_level(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn LevelCalc>>;

    fn compile_hierarchy(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn HierarchyCalc>>;

    fn compile_dimension(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DimensionCalc>>;

    fn compile_integer(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn IntegerCalc>>;

    fn compile_double(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn DoubleCalc>>;

    fn compile_boolean(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn BooleanCalc>>;

    fn compile_string(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn StringCalc>>;

    fn compile_date_time(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DateTimeCalc>>;

    fn compile_tuple(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn TupleCalc>>;

    /// Compile to a scalar calc. With `specific`, the calc kind matches the scalar category of
    /// the expression's type; otherwise any scalar kind may come back.
    fn compile_scalar(&self, cx: CompileCx<'_>, exp: &Exp, specific: bool)
        -> CompileResult<Calc>;

    /// Compile a set expression to a list. With `mutable`, the caller owns the list it gets and
    /// may modify it.
    fn compile_list(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        mutable: bool,
    ) -> CompileResult<Arc<dyn ListCalc>>;

    /// Compile a set expression for iteration; lazy when possible.
    fn compile_iter(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<SetCalc>;

    /// Compile to `target` (or the expression's own type when `None`), accepting `styles` for
    /// set-valued results.
    fn compile_as(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        target: Option<&Type>,
        styles: ResultStyles,
    ) -> CompileResult<Calc>;

    /// Slot of the named parameter, compiling its default the first time it is referenced.
    fn register_parameter(&self, cx: CompileCx<'_>, name: &str)
        -> CompileResult<Arc<ParameterSlot>>;
}

impl<C: ExpCompiler + ?Sized> ExpCompiler for Box<C> {
    fn state(&self) -> &CompilerState {
        (**self).state()
    }

    fn policy(&self) -> &dyn ExpCompiler {
        (**self).policy()
    }

    fn compile(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Calc> {
        (**self).compile(cx, exp)
    }

    fn compile_member(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn MemberCalc>> {
        (**self).compile_member(cx, exp)
    }

    fn compile_level(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn LevelCalc>> {
        (**self).compile_level(cx, exp)
    }

    fn compile_hierarchy(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn HierarchyCalc>> {
        (**self).compile_hierarchy(cx, exp)
    }

    fn compile_dimension(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DimensionCalc>> {
        (**self).compile_dimension(cx, exp)
    }

    fn compile_integer(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn IntegerCalc>> {
        (**self).compile_integer(cx, exp)
    }

    fn compile_double(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn DoubleCalc>> {
        (**self).compile_double(cx, exp)
    }

    fn compile_boolean(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn BooleanCalc>> {
        (**self).compile_boolean(cx, exp)
    }

    fn compile_string(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn StringCalc>> {
        (**self).compile_string(cx, exp)
    }

    fn compile_date_time(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DateTimeCalc>> {
        (**self).compile_date_time(cx, exp)
    }

    fn compile_tuple(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn TupleCalc>> {
        (**self).compile_tuple(cx, exp)
    }

    fn compile_scalar(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        specific: bool,
    ) -> CompileResult<Calc> {
        (**self).compile_scalar(cx, exp, specific)
    }

    fn compile_list(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        mutable: bool,
    ) -> CompileResult<Arc<dyn ListCalc>> {
        (**self).compile_list(cx, exp, mutable)
    }

    fn compile_iter(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<SetCalc> {
        (**self).compile_iter(cx, exp)
    }

    fn compile_as(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        target: Option<&Type>,
        styles: ResultStyles,
    ) -> CompileResult<Calc> {
        (**self).compile_as(cx, exp, target, styles)
    }

    fn register_parameter(
        &self,
        cx: CompileCx<'_>,
        name: &str,
    ) -> CompileResult<Arc<ParameterSlot>> {
        (**self).register_parameter(cx, name)
    }
}

/// Handle of the active compiler, threaded through every recursive compile call.
///
/// Mirrors the [`ExpCompiler`] entry points; each forwards to the active compiler with this same
/// context.
#[derive(Clone, Copy)]
pub struct CompileCx<'a> {
    active: &'a dyn ExpCompiler,
}

impl<'a> CompileCx<'a> {
    pub fn new(active: &'a dyn ExpCompiler) -> Self {
        Self { active }
    }

    pub fn active(self) -> &'a dyn ExpCompiler {
        self.active
    }

    pub fn policy(self) -> &'a dyn ExpCompiler {
        self.active.policy()
    }

    pub fn state(self) -> &'a CompilerState {
        self.active.state()
    }

    pub fn schema(self) -> &'a Schema {
        self.state().schema()
    }

    pub fn result_styles(self) -> ResultStyles {
        self.state().result_styles()
    }

    /// The expression as it appears in diagnostics.
    pub fn render(self, exp: &Exp) -> String {
        exp.display(self.schema()).to_string()
    }

    pub(crate) fn static_type_error(self, exp: &Exp, to: impl Into<String>) -> CompileError {
        CompileError::static_type(self.render(exp), exp.ty(), to)
    }

    pub fn compile(self, exp: &Exp) -> CompileResult<Calc> {
        self.active.compile(self, exp)
    }

    pub fn compile_member(self, exp: &Exp) -> CompileResult<Arc<dyn MemberCalc>> {
        self.active.compile_member(self, exp)
    }

    pub fn compile_level(self, exp: &Exp) -> CompileResult<Arc<dyn LevelCalc>> {
        self.active.compile_level(self, exp)
    }

    pub fn compile_hierarchy(self, exp: &Exp) -> CompileResult<Arc<dyn HierarchyCalc>> {
        self.active.compile_hierarchy(self, exp)
    }

    pub fn compile_dimension(self, exp: &Exp) -> CompileResult<Arc<dyn DimensionCalc>> {
        self.active.compile_dimension(self, exp)
    }

    pub fn compile_integer(self, exp: &Exp) -> CompileResult<Arc<dyn IntegerCalc>> {
        self.active.compile_integer(self, exp)
    }

    pub fn compile_double(self, exp: &Exp) -> CompileResult<Arc<dyn DoubleCalc>> {
        self.active.compile_double(self, exp)
    }

    pub fn compile_boolean(self, exp: &Exp) -> CompileResult<Arc<dyn BooleanCalc>> {
        self.active.compile_boolean(self, exp)
    }

    pub fn compile_string(self, exp: &Exp) -> CompileResult<Arc<dyn StringCalc>> {
        self.active.compile_string(self, exp)
    }

    pub fn compile_date_time(self, exp: &Exp) -> CompileResult<Arc<dyn DateTimeCalc>> {
        self.active.compile_date_time(self, exp)
    }

    pub fn compile_tuple(self, exp: &Exp) -> CompileResult<Arc<dyn TupleCalc>> {
        self.active.compile_tuple(self, exp)
    }

    pub fn compile_scalar(self, exp: &Exp, specific: bool) -> CompileResult<Calc> {
        self.active.compile_scalar(self, exp, specific)
    }

    pub fn compile_list(self, exp: &Exp, mutable: bool) -> CompileResult<Arc<dyn ListCalc>> {
        self.active.compile_list(self, exp, mutable)
    }

    pub fn compile_iter(self, exp: &Exp) -> CompileResult<SetCalc> {
        self.active.compile_iter(self, exp)
    }

    pub fn compile_as(
        self,
        exp: &Exp,
        target: Option<&Type>,
        styles: ResultStyles,
    ) -> CompileResult<Calc> {
        self.active.compile_as(self, exp, target, styles)
    }

    pub fn register_parameter(self, name: &str) -> CompileResult<Arc<ParameterSlot>> {
        self.active.register_parameter(self, name)
    }
}

impl std::fmt::Debug for CompileCx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileCx")
            .field("result_styles", &self.result_styles())
            .finish()
    }
}
