use super::base::{BaseCompiler, CopyPolicy};
use super::{CompileCx, CompilerState, ExpCompiler};
use crate::calc::{
    BooleanCalc, Calc, CalcValue, ConstantCalc, DateTimeCalc, DefaultMemberTuple, DimensionCalc,
    DoubleCalc, HierarchyCalc, IntegerCalc, LevelCalc, ListCalc, MemberCalc, MemberTuple,
    ResultStyles, SetCalc, StringCalc, TupleCalc,
};
use crate::error::CompileResult;
use crate::exp::Exp;
use crate::parameter::ParameterSlot;
use crate::types::{MemberType, Type};
use smallvec::smallvec;
use std::sync::Arc;

/// [`BaseCompiler`] with more permissive tuple coercions and a stricter mutable-list policy.
///
/// - `compile_tuple` accepts dimension and hierarchy expressions (the default member, as a
///   one-member tuple) and member expressions (a one-member tuple).
/// - `compile_list(exp, true)` hands out a fresh copy on every evaluation, whether or not the
///   underlying list is shared.
///
/// Everything else is the base behaviour.
#[derive(Debug)]
pub struct RefinedCompiler {
    base: BaseCompiler,
}

impl RefinedCompiler {
    pub fn new(base: BaseCompiler) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &BaseCompiler {
        &self.base
    }
}

impl ExpCompiler for RefinedCompiler {
    fn state(&self) -> &CompilerState {
        self.base.state()
    }

    fn policy(&self) -> &dyn ExpCompiler {
        self
    }

    fn compile(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Calc> {
        self.base.compile(cx, exp)
    }

    fn compile_member(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn MemberCalc>> {
        self.base.compile_member(cx, exp)
    }

    fn compile_level(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn LevelCalc>> {
        self.base.compile_level(cx, exp)
    }

    fn compile_hierarchy(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn HierarchyCalc>> {
        self.base.compile_hierarchy(cx, exp)
    }

    fn compile_dimension(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DimensionCalc>> {
        self.base.compile_dimension(cx, exp)
    }

    fn compile_integer(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn IntegerCalc>> {
        self.base.compile_integer(cx, exp)
    }

    fn compile_double(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn DoubleCalc>> {
        self.base.compile_double(cx, exp)
    }

    fn compile_boolean(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn BooleanCalc>> {
        self.base.compile_boolean(cx, exp)
    }

    fn compile_string(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn StringCalc>> {
        self.base.compile_string(cx, exp)
    }

    fn compile_date_time(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
    ) -> CompileResult<Arc<dyn DateTimeCalc>> {
        self.base.compile_date_time(cx, exp)
    }

    fn compile_tuple(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn TupleCalc>> {
        let policy = cx.policy();
        match exp.ty() {
            Type::Dimension(_) | Type::Hierarchy(_) => {
                let hierarchy = policy.compile_hierarchy(cx, exp)?;
                if let Some(CalcValue::Hierarchy(h)) = hierarchy.constant() {
                    let schema = cx.schema();
                    let member = schema.default_member(*h);
                    return Ok(Arc::new(ConstantCalc::new(
                        CalcValue::Tuple(smallvec![member]),
                        Type::Tuple(vec![Type::Member(MemberType::for_member(schema, member))]),
                    )));
                }
                let ty = match hierarchy.result_type() {
                    Type::Hierarchy(t) => MemberType {
                        dimension: t.dimension,
                        hierarchy: t.hierarchy,
                        level: None,
                    },
                    _ => MemberType::default(),
                };
                Ok(Arc::new(DefaultMemberTuple::new(hierarchy, ty)))
            }
            Type::Member(_) => {
                let member = policy.compile_member(cx, exp)?;
                Ok(Arc::new(MemberTuple::new(vec![member])))
            }
            _ => self.base.compile_tuple(cx, exp),
        }
    }

    fn compile_scalar(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        specific: bool,
    ) -> CompileResult<Calc> {
        self.base.compile_scalar(cx, exp, specific)
    }

    fn compile_list(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        mutable: bool,
    ) -> CompileResult<Arc<dyn ListCalc>> {
        self.base.negotiate_list(cx, exp, mutable, CopyPolicy::Always)
    }

    fn compile_iter(&self, cx: CompileCx<'_>, exp: &Exp) -> CompileResult<SetCalc> {
        self.base.compile_iter(cx, exp)
    }

    fn compile_as(
        &self,
        cx: CompileCx<'_>,
        exp: &Exp,
        target: Option<&Type>,
        styles: ResultStyles,
    ) -> CompileResult<Calc> {
        self.base.compile_as(cx, exp, target, styles)
    }

    fn register_parameter(
        &self,
        cx: CompileCx<'_>,
        name: &str,
    ) -> CompileResult<Arc<ParameterSlot>> {
        self.base.register_parameter(cx, name)
    }
}
