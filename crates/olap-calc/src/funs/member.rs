//! Metadata navigation properties.

use super::{check_arity, invalid_arg, FunDef, FunTable, Syntax};
use crate::calc::{
    Calc, CalcNode, CalcValue, DimensionCalc, HierarchyCalc, LevelCalc, ListCalc, MemberCalc,
    ResultStyle, StringCalc, TupleList,
};
use crate::compiler::{current_member, CompileCx};
use crate::error::{CalcResult, CompileResult, EvalError};
use crate::evaluator::Evaluator;
use crate::exp::{Exp, FunCall};
use crate::types::{DimensionType, HierarchyType, LevelType, MemberType, Type};
use olap_model::{DimensionId, HierarchyId, LevelId, MemberId, Schema};
use std::sync::Arc;

pub(super) fn register(table: &mut FunTable) {
    table.register(CurrentMember);
    table.register(DefaultMember);
    table.register(Parent);
    table.register(HierarchyOf);
    table.register(DimensionOf);
    table.register(LevelOf);
    table.register(Name);
    table.register(Members);
    table.register(Children);
}

/// Member type ranging over the hierarchy `ty` is pinned to.
fn member_in(ty: &Type) -> MemberType {
    MemberType {
        dimension: ty.pinned_dimension(),
        hierarchy: ty.pinned_hierarchy(),
        level: None,
    }
}

fn hierarchy_in(ty: &Type) -> HierarchyType {
    HierarchyType {
        dimension: ty.pinned_dimension(),
        hierarchy: ty.pinned_hierarchy(),
    }
}

fn single_arg<'a>(
    name: &str,
    args: &'a [Exp],
    accept: impl Fn(&Type) -> bool,
    expected: &str,
) -> CompileResult<&'a Type> {
    check_arity(name, args, 1, 1)?;
    let ty = args[0].ty();
    if accept(ty) {
        Ok(ty)
    } else {
        Err(invalid_arg(name, 0, format!("expected {expected}, got {ty}")))
    }
}

fn constant_member(calc: &Arc<dyn MemberCalc>) -> Option<MemberId> {
    match calc.constant() {
        Some(CalcValue::Member(m)) => Some(*m),
        _ => None,
    }
}

fn constant_hierarchy(calc: &Arc<dyn HierarchyCalc>) -> Option<HierarchyId> {
    match calc.constant() {
        Some(CalcValue::Hierarchy(h)) => Some(*h),
        _ => None,
    }
}

/// Members of a hierarchy in hierarchical order: each member followed by its descendants.
fn hierarchy_members(schema: &Schema, hierarchy: HierarchyId) -> Vec<MemberId> {
    let mut out = Vec::new();
    let Some(first) = schema.hierarchy(hierarchy).levels().first() else {
        return out;
    };
    let mut stack: Vec<MemberId> = schema.level(*first).members().iter().rev().copied().collect();
    while let Some(member) = stack.pop() {
        out.push(member);
        stack.extend(schema.member(member).children().iter().rev().copied());
    }
    out
}

fn parent_of(schema: &Schema, member: MemberId) -> MemberId {
    let m = schema.member(member);
    m.parent()
        .unwrap_or_else(|| schema.hierarchy(m.hierarchy()).null_member())
}

fn level_of(schema: &Schema, member: MemberId) -> CalcResult<LevelId> {
    let m = schema.member(member);
    m.level()
        .ok_or_else(|| EvalError::NullMember(m.unique_name().to_string()))
}

/// The hierarchy calc a `.Dimension` or `.Hierarchy` call navigates from.
fn compile_owning_hierarchy(cx: CompileCx<'_>, exp: &Exp) -> CompileResult<Arc<dyn HierarchyCalc>> {
    if !matches!(exp.ty(), Type::Member(_)) {
        return cx.compile_hierarchy(exp);
    }
    let member = cx.compile_member(exp)?;
    let ty = hierarchy_in(exp.ty());
    if let Some(m) = constant_member(&member) {
        let h = cx.schema().member(m).hierarchy();
        return Calc::constant_of(CalcValue::Hierarchy(h), Type::Hierarchy(ty)).into_hierarchy();
    }
    Ok(Arc::new(MemberHierarchy { member, ty }))
}

/// `Hierarchy.CurrentMember`
#[derive(Debug)]
struct CurrentMember;

impl FunDef for CurrentMember {
    fn name(&self) -> &str {
        "CurrentMember"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Property
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        let ty = single_arg(
            self.name(),
            args,
            |t| matches!(t, Type::Hierarchy(_) | Type::Dimension(_)),
            "a hierarchy",
        )?;
        Ok(Type::Member(member_in(ty)))
    }

    fn compile_call(&self, call: &FunCall, _ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let hierarchy = cx.compile_hierarchy(call.arg(0))?;
        Ok(Calc::Member(current_member(cx.schema(), hierarchy)))
    }
}

/// `Hierarchy.DefaultMember`
#[derive(Debug)]
struct DefaultMember;

impl FunDef for DefaultMember {
    fn name(&self) -> &str {
        "DefaultMember"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Property
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        let ty = single_arg(
            self.name(),
            args,
            |t| matches!(t, Type::Hierarchy(_) | Type::Dimension(_)),
            "a hierarchy",
        )?;
        Ok(Type::Member(member_in(ty)))
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let hierarchy = cx.compile_hierarchy(call.arg(0))?;
        if let Some(h) = constant_hierarchy(&hierarchy) {
            let member = cx.schema().default_member(h);
            return Ok(Calc::constant_of(CalcValue::Member(member), ty.clone()));
        }
        Ok(Calc::Member(Arc::new(HierarchyDefaultMember {
            hierarchy,
            ty: member_in(ty),
        })))
    }
}

/// `Member.Parent`; the null member for roots.
#[derive(Debug)]
struct Parent;

impl FunDef for Parent {
    fn name(&self) -> &str {
        "Parent"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Property
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        let ty = single_arg(self.name(), args, |t| matches!(t, Type::Member(_)), "a member")?;
        Ok(Type::Member(member_in(ty)))
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let member = cx.compile_member(call.arg(0))?;
        if let Some(m) = constant_member(&member) {
            let parent = parent_of(cx.schema(), m);
            return Ok(Calc::constant_of(CalcValue::Member(parent), ty.clone()));
        }
        Ok(Calc::Member(Arc::new(MemberParent {
            member,
            ty: member_in(ty),
        })))
    }
}

/// `Member.Hierarchy`, `Level.Hierarchy`
#[derive(Debug)]
struct HierarchyOf;

impl FunDef for HierarchyOf {
    fn name(&self) -> &str {
        "Hierarchy"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Property
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        let ty = single_arg(
            self.name(),
            args,
            |t| matches!(t, Type::Member(_) | Type::Level(_)),
            "a member or level",
        )?;
        Ok(Type::Hierarchy(hierarchy_in(ty)))
    }

    fn compile_call(&self, call: &FunCall, _ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        compile_owning_hierarchy(cx, call.arg(0)).map(Calc::Hierarchy)
    }
}

/// `Member.Dimension`, `Level.Dimension`, `Hierarchy.Dimension`
#[derive(Debug)]
struct DimensionOf;

impl FunDef for DimensionOf {
    fn name(&self) -> &str {
        "Dimension"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Property
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        let ty = single_arg(
            self.name(),
            args,
            |t| matches!(t, Type::Member(_) | Type::Level(_) | Type::Hierarchy(_)),
            "a member, level or hierarchy",
        )?;
        Ok(Type::Dimension(DimensionType {
            dimension: ty.pinned_dimension(),
        }))
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let hierarchy = compile_owning_hierarchy(cx, call.arg(0))?;
        if let Some(h) = constant_hierarchy(&hierarchy) {
            let dimension = cx.schema().hierarchy(h).dimension();
            return Ok(Calc::constant_of(CalcValue::Dimension(dimension), ty.clone()));
        }
        let ty = match ty {
            Type::Dimension(t) => *t,
            _ => DimensionType::default(),
        };
        Ok(Calc::Dimension(Arc::new(HierarchyDimension { hierarchy, ty })))
    }
}

/// `Member.Level`
#[derive(Debug)]
struct LevelOf;

impl FunDef for LevelOf {
    fn name(&self) -> &str {
        "Level"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Property
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        let ty = single_arg(self.name(), args, |t| matches!(t, Type::Member(_)), "a member")?;
        let member = member_in(ty);
        Ok(Type::Level(LevelType {
            dimension: member.dimension,
            hierarchy: member.hierarchy,
            level: None,
        }))
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let member = cx.compile_member(call.arg(0))?;
        if let Some(m) = constant_member(&member) {
            // The null member has no level; leave the error to evaluation.
            if let Some(level) = cx.schema().member(m).level() {
                return Ok(Calc::constant_of(
                    CalcValue::Level(level),
                    Type::Level(LevelType::for_level(cx.schema(), level)),
                ));
            }
        }
        let ty = match ty {
            Type::Level(t) => *t,
            _ => LevelType::default(),
        };
        Ok(Calc::Level(Arc::new(MemberLevel { member, ty })))
    }
}

/// `.Name` of a member, level, hierarchy or dimension.
#[derive(Debug)]
struct Name;

fn name_of(schema: &Schema, value: &CalcValue) -> Option<String> {
    let name = match value {
        CalcValue::Member(m) => schema.member(*m).name(),
        CalcValue::Level(l) => schema.level(*l).name(),
        CalcValue::Hierarchy(h) => schema.hierarchy(*h).name(),
        CalcValue::Dimension(d) => schema.dimension(*d).name(),
        _ => return None,
    };
    Some(name.to_string())
}

impl FunDef for Name {
    fn name(&self) -> &str {
        "Name"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Property
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        single_arg(
            self.name(),
            args,
            |t| {
                matches!(
                    t,
                    Type::Member(_) | Type::Level(_) | Type::Hierarchy(_) | Type::Dimension(_)
                )
            },
            "a member, level, hierarchy or dimension",
        )?;
        Ok(Type::STRING)
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let arg = call.arg(0);
        let source = match arg.ty() {
            Type::Member(_) => Calc::Member(cx.compile_member(arg)?),
            Type::Level(_) => Calc::Level(cx.compile_level(arg)?),
            Type::Hierarchy(_) => Calc::Hierarchy(cx.compile_hierarchy(arg)?),
            _ => Calc::Dimension(cx.compile_dimension(arg)?),
        };
        if let Some(name) = source.constant().and_then(|v| name_of(cx.schema(), v)) {
            return Ok(Calc::constant_of(CalcValue::Scalar(name.into()), ty.clone()));
        }
        Ok(Calc::String(Arc::new(NameCalc { source })))
    }
}

/// `Level.Members`, `Hierarchy.Members`
#[derive(Debug)]
struct Members;

impl FunDef for Members {
    fn name(&self) -> &str {
        "Members"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Property
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        let ty = single_arg(
            self.name(),
            args,
            |t| matches!(t, Type::Level(_) | Type::Hierarchy(_) | Type::Dimension(_)),
            "a level or hierarchy",
        )?;
        let mut member = member_in(ty);
        if let Type::Level(t) = ty {
            member.level = t.level;
        }
        Ok(Type::set_of(Type::Member(member)))
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let arg = call.arg(0);
        let schema = cx.schema();
        let source = if matches!(arg.ty(), Type::Level(_)) {
            let level = cx.compile_level(arg)?;
            if let Some(CalcValue::Level(l)) = level.constant() {
                let list = TupleList::from_members(schema.level(*l).members().iter().copied());
                return Ok(Calc::constant_of(CalcValue::List(list), ty.clone()));
            }
            MemberSource::Level(level)
        } else {
            let hierarchy = cx.compile_hierarchy(arg)?;
            if let Some(h) = constant_hierarchy(&hierarchy) {
                let list = TupleList::from_members(hierarchy_members(schema, h));
                return Ok(Calc::constant_of(CalcValue::List(list), ty.clone()));
            }
            MemberSource::Hierarchy(hierarchy)
        };
        Ok(Calc::List(Arc::new(MemberList {
            source,
            ty: ty.clone(),
        })))
    }
}

/// `Member.Children`
#[derive(Debug)]
struct Children;

impl FunDef for Children {
    fn name(&self) -> &str {
        "Children"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Property
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        let ty = single_arg(self.name(), args, |t| matches!(t, Type::Member(_)), "a member")?;
        Ok(Type::set_of(Type::Member(member_in(ty))))
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let member = cx.compile_member(call.arg(0))?;
        if let Some(m) = constant_member(&member) {
            let children = cx.schema().member(m).children().iter().copied();
            let list = TupleList::from_members(children);
            return Ok(Calc::constant_of(CalcValue::List(list), ty.clone()));
        }
        Ok(Calc::List(Arc::new(MemberList {
            source: MemberSource::Children(member),
            ty: ty.clone(),
        })))
    }
}

#[derive(Debug)]
struct HierarchyDefaultMember {
    hierarchy: Arc<dyn HierarchyCalc>,
    ty: MemberType,
}

impl CalcNode for HierarchyDefaultMember {
    fn name(&self) -> &'static str {
        "HierarchyDefaultMember"
    }

    fn result_type(&self) -> Type {
        Type::Member(self.ty)
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Hierarchy(self.hierarchy.clone())]
    }
}

impl MemberCalc for HierarchyDefaultMember {
    fn evaluate_member(&self, ev: &mut dyn Evaluator) -> CalcResult<MemberId> {
        let hierarchy = self.hierarchy.evaluate_hierarchy(ev)?;
        Ok(ev.schema().default_member(hierarchy))
    }
}

#[derive(Debug)]
struct MemberParent {
    member: Arc<dyn MemberCalc>,
    ty: MemberType,
}

impl CalcNode for MemberParent {
    fn name(&self) -> &'static str {
        "MemberParent"
    }

    fn result_type(&self) -> Type {
        Type::Member(self.ty)
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Member(self.member.clone())]
    }
}

impl MemberCalc for MemberParent {
    fn evaluate_member(&self, ev: &mut dyn Evaluator) -> CalcResult<MemberId> {
        let member = self.member.evaluate_member(ev)?;
        Ok(parent_of(ev.schema(), member))
    }
}

#[derive(Debug)]
struct MemberHierarchy {
    member: Arc<dyn MemberCalc>,
    ty: HierarchyType,
}

impl CalcNode for MemberHierarchy {
    fn name(&self) -> &'static str {
        "MemberHierarchy"
    }

    fn result_type(&self) -> Type {
        Type::Hierarchy(self.ty)
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Member(self.member.clone())]
    }
}

impl HierarchyCalc for MemberHierarchy {
    fn evaluate_hierarchy(&self, ev: &mut dyn Evaluator) -> CalcResult<HierarchyId> {
        let member = self.member.evaluate_member(ev)?;
        Ok(ev.schema().member(member).hierarchy())
    }
}

#[derive(Debug)]
struct HierarchyDimension {
    hierarchy: Arc<dyn HierarchyCalc>,
    ty: DimensionType,
}

impl CalcNode for HierarchyDimension {
    fn name(&self) -> &'static str {
        "HierarchyDimension"
    }

    fn result_type(&self) -> Type {
        Type::Dimension(self.ty)
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Hierarchy(self.hierarchy.clone())]
    }
}

impl DimensionCalc for HierarchyDimension {
    fn evaluate_dimension(&self, ev: &mut dyn Evaluator) -> CalcResult<DimensionId> {
        let hierarchy = self.hierarchy.evaluate_hierarchy(ev)?;
        Ok(ev.schema().hierarchy(hierarchy).dimension())
    }
}

#[derive(Debug)]
struct MemberLevel {
    member: Arc<dyn MemberCalc>,
    ty: LevelType,
}

impl CalcNode for MemberLevel {
    fn name(&self) -> &'static str {
        "MemberLevel"
    }

    fn result_type(&self) -> Type {
        Type::Level(self.ty)
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Member(self.member.clone())]
    }
}

impl LevelCalc for MemberLevel {
    fn evaluate_level(&self, ev: &mut dyn Evaluator) -> CalcResult<LevelId> {
        let member = self.member.evaluate_member(ev)?;
        level_of(ev.schema(), member)
    }
}

#[derive(Debug)]
struct NameCalc {
    source: Calc,
}

impl CalcNode for NameCalc {
    fn name(&self) -> &'static str {
        "Name"
    }

    fn result_type(&self) -> Type {
        Type::STRING
    }

    fn children(&self) -> Vec<Calc> {
        vec![self.source.clone()]
    }
}

impl StringCalc for NameCalc {
    fn evaluate_string(&self, ev: &mut dyn Evaluator) -> CalcResult<Option<String>> {
        let value = self.source.evaluate(ev)?;
        name_of(ev.schema(), &value).map(Some).ok_or_else(|| {
            EvalError::Internal(format!("{} calc has no name", self.source.kind_name()))
        })
    }
}

#[derive(Debug)]
enum MemberSource {
    Level(Arc<dyn LevelCalc>),
    Hierarchy(Arc<dyn HierarchyCalc>),
    Children(Arc<dyn MemberCalc>),
}

/// Members of a level or hierarchy, or children of a member, computed at evaluation time.
#[derive(Debug)]
struct MemberList {
    source: MemberSource,
    ty: Type,
}

impl CalcNode for MemberList {
    fn name(&self) -> &'static str {
        match self.source {
            MemberSource::Level(_) => "LevelMembers",
            MemberSource::Hierarchy(_) => "HierarchyMembers",
            MemberSource::Children(_) => "MemberChildren",
        }
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn children(&self) -> Vec<Calc> {
        vec![match &self.source {
            MemberSource::Level(c) => Calc::Level(c.clone()),
            MemberSource::Hierarchy(c) => Calc::Hierarchy(c.clone()),
            MemberSource::Children(c) => Calc::Member(c.clone()),
        }]
    }

    /// Each evaluation builds a new list.
    fn result_style(&self) -> ResultStyle {
        ResultStyle::MutableList
    }
}

impl ListCalc for MemberList {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        let members = match &self.source {
            MemberSource::Level(c) => {
                let level = c.evaluate_level(ev)?;
                ev.schema().level(level).members().to_vec()
            }
            MemberSource::Hierarchy(c) => {
                let hierarchy = c.evaluate_hierarchy(ev)?;
                hierarchy_members(ev.schema(), hierarchy)
            }
            MemberSource::Children(c) => {
                let member = c.evaluate_member(ev)?;
                ev.schema().member(member).children().to_vec()
            }
        };
        Ok(TupleList::from_members(members))
    }
}
