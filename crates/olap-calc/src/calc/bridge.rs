//! Calcs synthesized by the compiler at type boundaries.

use super::{
    drain_cursor, Calc, CalcNode, HierarchyCalc, IterCalc, LevelCalc, ListCalc, MemberCalc,
    ResultStyle, Tuple, TupleCalc, TupleList, ValueCalc,
};
use crate::error::CalcResult;
use crate::evaluator::{ContextGuard, Evaluator};
use crate::types::{HierarchyType, MemberType, Type};
use olap_model::{HierarchyId, LevelId, MemberId, Value};
use smallvec::smallvec;
use std::sync::Arc;

/// Current member of a hierarchy known at compile time.
#[derive(Debug)]
pub struct HierarchyCurrentMemberFixed {
    hierarchy: HierarchyId,
    ty: MemberType,
}

impl HierarchyCurrentMemberFixed {
    pub fn new(hierarchy: HierarchyId, ty: MemberType) -> Self {
        Self { hierarchy, ty }
    }

    pub fn hierarchy(&self) -> HierarchyId {
        self.hierarchy
    }
}

impl CalcNode for HierarchyCurrentMemberFixed {
    fn name(&self) -> &'static str {
        "HierarchyCurrentMemberFixed"
    }

    fn result_type(&self) -> Type {
        Type::Member(self.ty)
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        vec![("hierarchy", self.hierarchy.index().to_string())]
    }
}

impl MemberCalc for HierarchyCurrentMemberFixed {
    fn evaluate_member(&self, ev: &mut dyn Evaluator) -> CalcResult<MemberId> {
        Ok(ev.context_member(self.hierarchy))
    }
}

/// Current member of a hierarchy computed at evaluation time.
#[derive(Debug)]
pub struct HierarchyCurrentMember {
    hierarchy: Arc<dyn HierarchyCalc>,
    ty: MemberType,
}

impl HierarchyCurrentMember {
    pub fn new(hierarchy: Arc<dyn HierarchyCalc>, ty: MemberType) -> Self {
        Self { hierarchy, ty }
    }
}

impl CalcNode for HierarchyCurrentMember {
    fn name(&self) -> &'static str {
        "HierarchyCurrentMember"
    }

    fn result_type(&self) -> Type {
        Type::Member(self.ty)
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Hierarchy(self.hierarchy.clone())]
    }
}

impl MemberCalc for HierarchyCurrentMember {
    fn evaluate_member(&self, ev: &mut dyn Evaluator) -> CalcResult<MemberId> {
        // The hierarchy expression may move the context; the member is read from the caller's.
        let hierarchy = {
            let mut guard = ContextGuard::new(ev);
            self.hierarchy.evaluate_hierarchy(&mut *guard)?
        };
        Ok(ev.context_member(hierarchy))
    }
}

/// The hierarchy a level belongs to.
#[derive(Debug)]
pub struct LevelHierarchy {
    level: Arc<dyn LevelCalc>,
    ty: HierarchyType,
}

impl LevelHierarchy {
    pub fn new(level: Arc<dyn LevelCalc>, ty: HierarchyType) -> Self {
        Self { level, ty }
    }
}

impl CalcNode for LevelHierarchy {
    fn name(&self) -> &'static str {
        "LevelHierarchy"
    }

    fn result_type(&self) -> Type {
        Type::Hierarchy(self.ty)
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Level(self.level.clone())]
    }
}

impl HierarchyCalc for LevelHierarchy {
    fn evaluate_hierarchy(&self, ev: &mut dyn Evaluator) -> CalcResult<HierarchyId> {
        let level: LevelId = self.level.evaluate_level(ev)?;
        Ok(ev.schema().level(level).hierarchy())
    }
}

/// Read the cell at `members` with the rest of the context unchanged. The context is restored on
/// every path out.
fn evaluate_at(ev: &mut dyn Evaluator, members: &[MemberId], null_check: bool) -> CalcResult<Value> {
    if null_check && ev.need_to_return_null_for_unrelated_dimension(members) {
        return Ok(Value::Null);
    }
    let mut guard = ContextGuard::new(ev);
    guard.set_context_members(members);
    guard.evaluate_current()
}

fn null_check_annotation(null_check: bool) -> Vec<(&'static str, String)> {
    vec![("null_check", null_check.to_string())]
}

/// Value of the cell at a member.
#[derive(Debug)]
pub struct MemberValue {
    member: Arc<dyn MemberCalc>,
    null_check: bool,
}

impl MemberValue {
    pub fn new(member: Arc<dyn MemberCalc>, null_check: bool) -> Self {
        Self { member, null_check }
    }
}

impl CalcNode for MemberValue {
    fn name(&self) -> &'static str {
        "MemberValue"
    }

    fn result_type(&self) -> Type {
        Type::VALUE
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Member(self.member.clone())]
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        null_check_annotation(self.null_check)
    }
}

impl ValueCalc for MemberValue {
    fn evaluate_value(&self, ev: &mut dyn Evaluator) -> CalcResult<Value> {
        let member = self.member.evaluate_member(ev)?;
        evaluate_at(ev, &[member], self.null_check)
    }
}

/// Value of the cell at a tuple.
#[derive(Debug)]
pub struct TupleValue {
    tuple: Arc<dyn TupleCalc>,
    null_check: bool,
}

impl TupleValue {
    pub fn new(tuple: Arc<dyn TupleCalc>, null_check: bool) -> Self {
        Self { tuple, null_check }
    }
}

impl CalcNode for TupleValue {
    fn name(&self) -> &'static str {
        "TupleValue"
    }

    fn result_type(&self) -> Type {
        Type::VALUE
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Tuple(self.tuple.clone())]
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        null_check_annotation(self.null_check)
    }
}

impl ValueCalc for TupleValue {
    fn evaluate_value(&self, ev: &mut dyn Evaluator) -> CalcResult<Value> {
        let tuple = self.tuple.evaluate_tuple(ev)?;
        evaluate_at(ev, &tuple, self.null_check)
    }
}

/// Value of the cell at a tuple given by its member calcs, without building the tuple first.
#[derive(Debug)]
pub struct MemberArrayValue {
    members: Vec<Arc<dyn MemberCalc>>,
    null_check: bool,
}

impl MemberArrayValue {
    pub fn new(members: Vec<Arc<dyn MemberCalc>>, null_check: bool) -> Self {
        Self {
            members,
            null_check,
        }
    }
}

impl CalcNode for MemberArrayValue {
    fn name(&self) -> &'static str {
        "MemberArrayValue"
    }

    fn result_type(&self) -> Type {
        Type::VALUE
    }

    fn children(&self) -> Vec<Calc> {
        self.members.iter().cloned().map(Calc::Member).collect()
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        null_check_annotation(self.null_check)
    }
}

impl ValueCalc for MemberArrayValue {
    fn evaluate_value(&self, ev: &mut dyn Evaluator) -> CalcResult<Value> {
        let mut members: Tuple = Tuple::with_capacity(self.members.len());
        for calc in &self.members {
            members.push(calc.evaluate_member(ev)?);
        }
        evaluate_at(ev, &members, self.null_check)
    }
}

/// Tuple built from one member calc per position.
#[derive(Debug)]
pub struct MemberTuple {
    members: Vec<Arc<dyn MemberCalc>>,
    ty: Vec<Type>,
}

impl MemberTuple {
    pub fn new(members: Vec<Arc<dyn MemberCalc>>) -> Self {
        let ty = members.iter().map(|m| m.result_type()).collect();
        Self { members, ty }
    }
}

impl CalcNode for MemberTuple {
    fn name(&self) -> &'static str {
        "MemberTuple"
    }

    fn result_type(&self) -> Type {
        Type::Tuple(self.ty.clone())
    }

    fn children(&self) -> Vec<Calc> {
        self.members.iter().cloned().map(Calc::Member).collect()
    }
}

impl TupleCalc for MemberTuple {
    fn evaluate_tuple(&self, ev: &mut dyn Evaluator) -> CalcResult<Tuple> {
        let mut tuple = Tuple::with_capacity(self.members.len());
        for calc in &self.members {
            tuple.push(calc.evaluate_member(ev)?);
        }
        Ok(tuple)
    }

    fn member_calcs(&self) -> Option<&[Arc<dyn MemberCalc>]> {
        Some(&self.members)
    }
}

/// One-member tuple holding the default member of a hierarchy computed at evaluation time.
#[derive(Debug)]
pub struct DefaultMemberTuple {
    hierarchy: Arc<dyn HierarchyCalc>,
    ty: MemberType,
}

impl DefaultMemberTuple {
    pub fn new(hierarchy: Arc<dyn HierarchyCalc>, ty: MemberType) -> Self {
        Self { hierarchy, ty }
    }
}

impl CalcNode for DefaultMemberTuple {
    fn name(&self) -> &'static str {
        "DefaultMemberTuple"
    }

    fn result_type(&self) -> Type {
        Type::Tuple(vec![Type::Member(self.ty)])
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Hierarchy(self.hierarchy.clone())]
    }
}

impl TupleCalc for DefaultMemberTuple {
    fn evaluate_tuple(&self, ev: &mut dyn Evaluator) -> CalcResult<Tuple> {
        let hierarchy = self.hierarchy.evaluate_hierarchy(ev)?;
        Ok(smallvec![ev.schema().default_member(hierarchy)])
    }
}

/// Materializes an iterable into a fresh list.
#[derive(Debug)]
pub struct IterToList {
    iter: Arc<dyn IterCalc>,
}

impl IterToList {
    pub fn new(iter: Arc<dyn IterCalc>) -> Self {
        Self { iter }
    }
}

impl CalcNode for IterToList {
    fn name(&self) -> &'static str {
        "IterToList"
    }

    fn result_type(&self) -> Type {
        self.iter.result_type()
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::Iterable(self.iter.clone())]
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::MutableList
    }
}

impl ListCalc for IterToList {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        let arity = self.iter.result_type().arity();
        let cursor = self.iter.evaluate_iterable(ev)?;
        drain_cursor(cursor, ev, arity)
    }
}

/// Hands out a list the caller may mutate, copying only when the underlying list is shared.
#[derive(Debug)]
pub struct CopyOnWriteList {
    list: Arc<dyn ListCalc>,
}

impl CopyOnWriteList {
    pub fn new(list: Arc<dyn ListCalc>) -> Self {
        Self { list }
    }
}

impl CalcNode for CopyOnWriteList {
    fn name(&self) -> &'static str {
        "CopyOnWriteList"
    }

    fn result_type(&self) -> Type {
        self.list.result_type()
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::List(self.list.clone())]
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::MutableList
    }
}

impl ListCalc for CopyOnWriteList {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        Ok(self.list.evaluate_list(ev)?.into_unique())
    }
}

/// Hands out a private copy of the list on every evaluation.
#[derive(Debug)]
pub struct CopyList {
    list: Arc<dyn ListCalc>,
}

impl CopyList {
    pub fn new(list: Arc<dyn ListCalc>) -> Self {
        Self { list }
    }
}

impl CalcNode for CopyList {
    fn name(&self) -> &'static str {
        "CopyList"
    }

    fn result_type(&self) -> Type {
        self.list.result_type()
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::List(self.list.clone())]
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::MutableList
    }
}

impl ListCalc for CopyList {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        Ok(self.list.evaluate_list(ev)?.deep_copy())
    }
}
