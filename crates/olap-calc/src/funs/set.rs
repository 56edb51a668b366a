//! Set constructors and set functions.
//!
//! Each function asks for its inputs in the cheapest form it can consume and honours the result
//! styles its caller accepts: `Filter` stays lazy when an iterable is acceptable, `Order` sorts a
//! list it owns.

use super::{check_arity, invalid_arg, require_set, FunDef, FunTable, Syntax};
use crate::calc::{
    BooleanCalc, Calc, CalcNode, CalcValue, IntegerCalc, IterCalc, ListCalc, MemberCalc,
    ResultStyle, SetCalc, Tuple, TupleCalc, TupleCursor, TupleList,
};
use crate::compiler::CompileCx;
use crate::error::{CalcResult, CompileResult};
use crate::evaluator::{ContextGuard, Evaluator};
use crate::exp::{Exp, ExpKind, FunCall, Literal};
use crate::types::Type;
use chrono::NaiveDateTime;
use olap_model::{MemberId, Schema, Value};
use ordered_float::OrderedFloat;
use std::sync::Arc;

pub(super) fn register(table: &mut FunTable) {
    table.register(SetConstructor);
    table.register(Filter);
    table.register(CrossJoin);
    table.register(Order);
    table.register(Head);
}

/// Run `f` with the context moved to `tuple`, restoring it afterwards.
fn evaluate_at<T>(
    ev: &mut dyn Evaluator,
    tuple: &[MemberId],
    f: impl FnOnce(&mut dyn Evaluator) -> CalcResult<T>,
) -> CalcResult<T> {
    let mut guard = ContextGuard::new(ev);
    guard.set_context_members(tuple);
    f(&mut *guard)
}

/// `{member, tuple or set, ...}`
#[derive(Debug)]
struct SetConstructor;

#[derive(Debug)]
enum SetItem {
    Member(Arc<dyn MemberCalc>),
    Tuple(Arc<dyn TupleCalc>),
    Set(SetCalc),
}

impl FunDef for SetConstructor {
    fn name(&self) -> &str {
        "{}"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Braces
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        let Some(first) = args.first() else {
            return Ok(Type::set_of(Type::member()));
        };
        let element = match first.ty() {
            Type::Set(element) => (**element).clone(),
            ty @ (Type::Member(_) | Type::Tuple(_)) => ty.clone(),
            other => {
                return Err(invalid_arg(
                    self.name(),
                    0,
                    format!("expected a member, tuple or set, got {other}"),
                ))
            }
        };
        let arity = element.arity();
        for (i, arg) in args.iter().enumerate().skip(1) {
            let ty = arg.ty();
            if !matches!(ty, Type::Member(_) | Type::Tuple(_) | Type::Set(_)) {
                return Err(invalid_arg(
                    self.name(),
                    i,
                    format!("expected a member, tuple or set, got {ty}"),
                ));
            }
            if ty.arity() != arity {
                return Err(invalid_arg(
                    self.name(),
                    i,
                    format!("arity {} does not match arity {arity} of the set", ty.arity()),
                ));
            }
        }
        Ok(Type::set_of(element))
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let mut items = Vec::with_capacity(call.args().len());
        for arg in call.args() {
            items.push(match arg.ty() {
                Type::Member(_) => SetItem::Member(cx.compile_member(arg)?),
                Type::Tuple(_) => SetItem::Tuple(cx.compile_tuple(arg)?),
                _ => SetItem::Set(cx.compile_iter(arg)?),
            });
        }

        let constants: Option<Vec<Tuple>> = items
            .iter()
            .map(|item| match item {
                SetItem::Member(c) => match c.constant() {
                    Some(CalcValue::Member(m)) => Some(Tuple::from_slice(&[*m])),
                    _ => None,
                },
                SetItem::Tuple(c) => match c.constant() {
                    Some(CalcValue::Tuple(t)) => Some(t.clone()),
                    _ => None,
                },
                SetItem::Set(_) => None,
            })
            .collect();
        if let Some(mut tuples) = constants {
            let schema = cx.schema();
            tuples.retain(|t| !t.iter().any(|m| schema.member(*m).is_null()));
            let list = TupleList::with_tuples(ty.arity(), tuples);
            return Ok(Calc::constant_of(CalcValue::List(list), ty.clone()));
        }

        Ok(Calc::List(Arc::new(SetConstructorCalc {
            items,
            ty: ty.clone(),
        })))
    }
}

#[derive(Debug)]
struct SetConstructorCalc {
    items: Vec<SetItem>,
    ty: Type,
}

impl CalcNode for SetConstructorCalc {
    fn name(&self) -> &'static str {
        "SetConstructor"
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn children(&self) -> Vec<Calc> {
        self.items
            .iter()
            .map(|item| match item {
                SetItem::Member(c) => Calc::Member(c.clone()),
                SetItem::Tuple(c) => Calc::Tuple(c.clone()),
                SetItem::Set(c) => c.clone().into_calc(),
            })
            .collect()
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::MutableList
    }
}

impl ListCalc for SetConstructorCalc {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        let mut list = TupleList::new(self.ty.arity());
        for item in &self.items {
            match item {
                SetItem::Member(c) => {
                    let member = c.evaluate_member(ev)?;
                    // Null members are dropped from sets.
                    if !ev.schema().member(member).is_null() {
                        list.push(Tuple::from_slice(&[member]));
                    }
                }
                SetItem::Tuple(c) => {
                    let tuple = c.evaluate_tuple(ev)?;
                    if !tuple.iter().any(|m| ev.schema().member(*m).is_null()) {
                        list.push(tuple);
                    }
                }
                SetItem::Set(c) => {
                    let mut cursor = c.cursor(ev)?;
                    while let Some(tuple) = cursor.next_tuple(ev)? {
                        list.push(tuple);
                    }
                }
            }
        }
        Ok(list)
    }
}

/// `Filter(set, condition)`
#[derive(Debug)]
struct Filter;

impl FunDef for Filter {
    fn name(&self) -> &str {
        "Filter"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Function
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 2, 2)?;
        let set = require_set(self.name(), args, 0)?;
        if args[1].ty().is_set() {
            return Err(invalid_arg(self.name(), 1, "expected a condition, got a set"));
        }
        Ok(set)
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let lazy = cx.result_styles().accepts(ResultStyle::Iterable);
        let condition = cx.compile_boolean(call.arg(1))?;
        if lazy {
            let source = cx.compile_iter(call.arg(0))?;
            return Ok(Calc::Iterable(Arc::new(FilterIter {
                source,
                condition,
                ty: ty.clone(),
            })));
        }
        let source = cx.compile_list(call.arg(0), false)?;
        Ok(Calc::List(Arc::new(FilterList {
            source,
            condition,
            ty: ty.clone(),
        })))
    }
}

/// Filter producing its result on demand.
#[derive(Debug)]
struct FilterIter {
    source: SetCalc,
    condition: Arc<dyn BooleanCalc>,
    ty: Type,
}

impl CalcNode for FilterIter {
    fn name(&self) -> &'static str {
        "FilterIter"
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn children(&self) -> Vec<Calc> {
        vec![
            self.source.clone().into_calc(),
            Calc::Boolean(self.condition.clone()),
        ]
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::Iterable
    }
}

struct FilterCursor<'a> {
    inner: Box<dyn TupleCursor + 'a>,
    condition: &'a dyn BooleanCalc,
}

impl TupleCursor for FilterCursor<'_> {
    fn next_tuple(&mut self, ev: &mut dyn Evaluator) -> CalcResult<Option<Tuple>> {
        while let Some(tuple) = self.inner.next_tuple(ev)? {
            let condition = self.condition;
            if evaluate_at(ev, &tuple, |ev| condition.evaluate_boolean(ev))? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

impl IterCalc for FilterIter {
    fn evaluate_iterable<'a>(
        &'a self,
        ev: &mut dyn Evaluator,
    ) -> CalcResult<Box<dyn TupleCursor + 'a>> {
        Ok(Box::new(FilterCursor {
            inner: self.source.cursor(ev)?,
            condition: &*self.condition,
        }))
    }
}

/// Filter materializing its result.
#[derive(Debug)]
struct FilterList {
    source: Arc<dyn ListCalc>,
    condition: Arc<dyn BooleanCalc>,
    ty: Type,
}

impl CalcNode for FilterList {
    fn name(&self) -> &'static str {
        "FilterList"
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn children(&self) -> Vec<Calc> {
        vec![
            Calc::List(self.source.clone()),
            Calc::Boolean(self.condition.clone()),
        ]
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::MutableList
    }
}

impl ListCalc for FilterList {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        let source = self.source.evaluate_list(ev)?;
        let mut kept = Vec::new();
        for tuple in &source {
            if evaluate_at(ev, tuple, |ev| self.condition.evaluate_boolean(ev))? {
                kept.push(tuple.clone());
            }
        }
        Ok(TupleList::with_tuples(source.arity(), kept))
    }
}

/// `CrossJoin(set1, set2)`
#[derive(Debug)]
struct CrossJoin;

impl FunDef for CrossJoin {
    fn name(&self) -> &str {
        "CrossJoin"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Function
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 2, 2)?;
        let left = require_set(self.name(), args, 0)?;
        let right = require_set(self.name(), args, 1)?;
        let mut members = left.member_types();
        let right = right.member_types();
        for ty in &right {
            if let Some(h) = ty.pinned_hierarchy() {
                if members.iter().any(|m| m.pinned_hierarchy() == Some(h)) {
                    return Err(invalid_arg(
                        self.name(),
                        1,
                        "a hierarchy appears on both sides of the cross join",
                    ));
                }
            }
        }
        members.extend(right);
        Ok(Type::set_of(Type::Tuple(members)))
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let left = cx.compile_list(call.arg(0), false)?;
        let right = cx.compile_list(call.arg(1), false)?;
        Ok(Calc::List(Arc::new(CrossJoinCalc {
            left,
            right,
            ty: ty.clone(),
        })))
    }
}

#[derive(Debug)]
struct CrossJoinCalc {
    left: Arc<dyn ListCalc>,
    right: Arc<dyn ListCalc>,
    ty: Type,
}

impl CalcNode for CrossJoinCalc {
    fn name(&self) -> &'static str {
        "CrossJoin"
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::List(self.left.clone()), Calc::List(self.right.clone())]
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::MutableList
    }
}

impl ListCalc for CrossJoinCalc {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        let left = self.left.evaluate_list(ev)?;
        let right = self.right.evaluate_list(ev)?;
        let mut tuples = Vec::with_capacity(left.len() * right.len());
        for l in &left {
            for r in &right {
                let mut tuple = l.clone();
                tuple.extend_from_slice(r);
                tuples.push(tuple);
            }
        }
        Ok(TupleList::with_tuples(left.arity() + right.arity(), tuples))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Ascending,
    Descending,
}

/// `Order(set, key[, "ASC" | "DESC" | "BASC" | "BDESC"])`
///
/// Sorting is stable and flat: `ASC`/`BASC` and `DESC`/`BDESC` behave alike. Empty keys sort
/// lowest.
#[derive(Debug)]
struct Order;

fn order_direction(fun: &str, args: &[Exp]) -> CompileResult<Direction> {
    let Some(arg) = args.get(2) else {
        return Ok(Direction::Ascending);
    };
    let flag = match arg.kind() {
        ExpKind::Literal(Literal::String(s)) => s.to_ascii_uppercase(),
        _ => return Err(invalid_arg(fun, 2, "expected ASC, DESC, BASC or BDESC")),
    };
    match flag.as_str() {
        "ASC" | "BASC" => Ok(Direction::Ascending),
        "DESC" | "BDESC" => Ok(Direction::Descending),
        other => Err(invalid_arg(fun, 2, format!("unknown sort flag {other}"))),
    }
}

impl FunDef for Order {
    fn name(&self) -> &str {
        "Order"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Function
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 2, 3)?;
        let set = require_set(self.name(), args, 0)?;
        if args[1].ty().is_set() {
            return Err(invalid_arg(self.name(), 1, "expected a sort key, got a set"));
        }
        order_direction(self.name(), args)?;
        Ok(set)
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let direction = order_direction(self.name(), call.args())?;
        let list = cx.compile_list(call.arg(0), true)?;
        let key = cx.compile_scalar(call.arg(1), false)?;
        Ok(Calc::List(Arc::new(OrderCalc {
            list,
            key,
            direction,
            ty: ty.clone(),
        })))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Empty,
    Boolean(bool),
    Number(OrderedFloat<f64>),
    Text(String),
    DateTime(NaiveDateTime),
}

impl From<Value> for SortKey {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SortKey::Empty,
            Value::Boolean(b) => SortKey::Boolean(b),
            Value::Integer(i) => SortKey::Number(OrderedFloat(f64::from(i))),
            Value::Double(d) => SortKey::Number(OrderedFloat(d)),
            Value::String(s) => SortKey::Text(s),
            Value::DateTime(dt) => SortKey::DateTime(dt),
        }
    }
}

#[derive(Debug)]
struct OrderCalc {
    list: Arc<dyn ListCalc>,
    key: Calc,
    direction: Direction,
    ty: Type,
}

impl CalcNode for OrderCalc {
    fn name(&self) -> &'static str {
        "Order"
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn children(&self) -> Vec<Calc> {
        vec![Calc::List(self.list.clone()), self.key.clone()]
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::MutableList
    }

    fn annotations(&self) -> Vec<(&'static str, String)> {
        vec![("direction", format!("{:?}", self.direction))]
    }
}

impl ListCalc for OrderCalc {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        // Compiled as a mutable list, so sorting in place cannot affect anyone else.
        let mut list = self.list.evaluate_list(ev)?;
        let tuples = std::mem::take(list.tuples_mut());
        let mut keyed = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let key = evaluate_at(ev, &tuple, |ev| self.key.evaluate_scalar(ev))?;
            keyed.push((SortKey::from(key), tuple));
        }
        match self.direction {
            Direction::Ascending => keyed.sort_by(|a, b| a.0.cmp(&b.0)),
            Direction::Descending => keyed.sort_by(|a, b| b.0.cmp(&a.0)),
        }
        list.tuples_mut()
            .extend(keyed.into_iter().map(|(_, tuple)| tuple));
        Ok(list)
    }
}

/// `Head(set[, count])`; `count` defaults to 1.
#[derive(Debug)]
struct Head;

impl FunDef for Head {
    fn name(&self) -> &str {
        "Head"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Function
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 1, 2)?;
        let set = require_set(self.name(), args, 0)?;
        if let Some(count) = args.get(1) {
            if !(count.ty().is_numeric() || *count.ty() == Type::VALUE) {
                return Err(invalid_arg(
                    self.name(),
                    1,
                    format!("expected a number, got {}", count.ty()),
                ));
            }
        }
        Ok(set)
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        let set = cx.compile_iter(call.arg(0))?;
        let count = match call.args().get(1) {
            Some(arg) => Some(cx.compile_integer(arg)?),
            None => None,
        };
        Ok(Calc::List(Arc::new(HeadCalc {
            set,
            count,
            ty: ty.clone(),
        })))
    }
}

#[derive(Debug)]
struct HeadCalc {
    set: SetCalc,
    count: Option<Arc<dyn IntegerCalc>>,
    ty: Type,
}

impl CalcNode for HeadCalc {
    fn name(&self) -> &'static str {
        "Head"
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn children(&self) -> Vec<Calc> {
        let mut children = vec![self.set.clone().into_calc()];
        children.extend(self.count.clone().map(Calc::Integer));
        children
    }

    fn result_style(&self) -> ResultStyle {
        ResultStyle::MutableList
    }
}

impl ListCalc for HeadCalc {
    fn evaluate_list(&self, ev: &mut dyn Evaluator) -> CalcResult<TupleList> {
        let count = match &self.count {
            Some(c) => c.evaluate_integer(ev)?.unwrap_or(0),
            None => 1,
        };
        let count = usize::try_from(count).unwrap_or(0);
        let mut list = TupleList::new(self.ty.arity());
        // Stop pulling once the count is reached, so a lazy source is never fully evaluated.
        let mut cursor = self.set.cursor(ev)?;
        while list.len() < count {
            match cursor.next_tuple(ev)? {
                Some(tuple) => list.push(tuple),
                None => break,
            }
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_keys_sort_before_numbers() {
        let mut keys = vec![
            SortKey::from(Value::Double(2.0)),
            SortKey::from(Value::Null),
            SortKey::from(Value::Integer(-1)),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                SortKey::Empty,
                SortKey::Number(OrderedFloat(-1.0)),
                SortKey::Number(OrderedFloat(2.0)),
            ]
        );
    }

    #[test]
    fn unknown_sort_flag_is_rejected() {
        let args = vec![Exp::null(), Exp::null(), Exp::string("SIDEWAYS")];
        assert!(order_direction("Order", &args).is_err());
        let args = vec![Exp::null(), Exp::null(), Exp::string("bdesc")];
        assert_eq!(order_direction("Order", &args).ok(), Some(Direction::Descending));
    }
}
