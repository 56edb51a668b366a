use super::{check_arity, invalid_arg, FunDef, FunTable, Syntax};
use crate::calc::{Calc, CalcValue, MemberTuple, Tuple};
use crate::compiler::CompileCx;
use crate::error::CompileResult;
use crate::exp::{Exp, FunCall};
use crate::types::{MemberType, Type};
use olap_model::Schema;
use std::sync::Arc;

pub(super) fn register(table: &mut FunTable) {
    table.register(TupleConstructor);
}

/// `(member, member, ...)`. With a single argument, plain parentheses around any expression.
#[derive(Debug)]
struct TupleConstructor;

impl FunDef for TupleConstructor {
    fn name(&self) -> &str {
        "()"
    }

    fn syntax(&self) -> Syntax {
        Syntax::Parentheses
    }

    fn result_type(&self, _schema: &Schema, args: &[Exp]) -> CompileResult<Type> {
        check_arity(self.name(), args, 1, usize::MAX)?;
        if let [only] = args {
            return Ok(only.ty().clone());
        }
        let mut members: Vec<MemberType> = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let member = match arg.ty() {
                Type::Member(t) => *t,
                Type::Hierarchy(_) | Type::Dimension(_) => MemberType {
                    dimension: arg.ty().pinned_dimension(),
                    hierarchy: arg.ty().pinned_hierarchy(),
                    level: None,
                },
                other => {
                    return Err(invalid_arg(
                        self.name(),
                        i,
                        format!("expected a member, got {other}"),
                    ))
                }
            };
            if let Some(h) = member.hierarchy {
                if members.iter().any(|m| m.hierarchy == Some(h)) {
                    return Err(invalid_arg(
                        self.name(),
                        i,
                        "hierarchy appears more than once in the tuple",
                    ));
                }
            }
            members.push(member);
        }
        Ok(Type::Tuple(members.into_iter().map(Type::Member).collect()))
    }

    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc> {
        if let [only] = call.args() {
            return cx.compile(only);
        }
        let members = call
            .args()
            .iter()
            .map(|arg| cx.compile_member(arg))
            .collect::<CompileResult<Vec<_>>>()?;
        let constant: Option<Tuple> = members
            .iter()
            .map(|m| match m.constant() {
                Some(CalcValue::Member(id)) => Some(*id),
                _ => None,
            })
            .collect();
        if let Some(tuple) = constant {
            return Ok(Calc::constant_of(CalcValue::Tuple(tuple), ty.clone()));
        }
        Ok(Calc::Tuple(Arc::new(MemberTuple::new(members))))
    }
}
