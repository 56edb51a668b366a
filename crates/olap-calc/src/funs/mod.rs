//! Built-in function definitions.
//!
//! A [`FunDef`] types its calls when the expression tree is built and compiles them into calcs,
//! compiling its arguments through the [`CompileCx`] it is handed.

mod aggregate;
mod member;
mod operators;
mod set;
mod tuple;

use crate::calc::Calc;
use crate::compiler::CompileCx;
use crate::error::{CompileError, CompileResult};
use crate::exp::{Exp, FunCall};
use crate::types::Type;
use ahash::AHashMap;
use olap_model::Schema;
use std::fmt;
use std::sync::Arc;

/// How a call is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Syntax {
    /// `Name(args)`
    Function,
    /// `arg.Name`
    Property,
    /// `arg.Name(args)`
    Method,
    /// `left op right`
    Infix,
    /// `op arg`
    Prefix,
    /// `{args}`
    Braces,
    /// `(args)`
    Parentheses,
}

pub trait FunDef: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn syntax(&self) -> Syntax;

    /// Validate `args` and compute the type of the call.
    fn result_type(&self, schema: &Schema, args: &[Exp]) -> CompileResult<Type>;

    /// Compile a call of this function whose type is `ty`.
    fn compile_call(&self, call: &FunCall, ty: &Type, cx: CompileCx<'_>) -> CompileResult<Calc>;
}

/// Function lookup by name (case-insensitive) and syntax.
#[derive(Clone, Debug, Default)]
pub struct FunTable {
    funs: AHashMap<(String, Syntax), Arc<dyn FunDef>>,
}

impl FunTable {
    /// Every built-in function.
    pub fn standard() -> Self {
        let mut table = Self::default();
        member::register(&mut table);
        set::register(&mut table);
        aggregate::register(&mut table);
        operators::register(&mut table);
        tuple::register(&mut table);
        table
    }

    pub fn register(&mut self, fun: impl FunDef + 'static) {
        let key = (fun.name().to_ascii_lowercase(), fun.syntax());
        self.funs.insert(key, Arc::new(fun));
    }

    pub fn lookup(&self, name: &str, syntax: Syntax) -> Option<&Arc<dyn FunDef>> {
        self.funs.get(&(name.to_ascii_lowercase(), syntax))
    }

    /// Resolve and type a call.
    pub fn call(
        &self,
        schema: &Schema,
        name: &str,
        syntax: Syntax,
        args: Vec<Exp>,
    ) -> CompileResult<Exp> {
        let fun = self
            .lookup(name, syntax)
            .ok_or_else(|| CompileError::UnknownFunction(name.to_string()))?;
        Exp::call(schema, fun.clone(), args)
    }

    pub fn len(&self) -> usize {
        self.funs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funs.is_empty()
    }
}

pub(crate) fn check_arity(
    fun: &str,
    args: &[Exp],
    min: usize,
    max: usize,
) -> CompileResult<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else if max == usize::MAX {
        format!("at least {min}")
    } else {
        format!("{min} to {max}")
    };
    Err(CompileError::Arity {
        function: fun.to_string(),
        expected,
        actual: args.len(),
    })
}

pub(crate) fn invalid_arg(fun: &str, index: usize, message: impl Into<String>) -> CompileError {
    CompileError::InvalidArgument {
        function: fun.to_string(),
        index,
        message: message.into(),
    }
}

/// The type of a set-valued argument.
pub(crate) fn require_set(fun: &str, args: &[Exp], index: usize) -> CompileResult<Type> {
    match args[index].ty() {
        ty @ Type::Set(_) => Ok(ty.clone()),
        other => Err(invalid_arg(fun, index, format!("expected a set, got {other}"))),
    }
}
