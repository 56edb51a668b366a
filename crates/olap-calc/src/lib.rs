#![forbid(unsafe_code)]

//! Compilation and evaluation of typed OLAP expressions.
//!
//! An [`Exp`] tree arrives already validated and typed. A compiler stack ([`BaseCompiler`] or
//! [`RefinedCompiler`], optionally wrapped in [`DecoratingCompiler`] layers) turns it into a tree
//! of [`Calc`] nodes, inserting conversions wherever a parent needs a different kind of value than
//! a child produces, and negotiating the physical form (list, mutable list, iterable) of every
//! set. The calc tree is then evaluated, any number of times and from any thread, against an
//! [`Evaluator`] that tracks the current member of every hierarchy.
//!
//! ```text
//! Exp ──compile──▶ Calc ──evaluate(ev)──▶ CalcValue
//! ```

mod calc;
mod compiler;
mod config;
mod error;
mod evaluator;
mod exp;
mod funs;
mod parameter;
mod types;

pub use crate::calc::{
    kind_for_type, BooleanCalc, Calc, CalcKind, CalcNode, CalcValue, ConstantCalc, DateTimeCalc,
    DimensionCalc, DoubleCalc, HierarchyCalc, HierarchyCurrentMemberFixed, IntegerCalc, IterCalc,
    LevelCalc, ListCalc, ListCursor, MemberCalc, ResultStyle, ResultStyles, SetCalc, StringCalc,
    Tuple, TupleCalc, TupleCursor, TupleList, ValueCalc,
};
pub use crate::compiler::{
    AfterCompile, BaseCompiler, CalcProfile, CompileCx, CompilerState, DecoratingCompiler,
    ExpCompiler, Profile, ProfilingHook, RefinedCompiler, TracingHook,
};
pub use crate::config::{
    build_compiler, CompilerFlavor, CompilerSettings, CompilerStack, EvaluatorSettings, Settings,
};
pub use crate::error::{CalcResult, CompileError, CompileResult, EvalError};
pub use crate::evaluator::{
    CellReader, ContextEvaluator, ContextGuard, Evaluator, InMemoryCells, Savepoint,
};
pub use crate::exp::{Exp, ExpKind, FunCall, Literal, ParameterRef};
pub use crate::funs::{FunDef, FunTable, Syntax};
pub use crate::parameter::{Parameter, ParameterSlot, ParameterSlotRegistry};
pub use crate::types::{
    DimensionType, HierarchyType, LevelType, MemberType, ScalarType, Type,
};

/// Bridging and conversion calcs the compilers insert, for inspecting compiled trees.
pub mod bridge {
    pub use crate::calc::{
        CastToNumeric, CopyList, CopyOnWriteList, DefaultMemberTuple, DoubleToBoolean,
        DoubleToInteger, HierarchyCurrentMember, IntegerToBoolean, IntegerToDouble, IterToList,
        LevelHierarchy, MemberArrayValue, MemberTuple, MemberValue, ScalarToValue, TupleValue,
        ValueToBoolean, ValueToDateTime, ValueToDouble, ValueToInteger, ValueToString,
    };
    pub use crate::calc::{
        double_to_integer, value_to_boolean, value_to_date_time, value_to_double,
        value_to_integer, value_to_string,
    };
}
