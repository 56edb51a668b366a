use crate::types::Type;
use olap_model::ModelError;

pub type CompileResult<T> = Result<T, CompileError>;
pub type CalcResult<T> = Result<T, EvalError>;

/// Errors raised while turning an expression tree into a calc tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// No legal coercion exists between the static types involved.
    #[error("cannot convert {exp} of type {from} to {to}")]
    StaticType {
        exp: String,
        from: String,
        to: String,
    },

    /// The compiler broke one of its own contracts. Never caused by user input.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("cannot compile default value of parameter {parameter}: {source}")]
    Parameter {
        parameter: String,
        #[source]
        source: Box<CompileError>,
    },

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("function {function} expects {expected} arguments, got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("invalid argument {index} to {function}: {message}")]
    InvalidArgument {
        function: String,
        index: usize,
        message: String,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl CompileError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal(message.into())
    }

    pub(crate) fn static_type(exp: impl Into<String>, from: &Type, to: impl Into<String>) -> Self {
        CompileError::StaticType {
            exp: exp.into(),
            from: from.to_string(),
            to: to.into(),
        }
    }
}

/// Errors raised while evaluating a calc tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("null member where a member is required: {0}")]
    NullMember(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("integer overflow converting {0} to a 32-bit integer")]
    IntegerOverflow(f64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("evaluation exceeded the maximum depth of {0}")]
    Recursion(usize),

    #[error("internal error: {0}")]
    Internal(String),
}
