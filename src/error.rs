use std::fmt;

use thiserror::Error;

/// A 0-based position in the expression source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// 0-based line number
    pub line: usize,
    /// 0-based column (character offset within the line)
    pub column: usize,
    /// 0-based absolute byte offset from the start of input
    pub offset: usize,
}

/// A syntax error reported by the expression parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.position.line + 1, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Coarse classification of evaluation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Source does not parse, or uses syntax outside the whitelist.
    Syntax,
    /// A function name that is not in the environment.
    Reference,
    /// Arity mismatch or an ill-typed argument.
    Type,
    /// Failures raised by function bodies and helpers.
    Runtime,
}

/// Everything that can go wrong while evaluating an expression.
///
/// The `Display` form is what ends up inside rendered error spans, so the
/// wording is part of the observable behaviour.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("SyntaxError: {0}")]
    Syntax(#[from] ParseError),

    #[error("SyntaxError: unsupported syntax: {0}")]
    UnsupportedSyntax(&'static str),

    #[error("SyntaxError: binary op {0} is not whitelisted")]
    NotWhitelisted(&'static str),

    #[error("SyntaxError: functions may only be called by name; got {0}")]
    IndirectCall(&'static str),

    #[error("ReferenceError: no function named {0}")]
    UnknownFunction(String),

    #[error("TypeError: refusing to touch literal of type {0}")]
    UnsupportedLiteral(&'static str),

    #[error("TypeError: {name} expects {expected} args, got {got}")]
    Arity {
        name: String,
        /// Rendered requirement, e.g. `2` or `at least 2`.
        expected: String,
        got: usize,
    },

    #[error("TypeError: argument {position} to {name} is ill-typed: {reason}")]
    IllTyped {
        name: String,
        /// 1-based argument position
        position: usize,
        reason: String,
    },

    #[error("Error: {0}")]
    Runtime(String),

    #[error("RangeError: expression source is longer than {0} bytes")]
    SourceTooLong(usize),

    #[error("RangeError: evaluation exceeded its budget of {0} steps")]
    BudgetExceeded(usize),
}

impl EvalError {
    pub fn runtime(message: impl Into<String>) -> Self {
        EvalError::Runtime(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::Syntax(_)
            | EvalError::UnsupportedSyntax(_)
            | EvalError::NotWhitelisted(_)
            | EvalError::IndirectCall(_) => ErrorKind::Syntax,
            EvalError::UnknownFunction(_) => ErrorKind::Reference,
            EvalError::UnsupportedLiteral(_)
            | EvalError::Arity { .. }
            | EvalError::IllTyped { .. } => ErrorKind::Type,
            EvalError::Runtime(_)
            | EvalError::SourceTooLong(_)
            | EvalError::BudgetExceeded(_) => ErrorKind::Runtime,
        }
    }
}

/// Failures of the template stage: the templating engine rejected the
/// template text, or rendering it aborted.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template does not compile: {0}")]
    Compile(#[from] Box<handlebars::TemplateError>),

    #[error("template failed to render: {0}")]
    Render(#[from] Box<handlebars::RenderError>),
}
