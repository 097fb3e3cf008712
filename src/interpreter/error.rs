use thiserror::Error;

/// Typed errors produced by the tree-walking interpreter backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Null reference")]
    NullReference,
    #[error("Null value used in {operation}")]
    NullOperand { operation: &'static str },
    #[error("Expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error("Cannot iterate over {got}")]
    NotIterable { got: &'static str },
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    FunctionArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Call depth exceeded {limit}")]
    CallDepthExceeded { limit: usize },
    #[error("Cannot execute syntax error at '{text}'")]
    SyntaxError { text: String },
    #[error("Program has no root node")]
    MissingProgram,
}
