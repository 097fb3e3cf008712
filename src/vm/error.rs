use thiserror::Error;

/// VM execution errors produced while running compiled bytecode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Expected {expected} on the stack, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error("Null reference")]
    NullReference,
    #[error("Cannot cast {got} to {expected}")]
    ClassCast { expected: String, got: &'static str },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Local slot {slot} out of range")]
    InvalidSlot { slot: usize },
    #[error("Undefined field '{name}'")]
    UndefinedField { name: String },
    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    FunctionArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Undefined label {label}")]
    UndefinedLabel { label: usize },
    #[error("Iterator exhausted")]
    IteratorExhausted,
    #[error("Call depth exceeded {limit}")]
    CallDepthExceeded { limit: usize },
    #[error("Code block ended without a return")]
    MissingReturn,
}
