use std::fmt;

use thiserror::Error;

use crate::token::Span;

/// Closed set of problems the parser and validator can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnexpectedToken,
    UnterminatedList,
    UnterminatedArgList,
    UnknownName,
    DuplicateName,
    IncompatibleTypes,
    ArgMismatch,
    MissingReturnStatement,
    NestedFunction,
}

impl ErrorKind {
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::UnexpectedToken => "Unexpected token",
            ErrorKind::UnterminatedList => "Unterminated list",
            ErrorKind::UnterminatedArgList => "Unterminated argument list",
            ErrorKind::UnknownName => "Unknown name",
            ErrorKind::DuplicateName => "Duplicate name",
            ErrorKind::IncompatibleTypes => "Incompatible types",
            ErrorKind::ArgMismatch => "Argument count mismatch",
            ErrorKind::MissingReturnStatement => "Missing return statement",
            ErrorKind::NestedFunction => "Functions may only be defined at the top level",
        }
    }

    pub fn is_syntax_error(self) -> bool {
        matches!(
            self,
            ErrorKind::UnexpectedToken | ErrorKind::UnterminatedList | ErrorKind::UnterminatedArgList
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A problem attached to the AST node where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {}, column {}", .span.line, .span.column)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}
