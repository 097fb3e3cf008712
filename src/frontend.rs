use std::fmt;

use log::debug;
use thiserror::Error;

use crate::ast::Ast;
use crate::diagnostic::Diagnostic;
use crate::parser;
use crate::validator;

/// Every diagnostic of a program that cannot be handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct FrontendError {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for FrontendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.diagnostics.len();
        write!(f, "{count} error{}", if count == 1 { "" } else { "s" })?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n  {diagnostic}")?;
        }
        Ok(())
    }
}

/// Parses and validates `source`, returning the tree even when it has errors.
pub fn analyze(source: &str) -> Ast {
    let mut ast = parser::parse(source);
    validator::validate(&mut ast);
    ast
}

pub fn check(ast: &Ast) -> Result<(), FrontendError> {
    let diagnostics = ast.diagnostics();
    if diagnostics.is_empty() {
        Ok(())
    } else {
        debug!("frontend rejected program with {} diagnostics", diagnostics.len());
        Err(FrontendError { diagnostics })
    }
}

/// Parses and validates `source`, failing if any diagnostic was recorded.
pub fn load(source: &str) -> Result<Ast, FrontendError> {
    let ast = analyze(source);
    check(&ast)?;
    Ok(ast)
}
