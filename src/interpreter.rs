use anyhow::Result;
use log::debug;
use rustc_hash::FxHashMap;

use crate::ast::{Ast, NodeId, ProgramBody, Statement};
use crate::backend::{Backend, PreparedBackend, on_execution_stack};

mod error;
mod runtime;
mod value;

pub use error::InterpreterError;
use runtime::{Environment, Flow, InterpreterRuntime};
use value::Value;

/// AST-walking backend that executes programs directly without compilation.
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Prepared executable program for the tree-walking interpreter.
pub struct PreparedInterpreter {
    ast: Ast,
    functions: FxHashMap<String, NodeId>,
}

impl PreparedInterpreter {
    /// Runs on the caller's thread, appending printed lines to `output`.
    pub fn run_with_output(
        &self,
        output: &mut String,
    ) -> std::result::Result<(), InterpreterError> {
        // Execution pipeline:
        // run_with_output -> execute_block (top-level statements) -> execute
        // -> evaluate -> call -> execute_block (function body).
        let body = self
            .ast
            .program_body()
            .ok_or(InterpreterError::MissingProgram)?;
        let mut runtime = InterpreterRuntime {
            ast: &self.ast,
            functions: &self.functions,
            environment: Environment::new(),
            output,
            depth: 0,
        };
        match body {
            ProgramBody::Expression(expression) => {
                let value = runtime.evaluate(*expression)?;
                runtime.print(&value);
            }
            ProgramBody::Statements(statements) => {
                // A top-level return cannot be parsed, so the flow is always normal.
                let flow = runtime.execute_block(statements)?;
                debug_assert_eq!(flow, Flow::Normal);
            }
        }
        Ok(())
    }
}

impl PreparedBackend for PreparedInterpreter {
    fn run_into(&self, output: &mut String) -> Result<()> {
        Ok(on_execution_stack(|| self.run_with_output(output))??)
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn prepare(&self, ast: &Ast) -> Result<Box<dyn PreparedBackend>> {
        let mut functions = FxHashMap::default();
        if let Some(ProgramBody::Statements(statements)) = ast.program_body() {
            for &id in statements {
                if let Some(Statement::Function(function)) = ast.statement(id) {
                    functions.entry(function.name.clone()).or_insert(id);
                }
            }
        }
        debug!("interpreter prepared {} functions", functions.len());
        Ok(Box::new(PreparedInterpreter {
            ast: ast.clone(),
            functions,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend;
    use indoc::indoc;

    fn run_source(source: &str) -> anyhow::Result<String> {
        let ast = frontend::load(source)?;
        Interpreter::new().run(&ast)
    }

    fn expect_interpreter_error(error: anyhow::Error) -> InterpreterError {
        error
            .downcast::<InterpreterError>()
            .expect("expected InterpreterError")
    }

    #[test]
    fn evaluates_precedence() {
        assert_eq!(run_source("2*(3+3)").expect("run failed"), "12\n");
        assert_eq!(run_source("(2*(3+3))/2").expect("run failed"), "6\n");
        assert_eq!(run_source("(2*2)+3").expect("run failed"), "7\n");
        assert_eq!(run_source("100*-1").expect("run failed"), "-100\n");
    }

    #[test]
    fn function_with_for_loop() {
        let source = indoc! {"
            function foo(a : int) {
              for (x in [1, 2, 3, 4, 5]) {
                print(a + x)
              }
            }
            foo(1)
        "};
        assert_eq!(run_source(source).expect("run failed"), "2\n3\n4\n5\n6\n");
    }

    #[test]
    fn string_concatenation_uses_static_type() {
        let source = indoc! {r#"
            var x = 1
            if (x > 0) {
              print(x + "1")
            }
            print(x + 1)
        "#};
        assert_eq!(run_source(source).expect("run failed"), "11\n2\n");
    }

    #[test]
    fn calls_see_globals_but_not_caller_locals() {
        let source = indoc! {"
            var g = 1
            function bump() { g = g + 1 }
            if (true) {
              var g = 100
              bump()
              print(g)
            }
            print(g)
        "};
        assert_eq!(run_source(source).expect("run failed"), "100\n2\n");
    }

    #[test]
    fn return_leaves_loops_and_branches() {
        let source = indoc! {"
            function first_big(items : list<int>) : int {
              for (i in items) {
                if (i > 10) { return i }
              }
              return -1
            }
            print(first_big([3, 42, 99]))
            print(first_big([1, 2]))
        "};
        assert_eq!(run_source(source).expect("run failed"), "42\n-1\n");
    }

    #[test]
    fn expression_program_prints_its_value() {
        assert_eq!(
            run_source(r#"[1, "a", true, null]"#).expect("run failed"),
            "[1, a, true, null]\n"
        );
        assert_eq!(run_source("1 == 1").expect("run failed"), "true\n");
    }

    #[test]
    fn equality_compares_structurally() {
        let source = indoc! {r#"
            print([1, 2] == [1, 2])
            print(null == null)
            print("a" != "a")
            print(1 == "1")
        "#};
        assert_eq!(
            run_source(source).expect("run failed"),
            "true\ntrue\nfalse\nfalse\n"
        );
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let error = run_source("print(1 / 0)").expect_err("division should fail");
        assert_eq!(
            expect_interpreter_error(error),
            InterpreterError::DivisionByZero
        );
    }

    #[test]
    fn null_cannot_enter_primitive_storage() {
        for source in [
            "var x : int = null\nprint(x + 1)",
            "for (x in [null, 1]) { print(x) }",
            "function f(a : int) { print(a) }\nf(null)",
            "function g() : bool { return null }\nprint(g())",
        ] {
            let error = run_source(source).expect_err("null should fail");
            assert_eq!(
                expect_interpreter_error(error),
                InterpreterError::NullReference,
                "{source}"
            );
        }
        assert_eq!(
            run_source("var o : object = null\nprint(o)").expect("run failed"),
            "null\n"
        );
    }

    #[test]
    fn output_before_a_runtime_error_is_kept() {
        let ast = frontend::load("print(1)\nprint(1 / 0)").expect("valid program");
        let prepared = Interpreter::new().prepare(&ast).expect("prepare");
        let mut output = String::new();
        let error = prepared.run_into(&mut output).expect_err("division should fail");
        assert_eq!(output, "1\n");
        assert_eq!(
            expect_interpreter_error(error),
            InterpreterError::DivisionByZero
        );
    }

    #[test]
    fn deep_recursion_runs_on_the_execution_stack() {
        let source = indoc! {"
            function count(n : int) : int {
              if (n == 0) { return 0 }
              return count(n - 1) + 1
            }
            print(count(200))
        "};
        assert_eq!(run_source(source).expect("run failed"), "200\n");
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let error = run_source("function f() { f() }\nf()").expect_err("recursion should fail");
        assert_eq!(
            expect_interpreter_error(error),
            InterpreterError::CallDepthExceeded { limit: 256 }
        );
    }
}
