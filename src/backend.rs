use std::io;
use std::panic;
use std::thread;

use anyhow::Result;

use crate::ast::Ast;

pub use crate::interpreter;
pub use crate::vm;

/// Native stack reserved for running a program; both backends recurse once
/// per CatScript call.
pub const EXECUTION_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Executable artifact produced by a backend `prepare` step.
///
/// This keeps compilation and execution separated so benchmarks and tests can
/// measure/validate prepare-vs-run phases independently.
pub trait PreparedBackend {
    /// Runs the program, appending printed lines to `output` as they are
    /// produced. On failure `output` keeps everything printed before the error.
    fn run_into(&self, output: &mut String) -> Result<()>;

    fn run(&self) -> Result<String> {
        let mut output = String::new();
        self.run_into(&mut output)?;
        Ok(output)
    }
}

/// Common interface implemented by each execution backend.
///
/// `prepare` takes a validated tree and builds backend-owned executable
/// state, while `run` offers the convenience path for one-shot execution.
/// Backends do not re-check diagnostics; callers gate on `frontend::check`.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn prepare(&self, ast: &Ast) -> Result<Box<dyn PreparedBackend>>;

    fn run(&self, ast: &Ast) -> Result<String> {
        self.prepare(ast)?.run()
    }
}

pub fn backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(crate::interpreter::Interpreter::new()),
        Box::new(crate::vm::VM::new()),
    ]
}

pub fn find_backend(name: &str) -> Option<Box<dyn Backend>> {
    backends().into_iter().find(|backend| backend.name() == name)
}

/// Runs `run` on a scoped thread with `EXECUTION_STACK_SIZE` bytes of stack.
/// A panic on that thread is resumed on the caller's.
pub(crate) fn on_execution_stack<T, F>(run: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("catscript-run".to_string())
            .stack_size(EXECUTION_STACK_SIZE)
            .spawn_scoped(scope, run)?;
        match handle.join() {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}
