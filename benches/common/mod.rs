#![allow(dead_code)]
use std::path::Path;

use catscript::ast::Ast;
use catscript::frontend;
use test_support::bench_cases;

/// Benchmark workloads as `(tag, program path)` pairs.
pub fn workloads() -> Vec<(String, String)> {
    bench_cases(Path::new("tests/programs"))
        .unwrap_or_else(|err| panic!("load bench cases: {err}"))
        .into_iter()
        .map(|(tag, case)| (tag, case.program_path.display().to_string()))
        .collect()
}

pub fn load_source(path: &str) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"))
}

pub fn load_program(path: &str) -> Ast {
    let source = load_source(path);
    frontend::load(&source).unwrap_or_else(|err| panic!("check {path}: {err}"))
}
