mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use catscript::{frontend, lexer, parser, validator};

fn bench_frontend(c: &mut Criterion) {
    for (label, path) in common::workloads() {
        let source = common::load_source(&path);
        let parsed = parser::parse(&source);

        c.bench_function(&format!("frontend_tokenize_{label}"), |b| {
            b.iter(|| {
                let out = lexer::tokenize(black_box(&source));
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_parse_only_{label}"), |b| {
            b.iter(|| {
                let out = parser::parse(black_box(&source));
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_validate_only_{label}"), |b| {
            b.iter(|| {
                let mut ast = parsed.clone();
                validator::validate(black_box(&mut ast));
                black_box(ast);
            })
        });

        c.bench_function(&format!("frontend_load_{label}"), |b| {
            b.iter(|| {
                let out = frontend::load(black_box(&source)).expect("load");
                black_box(out);
            })
        });
    }
}

criterion_group!(benches, bench_frontend);
criterion_main!(benches);
