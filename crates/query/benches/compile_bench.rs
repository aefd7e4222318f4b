//! Benchmarks for statement compilation and cursor iteration.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::Value;
use strata_query::cursor::collect_rows;
use strata_query::SqlCompiler;
use strata_storage::MemoryEngine;

const HOUR: i64 = 3_600_000_000;

fn engine(rows: i64) -> MemoryEngine {
    let mut compiler = SqlCompiler::default();
    let mut engine = MemoryEngine::new();
    compiler
        .execute(
            &mut engine,
            "create table trades (sym SYMBOL index, price DOUBLE, qty INT, ts TIMESTAMP) \
             timestamp(ts) partition by DAY",
        )
        .unwrap();
    compiler
        .execute(&mut engine, "create table syms (name SYMBOL, sector INT)")
        .unwrap();
    for i in 0..rows {
        let row = vec![
            Value::Str(format!("S{}", i % 32)),
            Value::Double((i % 997) as f64),
            Value::Int((i % 100) as i32),
            Value::Timestamp(i * HOUR / 60),
        ];
        engine.append("trades", row).unwrap();
    }
    for i in 0..32 {
        engine
            .append("syms", vec![Value::Str(format!("S{}", i)), Value::Int(i % 4)])
            .unwrap();
    }
    engine
}

fn bench_compile(c: &mut Criterion) {
    let engine = engine(16);
    let mut group = c.benchmark_group("compile");
    let queries = [
        ("filter", "select price from trades where sym = 'S1' and price > 10"),
        ("group_by", "select sym, sum(qty), avg(price) from trades"),
        (
            "join",
            "select t.price, s.sector from trades t join syms s on t.sym = s.name where s.sector = 2",
        ),
        ("sample_by", "select sym, max(price) from trades sample by 1h"),
    ];
    for (name, sql) in queries {
        group.bench_with_input(BenchmarkId::from_parameter(name), sql, |b, sql| {
            let mut compiler = SqlCompiler::default();
            b.iter(|| black_box(compiler.compile(&engine, sql).unwrap()));
        });
    }
    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");
    for rows in [1_000i64, 10_000] {
        let engine = engine(rows);
        let mut compiler = SqlCompiler::default();
        let indexed = compiler
            .compile(&engine, "select price from trades where sym in ('S1', 'S2')")
            .unwrap();
        let sorted = compiler
            .compile(&engine, "select price from trades order by price desc limit 10")
            .unwrap();
        group.bench_with_input(BenchmarkId::new("index_lookup", rows), &indexed, |b, f| {
            b.iter(|| black_box(collect_rows(f.as_ref()).unwrap().len()))
        });
        group.bench_with_input(BenchmarkId::new("top_10", rows), &sorted, |b, f| {
            b.iter(|| black_box(collect_rows(f.as_ref()).unwrap().len()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_execute);
criterion_main!(benches);
