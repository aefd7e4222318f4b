//! End-to-end query execution over the in-memory engine.

use strata_core::Value;
use strata_query::cursor::{collect_rows, plan};
use strata_query::{CompiledStatement, CompilerConfig, SqlCompiler};
use strata_storage::MemoryEngine;

const HOUR: i64 = 3_600_000_000;

/// `quotes`: one row per hour over symbols A B A C B A with bids 1..6.
/// `fx`: rates 10, 20, 30 for A, B, A at 00:30, 01:30 and 03:30.
fn setup() -> (SqlCompiler, MemoryEngine) {
    let mut compiler = SqlCompiler::default();
    let mut engine = MemoryEngine::new();
    compiler
        .execute(
            &mut engine,
            "create table quotes (sym SYMBOL index, bid DOUBLE, ts TIMESTAMP) timestamp(ts) partition by DAY",
        )
        .unwrap();
    compiler
        .execute(&mut engine, "create table fx (ccy SYMBOL, rate DOUBLE, ts TIMESTAMP) timestamp(ts)")
        .unwrap();

    for (i, sym) in ["A", "B", "A", "C", "B", "A"].iter().enumerate() {
        let row = vec![
            Value::from(*sym),
            Value::Double(i as f64 + 1.0),
            Value::Timestamp(i as i64 * HOUR),
        ];
        engine.append("quotes", row).unwrap();
    }
    for (ccy, rate, ts) in [("A", 10.0, HOUR / 2), ("B", 20.0, 3 * HOUR / 2), ("A", 30.0, 7 * HOUR / 2)] {
        engine
            .append("fx", vec![Value::from(ccy), Value::Double(rate), Value::Timestamp(ts)])
            .unwrap();
    }
    (compiler, engine)
}

fn query(sql: &str) -> Vec<Vec<Value>> {
    let (mut compiler, mut engine) = setup();
    match compiler.execute(&mut engine, sql).unwrap() {
        CompiledStatement::Select(factory) => collect_rows(factory.as_ref()).unwrap(),
        _ => panic!("not a query: {}", sql),
    }
}

fn plan_of(sql: &str) -> String {
    let (mut compiler, engine) = setup();
    plan(compiler.compile(&engine, sql).unwrap().as_ref())
}

fn column_f64(rows: &[Vec<Value>], column: usize) -> Vec<Option<f64>> {
    rows.iter()
        .map(|r| if r[column].is_null() { None } else { r[column].to_f64() })
        .collect()
}

#[test]
fn test_timestamp_interval() {
    let rows = query("select bid from quotes where ts > '1970-01-01T02:00:00Z'");
    assert_eq!(column_f64(&rows, 0), [Some(4.0), Some(5.0), Some(6.0)]);
    assert_eq!(query("select bid from quotes where ts in ('1970-01-01')").len(), 6);
    assert!(query("select bid from quotes where ts in ('1970-01-02')").is_empty());
}

#[test]
fn test_index_and_filter() {
    let rows = query("select bid from quotes where sym in ('A', 'C') and bid > 2");
    assert_eq!(column_f64(&rows, 0), [Some(3.0), Some(4.0), Some(6.0)]);
}

#[test]
fn test_latest_by_without_index() {
    let mut rows: Vec<(String, f64)> = query("select ccy, rate from fx latest by ccy")
        .into_iter()
        .map(|r| (r[0].to_string(), r[1].to_f64().unwrap()))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(rows, [("A".to_string(), 30.0), ("B".to_string(), 20.0)]);

    let rows = query("select rate from fx latest by ccy where ccy = 'B'");
    assert_eq!(column_f64(&rows, 0), [Some(20.0)]);
}

#[test]
fn test_latest_by_index_keys() {
    let sql = "select sym, bid from quotes latest by sym where sym = 'A'";
    assert!(plan_of(sql).contains("LatestByIndexed"), "{}", plan_of(sql));
    let rows = query(sql);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0].to_string(), "A");
    assert_eq!(column_f64(&rows, 1), [Some(6.0)]);

    let sql = "select sym, bid from quotes latest by sym where sym in ('A', 'Z')";
    assert!(plan_of(sql).contains("LatestByIndexed"));
    assert_eq!(column_f64(&query(sql), 1), [Some(6.0)]);

    let rows = query("select sym, bid from quotes latest by sym where sym in ('A', 'C')");
    assert_eq!(column_f64(&rows, 1), [Some(4.0), Some(6.0)]);
}

#[test]
fn test_latest_by_index_with_filter() {
    let rows = query("select sym, bid from quotes latest by sym where bid < 5");
    assert_eq!(column_f64(&rows, 1), [Some(2.0), Some(3.0), Some(4.0)]);
}

#[test]
fn test_asof_join() {
    let rows = query("select q.bid, f.rate from quotes q asof join fx f on q.sym = f.ccy");
    assert_eq!(
        column_f64(&rows, 1),
        [None, None, Some(10.0), None, Some(20.0), Some(30.0)]
    );
}

#[test]
fn test_outer_join() {
    let rows = query("select q.bid, f.rate from quotes q outer join fx f on q.sym = f.ccy");
    assert_eq!(rows.len(), 9);
    assert_eq!(rows.iter().filter(|r| r[1].is_null()).count(), 1);
}

#[test]
fn test_count_per_symbol() {
    let counts: Vec<(String, i64)> = query("select sym, count() from quotes")
        .into_iter()
        .map(|r| (r[0].to_string(), r[1].to_i64().unwrap()))
        .collect();
    assert_eq!(
        counts,
        [("A".to_string(), 3), ("B".to_string(), 2), ("C".to_string(), 1)]
    );
}

#[test]
fn test_rank_within_partition() {
    let ranks: Vec<i64> = query("select bid, rank() r over (partition by sym order by bid desc) from quotes")
        .into_iter()
        .map(|r| r[1].to_i64().unwrap())
        .collect();
    assert_eq!(ranks, [3, 2, 2, 1, 1, 1]);
}

#[test]
fn test_random_functions_follow_the_seed() {
    let run = || {
        let (_, mut engine) = setup();
        let mut compiler = SqlCompiler::new(CompilerConfig::new().with_random_seed(7, 11));
        match compiler.execute(&mut engine, "select rnd_int() r from quotes limit 3").unwrap() {
            CompiledStatement::Select(factory) => collect_rows(factory.as_ref()).unwrap(),
            _ => unreachable!(),
        }
    };
    let first = run();
    assert_eq!(first.len(), 3);
    assert_eq!(first, run());
}

#[test]
fn test_order_by_limit() {
    let rows = query("select sym, bid from quotes order by bid desc limit 2");
    assert_eq!(column_f64(&rows, 1), [Some(6.0), Some(5.0)]);
}
