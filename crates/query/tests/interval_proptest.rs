//! Property tests for interval lists and join ordering.

use proptest::prelude::*;
use strata_query::model::interval::{append, intersect, invert, subtract, Interval};
use strata_query::SqlCompiler;
use strata_storage::MemoryEngine;

/// Random sorted, coalesced interval list.
fn interval_list() -> impl Strategy<Value = Vec<Interval>> {
    prop::collection::vec((0i64..1_000, 0i64..50), 0..12).prop_map(|mut pairs| {
        pairs.sort();
        let mut list = Vec::new();
        for (lo, len) in pairs {
            append(&mut list, lo, lo + len);
        }
        list
    })
}

fn is_coalesced(list: &[Interval]) -> bool {
    list.iter().all(|i| i.lo <= i.hi) && list.windows(2).all(|w| w[0].hi.saturating_add(1) < w[1].lo)
}

fn covers(list: &[Interval], ts: i64) -> bool {
    list.iter().any(|i| i.contains(ts))
}

proptest! {
    #[test]
    fn intersect_is_idempotent(a in interval_list()) {
        prop_assert_eq!(intersect(&a, &a), a);
    }

    #[test]
    fn intersect_is_commutative(a in interval_list(), b in interval_list()) {
        let ab = intersect(&a, &b);
        prop_assert!(is_coalesced(&ab));
        prop_assert_eq!(ab, intersect(&b, &a));
    }

    #[test]
    fn intersect_and_subtract_partition_points(a in interval_list(), b in interval_list(), ts in 0i64..1_100) {
        let both = intersect(&a, &b);
        let only = subtract(&a, &b);
        prop_assert!(is_coalesced(&only));
        prop_assert_eq!(covers(&both, ts), covers(&a, ts) && covers(&b, ts));
        prop_assert_eq!(covers(&only, ts), covers(&a, ts) && !covers(&b, ts));
    }

    #[test]
    fn double_inversion_is_identity(a in interval_list()) {
        prop_assert_eq!(invert(&invert(&a)), a);
    }

    #[test]
    fn join_order_is_deterministic(tables in 2usize..5, cross in any::<bool>()) {
        let mut compiler = SqlCompiler::default();
        let mut engine = MemoryEngine::new();
        for t in 0..tables {
            compiler.execute(&mut engine, &format!("create table t{} (x INT, y INT)", t)).unwrap();
        }
        let mut sql = String::from("select t0.x from t0");
        for t in 1..tables {
            if cross && t == 1 {
                sql.push_str(&format!(" cross join t{}", t));
            } else {
                sql.push_str(&format!(" join t{} on t{}.x = t{}.y", t, t, t - 1));
            }
        }
        let first = compiler.explain(&engine, &sql).unwrap();
        prop_assert_eq!(first, compiler.explain(&engine, &sql).unwrap());
    }
}
