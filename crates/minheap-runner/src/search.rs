use crate::oracle::{HeapOracle, Outcome};
use anyhow::Result;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::io::Write;

pub const MIN_HEAP_MB: u64 = 2;

/// Orders every measured size below `AllFailed`. Persisted as an integer, or
/// as `.inf` when nothing below the ceiling passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MinHeap {
    Size(u64),
    AllFailed,
}

impl MinHeap {
    pub fn size(self) -> Option<u64> {
        match self {
            MinHeap::Size(mb) => Some(mb),
            MinHeap::AllFailed => None,
        }
    }
}

impl fmt::Display for MinHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinHeap::Size(mb) => write!(f, "{}", mb),
            MinHeap::AllFailed => write!(f, "inf"),
        }
    }
}

impl Serialize for MinHeap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MinHeap::Size(mb) => serializer.serialize_u64(*mb),
            MinHeap::AllFailed => serializer.serialize_f64(f64::INFINITY),
        }
    }
}

struct MinHeapVisitor;

impl<'de> Visitor<'de> for MinHeapVisitor {
    type Value = MinHeap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a heap size in MB or .inf")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<MinHeap, E> {
        if v == 0 {
            return Err(E::custom("heap size must be positive"));
        }
        Ok(MinHeap::Size(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<MinHeap, E> {
        let v = u64::try_from(v).map_err(|_| E::custom(format!("negative heap size {}", v)))?;
        self.visit_u64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<MinHeap, E> {
        if v == f64::INFINITY {
            Ok(MinHeap::AllFailed)
        } else if v.is_finite() && v >= 1.0 && v < u64::MAX as f64 && v.fract() == 0.0 {
            Ok(MinHeap::Size(v as u64))
        } else {
            Err(E::custom(format!("invalid heap size {}", v)))
        }
    }
}

impl<'de> Deserialize<'de> for MinHeap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MinHeapVisitor)
    }
}

/// Bisects `[MIN_HEAP_MB, ceiling]` for the smallest heap at which the
/// oracle passes.
///
/// Assumes success is monotone in heap size. Failure at `lo` and success at
/// `hi` hold on every iteration; the ceiling itself is never probed.
pub fn search_min_heap(
    oracle: &mut dyn HeapOracle,
    ceiling: u64,
    progress: &mut dyn Write,
) -> Result<MinHeap> {
    let mut lo = MIN_HEAP_MB;
    let mut hi = ceiling;
    let mut best = MinHeap::AllFailed;
    while hi > lo && hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        write!(progress, "{}M", mid)?;
        progress.flush()?;
        let outcome = oracle.probe(mid)?;
        write!(progress, "{}", outcome.marker())?;
        progress.flush()?;
        if outcome == Outcome::Pass {
            best = MinHeap::Size(mid);
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold_oracle(threshold: u64, calls: &mut Vec<u64>) -> impl FnMut(u64) -> Result<Outcome> + '_ {
        move |heap| {
            calls.push(heap);
            Ok(if heap >= threshold {
                Outcome::Pass
            } else {
                Outcome::Oom
            })
        }
    }

    #[test]
    fn finds_threshold_within_log_calls() {
        let mut calls = Vec::new();
        let mut progress = Vec::new();
        let result = search_min_heap(&mut threshold_oracle(10, &mut calls), 64, &mut progress)
            .expect("search");
        assert_eq!(result, MinHeap::Size(10));
        assert_eq!(calls, vec![33, 17, 9, 13, 11, 10]);
        assert_eq!(
            String::from_utf8(progress).expect("utf8"),
            "33M o 17M o 9M x 13M o 11M o 10M o "
        );
    }

    #[test]
    fn call_count_is_logarithmic_for_every_threshold() {
        for ceiling in [4u64, 5, 64, 100, 1000, 4096] {
            let bound = (ceiling as f64).log2().ceil() as usize;
            for threshold in 1..=ceiling + 1 {
                let mut calls = Vec::new();
                let result = search_min_heap(
                    &mut threshold_oracle(threshold, &mut calls),
                    ceiling,
                    &mut std::io::sink(),
                )
                .expect("search");
                assert!(calls.len() <= bound, "ceiling {} threshold {}: {:?}", ceiling, threshold, calls);
                match result {
                    MinHeap::Size(mb) => {
                        assert_eq!(mb, threshold.max(MIN_HEAP_MB + 1));
                    }
                    MinHeap::AllFailed => assert!(threshold >= ceiling - 1 || ceiling - MIN_HEAP_MB <= 1),
                }
            }
        }
    }

    #[test]
    fn all_failures_yield_all_failed() {
        let mut oracle = |_heap: u64| -> Result<Outcome> { Ok(Outcome::Fail) };
        let result = search_min_heap(&mut oracle, 256, &mut std::io::sink()).expect("search");
        assert_eq!(result, MinHeap::AllFailed);
    }

    #[test]
    fn tiny_ceiling_probes_nothing() {
        let mut calls = Vec::new();
        let result = search_min_heap(&mut threshold_oracle(1, &mut calls), 3, &mut std::io::sink())
            .expect("search");
        assert_eq!(result, MinHeap::AllFailed);
        assert!(calls.is_empty());
    }

    #[test]
    fn oracle_errors_propagate() {
        let mut oracle = |_heap: u64| -> Result<Outcome> { Err(anyhow::anyhow!("spawn failed")) };
        assert!(search_min_heap(&mut oracle, 64, &mut std::io::sink()).is_err());
    }

    #[test]
    fn min_heap_orders_sizes_below_all_failed() {
        assert!(MinHeap::Size(1000) < MinHeap::AllFailed);
        assert!(MinHeap::Size(10) < MinHeap::Size(11));
        assert_eq!(MinHeap::AllFailed.to_string(), "inf");
    }

    #[test]
    fn min_heap_yaml_uses_inf_sentinel() {
        let yaml = serde_yaml::to_string(&vec![MinHeap::Size(42), MinHeap::AllFailed]).expect("yaml");
        assert!(yaml.contains(".inf"), "unexpected yaml: {}", yaml);
        let back: Vec<MinHeap> = serde_yaml::from_str(&yaml).expect("parse");
        assert_eq!(back, vec![MinHeap::Size(42), MinHeap::AllFailed]);
        let float: MinHeap = serde_yaml::from_str("17.0").expect("float");
        assert_eq!(float, MinHeap::Size(17));
        assert!(serde_yaml::from_str::<MinHeap>("-3").is_err());
    }

    #[test]
    fn min_heap_rejects_zero_and_out_of_range_sizes() {
        for raw in ["0", "0.0", "1.5", "1.0e+30", "-.inf", ".nan"] {
            assert!(serde_yaml::from_str::<MinHeap>(raw).is_err(), "accepted {}", raw);
        }
    }
}
