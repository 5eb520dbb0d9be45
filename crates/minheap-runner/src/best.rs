use crate::search::MinHeap;
use crate::store::{ResultMap, SuiteResults};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct BestConfig {
    pub config: String,
    pub wins: usize,
    /// The winner's full results, ready to paste into a config file.
    pub fragment: SuiteResults,
}

/// For each (suite, benchmark), the config with the strictly smallest
/// measured heap. Configs are visited in map order, so the first one wins a
/// tie. Benchmarks that failed everywhere have no winner.
pub fn benchmark_winners(results: &ResultMap) -> BTreeMap<(String, String), (String, MinHeap)> {
    let mut winners: BTreeMap<(String, String), (String, MinHeap)> = BTreeMap::new();
    for (config, suites) in results {
        for (suite, benchmarks) in suites {
            for (benchmark, heap) in benchmarks {
                let current = winners
                    .get(&(suite.clone(), benchmark.clone()))
                    .map(|(_, h)| *h)
                    .unwrap_or(MinHeap::AllFailed);
                if *heap < current {
                    winners.insert((suite.clone(), benchmark.clone()), (config.clone(), *heap));
                }
            }
        }
    }
    winners
}

pub fn win_counts(results: &ResultMap) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for (config, _) in benchmark_winners(results).into_values() {
        *counts.entry(config).or_insert(0) += 1;
    }
    counts
}

/// Picks the config with the most wins; equal counts go to the
/// lexicographically smallest config. `None` when nothing passed anywhere.
pub fn select_best(results: &ResultMap) -> Option<BestConfig> {
    let mut best: Option<(String, usize)> = None;
    for (config, wins) in win_counts(results) {
        if best.as_ref().map_or(true, |(_, w)| wins > *w) {
            best = Some((config, wins));
        }
    }
    let (config, wins) = best?;
    let fragment = results.get(&config).cloned().unwrap_or_default();
    Some(BestConfig {
        config,
        wins,
        fragment,
    })
}
