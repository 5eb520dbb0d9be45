//! Minimum-heap measurement campaigns.
//!
//! A campaign pairs every config variant (a runtime plus modifiers) with
//! every configured benchmark and bisects for the smallest heap size at
//! which the benchmark still passes. Results are kept in a nested map that
//! is rewritten after each measurement, so an interrupted campaign resumes
//! where it stopped.

mod benchmark;
mod best;
mod campaign;
mod exec;
mod modifier;
mod oracle;
mod resolve;
mod runtime;
mod search;
mod store;
mod suite;

pub use benchmark::{Benchmark, Invocation};
pub use best::{benchmark_winners, select_best, win_counts, BestConfig};
pub use campaign::{run_campaign, CampaignSummary, ScratchDir};
pub use exec::{BenchmarkExecutor, ProcessExecutor, RunOutput};
pub use modifier::{Modifier, ModifierKind};
pub use oracle::{classify, BenchmarkOracle, HeapOracle, Outcome};
pub use resolve::{encode_variant, ConfigVariant, Registries, ResolvedConfig};
pub use runtime::{JikesRvm, NativeExecutable, OpenJdk, Runtime};
pub use search::{search_min_heap, MinHeap, MIN_HEAP_MB};
pub use store::{BenchmarkResults, ResultMap, ResultStore, SuiteResults};
pub use suite::{DaCapo, SpecJvm98, Suite};
