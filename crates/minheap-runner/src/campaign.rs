use crate::exec::BenchmarkExecutor;
use crate::oracle::BenchmarkOracle;
use crate::resolve::{ResolvedConfig, MAXHEAP_KEY};
use crate::search::{search_min_heap, MIN_HEAP_MB};
use crate::store::ResultStore;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create() -> Result<Self> {
        let path = std::env::temp_dir().join(format!(
            "minheap-{}-{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&path)
            .map_err(|e| anyhow!("failed to create {}: {}", path.display(), e))?;
        info!("Temporary directory: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignSummary {
    pub measured: usize,
    pub skipped_existing: usize,
    /// Config variants whose runtime takes no heap size.
    pub skipped_configs: usize,
}

/// Measures the minimum heap of every benchmark under every config variant
/// not already present in `store`, flushing after each measurement.
///
/// Every variant is parsed before the first benchmark runs, so a bad
/// `configs` entry fails the campaign without side effects.
pub fn run_campaign(
    config: &ResolvedConfig,
    store: &mut ResultStore,
    executor: &mut dyn BenchmarkExecutor,
    progress: &mut dyn Write,
) -> Result<CampaignSummary> {
    let maxheap = config
        .maxheap()
        .ok_or_else(|| anyhow!("config does not set `{}`", MAXHEAP_KEY))?;
    let variants = config.variants()?;
    let scratch = ScratchDir::create()?;
    let mut summary = CampaignSummary::default();

    for variant in &variants {
        store.ensure_config(&variant.encoded);
        writeln!(progress, "{} ", variant.encoded)?;
        if variant.runtime.heapsize_modifier(MIN_HEAP_MB).is_none() {
            warn!(
                config = %variant.encoded,
                runtime = variant.runtime.name(),
                "runtime takes no heap size, skipping config"
            );
            summary.skipped_configs += 1;
            continue;
        }

        for (suite_name, benchmarks) in config.benchmarks() {
            let suite = config
                .suite(suite_name)
                .ok_or_else(|| anyhow!("benchmarks reference unknown suite {}", suite_name))?;
            store.ensure_suite(&variant.encoded, suite_name);
            for benchmark in benchmarks {
                if store.contains(&variant.encoded, suite_name, benchmark.name()) {
                    debug!(
                        config = %variant.encoded,
                        suite = %suite_name,
                        benchmark = benchmark.name(),
                        "already measured"
                    );
                    summary.skipped_existing += 1;
                    continue;
                }
                write!(progress, "\t {}-{} ", suite_name, benchmark.name())?;
                progress.flush()?;

                let configured = benchmark.attach_modifiers(&variant.modifiers);
                let mut oracle = BenchmarkOracle::new(
                    &mut *executor,
                    suite.as_ref(),
                    variant.runtime.as_ref(),
                    &configured,
                    scratch.path(),
                );
                let minheap = search_min_heap(&mut oracle, maxheap, progress)?;
                writeln!(progress, "minheap {}", minheap)?;

                store.record(&variant.encoded, suite_name, benchmark.name(), minheap);
                store.flush()?;
                summary.measured += 1;
            }
        }
    }
    info!(
        measured = summary.measured,
        skipped_existing = summary.skipped_existing,
        skipped_configs = summary.skipped_configs,
        "campaign finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::Benchmark;
    use crate::exec::RunOutput;
    use crate::resolve::Registries;
    use crate::runtime::Runtime;
    use crate::search::MinHeap;
    use minheap_config::ConfigDocument;
    use std::time::Duration;

    /// Passes whenever `-Xmx` is at least `threshold` MB.
    struct ThresholdExecutor {
        threshold: u64,
        cwds: Vec<PathBuf>,
    }

    impl BenchmarkExecutor for ThresholdExecutor {
        fn run(
            &mut self,
            runtime: &dyn Runtime,
            benchmark: &Benchmark,
            _timeout: Option<Duration>,
            cwd: &Path,
        ) -> Result<RunOutput> {
            self.cwds.push(cwd.to_path_buf());
            let invocation = benchmark.invocation(runtime)?;
            let heap: u64 = invocation
                .args
                .iter()
                .find_map(|a| a.strip_prefix("-Xmx")?.strip_suffix('M')?.parse().ok())
                .expect("heap flag");
            let output = if heap >= self.threshold {
                "===== DaCapo fop PASSED in 100 msec ====="
            } else {
                "java.lang.OutOfMemoryError: Java heap space"
            };
            Ok(RunOutput {
                output: output.to_string(),
                exit_code: Some(0),
                timed_out: false,
            })
        }
    }

    fn resolved(yaml: &str) -> ResolvedConfig {
        let doc = ConfigDocument::from_yaml_str(yaml).expect("yaml");
        ResolvedConfig::resolve(doc, &Registries::builtin()).expect("resolve")
    }

    const BASE: &str = r#"
runtimes:
  jdk11:
    type: OpenJDK
    release: 11
    home: /nonexistent/jdk11
suites:
  dacapo:
    type: DaCapo
    release: "9.12"
    path: /nonexistent/dacapo.jar
benchmarks:
  dacapo: [fop]
configs:
  - "jdk11"
"#;

    #[test]
    fn missing_maxheap_is_an_error() {
        let config = resolved(BASE);
        let mut store = ResultStore::default();
        let mut executor = ThresholdExecutor {
            threshold: 10,
            cwds: Vec::new(),
        };
        let err = run_campaign(&config, &mut store, &mut executor, &mut std::io::sink())
            .expect_err("no maxheap");
        assert!(err.to_string().contains("maxheap"));
        assert!(executor.cwds.is_empty());
    }

    #[test]
    fn unknown_config_reference_fails_before_any_run() {
        let config = resolved(&format!("{}  - \"jdk11|nope\"\nmaxheap: 64\n", BASE));
        let mut store = ResultStore::default();
        let mut executor = ThresholdExecutor {
            threshold: 10,
            cwds: Vec::new(),
        };
        assert!(run_campaign(&config, &mut store, &mut executor, &mut std::io::sink()).is_err());
        assert!(executor.cwds.is_empty());
        assert!(store.results().is_empty());
    }

    #[test]
    fn progress_lines_and_scratch_dir() {
        let config = resolved(&format!("{}maxheap: 64\n", BASE));
        let mut store = ResultStore::default();
        let mut executor = ThresholdExecutor {
            threshold: 10,
            cwds: Vec::new(),
        };
        let mut progress = Vec::new();
        let summary = run_campaign(&config, &mut store, &mut executor, &mut progress).expect("run");

        assert_eq!(summary.measured, 1);
        assert_eq!(store.get("jdk11", "dacapo", "fop"), Some(MinHeap::Size(10)));
        assert_eq!(
            String::from_utf8(progress).expect("utf8"),
            "jdk11 \n\t dacapo-fop 33M o 17M o 9M x 13M o 11M o 10M o minheap 10\n"
        );
        let scratch = &executor.cwds[0];
        assert!(executor.cwds.iter().all(|c| c == scratch));
        assert!(!scratch.exists(), "scratch dir should be removed");
    }
}
