use crate::search::MinHeap;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub type BenchmarkResults = BTreeMap<String, MinHeap>;
pub type SuiteResults = BTreeMap<String, BenchmarkResults>;
// config -> suite -> benchmark -> min heap
pub type ResultMap = BTreeMap<String, SuiteResults>;

#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    results: ResultMap,
    path: Option<PathBuf>,
}

impl ResultStore {
    /// Loads `path` as the resumption point; every flush rewrites it.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            results: read_results(path)?,
            path: Some(path.to_path_buf()),
        })
    }

    /// Loads `path` if present but never writes it back.
    pub fn open_dry_run(path: &Path) -> Result<Self> {
        Ok(Self {
            results: read_results(path)?,
            path: None,
        })
    }

    pub fn in_memory(results: ResultMap) -> Self {
        Self {
            results,
            path: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn results(&self) -> &ResultMap {
        &self.results
    }

    pub fn into_results(self) -> ResultMap {
        self.results
    }

    pub fn get(&self, config: &str, suite: &str, benchmark: &str) -> Option<MinHeap> {
        self.results
            .get(config)
            .and_then(|suites| suites.get(suite))
            .and_then(|bms| bms.get(benchmark))
            .copied()
    }

    pub fn contains(&self, config: &str, suite: &str, benchmark: &str) -> bool {
        self.get(config, suite, benchmark).is_some()
    }

    pub fn ensure_config(&mut self, config: &str) {
        self.results.entry(config.to_string()).or_default();
    }

    pub fn ensure_suite(&mut self, config: &str, suite: &str) {
        self.results
            .entry(config.to_string())
            .or_default()
            .entry(suite.to_string())
            .or_default();
    }

    pub fn record(&mut self, config: &str, suite: &str, benchmark: &str, minheap: MinHeap) {
        self.results
            .entry(config.to_string())
            .or_default()
            .entry(suite.to_string())
            .or_default()
            .insert(benchmark.to_string(), minheap);
    }

    /// No-op for dry-run and in-memory stores.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&self.results)?;
        atomic_write_bytes(path, yaml.as_bytes())
            .map_err(|e| anyhow!("failed to write results to {}: {}", path.display(), e))?;
        debug!(path = %path.display(), "flushed results");
        Ok(())
    }
}

fn read_results(path: &Path) -> Result<ResultMap> {
    if !path.exists() {
        info!("No existing results at {}, starting fresh", path.display());
        return Ok(ResultMap::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(ResultMap::new());
    }
    let parsed: Option<ResultMap> = serde_yaml::from_str(&raw)
        .map_err(|e| anyhow!("invalid result file {}: {}", path.display(), e))?;
    let results = parsed.unwrap_or_default();
    info!(
        "Resuming from {} ({} configs)",
        path.display(),
        results.len()
    );
    Ok(results)
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    replace_file(&tmp, path, bytes)
}

// `path` is only ever touched by the final rename.
fn replace_file(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let written = write_synced(tmp, bytes).and_then(|_| fs::rename(tmp, path));
    if let Err(e) = written {
        let _ = fs::remove_file(tmp);
        return Err(e.into());
    }
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
