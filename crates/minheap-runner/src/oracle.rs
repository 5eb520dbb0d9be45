use crate::benchmark::Benchmark;
use crate::exec::{BenchmarkExecutor, RunOutput};
use crate::runtime::Runtime;
use crate::suite::Suite;
use anyhow::{anyhow, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Oom,
    /// Any other failure, including a timeout.
    Fail,
}

impl Outcome {
    pub fn marker(self) -> &'static str {
        match self {
            Outcome::Pass => " o ",
            Outcome::Oom => " x ",
            Outcome::Fail => " ? ",
        }
    }
}

/// Answers whether a benchmark runs at a given heap size.
pub trait HeapOracle {
    fn probe(&mut self, heap_mb: u64) -> Result<Outcome>;
}

impl<F> HeapOracle for F
where
    F: FnMut(u64) -> Result<Outcome>,
{
    fn probe(&mut self, heap_mb: u64) -> Result<Outcome> {
        self(heap_mb)
    }
}

pub fn classify(suite: &dyn Suite, run: &RunOutput) -> Outcome {
    if run.timed_out {
        Outcome::Fail
    } else if suite.is_passed(&run.output) {
        Outcome::Pass
    } else if suite.is_oom(&run.output) {
        Outcome::Oom
    } else {
        Outcome::Fail
    }
}

pub struct BenchmarkOracle<'a> {
    executor: &'a mut dyn BenchmarkExecutor,
    suite: &'a dyn Suite,
    runtime: &'a dyn Runtime,
    benchmark: &'a Benchmark,
    cwd: &'a Path,
}

impl<'a> BenchmarkOracle<'a> {
    pub fn new(
        executor: &'a mut dyn BenchmarkExecutor,
        suite: &'a dyn Suite,
        runtime: &'a dyn Runtime,
        benchmark: &'a Benchmark,
        cwd: &'a Path,
    ) -> Self {
        Self {
            executor,
            suite,
            runtime,
            benchmark,
            cwd,
        }
    }
}

impl HeapOracle for BenchmarkOracle<'_> {
    fn probe(&mut self, heap_mb: u64) -> Result<Outcome> {
        let heapsize = self.runtime.heapsize_modifier(heap_mb).ok_or_else(|| {
            anyhow!("runtime {} does not accept a heap size", self.runtime.name())
        })?;
        let sized = self.benchmark.attach_modifiers(&[heapsize]);
        let timeout = self.suite.timeout(self.benchmark.name());
        let run = self.executor.run(self.runtime, &sized, timeout, self.cwd)?;
        Ok(classify(self.suite, &run))
    }
}
