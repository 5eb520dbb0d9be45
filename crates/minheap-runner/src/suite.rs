use crate::benchmark::Benchmark;
use minheap_config::{ComponentRegistry, ComponentSpec, ConfigError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const OOM_MARKER: &str = "OutOfMemoryError";

/// A benchmark suite: knows how to launch its benchmarks and how to read
/// their output.
pub trait Suite: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn get_benchmark(&self, bm_name: &str) -> Result<Benchmark, ConfigError>;

    fn timeout(&self, bm_name: &str) -> Option<Duration>;

    fn is_passed(&self, output: &str) -> bool;

    fn is_oom(&self, output: &str) -> bool {
        output.contains(OOM_MARKER)
    }
}

pub fn register_builtin(registry: &mut ComponentRegistry<Arc<dyn Suite>>) {
    registry.register("DaCapo", dacapo);
    registry.register("SPECjvm98", spec_jvm98);
}

fn dacapo(spec: &ComponentSpec<'_>) -> Result<Arc<dyn Suite>, ConfigError> {
    Ok(Arc::new(DaCapo::from_spec(spec)?))
}

fn spec_jvm98(spec: &ComponentSpec<'_>) -> Result<Arc<dyn Suite>, ConfigError> {
    Ok(Arc::new(SpecJvm98::from_spec(spec)?))
}

fn timing_iteration(spec: &ComponentSpec<'_>) -> Result<u64, ConfigError> {
    match spec.optional_u64("timing_iteration")? {
        Some(0) => Err(ConfigError::invalid_field(
            spec.name(),
            "timing_iteration",
            "must be at least 1",
        )),
        Some(n) => Ok(n),
        None => Ok(1),
    }
}

fn check_bm_name(suite: &str, bm_name: &str) -> Result<(), ConfigError> {
    if bm_name.is_empty() || bm_name.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid_field(
            suite,
            "benchmarks",
            format!("'{}' is not a valid benchmark name", bm_name),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DaCapo {
    name: String,
    release: String,
    path: String,
    timing_iteration: u64,
    callback: Option<String>,
    timeout: Option<Duration>,
}

impl DaCapo {
    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            name: spec.name().to_string(),
            release: spec.required_str("release")?,
            path: spec.required_str("path")?,
            timing_iteration: timing_iteration(spec)?,
            callback: spec.optional_str("callback")?,
            timeout: spec.optional_u64("timeout")?.map(Duration::from_secs),
        })
    }

    pub fn release(&self) -> &str {
        &self.release
    }
}

impl Suite for DaCapo {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_benchmark(&self, bm_name: &str) -> Result<Benchmark, ConfigError> {
        check_bm_name(&self.name, bm_name)?;
        let mut program = vec!["-jar".to_string(), self.path.clone()];
        if let Some(callback) = &self.callback {
            program.push("-c".to_string());
            program.push(callback.clone());
        }
        program.push("-n".to_string());
        program.push(self.timing_iteration.to_string());
        Ok(Benchmark::new(&self.name, bm_name, program).with_trailing(vec![bm_name.to_string()]))
    }

    fn timeout(&self, _bm_name: &str) -> Option<Duration> {
        self.timeout
    }

    fn is_passed(&self, output: &str) -> bool {
        output.contains("PASSED in ")
    }
}

#[derive(Debug, Clone)]
pub struct SpecJvm98 {
    name: String,
    path: String,
    timing_iteration: u64,
    timeout: Option<Duration>,
}

impl SpecJvm98 {
    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            name: spec.name().to_string(),
            path: spec.required_str("path")?,
            timing_iteration: timing_iteration(spec)?,
            timeout: spec.optional_u64("timeout")?.map(Duration::from_secs),
        })
    }
}

impl Suite for SpecJvm98 {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_benchmark(&self, bm_name: &str) -> Result<Benchmark, ConfigError> {
        check_bm_name(&self.name, bm_name)?;
        let program = vec![
            "SpecApplication".to_string(),
            format!("-i{}", self.timing_iteration),
        ];
        Ok(Benchmark::new(&self.name, bm_name, program)
            .with_classpath(vec![self.path.clone()])
            .with_trailing(vec![format!("_{}", bm_name)]))
    }

    fn timeout(&self, _bm_name: &str) -> Option<Duration> {
        self.timeout
    }

    fn is_passed(&self, output: &str) -> bool {
        output.contains("Finished in") && !output.contains("**NOT VALID**")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ComponentRegistry<Arc<dyn Suite>> {
        let mut registry = ComponentRegistry::new("suite");
        register_builtin(&mut registry);
        registry
    }

    #[test]
    fn dacapo_builds_jar_invocation() {
        let suite = registry()
            .construct_value(
                "dacapo-chopin",
                &json!({"type": "DaCapo", "release": "23.11", "path": "/dacapo.jar", "timing_iteration": 3, "timeout": 120}),
            )
            .expect("dacapo");
        let bm = suite.get_benchmark("fop").expect("fop");
        assert_eq!(bm.suite_name(), "dacapo-chopin");
        assert_eq!(bm.name(), "fop");
        assert_eq!(suite.timeout("fop"), Some(Duration::from_secs(120)));
        assert!(suite.is_passed("===== DaCapo 23.11 fop PASSED in 812 msec ====="));
        assert!(!suite.is_passed("===== DaCapo 23.11 fop FAILED ====="));
        assert!(suite.is_oom("java.lang.OutOfMemoryError: Java heap space"));
        assert!(suite.get_benchmark("two words").is_err());
    }

    #[test]
    fn dacapo_rejects_zero_iterations() {
        let err = registry()
            .construct_value(
                "d",
                &json!({"type": "DaCapo", "release": "9.12", "path": "/d.jar", "timing_iteration": 0}),
            )
            .expect_err("zero iterations");
        assert!(matches!(err, ConfigError::InvalidField { .. }));
    }

    #[test]
    fn spec_jvm98_validity_marker() {
        let suite = registry()
            .construct_value("jvm98", &json!({"type": "SPECjvm98", "path": "/spec"}))
            .expect("jvm98");
        assert_eq!(suite.timeout("db"), None);
        assert!(suite.is_passed("======= _209_db Finished in 3.1 secs"));
        assert!(!suite.is_passed("**NOT VALID** _209_db Finished in 3.1 secs"));
    }
}
