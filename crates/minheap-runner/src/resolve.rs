use crate::benchmark::Benchmark;
use crate::modifier::{self, Modifier, ModifierKind};
use crate::runtime::{self, Runtime};
use crate::suite::{self, Suite};
use minheap_config::{ComponentRegistry, ConfigDocument, ConfigError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const SUITES_KEY: &str = "suites";
pub const MODIFIERS_KEY: &str = "modifiers";
pub const RUNTIMES_KEY: &str = "runtimes";
pub const JVMS_KEY: &str = "jvms";
pub const BENCHMARKS_KEY: &str = "benchmarks";
pub const CONFIGS_KEY: &str = "configs";
pub const MAXHEAP_KEY: &str = "maxheap";

const VARIANT_SEPARATOR: char = '|';
const MAX_SET_DEPTH: usize = 16;

pub struct Registries {
    pub runtimes: ComponentRegistry<Arc<dyn Runtime>>,
    pub modifiers: ComponentRegistry<Modifier>,
    pub suites: ComponentRegistry<Arc<dyn Suite>>,
}

impl Registries {
    pub fn empty() -> Self {
        Self {
            runtimes: ComponentRegistry::new("runtime"),
            modifiers: ComponentRegistry::new("modifier"),
            suites: ComponentRegistry::new("suite"),
        }
    }

    pub fn builtin() -> Self {
        let mut registries = Self::empty();
        runtime::register_builtin(&mut registries.runtimes);
        modifier::register_builtin(&mut registries.modifiers);
        suite::register_builtin(&mut registries.suites);
        registries
    }
}

#[derive(Debug, Clone)]
pub struct ConfigVariant {
    pub encoded: String,
    pub runtime: Arc<dyn Runtime>,
    pub modifiers: Vec<Modifier>,
}

#[derive(Debug)]
pub struct ResolvedConfig {
    runtimes: BTreeMap<String, Arc<dyn Runtime>>,
    modifiers: BTreeMap<String, Modifier>,
    suites: BTreeMap<String, Arc<dyn Suite>>,
    benchmarks: Vec<(String, Vec<Benchmark>)>,
    configs: Vec<String>,
    maxheap: Option<u64>,
    rest: Map<String, Value>,
}

impl ResolvedConfig {
    /// Instantiates typed components, then expands benchmark names using the
    /// already-built suites.
    pub fn resolve(document: ConfigDocument, registries: &Registries) -> Result<Self, ConfigError> {
        let mut rest = document.into_items();

        let mut runtimes = BTreeMap::new();
        for key in [RUNTIMES_KEY, JVMS_KEY] {
            if let Some(section) = rest.remove(key) {
                for (name, runtime) in construct_section(key, &section, &registries.runtimes)? {
                    if runtimes.insert(name.clone(), runtime).is_some() {
                        return Err(ConfigError::invalid_field(
                            &name,
                            key,
                            "runtime defined under both runtimes and jvms",
                        ));
                    }
                }
            }
        }
        let modifiers = match rest.remove(MODIFIERS_KEY) {
            Some(section) => construct_section(MODIFIERS_KEY, &section, &registries.modifiers)?,
            None => BTreeMap::new(),
        };
        let suites = match rest.remove(SUITES_KEY) {
            Some(section) => construct_section(SUITES_KEY, &section, &registries.suites)?,
            None => BTreeMap::new(),
        };

        let benchmarks = match rest.remove(BENCHMARKS_KEY) {
            Some(section) => expand_benchmarks(&section, &suites)?,
            None => Vec::new(),
        };
        let configs = match rest.remove(CONFIGS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(|s| s.to_string()).ok_or_else(|| {
                        ConfigError::invalid_field(CONFIGS_KEY, CONFIGS_KEY, "entries must be strings")
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ConfigError::invalid_field(
                    CONFIGS_KEY,
                    CONFIGS_KEY,
                    "expected a sequence",
                ))
            }
        };
        let maxheap = match rest.remove(MAXHEAP_KEY) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                ConfigError::invalid_field(MAXHEAP_KEY, MAXHEAP_KEY, "expected a non-negative integer")
            })?),
        };

        debug!(
            runtimes = runtimes.len(),
            modifiers = modifiers.len(),
            suites = suites.len(),
            configs = configs.len(),
            "resolved config"
        );
        Ok(Self {
            runtimes,
            modifiers,
            suites,
            benchmarks,
            configs,
            maxheap,
            rest,
        })
    }

    pub fn runtime(&self, name: &str) -> Option<&Arc<dyn Runtime>> {
        self.runtimes.get(name)
    }

    pub fn runtimes(&self) -> &BTreeMap<String, Arc<dyn Runtime>> {
        &self.runtimes
    }

    pub fn modifier(&self, name: &str) -> Option<&Modifier> {
        self.modifiers.get(name)
    }

    pub fn suite(&self, name: &str) -> Option<&Arc<dyn Suite>> {
        self.suites.get(name)
    }

    pub fn suites(&self) -> &BTreeMap<String, Arc<dyn Suite>> {
        &self.suites
    }

    pub fn benchmarks(&self) -> &[(String, Vec<Benchmark>)] {
        &self.benchmarks
    }

    pub fn configs(&self) -> &[String] {
        &self.configs
    }

    pub fn maxheap(&self) -> Option<u64> {
        self.maxheap
    }

    /// Any top-level key that is not a component section.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.rest.get(key)
    }

    /// Parses a `runtime|modifier|...` string, expanding modifier sets.
    pub fn variant(&self, raw: &str) -> Result<ConfigVariant, ConfigError> {
        let mut parts = raw.split(VARIANT_SEPARATOR).map(|s| s.trim());
        let runtime_name = parts.next().unwrap_or_default();
        let runtime = self
            .runtimes
            .get(runtime_name)
            .ok_or_else(|| ConfigError::unknown_reference("runtime", runtime_name))?
            .clone();
        let mut modifiers = Vec::new();
        for name in parts.filter(|s| !s.is_empty()) {
            self.expand_modifier(name, 0, &mut modifiers)?;
        }
        Ok(ConfigVariant {
            encoded: encode_variant(raw),
            runtime,
            modifiers,
        })
    }

    pub fn variants(&self) -> Result<Vec<ConfigVariant>, ConfigError> {
        self.configs.iter().map(|c| self.variant(c)).collect()
    }

    fn expand_modifier(&self, name: &str, depth: usize, out: &mut Vec<Modifier>) -> Result<(), ConfigError> {
        if depth > MAX_SET_DEPTH {
            return Err(ConfigError::invalid_field(
                name,
                MODIFIERS_KEY,
                "modifier sets nest too deeply (cycle?)",
            ));
        }
        let modifier = self
            .modifiers
            .get(name)
            .ok_or_else(|| ConfigError::unknown_reference("modifier", name))?;
        match &modifier.kind {
            ModifierKind::Set(members) => {
                for member in members {
                    self.expand_modifier(member, depth + 1, out)?;
                }
            }
            _ => out.push(modifier.clone()),
        }
        Ok(())
    }
}

/// Stable result-map key for a config string: segments trimmed, empty
/// modifier segments dropped, joined by `|`.
pub fn encode_variant(raw: &str) -> String {
    let mut segments = raw.split(VARIANT_SEPARATOR).map(|s| s.trim());
    let mut encoded = segments.next().unwrap_or_default().to_string();
    for segment in segments.filter(|s| !s.is_empty()) {
        encoded.push(VARIANT_SEPARATOR);
        encoded.push_str(segment);
    }
    encoded
}

fn construct_section<T>(
    key: &str,
    section: &Value,
    registry: &ComponentRegistry<T>,
) -> Result<BTreeMap<String, T>, ConfigError> {
    let entries = match section {
        Value::Object(map) => map,
        Value::Null => return Ok(BTreeMap::new()),
        _ => return Err(ConfigError::invalid_field(key, key, "expected a mapping")),
    };
    let mut built = BTreeMap::new();
    for (name, value) in entries {
        built.insert(name.clone(), registry.construct_value(name, value)?);
    }
    Ok(built)
}

fn expand_benchmarks(
    section: &Value,
    suites: &BTreeMap<String, Arc<dyn Suite>>,
) -> Result<Vec<(String, Vec<Benchmark>)>, ConfigError> {
    let entries = match section {
        Value::Object(map) => map,
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(ConfigError::invalid_field(
                BENCHMARKS_KEY,
                BENCHMARKS_KEY,
                "expected a mapping of suite name to benchmark names",
            ))
        }
    };
    let mut expanded = Vec::new();
    for (suite_name, names) in entries {
        let suite = suites
            .get(suite_name)
            .ok_or_else(|| ConfigError::unknown_reference("suite", suite_name))?;
        let names: &[Value] = match names {
            Value::Array(items) => items.as_slice(),
            Value::Null => &[],
            _ => {
                return Err(ConfigError::invalid_field(
                    suite_name,
                    BENCHMARKS_KEY,
                    "expected a sequence of benchmark names",
                ))
            }
        };
        let mut bms = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_str().ok_or_else(|| {
                ConfigError::invalid_field(suite_name, BENCHMARKS_KEY, "benchmark names must be strings")
            })?;
            bms.push(suite.get_benchmark(name)?);
        }
        expanded.push((suite_name.clone(), bms));
    }
    Ok(expanded)
}
