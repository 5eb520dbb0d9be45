use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const INCLUDES_KEY: &str = "includes";
pub const OVERRIDES_KEY: &str = "overrides";

/// An ordered, nested key/value tree loaded from a campaign config file.
///
/// A `ConfigDocument` never carries the reserved `includes` / `overrides`
/// keys; those are consumed by [`ConfigDocument::load`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    items: Map<String, Value>,
}

#[derive(Debug, Clone, Copy)]
struct Segment<'a> {
    raw: &'a str,
    index: Option<usize>,
}

impl ConfigDocument {
    pub fn new(items: Map<String, Value>) -> Result<Self, ConfigError> {
        for key in [INCLUDES_KEY, OVERRIDES_KEY] {
            if items.contains_key(key) {
                return Err(ConfigError::Reserved(key.to_string()));
            }
        }
        Ok(Self { items })
    }

    /// Builds a document from an in-memory YAML string. Includes are not
    /// followed, so reserved keys are rejected.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::new(parse_mapping(Path::new("<inline>"), raw)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn items(&self) -> &Map<String, Value> {
        &self.items
    }

    pub fn into_items(self) -> Map<String, Value> {
        self.items
    }

    /// Loads the document at `path`, following `includes` recursively and
    /// applying `overrides` to the combined includes before the remainder of
    /// the file is layered on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut stack = Vec::new();
        load_with_stack(path, &mut stack)
    }

    /// Reads the value addressed by a dotted selector such as `suites.dacapo.path`
    /// or `configs.0`.
    pub fn select(&self, selector: &str) -> Result<&Value, ConfigError> {
        let segments = parse_selector(selector)?;
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| ConfigError::selector(selector, "empty selector"))?;
        let mut current = self
            .items
            .get(first.raw)
            .ok_or_else(|| ConfigError::selector(selector, missing(first)))?;
        for segment in rest {
            current = step(current, *segment, selector)?;
        }
        Ok(current)
    }

    /// Assigns `new_value` at `selector`. Every segment but the last must
    /// already exist; the last one may add a new mapping key but must address
    /// an existing index when the parent is a sequence.
    pub fn apply_override(&mut self, selector: &str, new_value: Value) -> Result<(), ConfigError> {
        let segments = parse_selector(selector)?;
        let mut root = Value::Object(std::mem::take(&mut self.items));
        let result = assign(&mut root, &segments, selector, new_value);
        if let Value::Object(map) = root {
            self.items = map;
        }
        if result.is_ok() {
            debug!(selector, "applied config override");
        }
        result
    }

    /// Top-level sequences are concatenated and top-level mappings are
    /// updated one level deep. Any other collision takes `other`'s value.
    pub fn combine(&self, other: &ConfigDocument) -> ConfigDocument {
        let mut items = self.items.clone();
        for (key, value) in &other.items {
            let merged = match (items.get_mut(key), value) {
                (Some(Value::Array(existing)), Value::Array(extra)) => {
                    existing.extend(extra.iter().cloned());
                    true
                }
                (Some(Value::Object(existing)), Value::Object(extra)) => {
                    for (k, v) in extra {
                        existing.insert(k.clone(), v.clone());
                    }
                    true
                }
                _ => false,
            };
            if !merged {
                items.insert(key.clone(), value.clone());
            }
        }
        ConfigDocument { items }
    }
}

fn load_with_stack(path: &Path, stack: &mut Vec<PathBuf>) -> Result<ConfigDocument, ConfigError> {
    info!("Loading config {}", path.display());
    let canonical = path
        .canonicalize()
        .map_err(|e| ConfigError::load(path, e))?;
    if stack.contains(&canonical) {
        return Err(ConfigError::load(path, "include cycle detected"));
    }
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::load(path, e))?;
    let items = parse_mapping(path, &raw)?;

    let mut includes = None;
    let mut overrides = None;
    let mut rest = Map::new();
    for (key, value) in items {
        match key.as_str() {
            INCLUDES_KEY => includes = Some(value),
            OVERRIDES_KEY => overrides = Some(value),
            _ => {
                rest.insert(key, value);
            }
        }
    }
    let own = ConfigDocument { items: rest };

    let Some(includes) = includes else {
        if overrides.is_some() {
            return Err(ConfigError::load(path, "overrides declared without includes"));
        }
        return Ok(own);
    };
    let include_paths = includes
        .as_array()
        .ok_or_else(|| ConfigError::load(path, "includes must be a sequence of paths"))?;

    let dir = path.parent().unwrap_or(Path::new("."));
    stack.push(canonical);
    let mut base = ConfigDocument::default();
    for (idx, include) in include_paths.iter().enumerate() {
        let rel = include
            .as_str()
            .ok_or_else(|| ConfigError::load(path, format!("includes[{}] is not a string", idx)))?;
        let included = load_with_stack(&dir.join(rel), stack)?;
        base = if idx == 0 {
            included
        } else {
            base.combine(&included)
        };
    }
    stack.pop();

    if let Some(overrides) = overrides {
        let overrides = match overrides {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(ConfigError::load(path, "overrides must be a mapping")),
        };
        for (selector, new_value) in overrides {
            base.apply_override(&selector, new_value)?;
        }
    }
    Ok(base.combine(&own))
}

fn parse_mapping(path: &Path, raw: &str) -> Result<Map<String, Value>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| ConfigError::load(path, e))?;
    let json_value: Value =
        serde_json::to_value(yaml_value).map_err(|e| ConfigError::load(path, e))?;
    match json_value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ConfigError::load(path, "top level of a config must be a mapping")),
    }
}

fn parse_selector(selector: &str) -> Result<Vec<Segment<'_>>, ConfigError> {
    if selector.is_empty() {
        return Err(ConfigError::selector(selector, "empty selector"));
    }
    selector
        .split('.')
        .map(|raw| {
            if raw.is_empty() {
                return Err(ConfigError::selector(selector, "empty path segment"));
            }
            let index = if raw.bytes().all(|b| b.is_ascii_digit()) {
                Some(raw.parse::<usize>().map_err(|e| ConfigError::selector(selector, e))?)
            } else {
                None
            };
            Ok(Segment { raw, index })
        })
        .collect()
}

fn missing(segment: &Segment<'_>) -> String {
    format!("segment '{}' does not exist", segment.raw)
}

fn step<'v>(current: &'v Value, segment: Segment<'_>, selector: &str) -> Result<&'v Value, ConfigError> {
    match current {
        Value::Object(map) => map
            .get(segment.raw)
            .ok_or_else(|| ConfigError::selector(selector, missing(&segment))),
        Value::Array(arr) => {
            let idx = segment.index.ok_or_else(|| {
                ConfigError::selector(selector, format!("'{}' cannot index a sequence", segment.raw))
            })?;
            arr.get(idx).ok_or_else(|| {
                ConfigError::selector(selector, format!("index {} out of range (len {})", idx, arr.len()))
            })
        }
        _ => Err(ConfigError::selector(
            selector,
            format!("cannot descend into a scalar at '{}'", segment.raw),
        )),
    }
}

fn step_mut<'v>(
    current: &'v mut Value,
    segment: Segment<'_>,
    selector: &str,
) -> Result<&'v mut Value, ConfigError> {
    match current {
        Value::Object(map) => map
            .get_mut(segment.raw)
            .ok_or_else(|| ConfigError::selector(selector, missing(&segment))),
        Value::Array(arr) => {
            let len = arr.len();
            let idx = segment.index.ok_or_else(|| {
                ConfigError::selector(selector, format!("'{}' cannot index a sequence", segment.raw))
            })?;
            arr.get_mut(idx).ok_or_else(|| {
                ConfigError::selector(selector, format!("index {} out of range (len {})", idx, len))
            })
        }
        _ => Err(ConfigError::selector(
            selector,
            format!("cannot descend into a scalar at '{}'", segment.raw),
        )),
    }
}

fn assign(
    root: &mut Value,
    segments: &[Segment<'_>],
    selector: &str,
    new_value: Value,
) -> Result<(), ConfigError> {
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| ConfigError::selector(selector, "empty selector"))?;
    let mut current = root;
    for segment in parents {
        current = step_mut(current, *segment, selector)?;
    }
    match current {
        Value::Object(map) => {
            map.insert(last.raw.to_string(), new_value);
            Ok(())
        }
        Value::Array(arr) => {
            let len = arr.len();
            let idx = last.index.ok_or_else(|| {
                ConfigError::selector(selector, format!("'{}' cannot index a sequence", last.raw))
            })?;
            let slot = arr.get_mut(idx).ok_or_else(|| {
                ConfigError::selector(selector, format!("index {} out of range (len {})", idx, len))
            })?;
            *slot = new_value;
            Ok(())
        }
        _ => Err(ConfigError::selector(
            selector,
            format!("cannot assign '{}' inside a scalar", last.raw),
        )),
    }
}
