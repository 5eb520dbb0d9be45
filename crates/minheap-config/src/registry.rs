use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const TYPE_KEY: &str = "type";

pub type Constructor<T> = fn(&ComponentSpec<'_>) -> Result<T, ConfigError>;

/// The untyped config of a single named component, e.g. the mapping under
/// `suites.dacapo`.
#[derive(Debug, Clone, Copy)]
pub struct ComponentSpec<'a> {
    name: &'a str,
    fields: &'a Map<String, Value>,
}

impl<'a> ComponentSpec<'a> {
    pub fn new(name: &'a str, fields: &'a Map<String, Value>) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn type_tag(&self) -> Option<&'a str> {
        self.fields.get(TYPE_KEY).and_then(|v| v.as_str())
    }

    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.fields.get(field)
    }

    /// Scalars are accepted as strings so that `release: 11` reads as `"11"`.
    pub fn required_str(&self, field: &str) -> Result<String, ConfigError> {
        self.optional_str(field)?
            .ok_or_else(|| ConfigError::MissingField {
                component: self.name.to_string(),
                field: field.to_string(),
            })
    }

    pub fn optional_str(&self, field: &str) -> Result<Option<String>, ConfigError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(ConfigError::invalid_field(self.name, field, "expected a scalar")),
        }
    }

    pub fn optional_u64(&self, field: &str) -> Result<Option<u64>, ConfigError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_u64()
                .map(Some)
                .ok_or_else(|| ConfigError::invalid_field(self.name, field, "expected a non-negative integer")),
        }
    }
}

/// Maps `type` tags to constructors for one component family.
///
/// Registering a tag twice replaces the earlier constructor.
pub struct ComponentRegistry<T> {
    family: &'static str,
    constructors: BTreeMap<String, Constructor<T>>,
}

impl<T> ComponentRegistry<T> {
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            constructors: BTreeMap::new(),
        }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn register(&mut self, tag: &str, constructor: Constructor<T>) {
        if self.constructors.insert(tag.to_string(), constructor).is_some() {
            debug!(family = self.family, tag, "replaced registered constructor");
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|k| k.as_str())
    }

    pub fn construct(&self, tag: &str, spec: &ComponentSpec<'_>) -> Result<T, ConfigError> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| ConfigError::UnknownComponentType {
                family: self.family.to_string(),
                tag: tag.to_string(),
            })?;
        constructor(spec)
    }

    /// Constructs a component from its raw config value, dispatching on the
    /// value's `type` field.
    pub fn construct_value(&self, name: &str, value: &Value) -> Result<T, ConfigError> {
        let fields = value.as_object().ok_or_else(|| {
            ConfigError::invalid_field(name, TYPE_KEY, format!("{} config must be a mapping", self.family))
        })?;
        let spec = ComponentSpec::new(name, fields);
        let tag = spec.type_tag().ok_or_else(|| ConfigError::MissingField {
            component: name.to_string(),
            field: TYPE_KEY.to_string(),
        })?;
        self.construct(tag, &spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Widget {
        name: String,
        size: u64,
    }

    fn small(spec: &ComponentSpec<'_>) -> Result<Widget, ConfigError> {
        Ok(Widget {
            name: spec.name().to_string(),
            size: spec.optional_u64("size")?.unwrap_or(1),
        })
    }

    fn large(spec: &ComponentSpec<'_>) -> Result<Widget, ConfigError> {
        Ok(Widget {
            name: spec.required_str("label")?,
            size: 100,
        })
    }

    #[test]
    fn construct_dispatches_on_type_tag() {
        let mut registry = ComponentRegistry::new("widget");
        registry.register("Small", small);
        registry.register("Large", large);
        let w = registry
            .construct_value("w1", &json!({"type": "Small", "size": 7}))
            .expect("small");
        assert_eq!(w, Widget { name: "w1".into(), size: 7 });
        let w = registry
            .construct_value("w2", &json!({"type": "Large", "label": 3}))
            .expect("large");
        assert_eq!(w, Widget { name: "3".into(), size: 100 });
    }

    #[test]
    fn unknown_tag_is_a_config_error() {
        let mut registry = ComponentRegistry::new("widget");
        registry.register("Small", small);
        let err = registry
            .construct_value("w", &json!({"type": "Huge"}))
            .expect_err("unknown tag");
        match err {
            ConfigError::UnknownComponentType { family, tag } => {
                assert_eq!(family, "widget");
                assert_eq!(tag, "Huge");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn missing_fields_are_reported() {
        let mut registry = ComponentRegistry::new("widget");
        registry.register("Large", large);
        let err = registry
            .construct_value("w", &json!({"size": 1}))
            .expect_err("missing type");
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "type"));
        let err = registry
            .construct_value("w", &json!({"type": "Large"}))
            .expect_err("missing label");
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "label"));
    }

    #[test]
    fn reregistering_a_tag_overwrites() {
        let mut registry = ComponentRegistry::new("widget");
        registry.register("W", small);
        registry.register("W", large);
        registry.register("W", small);
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["W"]);
        let w = registry.construct_value("x", &json!({"type": "W"})).expect("w");
        assert_eq!(w.size, 1);
    }
}
