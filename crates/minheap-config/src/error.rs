use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, overriding or resolving a campaign configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("invalid override selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("unknown {family} type '{tag}'")]
    UnknownComponentType { family: String, tag: String },

    #[error("{component}: missing required field '{field}'")]
    MissingField { component: String, field: String },

    #[error("{component}: invalid field '{field}': {reason}")]
    InvalidField {
        component: String,
        field: String,
        reason: String,
    },

    #[error("unknown {kind} '{name}'")]
    UnknownReference { kind: String, name: String },

    #[error("reserved key '{0}' is only valid while loading a config file")]
    Reserved(String),
}

impl ConfigError {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ConfigError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn selector(selector: &str, reason: impl ToString) -> Self {
        ConfigError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_field(component: &str, field: &str, reason: impl ToString) -> Self {
        ConfigError::InvalidField {
            component: component.to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn unknown_reference(kind: &str, name: &str) -> Self {
        ConfigError::UnknownReference {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}
