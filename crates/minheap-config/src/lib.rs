//! Campaign configuration documents for `minheap`.
//!
//! Config files are YAML mappings that may pull in other files through
//! `includes` and patch them through `overrides`. Component definitions
//! (runtimes, modifiers, suites) stay untyped here and are instantiated by
//! tag through a [`ComponentRegistry`].

mod document;
mod error;
mod registry;

pub use document::{ConfigDocument, INCLUDES_KEY, OVERRIDES_KEY};
pub use error::ConfigError;
pub use registry::{ComponentRegistry, ComponentSpec, Constructor, TYPE_KEY};
