use minheap_config::{ComponentRegistry, ComponentSpec, ConfigError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modifier {
    pub name: String,
    pub kind: ModifierKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifierKind {
    JvmArg(Vec<String>),
    ProgramArg(Vec<String>),
    EnvVar { var: String, val: String },
    ClasspathAppend(Vec<String>),
    ClasspathPrepend(Vec<String>),
    /// Names of other modifiers, expanded when a config variant is parsed.
    Set(Vec<String>),
}

impl Modifier {
    pub fn jvm_args(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: ModifierKind::JvmArg(args),
        }
    }
}

pub fn register_builtin(registry: &mut ComponentRegistry<Modifier>) {
    registry.register("JVMArg", jvm_arg);
    registry.register("ProgramArg", program_arg);
    registry.register("EnvVar", env_var);
    registry.register("JVMClasspathAppend", classpath_append);
    registry.register("JVMClasspathPrepend", classpath_prepend);
    registry.register("ModifierSet", modifier_set);
}

fn split_val(spec: &ComponentSpec<'_>) -> Result<Vec<String>, ConfigError> {
    Ok(spec
        .required_str("val")?
        .split_whitespace()
        .map(|s| s.to_string())
        .collect())
}

fn build(spec: &ComponentSpec<'_>, kind: ModifierKind) -> Result<Modifier, ConfigError> {
    Ok(Modifier {
        name: spec.name().to_string(),
        kind,
    })
}

fn jvm_arg(spec: &ComponentSpec<'_>) -> Result<Modifier, ConfigError> {
    build(spec, ModifierKind::JvmArg(split_val(spec)?))
}

fn program_arg(spec: &ComponentSpec<'_>) -> Result<Modifier, ConfigError> {
    build(spec, ModifierKind::ProgramArg(split_val(spec)?))
}

fn env_var(spec: &ComponentSpec<'_>) -> Result<Modifier, ConfigError> {
    let kind = ModifierKind::EnvVar {
        var: spec.required_str("var")?,
        val: spec.required_str("val")?,
    };
    build(spec, kind)
}

fn classpath_append(spec: &ComponentSpec<'_>) -> Result<Modifier, ConfigError> {
    build(spec, ModifierKind::ClasspathAppend(split_val(spec)?))
}

fn classpath_prepend(spec: &ComponentSpec<'_>) -> Result<Modifier, ConfigError> {
    build(spec, ModifierKind::ClasspathPrepend(split_val(spec)?))
}

fn modifier_set(spec: &ComponentSpec<'_>) -> Result<Modifier, ConfigError> {
    let members: Vec<String> = spec
        .required_str("val")?
        .split('|')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if members.is_empty() {
        return Err(ConfigError::invalid_field(spec.name(), "val", "modifier set is empty"));
    }
    build(spec, ModifierKind::Set(members))
}
