use crate::modifier::Modifier;
use minheap_config::{ComponentRegistry, ComponentSpec, ConfigError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// An installed runtime that benchmarks can be launched under.
pub trait Runtime: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// `None` when the benchmark program is itself the executable.
    fn executable(&self) -> Option<&Path>;

    /// The modifier constraining the heap to `size_mb` megabytes, or `None`
    /// if this runtime cannot be given a heap size at all.
    fn heapsize_modifier(&self, size_mb: u64) -> Option<Modifier>;

    fn describe(&self) -> String;
}

pub fn register_builtin(registry: &mut ComponentRegistry<Arc<dyn Runtime>>) {
    registry.register("OpenJDK", open_jdk);
    registry.register("JikesRVM", jikes_rvm);
    registry.register("NativeExecutable", native_executable);
}

fn open_jdk(spec: &ComponentSpec<'_>) -> Result<Arc<dyn Runtime>, ConfigError> {
    Ok(Arc::new(OpenJdk::from_spec(spec)?))
}

fn jikes_rvm(spec: &ComponentSpec<'_>) -> Result<Arc<dyn Runtime>, ConfigError> {
    Ok(Arc::new(JikesRvm::from_spec(spec)?))
}

fn native_executable(spec: &ComponentSpec<'_>) -> Result<Arc<dyn Runtime>, ConfigError> {
    Ok(Arc::new(NativeExecutable {
        name: spec.name().to_string(),
    }))
}

fn java_heap_flags(name: &str, size_mb: u64) -> Modifier {
    Modifier::jvm_args(
        format!("{}_heap{}", name, size_mb),
        vec![format!("-Xms{}M", size_mb), format!("-Xmx{}M", size_mb)],
    )
}

fn check_install(kind: &str, home: &Path, executable: &Path) {
    for problem in install_problems(kind, home, executable) {
        warn!("{}", problem);
    }
}

fn install_problems(kind: &str, home: &Path, executable: &Path) -> Vec<String> {
    let mut problems = Vec::new();
    if !home.exists() {
        problems.push(format!("{} home {} doesn't exist", kind, home.display()));
    }
    if !executable.exists() {
        problems.push(format!("{} not found in {} home", executable.display(), kind));
    }
    problems
}

#[derive(Debug, Clone)]
pub struct OpenJdk {
    name: String,
    release: String,
    home: PathBuf,
    executable: PathBuf,
}

impl OpenJdk {
    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ConfigError> {
        let home = PathBuf::from(spec.required_str("home")?);
        let executable = home.join("bin").join("java");
        check_install("OpenJDK", &home, &executable);
        Ok(Self {
            name: spec.name().to_string(),
            release: spec.required_str("release")?,
            home,
            executable,
        })
    }
}

impl Runtime for OpenJdk {
    fn name(&self) -> &str {
        &self.name
    }

    fn executable(&self) -> Option<&Path> {
        Some(&self.executable)
    }

    fn heapsize_modifier(&self, size_mb: u64) -> Option<Modifier> {
        Some(java_heap_flags(&self.name, size_mb))
    }

    fn describe(&self) -> String {
        format!("OpenJDK {} {}", self.release, self.home.display())
    }
}

#[derive(Debug, Clone)]
pub struct JikesRvm {
    name: String,
    home: PathBuf,
    executable: PathBuf,
}

impl JikesRvm {
    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ConfigError> {
        let home = PathBuf::from(spec.required_str("home")?);
        let executable = home.join("rvm");
        check_install("JikesRVM", &home, &executable);
        Ok(Self {
            name: spec.name().to_string(),
            home,
            executable,
        })
    }
}

impl Runtime for JikesRvm {
    fn name(&self) -> &str {
        &self.name
    }

    fn executable(&self) -> Option<&Path> {
        Some(&self.executable)
    }

    fn heapsize_modifier(&self, size_mb: u64) -> Option<Modifier> {
        Some(java_heap_flags(&self.name, size_mb))
    }

    fn describe(&self) -> String {
        format!("JikesRVM {}", self.home.display())
    }
}

/// An ahead-of-time compiled benchmark binary; it has no launcher and no
/// heap flag.
#[derive(Debug, Clone)]
pub struct NativeExecutable {
    name: String,
}

impl Runtime for NativeExecutable {
    fn name(&self) -> &str {
        &self.name
    }

    fn executable(&self) -> Option<&Path> {
        None
    }

    fn heapsize_modifier(&self, _size_mb: u64) -> Option<Modifier> {
        None
    }

    fn describe(&self) -> String {
        "NativeExecutable".to_string()
    }
}
