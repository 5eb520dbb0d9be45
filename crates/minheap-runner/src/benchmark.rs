use crate::modifier::{Modifier, ModifierKind};
use crate::runtime::Runtime;
use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// One benchmark of a suite, together with the modifiers attached to it.
///
/// The command line is laid out as
/// `<launcher> <jvm args> [-cp <classpath>] <program> <program args> <trailing>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Benchmark {
    suite_name: String,
    name: String,
    classpath: Vec<String>,
    program: Vec<String>,
    trailing: Vec<String>,
    modifiers: Vec<Modifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Benchmark {
    pub fn new(suite_name: &str, name: &str, program: Vec<String>) -> Self {
        Self {
            suite_name: suite_name.to_string(),
            name: name.to_string(),
            classpath: Vec::new(),
            program,
            trailing: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    pub fn with_classpath(mut self, classpath: Vec<String>) -> Self {
        self.classpath = classpath;
        self
    }

    /// Arguments placed after any `ProgramArg` modifiers, e.g. the benchmark
    /// name for a harness that expects options first.
    pub fn with_trailing(mut self, trailing: Vec<String>) -> Self {
        self.trailing = trailing;
        self
    }

    pub fn suite_name(&self) -> &str {
        &self.suite_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    pub fn attach_modifiers(&self, modifiers: &[Modifier]) -> Benchmark {
        let mut attached = self.clone();
        attached.modifiers.extend(modifiers.iter().cloned());
        attached
    }

    /// `Set` modifiers are expected to have been expanded already and
    /// contribute nothing here.
    pub fn invocation(&self, runtime: &dyn Runtime) -> Result<Invocation> {
        let mut jvm_args = Vec::new();
        let mut program_args = Vec::new();
        let mut env = Vec::new();
        let mut cp_prepend = Vec::new();
        let mut cp_append = Vec::new();
        for modifier in &self.modifiers {
            match &modifier.kind {
                ModifierKind::JvmArg(args) => jvm_args.extend(args.iter().cloned()),
                ModifierKind::ProgramArg(args) => program_args.extend(args.iter().cloned()),
                ModifierKind::EnvVar { var, val } => env.push((var.clone(), val.clone())),
                ModifierKind::ClasspathAppend(entries) => cp_append.extend(entries.iter().cloned()),
                ModifierKind::ClasspathPrepend(entries) => {
                    cp_prepend.extend(entries.iter().cloned())
                }
                ModifierKind::Set(_) => {}
            }
        }

        let mut args = Vec::new();
        let program = match runtime.executable() {
            Some(launcher) => {
                args.extend(jvm_args);
                let classpath: Vec<String> = cp_prepend
                    .into_iter()
                    .chain(self.classpath.iter().cloned())
                    .chain(cp_append)
                    .collect();
                if !classpath.is_empty() {
                    args.push("-cp".to_string());
                    args.push(classpath.join(":"));
                }
                args.extend(self.program.iter().cloned());
                launcher.to_path_buf()
            }
            None => {
                let (first, rest) = self.program.split_first().ok_or_else(|| {
                    anyhow!(
                        "benchmark {}-{} has no program to execute natively",
                        self.suite_name,
                        self.name
                    )
                })?;
                args.extend(rest.iter().cloned());
                PathBuf::from(first)
            }
        };
        args.extend(program_args);
        args.extend(self.trailing.iter().cloned());
        Ok(Invocation { program, args, env })
    }
}
