use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use minheap_config::ConfigDocument;
use minheap_runner::{
    run_campaign, select_best, win_counts, BestConfig, ProcessExecutor, Registries,
    ResolvedConfig, ResultStore,
};
use serde_json::{json, Value};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "minheap",
    version = "0.3.0",
    about = "Find the minimum heap size each benchmark needs"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure every config/benchmark pair missing from RESULT
    Run {
        config: PathBuf,
        result: PathBuf,
        /// Read RESULT for resumption but never write it
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    /// Report the config with the most per-benchmark wins in RESULT
    Best {
        result: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Load CONFIG and print the resolved campaign without running it
    Describe {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run {
            config,
            result,
            dry_run,
            json,
        } => {
            let resolved = load_config(&config)?;
            let mut store = if dry_run {
                info!("Dry run: {} will not be written", result.display());
                ResultStore::open_dry_run(&result)?
            } else {
                ResultStore::open(&result)?
            };
            let mut executor = ProcessExecutor;
            // progress goes to stderr in json mode so stdout stays parseable
            let summary = if json {
                run_campaign(&resolved, &mut store, &mut executor, &mut io::stderr())?
            } else {
                run_campaign(&resolved, &mut store, &mut executor, &mut io::stdout())?
            };
            let best = select_best(store.results());
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "dry_run": dry_run,
                    "measured": summary.measured,
                    "skipped_existing": summary.skipped_existing,
                    "skipped_configs": summary.skipped_configs,
                    "best": best.as_ref().map(best_to_json)
                })));
            }
            print_best(best.as_ref())?;
        }
        Commands::Best { result, json } => {
            if !result.exists() {
                return Err(anyhow!("result file not found: {}", result.display()));
            }
            let store = ResultStore::open_dry_run(&result)?;
            let best = select_best(store.results());
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "best",
                    "wins": win_counts(store.results()),
                    "best": best.as_ref().map(best_to_json)
                })));
            }
            print_best(best.as_ref())?;
        }
        Commands::Describe { config, json } => {
            let resolved = load_config(&config)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "summary": describe_to_json(&resolved)?
                })));
            }
            print_description(&resolved)?;
        }
    }
    Ok(None)
}

fn load_config(path: &Path) -> Result<ResolvedConfig> {
    let document = ConfigDocument::load(path)?;
    Ok(ResolvedConfig::resolve(document, &Registries::builtin())?)
}

fn print_best(best: Option<&BestConfig>) -> Result<()> {
    let Some(best) = best else {
        println!("no config passed any benchmark");
        return Ok(());
    };
    println!(
        "{} obtained the most number of minimum heap sizes required: {}",
        best.config, best.wins
    );
    println!("Minimum heap sizes required:");
    print!("{}", serde_yaml::to_string(&best.fragment)?);
    Ok(())
}

fn print_description(config: &ResolvedConfig) -> Result<()> {
    println!("runtimes:");
    for (name, runtime) in config.runtimes() {
        println!("  {}: {}", name, runtime.describe());
    }
    println!("suites: {}", join_keys(config.suites().keys()));
    for (suite, benchmarks) in config.benchmarks() {
        let names: Vec<&str> = benchmarks.iter().map(|b| b.name()).collect();
        println!("  {}: {}", suite, names.join(", "));
    }
    println!("configs:");
    for variant in config.variants()? {
        let modifiers: Vec<&str> = variant.modifiers.iter().map(|m| m.name.as_str()).collect();
        println!(
            "  {} -> {} [{}]",
            variant.encoded,
            variant.runtime.name(),
            modifiers.join(" ")
        );
    }
    match config.maxheap() {
        Some(mb) => println!("maxheap: {}M", mb),
        None => println!("maxheap: (unset)"),
    }
    Ok(())
}

fn describe_to_json(config: &ResolvedConfig) -> Result<Value> {
    let runtimes: serde_json::Map<String, Value> = config
        .runtimes()
        .iter()
        .map(|(name, runtime)| (name.clone(), json!(runtime.describe())))
        .collect();
    let benchmarks: serde_json::Map<String, Value> = config
        .benchmarks()
        .iter()
        .map(|(suite, bms)| {
            (
                suite.clone(),
                json!(bms.iter().map(|b| b.name()).collect::<Vec<_>>()),
            )
        })
        .collect();
    let variants = config
        .variants()?
        .into_iter()
        .map(|v| {
            json!({
                "config": v.encoded,
                "runtime": v.runtime.name(),
                "modifiers": v.modifiers.iter().map(|m| m.name.as_str()).collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();
    Ok(json!({
        "runtimes": runtimes,
        "suites": config.suites().keys().collect::<Vec<_>>(),
        "benchmarks": benchmarks,
        "configs": variants,
        "maxheap": config.maxheap()
    }))
}

fn best_to_json(best: &BestConfig) -> Value {
    json!({
        "config": best.config,
        "wins": best.wins,
        "results": best.fragment
    })
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    keys.map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. } | Commands::Best { json, .. } | Commands::Describe { json, .. } => {
            *json
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_dry_run_and_global_verbose() {
        let cli = Cli::try_parse_from(["minheap", "run", "c.yml", "r.yml", "--dry-run", "-v"])
            .expect("parse");
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                config,
                result,
                dry_run,
                json,
            } => {
                assert_eq!(config, PathBuf::from("c.yml"));
                assert_eq!(result, PathBuf::from("r.yml"));
                assert!(dry_run);
                assert!(!json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn json_mode_follows_flag() {
        let cli = Cli::try_parse_from(["minheap", "best", "r.yml", "--json"]).expect("parse");
        assert!(command_json_mode(&cli.command));
    }

    #[test]
    fn best_json_carries_fragment() {
        let mut fragment = minheap_runner::SuiteResults::new();
        fragment
            .entry("dacapo".to_string())
            .or_default()
            .insert("fop".to_string(), minheap_runner::MinHeap::Size(33));
        let value = best_to_json(&BestConfig {
            config: "jdk11|ms".to_string(),
            wins: 1,
            fragment,
        });
        assert_eq!(value["config"], "jdk11|ms");
        assert_eq!(value["results"]["dacapo"]["fop"], 33);
    }
}
