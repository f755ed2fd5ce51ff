//! cloudfn-harness - verification harness for a Terraform-deployed cloud function
//!
//! Each scenario provisions a prerequisite bucket, applies the function
//! module, checks its outputs, calls the deployed endpoint until it answers,
//! and destroys everything it created, in reverse order, whatever happened.
//!
//! ## Usage
//!
//! ```bash
//! export PROJECT_ID=my-project
//!
//! # Run every scenario
//! cloudfn-harness run
//!
//! # Run one scenario with a shorter probe budget
//! cloudfn-harness run --scenario basic --probe-retries 3 --probe-interval 5
//!
//! # Run scenarios concurrently
//! cloudfn-harness run --parallel --concurrent 2
//!
//! # Inspect scenarios, environment and configuration
//! cloudfn-harness list --detailed
//! cloudfn-harness env
//! cloudfn-harness config show
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::info;

mod cleanup;
mod cli;
mod config;
mod error;
mod executor;
mod http;
mod infra;
mod models;
mod orchestrator;
mod output;
mod probe;
mod provision;
mod scenario;
mod utils;
mod validate;

use cli::Args;
use config::{env::print_env_help, EnvConfig, EnvResolver, HarnessConfig};
use executor::{ParallelExecutor, ScenarioRunner};
use orchestrator::Orchestrator;
use output::{write_results_to_file, OutputFormat, ResultFormatter};
use scenario::Scenario;
use utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        LogLevel::from_str(&args.log_level).unwrap_or(LogLevel::Info)
    };
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            let passed = run_scenarios(run_args).await?;
            if !passed {
                return Ok(ExitCode::FAILURE);
            }
        }
        cli::Command::List(list_args) => {
            Scenario::print_all(list_args.detailed);
        }
        cli::Command::Env => {
            print_env_help();
            println!();
            EnvConfig::load(&EnvResolver::process()).print_summary();
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn parse_scenarios(selection: &str) -> Result<Vec<Scenario>> {
    if selection.eq_ignore_ascii_case("all") {
        return Ok(Scenario::all());
    }
    selection
        .split(',')
        .map(|s| s.trim().parse::<Scenario>().map_err(anyhow::Error::from))
        .collect()
}

fn effective_config(args: &cli::RunArgs) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::load_or_default(args.config.as_deref())
        .context("Failed to load harness configuration")?;

    if let Some(retries) = args.probe_retries {
        config.probe.max_retries = retries;
    }
    if let Some(interval) = args.probe_interval {
        config.probe.interval_secs = interval;
    }
    if let Some(dir) = &args.module_dir {
        config.module_dir = dir.clone();
    }
    if let Some(concurrent) = args.concurrent {
        config.max_concurrent = concurrent;
    }

    Ok(config)
}

/// Run the selected scenarios; `Ok(false)` when any of them did not pass
async fn run_scenarios(args: cli::RunArgs) -> Result<bool> {
    let scenarios = parse_scenarios(&args.scenario)?;
    let format = OutputFormat::from_str(&args.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {}", args.format))?;
    let config = effective_config(&args)?;
    let max_concurrent = config.max_concurrent;

    info!(
        "Running {} scenario(s) against module {}",
        scenarios.len(),
        config.module_dir.display()
    );

    let orchestrator = Orchestrator::terraform(config)?;
    let resolver = EnvResolver::process();

    let summary = if args.parallel {
        ParallelExecutor::new(max_concurrent)
            .run_all(&orchestrator, &resolver, &scenarios)
            .await?
    } else {
        ScenarioRunner::new(orchestrator, resolver)
            .run_all(&scenarios)
            .await
    };

    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_summary(&summary));

    if let Some(path) = &args.output {
        write_results_to_file(path, &summary, format)
            .with_context(|| format!("Failed to write results to {path}"))?;
        println!("✓ Results saved to {path}");
    }

    Ok(summary.all_passed())
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show { path, format } => {
            let config = HarnessConfig::load_or_default(path.as_deref())?;
            let output = if format == "json" {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_yaml::to_string(&config)?
            };
            println!("{output}");
        }

        cli::ConfigAction::Init { path, force } => {
            let path = path
                .or_else(HarnessConfig::default_path)
                .ok_or_else(|| anyhow::anyhow!("No config directory found; pass --path"))?;
            if Path::new(&path).exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            HarnessConfig::default().save(&path)?;
            println!("✓ Configuration file created: {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenarios() {
        assert_eq!(parse_scenarios("all").unwrap(), Scenario::all());
        assert_eq!(
            parse_scenarios("iam-roles, basic").unwrap(),
            vec![Scenario::IamRoles, Scenario::Basic]
        );
        assert!(parse_scenarios("basic,nope").is_err());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        std::fs::write(&path, "max_concurrent: 5\nprobe:\n  max_retries: 7\n").unwrap();

        let args = Args::parse_from([
            "cloudfn-harness",
            "run",
            "--config",
            path.to_str().unwrap(),
            "--probe-interval",
            "1",
        ]);
        let cli::Command::Run(run_args) = args.command else {
            panic!("expected run");
        };

        let config = effective_config(&run_args).unwrap();
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.probe.max_retries, 7);
        assert_eq!(config.probe.interval_secs, 1);
    }
}
