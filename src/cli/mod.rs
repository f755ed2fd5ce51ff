//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Verification harness for a Terraform-deployed cloud function
#[derive(Parser, Debug)]
#[command(name = "cloudfn-harness")]
#[command(version)]
#[command(about = "Provision, apply, validate, probe and tear down a cloud function module")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run verification scenarios
    Run(RunArgs),

    /// List available scenarios
    List(ListArgs),

    /// Show the environment variables the harness reads
    Env,

    /// Manage the harness configuration file
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario to run (basic, iam-roles, all)
    #[arg(short, long, default_value = "all")]
    pub scenario: String,

    /// Run scenarios in parallel
    #[arg(short, long)]
    pub parallel: bool,

    /// Number of concurrent scenarios (when parallel)
    #[arg(short, long)]
    pub concurrent: Option<usize>,

    /// Configuration file (YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format (table, json, json-pretty, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Save results to file
    #[arg(short, long)]
    pub output: Option<String>,

    /// Probe attempts
    #[arg(long)]
    pub probe_retries: Option<u32>,

    /// Seconds between probe attempts
    #[arg(long)]
    pub probe_interval: Option<u64>,

    /// Directory of the module under test
    #[arg(long)]
    pub module_dir: Option<PathBuf>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show scenario details
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Configuration file to load instead of the default
        #[arg(long)]
        path: Option<PathBuf>,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Write a configuration file with the default settings
    Init {
        /// Where to write; defaults to the per-user config directory
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let args = Args::parse_from(["cloudfn-harness", "run"]);
        assert!(!args.verbose);
        assert_eq!(args.log_level, "info");
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.scenario, "all");
                assert!(!run.parallel);
                assert_eq!(run.format, "table");
                assert!(run.probe_retries.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_overrides() {
        let args = Args::parse_from([
            "cloudfn-harness",
            "--verbose",
            "run",
            "--scenario",
            "iam-roles",
            "--parallel",
            "--concurrent",
            "3",
            "--probe-retries",
            "4",
            "--module-dir",
            "infra/fn",
        ]);
        assert!(args.verbose);
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.scenario, "iam-roles");
        assert_eq!(run.concurrent, Some(3));
        assert_eq!(run.probe_retries, Some(4));
        assert_eq!(run.module_dir, Some(PathBuf::from("infra/fn")));
    }

    #[test]
    fn test_config_init() {
        let args = Args::parse_from(["cloudfn-harness", "config", "init", "--force"]);
        let Command::Config(ConfigArgs {
            action: ConfigAction::Init { path, force },
        }) = args.command
        else {
            panic!("expected config init");
        };
        assert!(force);
        assert!(path.is_none());
    }
}
