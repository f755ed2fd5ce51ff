//! Terraform CLI backend
//!
//! Drives the `terraform` binary as a child process. Every command runs in the
//! module directory with `-input=false -no-color`; `TF_IN_AUTOMATION` is set
//! so the CLI skips interactive hints.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use super::{ApplyResult, InfraError, Infrastructure, ModuleOptions};

/// Terraform CLI runner
#[derive(Clone, Debug)]
pub struct TerraformCli {
    binary: PathBuf,
}

impl TerraformCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn init_args(options: &ModuleOptions) -> Vec<String> {
        let mut args = vec![
            "init".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
        ];
        for (key, value) in &options.backend_config {
            args.push(format!("-backend-config={key}={value}"));
        }
        args
    }

    fn apply_args(options: &ModuleOptions) -> Vec<String> {
        let mut args = vec![
            "apply".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
            "-auto-approve".to_string(),
        ];
        push_vars(&mut args, options);
        args
    }

    fn destroy_args(options: &ModuleOptions) -> Vec<String> {
        let mut args = vec![
            "destroy".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
            "-auto-approve".to_string(),
        ];
        push_vars(&mut args, options);
        args
    }

    fn output_args() -> Vec<String> {
        vec![
            "output".to_string(),
            "-no-color".to_string(),
            "-json".to_string(),
        ]
    }

    async fn run(&self, options: &ModuleOptions, args: &[String]) -> Result<String, InfraError> {
        let command = format!(
            "terraform {}",
            args.first().map(String::as_str).unwrap_or_default()
        );
        debug!("Running {} in {} ({})", command, options.dir.display(), options.name);

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&options.dir)
            .envs(&options.env)
            .env("TF_IN_AUTOMATION", "1")
            .output()
            .await
            .map_err(|source| InfraError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InfraError::CommandFailed {
                command,
                exit_code: output.status.code(),
                output: format!("{}\n{}", stderr.trim(), stdout.trim())
                    .trim()
                    .to_string(),
            });
        }

        debug!("{} output: {}", command, stdout);
        Ok(stdout)
    }
}

/// Create the directories holding the state file and the data dir
async fn prepare_state_dirs(options: &ModuleOptions) -> Result<(), InfraError> {
    let state_parent = options
        .backend_config
        .get("path")
        .and_then(|p| Path::new(p).parent().map(Path::to_path_buf));
    let data_dir = options.env.get("TF_DATA_DIR").map(PathBuf::from);

    for dir in state_parent.into_iter().chain(data_dir) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| InfraError::StateDir {
                path: dir.display().to_string(),
                source,
            })?;
    }
    Ok(())
}

fn push_vars(args: &mut Vec<String>, options: &ModuleOptions) {
    for (key, value) in &options.vars {
        args.push("-var".to_string());
        args.push(format!("{key}={}", value.to_cli_value()));
    }
}

#[async_trait]
impl Infrastructure for TerraformCli {
    async fn apply(&self, options: &ModuleOptions) -> Result<ApplyResult, InfraError> {
        info!("terraform init && apply: {}", options.name);
        prepare_state_dirs(options).await?;
        self.run(options, &Self::init_args(options)).await?;
        self.run(options, &Self::apply_args(options)).await?;
        self.outputs(options).await
    }

    async fn destroy(&self, options: &ModuleOptions) -> Result<(), InfraError> {
        info!("terraform destroy: {}", options.name);
        prepare_state_dirs(options).await?;
        // Re-init so destroy works even when the apply that preceded it
        // failed before init completed.
        self.run(options, &Self::init_args(options)).await?;
        self.run(options, &Self::destroy_args(options)).await?;
        Ok(())
    }

    async fn outputs(&self, options: &ModuleOptions) -> Result<ApplyResult, InfraError> {
        let raw = self.run(options, &Self::output_args()).await?;
        ApplyResult::from_terraform_json(&raw)
    }
}
