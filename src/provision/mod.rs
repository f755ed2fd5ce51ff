//! Prerequisite resource provisioning
//!
//! The module under test needs a storage bucket for its source archive. The
//! bucket comes from a small fixture module applied before the real one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::error::{HarnessError, HarnessResult};
use crate::infra::{Infrastructure, ModuleOptions};

/// Kind of resource a scenario created
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Bucket,
    Module,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Bucket => write!(f, "bucket"),
            ResourceKind::Module => write!(f, "module"),
        }
    }
}

/// A created resource together with the options needed to destroy it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub options: ModuleOptions,
}

impl ProvisionedResource {
    pub fn new(kind: ResourceKind, name: impl Into<String>, options: ModuleOptions) -> Self {
        Self {
            kind,
            name: name.into(),
            options,
        }
    }

    /// Label used for the cleanup action
    pub fn destroy_label(&self) -> String {
        format!("destroy {} {}", self.kind, self.name)
    }
}

/// Creates and destroys the prerequisite bucket
#[derive(Clone)]
pub struct BucketProvisioner {
    infra: Arc<dyn Infrastructure>,
    fixture_dir: PathBuf,
    state_dir: Option<PathBuf>,
}

impl BucketProvisioner {
    pub fn new(infra: Arc<dyn Infrastructure>, fixture_dir: impl AsRef<Path>) -> Self {
        Self {
            infra,
            fixture_dir: fixture_dir.as_ref().to_path_buf(),
            state_dir: None,
        }
    }

    /// Keep the fixture's state under `dir`
    pub fn with_state_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.state_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn bucket_options(&self, project_id: &str, name: &str, region: &str) -> ModuleOptions {
        let options = ModuleOptions::new(format!("bucket {name}"), &self.fixture_dir)
            .var("project_id", project_id)
            .var("bucket_name", name)
            .var("region", region);

        match &self.state_dir {
            Some(dir) => options.with_state_dir(dir),
            None => options,
        }
    }

    /// Apply the bucket fixture once; any failure is fatal
    pub async fn create_bucket(
        &self,
        project_id: &str,
        name: &str,
        region: &str,
    ) -> HarnessResult<ProvisionedResource> {
        let options = self.bucket_options(project_id, name, region);
        info!("Creating bucket {} in {} ({})", name, project_id, region);

        self.infra
            .apply(&options)
            .await
            .map_err(|source| HarnessError::Provision {
                resource: format!("bucket {name}"),
                source,
            })?;

        info!("Bucket {} created", name);
        Ok(ProvisionedResource::new(ResourceKind::Bucket, name, options))
    }

    /// Destroy a bucket with the options it was created with
    pub async fn destroy_bucket(&self, resource: &ProvisionedResource) -> HarnessResult<()> {
        info!("Destroying bucket {}", resource.name);
        self.infra
            .destroy(&resource.options)
            .await
            .map_err(|source| HarnessError::Provision {
                resource: format!("bucket {}", resource.name),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{ApplyResult, InfraError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingInfra {
        fail_apply: bool,
        calls: Mutex<Vec<(String, ModuleOptions)>>,
    }

    #[async_trait]
    impl Infrastructure for RecordingInfra {
        async fn apply(&self, options: &ModuleOptions) -> Result<ApplyResult, InfraError> {
            self.calls
                .lock()
                .unwrap()
                .push(("apply".into(), options.clone()));
            if self.fail_apply {
                return Err(InfraError::CommandFailed {
                    command: "terraform apply".into(),
                    exit_code: Some(1),
                    output: "Error 429: rateLimitExceeded".into(),
                });
            }
            Ok(ApplyResult::new())
        }

        async fn destroy(&self, options: &ModuleOptions) -> Result<(), InfraError> {
            self.calls
                .lock()
                .unwrap()
                .push(("destroy".into(), options.clone()));
            Ok(())
        }

        async fn outputs(&self, _options: &ModuleOptions) -> Result<ApplyResult, InfraError> {
            Ok(ApplyResult::new())
        }
    }

    #[tokio::test]
    async fn test_create_then_destroy_reuses_options() {
        let infra = Arc::new(RecordingInfra::default());
        let provisioner = BucketProvisioner::new(infra.clone(), "test/fixtures/bucket")
            .with_state_dir("/tmp/h/fn-1/bucket");

        let bucket = provisioner
            .create_bucket("p1", "b1", "europe-west1")
            .await
            .unwrap();
        assert_eq!(bucket.kind, ResourceKind::Bucket);
        assert_eq!(bucket.destroy_label(), "destroy bucket b1");
        assert_eq!(bucket.options.string_var("region"), Some("europe-west1"));

        provisioner.destroy_bucket(&bucket).await.unwrap();

        let calls = infra.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "apply");
        assert_eq!(calls[1].0, "destroy");
        assert_eq!(calls[1].1.string_var("region"), Some("europe-west1"));
        assert_eq!(
            calls[1].1.backend_config.get("path").map(String::as_str),
            Some("/tmp/h/fn-1/bucket/terraform.tfstate")
        );
    }

    #[tokio::test]
    async fn test_create_failure_is_not_retried() {
        let infra = Arc::new(RecordingInfra {
            fail_apply: true,
            ..Default::default()
        });
        let provisioner = BucketProvisioner::new(infra.clone(), "fixture");

        let err = provisioner.create_bucket("p1", "b1", "us-central1").await.unwrap_err();
        assert!(matches!(err, HarnessError::Provision { .. }));
        assert_eq!(err.label(), "provision");
        assert_eq!(infra.calls.lock().unwrap().len(), 1);
    }
}
