//! CLI commands

pub mod apply;
pub mod bootstrap;
pub mod push;
pub mod wait;

use k8s_openapi::api::apps::v1::Deployment;
use std::path::Path;

use crate::error::{CliError, Result};

/// Connect with the ambient kubeconfig or in-cluster credentials
pub async fn connect() -> Result<kube::Client> {
    kube::Client::try_default().await.map_err(CliError::connect)
}

/// Read a single Deployment from a YAML manifest
pub fn load_deployment(path: &Path) -> Result<Deployment> {
    let content = std::fs::read_to_string(path)?;
    let deployment: Deployment = serde_yaml::from_str(&content).map_err(|e| {
        CliError::input_with_help(
            format!("{} is not a Deployment manifest: {}", path.display(), e),
            "pass a single apps/v1 Deployment document",
        )
    })?;
    if deployment.metadata.name.as_deref().is_none_or(str::is_empty) {
        return Err(CliError::input(format!(
            "{} has no metadata.name",
            path.display()
        )));
    }
    Ok(deployment)
}
