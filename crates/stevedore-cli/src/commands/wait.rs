//! Wait command - block until a resource reaches a state

use console::style;
use k8s_openapi::api::core::v1::{Pod, Secret};
use std::time::Duration;
use stevedore_core::Config;
use stevedore_kube::{
    Build, KubeObjects, Project, wait_for_build, wait_for_pod, wait_for_project_deletion,
    wait_for_secret,
};

use crate::error::Result;

fn done(what: &str) {
    println!("{} {}", style("✓").green().bold(), what);
}

/// Wait for a label-selected pod to reach `phase`
pub async fn pod(
    namespace: &str,
    config: &Config,
    selector: &str,
    phase: &str,
    timeout: Option<Duration>,
) -> Result<()> {
    let client = super::connect().await?;
    let pods = KubeObjects::<Pod>::namespaced(client, namespace);
    let found = wait_for_pod(&pods, selector, phase, timeout.unwrap_or(config.timeouts.pod)).await?;
    done(&format!(
        "Pod {} is {}",
        found.metadata.name.as_deref().unwrap_or_default(),
        phase
    ));
    Ok(())
}

/// Wait for a build to complete
pub async fn build(
    namespace: &str,
    config: &Config,
    name: &str,
    timeout: Option<Duration>,
) -> Result<()> {
    let client = super::connect().await?;
    let builds = KubeObjects::<Build>::namespaced(client, namespace);
    wait_for_build(&builds, name, timeout.unwrap_or(config.timeouts.build)).await?;
    done(&format!("Build {} complete", name));
    Ok(())
}

/// Wait for a secret to exist
pub async fn secret(
    namespace: &str,
    config: &Config,
    name: &str,
    timeout: Option<Duration>,
) -> Result<()> {
    let client = super::connect().await?;
    let secrets = KubeObjects::<Secret>::namespaced(client, namespace);
    wait_for_secret(&secrets, name, timeout.unwrap_or(config.timeouts.secret)).await?;
    done(&format!("Secret {} exists", name));
    Ok(())
}

/// Wait for a project to be deleted
pub async fn project_deleted(config: &Config, name: &str, timeout: Option<Duration>) -> Result<()> {
    let client = super::connect().await?;
    let projects = KubeObjects::<Project>::cluster(client);
    wait_for_project_deletion(&projects, name, timeout.unwrap_or(config.timeouts.project)).await?;
    done(&format!("Project {} deleted", name));
    Ok(())
}
