//! Persistent storage attach and detach on a pod template

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use std::collections::BTreeMap;
use stevedore_core::RetryPolicy;

use crate::error::{KubeError, Result};
use crate::session::ObjectSession;
use crate::template::pod_spec_mut;

/// Requested storage operations, each keyed by mount path with the claim name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeChanges {
    pub mount: BTreeMap<String, String>,
    pub unmount: BTreeMap<String, String>,
}

impl VolumeChanges {
    pub fn is_empty(&self) -> bool {
        self.mount.is_empty() && self.unmount.is_empty()
    }
}

/// Deterministic name of the volume backed by `claim`
pub fn claim_volume_name(claim: &str) -> String {
    format!("{}-volume", claim)
}

/// Volume entry referencing a persistent volume claim
pub fn claim_volume(volume_name: &str, claim: &str) -> Volume {
    Volume {
        name: volume_name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim.to_string(),
            read_only: None,
        }),
        ..Default::default()
    }
}

fn claim_of(volume: &Volume) -> Option<&str> {
    volume
        .persistent_volume_claim
        .as_ref()
        .map(|c| c.claim_name.as_str())
}

/// Apply unmounts then mounts to the first container of `template`
///
/// Any inconsistency aborts before the caller applies anything.
pub fn apply_volume_changes(template: &mut PodTemplateSpec, changes: &VolumeChanges) -> Result<()> {
    let spec = pod_spec_mut(template);
    if spec.containers.is_empty() {
        return Err(KubeError::MalformedInput(
            "cannot change volumes of a template without containers".to_string(),
        ));
    }

    for (path, claim) in &changes.unmount {
        unmount(spec, path, claim)?;
    }
    for (path, claim) in &changes.mount {
        mount(spec, path, claim)?;
    }
    Ok(())
}

fn mount(spec: &mut PodSpec, path: &str, claim: &str) -> Result<()> {
    let container = &mut spec.containers[0];
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    if mounts.iter().any(|m| m.mount_path == path) {
        return Err(KubeError::MalformedInput(format!(
            "path '{}' is already mounted in container '{}'",
            path, container.name
        )));
    }

    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    let name = match volumes.iter().find(|v| claim_of(v) == Some(claim)) {
        Some(existing) => existing.name.clone(),
        None => {
            let name = claim_volume_name(claim);
            volumes.push(claim_volume(&name, claim));
            name
        }
    };

    tracing::debug!(path, claim, volume = %name, "mounting claim");
    mounts.push(VolumeMount {
        name,
        mount_path: path.to_string(),
        ..Default::default()
    });
    Ok(())
}

fn unmount(spec: &mut PodSpec, path: &str, claim: &str) -> Result<()> {
    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    let backing: Vec<&Volume> = volumes.iter().filter(|v| claim_of(v) == Some(claim)).collect();
    let [volume] = backing.as_slice() else {
        return Err(KubeError::MalformedInput(format!(
            "claim '{}' must back exactly one volume, found {}",
            claim,
            backing.len()
        )));
    };
    let name = volume.name.clone();

    let container = &mut spec.containers[0];
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    if !mounts.iter().any(|m| m.name == name && m.mount_path == path) {
        return Err(KubeError::MalformedInput(format!(
            "claim '{}' is not mounted at '{}'",
            claim, path
        )));
    }

    tracing::debug!(path, claim, volume = %name, "unmounting claim");
    strip_volume(spec, &name);
    Ok(())
}

/// Remove a volume and every mount of it in every container
fn strip_volume(spec: &mut PodSpec, name: &str) {
    if let Some(volumes) = spec.volumes.as_mut() {
        volumes.retain(|v| v.name != name);
    }
    let containers = spec
        .containers
        .iter_mut()
        .chain(spec.init_containers.iter_mut().flatten());
    for container in containers {
        if let Some(mounts) = container.volume_mounts.as_mut() {
            mounts.retain(|m| m.name != name);
        }
    }
}

/// Remove the volume backed by `claim` from a live deployment
///
/// Concurrent removals of the same claim are expected, so conflicts are
/// retried with linear backoff up to `retry.max_attempts`. Returns `false`
/// when the claim was not referenced.
pub async fn remove_claim_volume<S>(
    deployments: &S,
    name: &str,
    claim: &str,
    retry: &RetryPolicy,
) -> Result<bool>
where
    S: ObjectSession<Deployment> + ?Sized,
{
    let mut attempt = 1;
    loop {
        let mut deployment = deployments.get(name).await?;
        let Some(spec) = deployment
            .spec
            .as_mut()
            .and_then(|s| s.template.spec.as_mut())
        else {
            return Ok(false);
        };

        let Some(volume) = spec
            .volumes
            .iter()
            .flatten()
            .find(|v| claim_of(v) == Some(claim))
            .map(|v| v.name.clone())
        else {
            tracing::debug!(deployment = name, claim, "claim not referenced, nothing to remove");
            return Ok(false);
        };
        strip_volume(spec, &volume);

        match deployments.update(&deployment).await {
            Ok(_) => {
                tracing::info!(deployment = name, claim, "removed claim volume");
                return Ok(true);
            }
            Err(e) if e.is_conflict() && attempt < retry.max_attempts => {
                let delay = retry.delay_for(attempt);
                tracing::warn!(
                    deployment = name,
                    claim,
                    attempt,
                    ?delay,
                    "conflict removing claim volume, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockObjects;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::Container;
    use kube::api::ObjectMeta;
    use std::time::Duration;

    fn template_with_claim() -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    volume_mounts: Some(vec![VolumeMount {
                        name: "data-volume".to_string(),
                        mount_path: "/data".to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                volumes: Some(vec![claim_volume("data-volume", "data")]),
                ..Default::default()
            }),
        }
    }

    fn deployment(template: PodTemplateSpec) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("app".to_string()),
                namespace: Some("dev".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template,
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn test_mount_and_unmount() {
        let mut template = template_with_claim();
        let mut changes = VolumeChanges::default();
        changes.mount.insert("/cache".to_string(), "cache".to_string());
        changes.unmount.insert("/data".to_string(), "data".to_string());

        apply_volume_changes(&mut template, &changes).unwrap();

        let spec = template.spec.unwrap();
        let volumes: Vec<&str> = spec.volumes.iter().flatten().map(|v| v.name.as_str()).collect();
        assert_eq!(volumes, ["cache-volume"]);
        let mounts = spec.containers[0].volume_mounts.clone().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].mount_path, "/cache");
    }

    #[test]
    fn test_mount_on_used_path_fails() {
        let mut template = template_with_claim();
        let mut changes = VolumeChanges::default();
        changes.mount.insert("/data".to_string(), "other".to_string());

        let err = apply_volume_changes(&mut template, &changes).unwrap_err();
        assert!(matches!(err, KubeError::MalformedInput(_)));
    }

    #[test]
    fn test_unmount_unknown_claim_fails() {
        let mut template = template_with_claim();
        let mut changes = VolumeChanges::default();
        changes.unmount.insert("/data".to_string(), "missing".to_string());

        assert!(apply_volume_changes(&mut template, &changes).is_err());
    }

    #[tokio::test]
    async fn test_remove_claim_volume_retries_conflicts() {
        let deployments = MockObjects::<Deployment>::namespaced("dev");
        deployments.insert(deployment(template_with_claim()));
        deployments.fail_updates_with_conflict(2);

        let retry = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        };
        assert!(remove_claim_volume(&deployments, "app", "data", &retry).await.unwrap());

        let counts = deployments.operation_counts();
        assert_eq!(counts.gets, 3);
        assert_eq!(counts.updates, 3);

        let stored = deployments.object("app").unwrap();
        let spec = stored.spec.unwrap().template.spec.unwrap();
        assert!(spec.volumes.unwrap_or_default().is_empty());
        assert!(spec.containers[0].volume_mounts.clone().unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_remove_claim_volume_gives_up() {
        let deployments = MockObjects::<Deployment>::namespaced("dev");
        deployments.insert(deployment(template_with_claim()));
        deployments.fail_updates_with_conflict(5);

        let retry = RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        };
        let err = remove_claim_volume(&deployments, "app", "data", &retry)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(deployments.operation_counts().updates, 2);
    }

    #[tokio::test]
    async fn test_remove_unreferenced_claim_is_noop() {
        let deployments = MockObjects::<Deployment>::namespaced("dev");
        deployments.insert(deployment(template_with_claim()));

        let removed = remove_claim_volume(&deployments, "app", "nope", &RetryPolicy::default())
            .await
            .unwrap();
        assert!(!removed);
        assert_eq!(deployments.operation_counts().updates, 0);
    }
}
