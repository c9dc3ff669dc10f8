//! Rollout completion predicates
//!
//! The revision counter of a Deployment is owned by the cluster and read from
//! the `deployment.kubernetes.io/revision` annotation.

use k8s_openapi::api::apps::v1::Deployment;

/// Annotation carrying the deployment revision counter
pub const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// Caller-supplied rollout completion predicate: `(observed, target_revision)`
pub type CompletionPredicate = fn(&Deployment, i64) -> bool;

/// Revision counter of a deployment, 0 when not yet assigned
pub fn revision(deployment: &Deployment) -> i64 {
    deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(REVISION_ANNOTATION))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// The deployment reached (or passed) the target revision
pub fn revision_reached(deployment: &Deployment, target: i64) -> bool {
    revision(deployment) >= target
}

/// The target revision is fully rolled out
///
/// Besides the revision, the controller must have observed the latest
/// generation and every desired replica must be updated and available.
pub fn rollout_complete(deployment: &Deployment, target: i64) -> bool {
    if !revision_reached(deployment, target) {
        return false;
    }

    let generation = deployment.metadata.generation.unwrap_or(0);
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);

    let Some(status) = deployment.status.as_ref() else {
        return false;
    };

    let observed = status.observed_generation.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    let total = status.replicas.unwrap_or(0);

    observed >= generation && updated == desired && available == desired && total == desired
}
