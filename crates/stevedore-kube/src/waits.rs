//! Specialised waits built on [`await_condition`]
//!
//! Each wait differs only in its selector and condition. Deadlines come from
//! the resolved [`Timeouts`](stevedore_core::Timeouts).

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Secret};
use std::time::Duration;

use crate::conditions::CompletionPredicate;
use crate::error::{KubeError, Result};
use crate::openshift::{Build, Project};
use crate::resource::Selector;
use crate::session::{EventType, ObjectSession};
use crate::watch::{Verdict, await_condition};

/// Pod phases a pod never leaves
pub const TERMINAL_POD_PHASES: &[&str] = &["Failed", "Unknown"];

/// Build phases signalling failure
pub const FAILED_BUILD_PHASES: &[&str] = &["Failed", "Cancelled", "Error"];

/// Wait until `predicate(observed, target_revision)` holds for a deployment
pub async fn wait_for_rollout<S>(
    deployments: &S,
    name: &str,
    target_revision: i64,
    predicate: CompletionPredicate,
    timeout: Duration,
) -> Result<Deployment>
where
    S: ObjectSession<Deployment> + ?Sized,
{
    tracing::info!(deployment = name, target_revision, "waiting for rollout");
    await_condition(
        deployments,
        &Selector::by_name(name),
        move |event: EventType, d: &Deployment| {
            if event == EventType::Deleted {
                Verdict::Failed("Deleted".to_string())
            } else if predicate(d, target_revision) {
                Verdict::Done
            } else {
                Verdict::Pending
            }
        },
        timeout,
    )
    .await
}

/// Wait until a pod matching `labels` reaches `phase`
///
/// `Failed` and `Unknown` are terminal and cannot be waited for.
pub async fn wait_for_pod<S>(pods: &S, labels: &str, phase: &str, timeout: Duration) -> Result<Pod>
where
    S: ObjectSession<Pod> + ?Sized,
{
    if TERMINAL_POD_PHASES.contains(&phase) {
        return Err(KubeError::MalformedInput(format!(
            "cannot wait for pod phase '{}'",
            phase
        )));
    }
    if labels.trim().is_empty() {
        return Err(KubeError::MalformedInput(
            "pod selector must not be blank".to_string(),
        ));
    }

    let wanted = phase.to_string();
    tracing::info!(selector = labels, phase, "waiting for pod");
    await_condition(
        pods,
        &Selector::by_labels(labels),
        move |event: EventType, pod: &Pod| {
            if event == EventType::Deleted {
                return Verdict::Failed("Deleted".to_string());
            }
            let current = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .unwrap_or_default();
            if current == wanted {
                Verdict::Done
            } else if TERMINAL_POD_PHASES.contains(&current) {
                Verdict::Failed(current.to_string())
            } else {
                Verdict::Pending
            }
        },
        timeout,
    )
    .await
}

/// Wait for a build to complete
pub async fn wait_for_build<S>(builds: &S, name: &str, timeout: Duration) -> Result<Build>
where
    S: ObjectSession<Build> + ?Sized,
{
    tracing::info!(build = name, "waiting for build to finish");
    await_condition(
        builds,
        &Selector::by_name(name),
        |event: EventType, build: &Build| match build.phase() {
            _ if event == EventType::Deleted => Verdict::Failed("Deleted".to_string()),
            "Complete" => Verdict::Done,
            phase if FAILED_BUILD_PHASES.contains(&phase) => Verdict::Failed(phase.to_string()),
            _ => Verdict::Pending,
        },
        timeout,
    )
    .await
}

/// Wait for a secret to exist
pub async fn wait_for_secret<S>(secrets: &S, name: &str, timeout: Duration) -> Result<Secret>
where
    S: ObjectSession<Secret> + ?Sized,
{
    await_condition(
        secrets,
        &Selector::by_name(name),
        |event: EventType, _: &Secret| match event {
            EventType::Added | EventType::Modified => Verdict::Done,
            _ => Verdict::Pending,
        },
        timeout,
    )
    .await
}

/// Wait until a project is gone
pub async fn wait_for_project_deletion<S>(projects: &S, name: &str, timeout: Duration) -> Result<()>
where
    S: ObjectSession<Project> + ?Sized,
{
    tracing::info!(project = name, "waiting for project deletion");
    await_condition(
        projects,
        &Selector::by_name(name),
        |event: EventType, _: &Project| match event {
            EventType::Deleted => Verdict::Done,
            _ => Verdict::Pending,
        },
        timeout,
    )
    .await
    .map(|_| ())
}
