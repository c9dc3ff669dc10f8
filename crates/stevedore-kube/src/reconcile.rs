//! Deployment reconciliation
//!
//! Converges a live Deployment onto a freshly generated one:
//!
//! 1. Fetch the live object (absence is a hard error)
//! 2. Merge: carry live-only volumes and mounts into the new template
//! 3. Transform: optional caller-supplied template mutation
//! 4. Volume sync: requested mounts and unmounts, all or nothing
//! 5. Apply: replace template, annotations and labels, then update
//! 6. Decide: image-driven changes trigger a rollout; otherwise an unchanged
//!    template ends the reconcile without waiting
//! 7. Wait: for `pre-update revision + 1` to satisfy the completion predicate
//!
//! The update does not carry a resource-version precondition. A concurrent
//! writer between fetch and apply is overwritten.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use std::fmt;
use std::time::Duration;
use stevedore_core::Config;

use crate::conditions::{CompletionPredicate, REVISION_ANNOTATION, revision};
use crate::error::{KubeError, Result};
use crate::session::{ObjectSession, Rollouts};
use crate::template::{MergePlan, TemplateFingerprint, template_of};
use crate::volumes::{VolumeChanges, apply_volume_changes};
use crate::waits::wait_for_rollout;

/// Template mutation applied after the merge
pub type TemplateTransform = Box<dyn Fn(&mut PodTemplateSpec) -> Result<()> + Send + Sync>;

/// How the new spec is merged and whether a rollout is forced
#[derive(Default)]
pub struct MergePolicy {
    /// A new image will be pushed asynchronously; always start a rollout
    pub image_driven: bool,

    /// Storage attach and detach applied to the merged template
    pub volumes: VolumeChanges,

    /// Optional mutation, e.g. stripping the supervisord bootstrap
    pub transform: Option<TemplateTransform>,
}

impl MergePolicy {
    pub fn image_driven() -> Self {
        Self {
            image_driven: true,
            ..Default::default()
        }
    }

    pub fn with_transform(
        mut self,
        transform: impl Fn(&mut PodTemplateSpec) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn with_volumes(mut self, volumes: VolumeChanges) -> Self {
        self.volumes = volumes;
        self
    }
}

impl fmt::Debug for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergePolicy")
            .field("image_driven", &self.image_driven)
            .field("volumes", &self.volumes)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// How a reconcile ended
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The template did not change, no rollout will happen
    Unchanged,
    /// A rollout reached the target revision
    RolledOut { revision: i64 },
}

/// Merges, applies and awaits deployment updates
pub struct DeploymentReconciler<S> {
    deployments: S,
    rollout_timeout: Duration,
}

impl<S> DeploymentReconciler<S>
where
    S: ObjectSession<Deployment> + Rollouts,
{
    pub fn new(deployments: S, config: &Config) -> Self {
        Self {
            deployments,
            rollout_timeout: config.timeouts.rollout,
        }
    }

    pub fn deployments(&self) -> &S {
        &self.deployments
    }

    /// Converge the live deployment named like `desired` onto it
    pub async fn reconcile(
        &self,
        desired: Deployment,
        policy: &MergePolicy,
        completion: CompletionPredicate,
    ) -> Result<ReconcileOutcome> {
        let name = desired
            .metadata
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| KubeError::MalformedInput("deployment name must not be blank".to_string()))?;

        // Fetch
        let live = self.deployments.get(&name).await?;
        let live_template = template_of(&live);
        let pre_revision = revision(&live);

        // Merge
        let mut template = template_of(&desired);
        let plan = MergePlan::compute(&live_template, &template);
        if !plan.is_empty() {
            tracing::debug!(
                deployment = %name,
                volumes = plan.volumes.len(),
                mounts = plan.volume_mounts.len(),
                "carrying live volumes forward"
            );
        }
        plan.apply_to(&mut template);

        // OptionalTransform
        if let Some(transform) = &policy.transform {
            transform(&mut template)?;
        }

        // VolumeSync
        apply_volume_changes(&mut template, &policy.volumes)?;

        // Apply
        let updated = self
            .deployments
            .update(&replace_template(live, desired, template))
            .await?;
        tracing::info!(deployment = %name, "applied deployment update");

        // Decide
        if policy.image_driven {
            tracing::info!(deployment = %name, "image-driven change, starting rollout");
            self.deployments.trigger_rollout(&name).await?;
        } else if TemplateFingerprint::of(&live_template) == TemplateFingerprint::of_deployment(&updated) {
            tracing::info!(deployment = %name, "template unchanged, no rollout to wait for");
            return Ok(ReconcileOutcome::Unchanged);
        }

        // Wait
        let observed = wait_for_rollout(
            &self.deployments,
            &name,
            pre_revision + 1,
            completion,
            self.rollout_timeout,
        )
        .await?;

        Ok(ReconcileOutcome::RolledOut {
            revision: revision(&observed),
        })
    }
}

/// Live object with template, annotations and labels taken from `desired`
///
/// The controller-owned revision annotation is kept.
fn replace_template(mut live: Deployment, desired: Deployment, template: PodTemplateSpec) -> Deployment {
    let live_revision = live
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(REVISION_ANNOTATION))
        .cloned();

    let mut annotations = desired.metadata.annotations.unwrap_or_default();
    if let Some(rev) = live_revision {
        annotations.entry(REVISION_ANNOTATION.to_string()).or_insert(rev);
    }
    live.metadata.annotations = Some(annotations);
    live.metadata.labels = desired.metadata.labels;

    live.spec.get_or_insert_with(DeploymentSpec::default).template = template;
    live
}
