//! Apply command - converge a live deployment onto a manifest

use console::style;
use k8s_openapi::api::apps::v1::Deployment;
use std::path::Path;
use stevedore_core::Config;
use stevedore_kube::{
    CompletionPredicate, DeploymentReconciler, KubeObjects, MergePolicy, ReconcileOutcome,
    revision_reached, rollout_complete, strip_bootstrap,
};

use crate::error::Result;

/// Run the apply command
pub async fn run(
    namespace: &str,
    config: &Config,
    file: &Path,
    image_driven: bool,
    strip: bool,
    component: Option<String>,
    revision_only: bool,
) -> Result<()> {
    let desired = super::load_deployment(file)?;
    let name = desired.metadata.name.clone().unwrap_or_default();
    let namespace = desired.metadata.namespace.clone().unwrap_or_else(|| namespace.to_string());

    let mut policy = MergePolicy {
        image_driven,
        ..Default::default()
    };
    if strip {
        let component = component.unwrap_or_else(|| name.clone());
        policy = policy.with_transform(move |template| strip_bootstrap(template, &component));
    }
    let completion: CompletionPredicate = if revision_only {
        revision_reached
    } else {
        rollout_complete
    };

    let client = super::connect().await?;
    let deployments = KubeObjects::<Deployment>::namespaced(client, &namespace);
    let reconciler = DeploymentReconciler::new(deployments, config);

    println!(
        "{} Applying deployment {} in {}",
        style("→").blue().bold(),
        style(&name).cyan(),
        style(&namespace).yellow()
    );

    match reconciler.reconcile(desired, &policy, completion).await? {
        ReconcileOutcome::Unchanged => {
            println!("{} Pod template unchanged, no rollout", style("✓").green());
        }
        ReconcileOutcome::RolledOut { revision } => {
            println!(
                "{} Rolled out revision {}",
                style("✓").green().bold(),
                style(revision).yellow()
            );
        }
    }

    Ok(())
}
