//! Bootstrap command - prepare a deployment manifest for in-place redeploys

use std::path::Path;
use stevedore_core::{Config, ImageRef, SourceKind};
use stevedore_kube::{BuilderImages, KubeImages, SupervisordBootstrapper, app_root_claim};

use crate::error::{CliError, Result};

/// Run the bootstrap command
///
/// Prints the transformed manifest, followed by the app-root claim when
/// `with_claim` is set.
pub async fn run(
    config: &Config,
    file: &Path,
    component: &str,
    builder_image: &str,
    source: SourceKind,
    with_claim: bool,
) -> Result<()> {
    let mut deployment = super::load_deployment(file)?;
    let image = ImageRef::parse(builder_image)?;

    let client = super::connect().await?;
    let metadata = KubeImages::new(client).metadata(&image).await?;

    let bootstrapper = SupervisordBootstrapper::new(config);
    let spec = deployment
        .spec
        .as_mut()
        .ok_or_else(|| CliError::input(format!("{} has no spec", file.display())))?;
    let template = std::mem::take(&mut spec.template);
    spec.template = bootstrapper.bootstrap(template, component, &metadata, source)?;
    tracing::info!(component, image = %image, %source, "deployment bootstrapped");

    let yaml = serde_yaml::to_string(&deployment).map_err(|e| CliError::Other {
        message: e.to_string(),
    })?;
    print!("{}", yaml);

    if with_claim {
        let labels = deployment.metadata.labels.clone().unwrap_or_default();
        let claim = serde_yaml::to_string(&app_root_claim(component, &labels)).map_err(|e| {
            CliError::Other {
                message: e.to_string(),
            }
        })?;
        println!("---");
        print!("{}", claim);
    }

    Ok(())
}
