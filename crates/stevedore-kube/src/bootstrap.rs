//! Supervisord bootstrap
//!
//! Augments a single-container pod template so an unmodified builder image
//! can run under supervisord and receive pushed sources:
//! - an init container seeding the shared volume with the supervisord runtime
//! - an init container copying the image's application root into a claim
//! - the shared volume, the application-root volume and their mounts
//! - environment variables describing the builder image's staging paths

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PodTemplateSpec, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use stevedore_core::builder::DEFAULT_APP_ROOT_DIR;
use stevedore_core::paths::is_sub_dir;
use stevedore_core::{BuilderMetadata, BuilderPaths, Config, ScriptsProtocol, SourceKind};

use crate::env::{env_var, remove_env, upsert_env};
use crate::error::{KubeError, Result};
use crate::template::{BOOTSTRAP_VOLUME, pod_spec_mut};
use crate::volumes::claim_volume;

pub const ENV_SCRIPTS_URL: &str = "ODO_S2I_SCRIPTS_URL";
pub const ENV_SCRIPTS_PROTOCOL: &str = "ODO_S2I_SCRIPTS_PROTOCOL";
pub const ENV_SRC_BIN_PATH: &str = "ODO_S2I_SRC_BIN_PATH";
pub const ENV_DEPLOYMENT_DIR: &str = "ODO_S2I_DEPLOYMENT_DIR";
pub const ENV_WORKING_DIR: &str = "ODO_S2I_WORKING_DIR";
pub const ENV_BUILDER_IMAGE: &str = "ODO_S2I_BUILDER_IMG";
pub const ENV_SRC_BACKUP_DIR: &str = "ODO_SRC_BACKUP_DIR";

/// Init container copying supervisord into the shared volume
pub const SUPERVISORD_INIT_CONTAINER: &str = "copy-supervisord";

/// Init container copying the image's application root into the data claim
pub const COPY_FILES_INIT_CONTAINER: &str = "copy-files-to-volume";

/// Where the shared volume is mounted
pub const SUPERVISORD_MOUNT_PATH: &str = "/opt/odo/";

/// Sub-path of the data claim holding the deployment output directory
pub const DEPLOYMENT_DIR_SUB_PATH: &str = "deployment";

/// Size of the application-root claim
pub const APP_ROOT_CLAIM_SIZE: &str = "1Gi";

/// Name of the application-root volume (and claim) of a component
pub fn app_root_volume_name(component: &str) -> String {
    format!("{}-s2idata", component)
}

/// Pod template transformation adding the supervisord runtime
#[derive(Debug, Clone)]
pub struct SupervisordBootstrapper {
    bootstrap_image: String,
}

impl SupervisordBootstrapper {
    pub fn new(config: &Config) -> Self {
        Self {
            bootstrap_image: config.bootstrap_image.clone(),
        }
    }

    pub fn bootstrap_image(&self) -> &str {
        &self.bootstrap_image
    }

    /// Bootstrap `template` for `component` built from an image with `metadata`
    ///
    /// The template must have exactly one container. Entries this step adds
    /// replace same-named entries already present, so bootstrapping twice
    /// yields the same template.
    pub fn bootstrap(
        &self,
        mut template: PodTemplateSpec,
        component: &str,
        metadata: &BuilderMetadata,
        source: SourceKind,
    ) -> Result<PodTemplateSpec> {
        if component.trim().is_empty() {
            return Err(KubeError::MalformedInput(
                "component name must not be blank".to_string(),
            ));
        }

        let paths = metadata
            .paths()
            .map_err(|e| KubeError::MalformedInput(e.to_string()))?;

        let spec = pod_spec_mut(&mut template);
        let count = spec.containers.len();
        let [container] = spec.containers.as_mut_slice() else {
            return Err(KubeError::MalformedInput(format!(
                "component '{}' must have exactly one container, found {}",
                component, count
            )));
        };
        let app_image = container.image.clone().ok_or_else(|| {
            KubeError::MalformedInput(format!("container '{}' has no image", container.name))
        })?;

        let env = container.env.get_or_insert_with(Vec::new);
        upsert_env(env, builder_env(&paths));
        if source == SourceKind::Local {
            upsert_env(env, [env_var(ENV_SRC_BACKUP_DIR, &paths.src_backup_path)]);
        }

        let data_volume = app_root_volume_name(component);
        let mut mounts = vec![
            mount(BOOTSTRAP_VOLUME, SUPERVISORD_MOUNT_PATH, None),
            mount(&data_volume, DEFAULT_APP_ROOT_DIR, None),
        ];
        if !paths.deployment_dir.is_empty() && !is_sub_dir(DEFAULT_APP_ROOT_DIR, &paths.deployment_dir)
        {
            mounts.push(mount(
                &data_volume,
                &paths.deployment_dir,
                Some(DEPLOYMENT_DIR_SUB_PATH),
            ));
        }
        let container_mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        for m in mounts {
            container_mounts.retain(|existing| existing.mount_path != m.mount_path);
            container_mounts.push(m);
        }

        let init = spec.init_containers.get_or_insert_with(Vec::new);
        upsert_named(
            init,
            Container {
                name: COPY_FILES_INIT_CONTAINER.to_string(),
                image: Some(app_image),
                command: Some(vec![COPY_FILES_INIT_CONTAINER.to_string()]),
                args: Some(vec!["/opt/app-root".to_string(), "/mnt/app-root".to_string()]),
                volume_mounts: Some(vec![mount(&data_volume, "/mnt", None)]),
                ..Default::default()
            },
            |c| &c.name,
        );
        upsert_named(
            init,
            Container {
                name: SUPERVISORD_INIT_CONTAINER.to_string(),
                image: Some(self.bootstrap_image.clone()),
                command: Some(vec!["/usr/bin/cp".to_string()]),
                args: Some(vec![
                    "-r".to_string(),
                    "/opt/odo-init/.".to_string(),
                    SUPERVISORD_MOUNT_PATH.to_string(),
                ]),
                volume_mounts: Some(vec![mount(BOOTSTRAP_VOLUME, SUPERVISORD_MOUNT_PATH, None)]),
                ..Default::default()
            },
            |c| &c.name,
        );

        let volumes = spec.volumes.get_or_insert_with(Vec::new);
        upsert_named(
            volumes,
            Volume {
                name: BOOTSTRAP_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
            |v| &v.name,
        );
        upsert_named(volumes, claim_volume(&data_volume, &data_volume), |v| &v.name);

        tracing::info!(
            component,
            image = %self.bootstrap_image,
            source = %source,
            "bootstrapped supervisord"
        );
        Ok(template)
    }
}

/// Staging-path variables handed to the assemble helper
fn builder_env(paths: &BuilderPaths) -> Vec<EnvVar> {
    let protocol = paths
        .scripts_protocol
        .as_ref()
        .map(ScriptsProtocol::as_str)
        .unwrap_or_default();
    vec![
        env_var(ENV_SCRIPTS_URL, &paths.scripts_path),
        env_var(ENV_SCRIPTS_PROTOCOL, protocol),
        env_var(ENV_SRC_BIN_PATH, &paths.src_or_bin_path),
        env_var(ENV_DEPLOYMENT_DIR, &paths.deployment_dir),
        env_var(ENV_WORKING_DIR, &paths.working_dir),
        env_var(ENV_BUILDER_IMAGE, &paths.builder_image_name),
    ]
}

fn mount(name: &str, path: &str, sub_path: Option<&str>) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        sub_path: sub_path.map(str::to_string),
        ..Default::default()
    }
}

fn upsert_named<T>(items: &mut Vec<T>, item: T, name: impl Fn(&T) -> &String) {
    match items.iter().position(|i| name(i) == name(&item)) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}

/// Switch the source-backup variable on for local sources, off otherwise
///
/// Used when an already bootstrapped component changes its source kind.
pub fn switch_source(template: &mut PodTemplateSpec, source: SourceKind) -> Result<()> {
    let spec = pod_spec_mut(template);
    let count = spec.containers.len();
    let [container] = spec.containers.as_mut_slice() else {
        return Err(KubeError::MalformedInput(format!(
            "expected exactly one container, found {}",
            count
        )));
    };
    let env = container.env.get_or_insert_with(Vec::new);
    if source == SourceKind::Local {
        upsert_env(
            env,
            [env_var(
                ENV_SRC_BACKUP_DIR,
                stevedore_core::builder::DEFAULT_SRC_BACKUP_DIR,
            )],
        );
    } else {
        remove_env(env, ENV_SRC_BACKUP_DIR);
    }
    Ok(())
}

/// Remove every trace of the bootstrap from `template`
///
/// Used when migrating a component to a repository build. Fails if the
/// application-root volume is absent.
pub fn strip_bootstrap(template: &mut PodTemplateSpec, component: &str) -> Result<()> {
    let data_volume = app_root_volume_name(component);
    let spec = pod_spec_mut(template);

    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    if !volumes.iter().any(|v| v.name == data_volume) {
        return Err(KubeError::MalformedInput(format!(
            "volume '{}' not found in component '{}'",
            data_volume, component
        )));
    }
    volumes.retain(|v| v.name != data_volume && v.name != BOOTSTRAP_VOLUME);

    for container in spec.containers.iter_mut() {
        if let Some(mounts) = container.volume_mounts.as_mut() {
            mounts.retain(|m| m.name != data_volume && m.name != BOOTSTRAP_VOLUME);
        }
    }
    if let Some(init) = spec.init_containers.as_mut() {
        init.retain(|c| c.name != COPY_FILES_INIT_CONTAINER && c.name != SUPERVISORD_INIT_CONTAINER);
    }

    tracing::debug!(component, "stripped supervisord bootstrap");
    Ok(())
}

/// Claim backing the application-root volume
pub fn app_root_claim(component: &str, labels: &BTreeMap<String, String>) -> PersistentVolumeClaim {
    let mut requests = BTreeMap::new();
    requests.insert(
        "storage".to_string(),
        Quantity(APP_ROOT_CLAIM_SIZE.to_string()),
    );

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(app_root_volume_name(component)),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}
