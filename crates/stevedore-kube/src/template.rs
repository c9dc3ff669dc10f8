//! Pod template comparison and merge planning
//!
//! Two deployment specs are compared through a [`TemplateFingerprint`]: the
//! sub-document this engine controls (containers, init containers, volumes).
//! Metadata, annotations and server-populated fields are left out so that
//! unrelated drift never forces a rollout wait.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, Volume,
    VolumeMount,
};

/// Reserved shared volume carrying the supervisord runtime
///
/// Never carried forward by a merge: it is either freshly added by the
/// bootstrapper or intentionally removed.
pub const BOOTSTRAP_VOLUME: &str = "odo-supervisord-shared-data";

/// Controlled fields of one container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerFingerprint {
    pub name: String,
    pub image: Option<String>,
    pub command: Option<Vec<String>>,
    pub args: Option<Vec<String>>,
    pub env: Vec<EnvVar>,
    pub ports: Vec<ContainerPort>,
    pub volume_mounts: Vec<VolumeMount>,
    pub resources: Option<ResourceRequirements>,
}

impl From<&Container> for ContainerFingerprint {
    fn from(c: &Container) -> Self {
        Self {
            name: c.name.clone(),
            image: c.image.clone(),
            command: c.command.clone(),
            args: c.args.clone(),
            env: c.env.clone().unwrap_or_default(),
            ports: c.ports.clone().unwrap_or_default(),
            volume_mounts: c.volume_mounts.clone().unwrap_or_default(),
            resources: c.resources.clone(),
        }
    }
}

/// Controlled sub-document of a pod template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateFingerprint {
    pub containers: Vec<ContainerFingerprint>,
    pub init_containers: Vec<ContainerFingerprint>,
    pub volumes: Vec<Volume>,
}

impl TemplateFingerprint {
    pub fn of(template: &PodTemplateSpec) -> Self {
        let Some(spec) = template.spec.as_ref() else {
            return Self::default();
        };
        Self {
            containers: spec.containers.iter().map(Into::into).collect(),
            init_containers: spec
                .init_containers
                .iter()
                .flatten()
                .map(Into::into)
                .collect(),
            volumes: spec.volumes.clone().unwrap_or_default(),
        }
    }

    pub fn of_deployment(deployment: &Deployment) -> Self {
        deployment
            .spec
            .as_ref()
            .map(|s| Self::of(&s.template))
            .unwrap_or_default()
    }
}

/// Pod template of a deployment, empty when unset
pub fn template_of(deployment: &Deployment) -> PodTemplateSpec {
    deployment
        .spec
        .as_ref()
        .map(|s| s.template.clone())
        .unwrap_or_default()
}

/// Pod spec of a template, created empty on first access
pub fn pod_spec_mut(template: &mut PodTemplateSpec) -> &mut PodSpec {
    template.spec.get_or_insert_with(PodSpec::default)
}

/// Live-only volumes and mounts carried into a freshly generated template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    pub volumes: Vec<Volume>,
    pub volume_mounts: Vec<VolumeMount>,
}

impl MergePlan {
    /// Entries of `live` absent by name from `new`, bootstrap volume excluded
    ///
    /// Mounts are read from the live container named like the new template's
    /// first container, falling back to the live template's first container
    /// when no name matches.
    pub fn compute(live: &PodTemplateSpec, new: &PodTemplateSpec) -> Self {
        let live_spec = live.spec.as_ref();
        let new_spec = new.spec.as_ref();

        let new_volumes: Vec<&str> = new_spec
            .and_then(|s| s.volumes.as_ref())
            .into_iter()
            .flatten()
            .map(|v| v.name.as_str())
            .collect();

        let volumes = live_spec
            .and_then(|s| s.volumes.as_ref())
            .into_iter()
            .flatten()
            .filter(|v| v.name != BOOTSTRAP_VOLUME && !new_volumes.contains(&v.name.as_str()))
            .cloned()
            .collect();

        let new_container = new_spec.and_then(|s| s.containers.first());
        let live_container = live_spec.and_then(|s| {
            new_container
                .and_then(|n| s.containers.iter().find(|c| c.name == n.name))
                .or_else(|| s.containers.first())
        });
        let mounts_of = |c: Option<&Container>| -> Vec<VolumeMount> {
            c.and_then(|c| c.volume_mounts.clone()).unwrap_or_default()
        };

        let new_mounts = mounts_of(new_container);
        let volume_mounts = mounts_of(live_container)
            .into_iter()
            .filter(|m| m.name != BOOTSTRAP_VOLUME && !new_mounts.iter().any(|n| n.name == m.name))
            .collect();

        Self {
            volumes,
            volume_mounts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty() && self.volume_mounts.is_empty()
    }

    /// Append the carried entries after the new template's own
    pub fn apply_to(&self, template: &mut PodTemplateSpec) {
        let spec = pod_spec_mut(template);
        if !self.volumes.is_empty() {
            spec.volumes
                .get_or_insert_with(Vec::new)
                .extend(self.volumes.iter().cloned());
        }
        if !self.volume_mounts.is_empty()
            && let Some(container) = spec.containers.first_mut()
        {
            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .extend(self.volume_mounts.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(name: &str) -> Volume {
        Volume {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn mount(name: &str, path: &str) -> VolumeMount {
        VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            ..Default::default()
        }
    }

    fn template(volumes: &[&str], mounts: &[(&str, &str)]) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    image: Some("app:latest".to_string()),
                    volume_mounts: Some(mounts.iter().map(|(n, p)| mount(n, p)).collect()),
                    ..Default::default()
                }],
                volumes: Some(volumes.iter().map(|n| volume(n)).collect()),
                ..Default::default()
            }),
        }
    }

    fn volume_names(t: &PodTemplateSpec) -> Vec<String> {
        TemplateFingerprint::of(t)
            .volumes
            .into_iter()
            .map(|v| v.name)
            .collect()
    }

    #[test]
    fn test_merge_carries_user_volumes_only() {
        let live = template(
            &["A", "B", BOOTSTRAP_VOLUME],
            &[("A", "/a"), ("B", "/b"), (BOOTSTRAP_VOLUME, "/opt/odo/")],
        );
        let mut new = template(&["A", "C"], &[("A", "/a2"), ("C", "/c")]);

        let plan = MergePlan::compute(&live, &new);
        plan.apply_to(&mut new);

        assert_eq!(volume_names(&new), ["A", "C", "B"]);
        let mounts = &TemplateFingerprint::of(&new).containers[0].volume_mounts;
        let mounted: Vec<(&str, &str)> = mounts
            .iter()
            .map(|m| (m.name.as_str(), m.mount_path.as_str()))
            .collect();
        assert_eq!(mounted, [("A", "/a2"), ("C", "/c"), ("B", "/b")]);
    }

    #[test]
    fn test_merge_reads_mounts_from_the_matching_container() {
        let mut live = template(&["A", "data"], &[("A", "/a")]);
        let sidecar = Container {
            name: "proxy".to_string(),
            volume_mounts: Some(vec![mount("proxy-cache", "/cache")]),
            ..Default::default()
        };
        let mut app = pod_spec_mut(&mut live).containers.remove(0);
        app.volume_mounts
            .get_or_insert_with(Vec::new)
            .push(mount("data", "/data"));
        pod_spec_mut(&mut live).containers = vec![sidecar, app];

        let new = template(&["A"], &[("A", "/a")]);
        let plan = MergePlan::compute(&live, &new);

        assert_eq!(plan.volumes, [volume("data")]);
        assert_eq!(plan.volume_mounts, [mount("data", "/data")]);
    }

    #[test]
    fn test_merge_of_identical_templates_is_empty() {
        let live = template(&["A"], &[("A", "/a")]);
        let new = live.clone();
        assert!(MergePlan::compute(&live, &new).is_empty());
    }

    #[test]
    fn test_fingerprint_ignores_metadata() {
        let a = template(&["A"], &[("A", "/a")]);
        let mut b = a.clone();
        b.metadata = Some(kube::api::ObjectMeta {
            annotations: Some([("touched".to_string(), "now".to_string())].into()),
            ..Default::default()
        });
        assert_eq!(TemplateFingerprint::of(&a), TemplateFingerprint::of(&b));

        let mut c = a.clone();
        pod_spec_mut(&mut c).containers[0].image = Some("app:v2".to_string());
        assert_ne!(TemplateFingerprint::of(&a), TemplateFingerprint::of(&c));
    }
}
