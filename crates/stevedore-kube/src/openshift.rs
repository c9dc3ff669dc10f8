//! OpenShift resource kinds watched by the engine
//!
//! Only the fields the waits read are typed; the rest of each spec is kept
//! verbatim so objects survive a get/update round trip.

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::{Kinded, ResourceKind};

/// `build.openshift.io/v1` Build
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[kube(
    group = "build.openshift.io",
    version = "v1",
    kind = "Build",
    namespaced,
    status = "BuildStatus",
    schema = "disabled"
)]
pub struct BuildSpec {
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildStatus {
    /// New, Pending, Running, Complete, Failed, Error or Cancelled
    #[serde(default)]
    pub phase: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `project.openshift.io/v1` Project (cluster scoped)
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[kube(
    group = "project.openshift.io",
    version = "v1",
    kind = "Project",
    status = "ProjectStatus",
    schema = "disabled"
)]
pub struct ProjectSpec {
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectStatus {
    /// Active or Terminating
    #[serde(default)]
    pub phase: String,
}

impl Kinded for Build {
    const KIND: ResourceKind = ResourceKind::Build;

    fn object_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

impl Kinded for Project {
    const KIND: ResourceKind = ResourceKind::Project;

    fn object_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

impl Build {
    /// Current phase, empty until the build controller reports one
    pub fn phase(&self) -> &str {
        self.status.as_ref().map(|s| s.phase.as_str()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_build_round_trip_keeps_unknown_fields() {
        let json = serde_json::json!({
            "apiVersion": "build.openshift.io/v1",
            "kind": "Build",
            "metadata": { "name": "app-1", "namespace": "dev" },
            "spec": { "strategy": { "type": "Source" } },
            "status": { "phase": "Running" }
        });

        let build: Build = serde_json::from_value(json).unwrap();
        assert_eq!(build.phase(), "Running");
        assert_eq!(build.object_name(), "app-1");
        assert!(build.spec.fields.contains_key("strategy"));

        let back = serde_json::to_value(&build).unwrap();
        assert_eq!(back["spec"]["strategy"]["type"], "Source");
    }

    #[test]
    fn test_api_groups() {
        assert_eq!(Build::group(&()), "build.openshift.io");
        assert_eq!(Project::plural(&()), "projects");
    }
}
