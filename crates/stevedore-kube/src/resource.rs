//! Resource references and watch selectors

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Secret};
use std::fmt;

/// Kinds of cluster objects this engine reads, mutates or watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deployment,
    Pod,
    Build,
    Secret,
    Project,
    ImageStreamTag,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Pod => "Pod",
            ResourceKind::Build => "Build",
            ResourceKind::Secret => "Secret",
            ResourceKind::Project => "Project",
            ResourceKind::ImageStreamTag => "ImageStreamTag",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static kind of a cluster object type
pub trait Kinded {
    const KIND: ResourceKind;

    /// Object name, empty when unset
    fn object_name(&self) -> &str;
}

macro_rules! kinded {
    ($ty:ty, $kind:expr) => {
        impl Kinded for $ty {
            const KIND: ResourceKind = $kind;

            fn object_name(&self) -> &str {
                self.metadata.name.as_deref().unwrap_or_default()
            }
        }
    };
}

kinded!(Deployment, ResourceKind::Deployment);
kinded!(Pod, ResourceKind::Pod);
kinded!(Secret, ResourceKind::Secret);

/// (kind, namespace, name) triple identifying a cluster object
///
/// When a watch targets a label selector rather than a single name, the name
/// is the bracketed selector, so messages still identify what was watched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceRef {
    /// Reference a namespaced object
    pub fn namespaced(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    /// Reference a cluster-scoped object
    pub fn cluster(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.to_string(),
        }
    }

    /// Reference whatever objects match a label selector
    pub fn selected(kind: ResourceKind, namespace: &str, labels: &str) -> Self {
        Self::namespaced(kind, namespace, &format!("[{}]", labels))
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Field and label selector scoping a watch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub fields: Option<String>,
    pub labels: Option<String>,
}

impl Selector {
    /// Select a single object by name
    pub fn by_name(name: &str) -> Self {
        Self {
            fields: Some(format!("metadata.name={}", name)),
            labels: None,
        }
    }

    /// Select by label selector expression
    pub fn by_labels(labels: &str) -> Self {
        Self {
            fields: None,
            labels: Some(labels.to_string()),
        }
    }

    /// Exact name from a `metadata.name=<name>` field selector
    pub fn name(&self) -> Option<&str> {
        self.fields
            .as_deref()?
            .split(',')
            .find_map(|term| term.strip_prefix("metadata.name="))
    }

    /// Whether an object with this name and labels is selected
    ///
    /// Only equality terms are understood, which is all this engine emits.
    pub fn matches<'a, I>(&self, name: &str, labels: I) -> bool
    where
        I: IntoIterator<Item = (&'a String, &'a String)> + Clone,
    {
        if let Some(wanted) = self.name()
            && wanted != name
        {
            return false;
        }

        let Some(expr) = self.labels.as_deref() else {
            return true;
        };

        expr.split(',').filter(|t| !t.trim().is_empty()).all(|term| {
            let Some((key, value)) = term.split_once('=') else {
                return false;
            };
            let (key, value) = (key.trim().trim_end_matches('='), value.trim());
            labels
                .clone()
                .into_iter()
                .any(|(k, v)| k == key && v == value)
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [self.fields.as_deref(), self.labels.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            f.write_str("<all>")
        } else {
            f.write_str(&parts.join(","))
        }
    }
}

/// Build a label selector expression from key/value pairs
pub fn labels_to_selector<'a, I>(labels: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut terms: Vec<String> = labels
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    terms.sort();
    terms.join(",")
}
