//! Builder-image metadata
//!
//! Source-to-image builder images describe, through image labels, where their
//! assemble scripts live and where they expect source or binaries to be staged.
//! [`BuilderMetadata::paths`] turns those labels into [`BuilderPaths`], the
//! values the remote assemble-and-restart helper is configured with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, Result};

/// Label holding the scripts URL
pub const SCRIPTS_URL_LABEL: &str = "io.openshift.s2i.scripts-url";

/// Label holding the path where source or binaries are expected
pub const SRC_OR_BIN_LABEL: &str = "io.openshift.s2i.destination";

/// Label holding the builder image name
pub const BUILDER_NAME_LABEL: &str = "name";

/// Labels that may carry the deployments directory, in lookup order
pub const DEPLOYMENTS_DIR_LABELS: &[&str] = &[
    "com.redhat.deployments-dir",
    "org.jboss.deployments-dir",
    "org.jboss.container.deployments-dir",
];

/// Staging path used when the image does not declare one
pub const DEFAULT_SRC_OR_BIN_PATH: &str = "/tmp";

/// Where local source is backed up inside the container
pub const DEFAULT_SRC_BACKUP_DIR: &str = "/opt/app-root/src-backup";

/// Application root of builder images
pub const DEFAULT_APP_ROOT_DIR: &str = "/opt/app-root";

/// How a component's source reaches the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A local directory pushed into the container
    #[default]
    Local,
    /// A prebuilt binary pushed into the container
    Binary,
    /// A repository built on the cluster
    Git,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::Local => "local",
            SourceKind::Binary => "binary",
            SourceKind::Git => "git",
        };
        f.write_str(s)
    }
}

/// Access protocol of the assemble scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptsProtocol {
    /// Scripts baked into the image (`image://`)
    Image,
    /// Scripts on the local filesystem of the image (`file://`)
    File,
    /// Scripts downloaded over HTTP(S)
    Http,
}

impl ScriptsProtocol {
    /// Split a scripts URL into protocol and path
    ///
    /// For HTTP the path is the full URL.
    pub fn split(url: &str) -> Result<(Self, String)> {
        if let Some(path) = url.strip_prefix("image://") {
            Ok((ScriptsProtocol::Image, path.to_string()))
        } else if let Some(path) = url.strip_prefix("file://") {
            Ok((ScriptsProtocol::File, path.to_string()))
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Ok((ScriptsProtocol::Http, url.to_string()))
        } else {
            Err(CoreError::UnknownScriptsProtocol {
                url: url.to_string(),
            })
        }
    }

    /// Value handed to the remote helper
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptsProtocol::Image => "image://",
            ScriptsProtocol::File => "file://",
            ScriptsProtocol::Http => "http(s)://",
        }
    }
}

/// Labels and working directory of a builder image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderMetadata {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: String,
}

/// Paths extracted from builder metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderPaths {
    /// Scripts protocol, `None` for images carrying no labels at all
    pub scripts_protocol: Option<ScriptsProtocol>,
    pub scripts_path: String,
    pub src_or_bin_path: String,
    pub deployment_dir: String,
    pub working_dir: String,
    pub src_backup_path: String,
    pub builder_image_name: String,
}

impl BuilderMetadata {
    pub fn new(labels: BTreeMap<String, String>, working_dir: impl Into<String>) -> Self {
        Self {
            labels,
            working_dir: working_dir.into(),
        }
    }

    /// First present value among `keys`
    fn first_label(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|k| self.labels.get(*k))
            .map(String::as_str)
    }

    /// Extract the staging paths and scripts location
    ///
    /// An image without labels yields empty paths. An image with labels must
    /// carry a scripts URL with a recognised protocol.
    pub fn paths(&self) -> Result<BuilderPaths> {
        if self.labels.is_empty() {
            tracing::debug!("builder image carries no labels, using empty paths");
            return Ok(BuilderPaths::default());
        }

        let scripts_url = self
            .labels
            .get(SCRIPTS_URL_LABEL)
            .map(String::as_str)
            .unwrap_or_default();
        let (protocol, scripts_path) = ScriptsProtocol::split(scripts_url)?;

        let src_or_bin_path = self
            .labels
            .get(SRC_OR_BIN_LABEL)
            .filter(|p| !p.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_SRC_OR_BIN_PATH.to_string());

        Ok(BuilderPaths {
            scripts_protocol: Some(protocol),
            scripts_path,
            src_or_bin_path,
            deployment_dir: self
                .first_label(DEPLOYMENTS_DIR_LABELS)
                .unwrap_or_default()
                .to_string(),
            working_dir: self.working_dir.clone(),
            src_backup_path: DEFAULT_SRC_BACKUP_DIR.to_string(),
            builder_image_name: self
                .labels
                .get(BUILDER_NAME_LABEL)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

impl BuilderPaths {
    /// Every remote directory a component's pushed files can live under
    pub fn sync_roots(&self) -> Vec<String> {
        [
            &self.src_or_bin_path,
            &self.deployment_dir,
            &self.working_dir,
            &self.src_backup_path,
        ]
        .into_iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> BuilderMetadata {
        BuilderMetadata::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            "/opt/app-root/src",
        )
    }

    #[test]
    fn test_image_protocol() {
        let paths = metadata(&[
            (SCRIPTS_URL_LABEL, "image:///usr/libexec/s2i"),
            (SRC_OR_BIN_LABEL, "/tmp/src"),
            (BUILDER_NAME_LABEL, "centos/nodejs-8"),
        ])
        .paths()
        .unwrap();

        assert_eq!(paths.scripts_protocol, Some(ScriptsProtocol::Image));
        assert_eq!(paths.scripts_path, "/usr/libexec/s2i");
        assert_eq!(paths.src_or_bin_path, "/tmp/src");
        assert_eq!(paths.working_dir, "/opt/app-root/src");
        assert_eq!(paths.src_backup_path, DEFAULT_SRC_BACKUP_DIR);
        assert_eq!(paths.builder_image_name, "centos/nodejs-8");
        assert_eq!(paths.deployment_dir, "");
    }

    #[test]
    fn test_http_protocol_keeps_full_url() {
        let paths = metadata(&[(SCRIPTS_URL_LABEL, "https://example.com/s2i")])
            .paths()
            .unwrap();
        assert_eq!(paths.scripts_protocol, Some(ScriptsProtocol::Http));
        assert_eq!(paths.scripts_path, "https://example.com/s2i");
        assert_eq!(ScriptsProtocol::Http.as_str(), "http(s)://");
    }

    #[test]
    fn test_default_src_path_and_deployments_dir_lookup_order() {
        let paths = metadata(&[
            (SCRIPTS_URL_LABEL, "file:///s2i"),
            ("org.jboss.container.deployments-dir", "/deployments-late"),
            ("org.jboss.deployments-dir", "/deployments"),
        ])
        .paths()
        .unwrap();
        assert_eq!(paths.src_or_bin_path, DEFAULT_SRC_OR_BIN_PATH);
        assert_eq!(paths.deployment_dir, "/deployments");
    }

    #[test]
    fn test_unknown_protocol_is_error() {
        let err = metadata(&[(SCRIPTS_URL_LABEL, "ftp://host/s2i")])
            .paths()
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownScriptsProtocol { .. }));

        // labels present but no scripts url at all
        assert!(metadata(&[("name", "x")]).paths().is_err());
    }

    #[test]
    fn test_no_labels_yields_empty_paths() {
        let paths = BuilderMetadata::default().paths().unwrap();
        assert_eq!(paths, BuilderPaths::default());
        assert!(paths.sync_roots().is_empty());
    }

    #[test]
    fn test_sync_roots_skip_empty() {
        let paths = metadata(&[(SCRIPTS_URL_LABEL, "image:///s2i")])
            .paths()
            .unwrap();
        assert_eq!(
            paths.sync_roots(),
            vec!["/tmp", "/opt/app-root/src", DEFAULT_SRC_BACKUP_DIR]
        );
    }
}
