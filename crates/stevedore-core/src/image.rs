//! Image reference parsing
//!
//! Builder images are referenced as `[namespace/]name[:tag]` or
//! `[namespace/]name@digest`. A reference without tag or digest points at `latest`.

use std::fmt;

use crate::error::{CoreError, Result};

/// Tag used when a reference names neither a tag nor a digest
pub const DEFAULT_TAG: &str = "latest";

/// A parsed image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Namespace the image stream lives in (empty when unqualified)
    pub namespace: Option<String>,
    /// Image name
    pub name: String,
    /// Tag, when referenced by tag
    pub tag: Option<String>,
    /// Digest, when referenced by digest
    pub digest: Option<String>,
}

impl ImageRef {
    /// Parse an image reference
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidImageReference {
            reference: reference.to_string(),
        };

        let digest_parts: Vec<&str> = reference.split('@').collect();
        match digest_parts.as_slice() {
            [name, digest] => {
                if name.is_empty() || digest.is_empty() {
                    return Err(invalid());
                }
                let (namespace, name) = split_namespace(name).ok_or_else(invalid)?;
                Ok(Self {
                    namespace,
                    name,
                    tag: None,
                    digest: Some(digest.to_string()),
                })
            }
            [image] if !image.is_empty() => {
                let tag_parts: Vec<&str> = image.split(':').collect();
                let (name, tag) = match tag_parts.as_slice() {
                    [name, tag] if !name.is_empty() && !tag.is_empty() => (*name, *tag),
                    [name] => (*name, DEFAULT_TAG),
                    _ => return Err(invalid()),
                };
                let (namespace, name) = split_namespace(name).ok_or_else(invalid)?;
                Ok(Self {
                    namespace,
                    name,
                    tag: Some(tag.to_string()),
                    digest: None,
                })
            }
            _ => Err(invalid()),
        }
    }

    /// Tag or digest suffix used to look the image up (`name:tag` / `name@digest`)
    pub fn lookup_name(&self) -> String {
        match (&self.tag, &self.digest) {
            (_, Some(digest)) => format!("{}@{}", self.name, digest),
            (Some(tag), None) => format!("{}:{}", self.name, tag),
            (None, None) => format!("{}:{}", self.name, DEFAULT_TAG),
        }
    }
}

fn split_namespace(name: &str) -> Option<(Option<String>, String)> {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        [ns, name] if !ns.is_empty() && !name.is_empty() => {
            Some((Some(ns.to_string()), name.to_string()))
        }
        [name] if !name.is_empty() => Some((None, name.to_string())),
        _ => None,
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{}/", ns)?;
        }
        write!(f, "{}", self.lookup_name())
    }
}
