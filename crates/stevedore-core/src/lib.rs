//! Stevedore Core - Cluster-free types and utilities
//!
//! This crate provides the foundational pieces used throughout Stevedore:
//! - `ImageRef`: Builder image references
//! - `PortSpec`: Container port declarations
//! - `BuilderMetadata`: Source-to-image labels and staging paths
//! - `ExcludeRules`: Exclusion globs for file synchronization
//! - `Config`: Engine configuration, resolved once at startup

pub mod builder;
pub mod config;
pub mod env;
pub mod error;
pub mod exclude;
pub mod image;
pub mod paths;
pub mod ports;

pub use builder::{BuilderMetadata, BuilderPaths, ScriptsProtocol, SourceKind};
pub use config::{Config, RetryPolicy, Timeouts};
pub use env::parse_env_strings;
pub use error::{CoreError, Result};
pub use exclude::ExcludeRules;
pub use image::ImageRef;
pub use ports::{PortSpec, Protocol};
