//! CLI error types with exit code handling
//!
//! Engine and configuration errors are folded into [`CliError`], which
//! carries the process exit code.

use miette::Diagnostic;
use stevedore_core::CoreError;
use stevedore_kube::KubeError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// User supplied something unusable
    #[error("Invalid input: {message}")]
    #[diagnostic(code(stevedore::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Configuration could not be resolved
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(stevedore::cli::config),
        help("check the file passed with --config or ~/.config/stevedore/config.yaml")
    )]
    Config { message: String },

    /// The cluster rejected or failed an operation
    #[error("{message}")]
    #[diagnostic(code(stevedore::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A wait ran out of time
    #[error("{message}")]
    #[diagnostic(
        code(stevedore::cli::timeout),
        help("raise the deadline with --timeout or in the config file")
    )]
    Timeout { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(stevedore::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(stevedore::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Timeout { .. } => exit_codes::TIMEOUT,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Failure to reach the cluster at all
    pub fn connect(err: kube::Error) -> Self {
        Self::Cluster {
            message: format!("unable to connect to the cluster: {}", err),
            help: Some("log in first or point KUBECONFIG at a valid configuration".to_string()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Timeout { .. } => CliError::Timeout {
                message: err.to_string(),
            },
            KubeError::MalformedInput(message) => CliError::input(message),
            KubeError::Core(core) => core.into(),
            KubeError::Io(e) => e.into(),
            KubeError::Conflict { .. } => CliError::Cluster {
                message: err.to_string(),
                help: Some("the deployment changed concurrently, run the command again".to_string()),
            },
            other => CliError::Cluster {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidConfig { .. } | CoreError::YamlParse(_) => CliError::Config {
                message: err.to_string(),
            },
            CoreError::Io(e) => e.into(),
            other => CliError::input(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<miette::Report> for CliError {
    fn from(err: miette::Report) -> Self {
        CliError::Other {
            message: format!("{:?}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stevedore_kube::{ResourceKind, ResourceRef};

    #[test]
    fn test_timeout_exit_code() {
        let err: CliError = KubeError::Timeout {
            resource: ResourceRef::namespaced(ResourceKind::Pod, "dev", "web-1"),
            elapsed: Duration::from_secs(240),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::TIMEOUT);
        assert_eq!(err.to_string(), "timed out after 240s waiting for Pod dev/web-1");
    }

    #[test]
    fn test_malformed_input_exit_code() {
        let err: CliError = KubeError::MalformedInput("blank".to_string()).into();
        assert_eq!(err.exit_code(), exit_codes::INPUT_ERROR);
    }

    #[test]
    fn test_core_errors_map_by_kind() {
        let config: CliError = CoreError::InvalidConfig {
            message: "bad".to_string(),
        }
        .into();
        assert_eq!(config.exit_code(), exit_codes::CONFIG_ERROR);

        let image: CliError = CoreError::InvalidImageReference {
            reference: ":tag".to_string(),
        }
        .into();
        assert_eq!(image.exit_code(), exit_codes::INPUT_ERROR);
    }

    #[test]
    fn test_not_found_is_cluster_error() {
        let err: CliError = KubeError::NotFound {
            resource: ResourceRef::namespaced(ResourceKind::Deployment, "dev", "web"),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::CLUSTER_ERROR);
        assert_eq!(err.to_string(), "Deployment dev/web not found");
    }
}
