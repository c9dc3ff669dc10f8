//! Stevedore CLI - push sources into running components and converge their deployments

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stevedore_core::{Config, SourceKind};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

use error::{CliError, Result};

#[derive(Parser, Debug)]
#[command(name = "stevedore")]
#[command(author = "Stevedore Contributors")]
#[command(version)]
#[command(about = "Push local sources into running components and converge their deployments", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Target namespace
    #[arg(short, long, global = true, default_value = "default")]
    namespace: String,

    /// Configuration file (default: ~/.config/stevedore/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy local files into a running pod
    Push {
        /// Target pod
        pod: String,

        /// Local directory whose contents are copied
        local_root: PathBuf,

        /// Remote destination directory
        #[arg(long)]
        dest: String,

        /// Only send these files (incremental push)
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Extra exclusion globs
        #[arg(long = "exclude")]
        excludes: Vec<String>,

        /// Paths deleted locally, removed remotely under every --root
        #[arg(long = "deleted")]
        deleted: Vec<String>,

        /// Remote roots deletions apply to (default: --dest)
        #[arg(long = "root")]
        roots: Vec<String>,
    },

    /// Converge a live deployment onto a manifest and wait for the rollout
    Apply {
        /// Deployment manifest
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// A new image is pushed separately; always start a rollout
        #[arg(long)]
        image_driven: bool,

        /// Remove the supervisord bootstrap while applying
        #[arg(long)]
        strip_bootstrap: bool,

        /// Component name (default: deployment name)
        #[arg(long)]
        component: Option<String>,

        /// Only wait for the new revision, not for available replicas
        #[arg(long)]
        revision_only: bool,
    },

    /// Print a deployment manifest prepared for in-place redeploys
    Bootstrap {
        /// Deployment manifest
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Component name
        #[arg(long)]
        component: String,

        /// Builder image reference, e.g. openshift/nodejs:8
        #[arg(long)]
        builder_image: String,

        /// Where the component's source comes from
        #[arg(long, value_enum, default_value = "local")]
        source: SourceArg,

        /// Also print the claim backing the app-root volume
        #[arg(long)]
        with_claim: bool,
    },

    /// Wait for a resource to reach a state
    Wait {
        #[command(subcommand)]
        target: WaitTarget,

        /// Deadline in seconds (default: from configuration)
        #[arg(long, global = true)]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum WaitTarget {
    /// Wait for a label-selected pod to reach a phase
    Pod {
        /// Label selector, e.g. app=web
        selector: String,

        /// Desired phase
        #[arg(long, default_value = "Running")]
        phase: String,
    },

    /// Wait for a build to complete
    Build { name: String },

    /// Wait for a secret to exist
    Secret { name: String },

    /// Wait for a project to be deleted
    ProjectDeleted { name: String },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SourceArg {
    Local,
    Binary,
    Git,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Local => SourceKind::Local,
            SourceArg::Binary => SourceKind::Binary,
            SourceArg::Git => SourceKind::Git,
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.config.as_deref()).map_err(CliError::from)?;
    tracing::debug!(?config, "configuration resolved");

    let namespace = cli.namespace.as_str();
    match cli.command {
        Commands::Push {
            pod,
            local_root,
            dest,
            files,
            excludes,
            deleted,
            roots,
        } => {
            commands::push::run(
                namespace,
                &pod,
                &local_root,
                &dest,
                files,
                &excludes,
                &deleted,
                &roots,
            )
            .await
        }

        Commands::Apply {
            file,
            image_driven,
            strip_bootstrap,
            component,
            revision_only,
        } => {
            commands::apply::run(
                namespace,
                &config,
                &file,
                image_driven,
                strip_bootstrap,
                component,
                revision_only,
            )
            .await
        }

        Commands::Bootstrap {
            file,
            component,
            builder_image,
            source,
            with_claim,
        } => {
            commands::bootstrap::run(
                &config,
                &file,
                &component,
                &builder_image,
                source.into(),
                with_claim,
            )
            .await
        }

        Commands::Wait { target, timeout } => {
            let timeout = timeout.map(std::time::Duration::from_secs);
            match target {
                WaitTarget::Pod { selector, phase } => {
                    commands::wait::pod(namespace, &config, &selector, &phase, timeout).await
                }
                WaitTarget::Build { name } => {
                    commands::wait::build(namespace, &config, &name, timeout).await
                }
                WaitTarget::Secret { name } => {
                    commands::wait::secret(namespace, &config, &name, timeout).await
                }
                WaitTarget::ProjectDeleted { name } => {
                    commands::wait::project_deleted(&config, &name, timeout).await
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_logging(cli.debug);

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_arguments() {
        let cli = Cli::try_parse_from([
            "stevedore",
            "push",
            "web-1",
            "./src",
            "--dest",
            "/tmp/src",
            "--exclude",
            "build/*",
            "--deleted",
            "foo.txt",
            "--root",
            "/app/src",
            "--root",
            "/app/bin",
        ])
        .unwrap();

        assert_eq!(cli.namespace, "default");
        match cli.command {
            Commands::Push {
                pod,
                dest,
                excludes,
                deleted,
                roots,
                files,
                ..
            } => {
                assert_eq!(pod, "web-1");
                assert_eq!(dest, "/tmp/src");
                assert_eq!(excludes, vec!["build/*"]);
                assert_eq!(deleted, vec!["foo.txt"]);
                assert_eq!(roots, vec!["/app/src", "/app/bin"]);
                assert!(files.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stevedore",
            "apply",
            "-f",
            "deploy.yaml",
            "--image-driven",
            "--namespace",
            "dev",
            "--debug",
        ])
        .unwrap();

        assert_eq!(cli.namespace, "dev");
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Commands::Apply {
                image_driven: true,
                strip_bootstrap: false,
                ..
            }
        ));
    }

    #[test]
    fn test_bootstrap_source_values() {
        let cli = Cli::try_parse_from([
            "stevedore",
            "bootstrap",
            "-f",
            "deploy.yaml",
            "--component",
            "web",
            "--builder-image",
            "openshift/nodejs:8",
            "--source",
            "git",
        ])
        .unwrap();
        match cli.command {
            Commands::Bootstrap { source, .. } => {
                assert_eq!(SourceKind::from(source), SourceKind::Git)
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let err = Cli::try_parse_from([
            "stevedore",
            "bootstrap",
            "-f",
            "deploy.yaml",
            "--component",
            "web",
            "--builder-image",
            "nodejs",
            "--source",
            "svn",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_wait_targets() {
        let cli = Cli::try_parse_from(["stevedore", "wait", "pod", "app=web", "--timeout", "30"])
            .unwrap();
        match cli.command {
            Commands::Wait {
                target: WaitTarget::Pod { selector, phase },
                timeout,
            } => {
                assert_eq!(selector, "app=web");
                assert_eq!(phase, "Running");
                assert_eq!(timeout, Some(30));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["stevedore", "wait", "project-deleted", "dev"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Wait {
                target: WaitTarget::ProjectDeleted { .. },
                timeout: None
            }
        ));
    }

    #[test]
    fn test_push_requires_dest() {
        assert!(Cli::try_parse_from(["stevedore", "push", "web-1", "./src"]).is_err());
    }
}
