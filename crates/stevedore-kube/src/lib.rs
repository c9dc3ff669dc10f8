//! Stevedore Kube - Convergence and synchronization engine
//!
//! This crate provides:
//! - **Condition Watching**: Deadline-bounded waits over watch event streams
//! - **Deployment Reconciliation**: Fetch, merge, apply, roll out and wait
//! - **Supervisord Bootstrap**: Pod template mutation for in-place redeploys
//! - **Volume Management**: Claim mount/unmount with conflict retries
//! - **File Sync**: Streaming tar upload into a running pod
//!
//! Cluster access goes through the traits in [`session`]; [`client`]
//! implements them with kube-rs and [`mock`] in memory.

pub mod bootstrap;
pub mod client;
pub mod conditions;
pub mod env;
pub mod error;
pub mod mock;
pub mod openshift;
pub mod pipe;
pub mod reconcile;
pub mod resource;
pub mod session;
pub mod sync;
pub mod template;
pub mod volumes;
pub mod waits;
pub mod watch;

pub use bootstrap::{SupervisordBootstrapper, app_root_claim, strip_bootstrap, switch_source};
pub use client::{KubeExec, KubeImages, KubeObjects};
pub use conditions::{CompletionPredicate, revision_reached, rollout_complete};
pub use error::{KubeError, Result};
pub use mock::{MockExec, MockImages, MockObjects, OperationCounts};
pub use openshift::{Build, Project};
pub use reconcile::{DeploymentReconciler, MergePolicy, ReconcileOutcome};
pub use resource::{Kinded, ResourceKind, ResourceRef, Selector};
pub use session::{
    BuilderImages, EventType, ExecOutput, ObjectSession, ObservedEvent, RemoteExec, Rollouts,
    WatchSession,
};
pub use sync::{FileSyncStreamer, SyncManifest, SyncReport};
pub use volumes::{VolumeChanges, remove_claim_volume};
pub use waits::{
    wait_for_build, wait_for_pod, wait_for_project_deletion, wait_for_rollout, wait_for_secret,
};
pub use watch::{Condition, Verdict, await_condition};
