//! In-memory collaborators for testing
//!
//! These stand in for the cluster in unit tests: objects live in memory,
//! watch streams are scripted, and every operation is counted so tests can
//! assert that sessions were opened and closed.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stevedore_core::{BuilderMetadata, ImageRef};
use tokio::io::AsyncReadExt;

use crate::error::{KubeError, Result};
use crate::resource::{Kinded, ResourceKind, ResourceRef, Selector};
use crate::session::{
    BuilderImages, ExecInput, ExecOutput, ObjectSession, ObservedEvent, RemoteExec, Rollouts,
    WatchSession,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub updates: usize,
    pub watches_opened: usize,
    pub watches_closed: usize,
    pub rollouts_triggered: usize,
}

struct WatchScript<K> {
    events: Vec<ObservedEvent<K>>,
    hang: bool,
}

/// In-memory [`ObjectSession`] for one resource kind
pub struct MockObjects<K> {
    namespace: Option<String>,
    store: Arc<Mutex<BTreeMap<String, K>>>,
    scripts: Arc<Mutex<VecDeque<WatchScript<K>>>>,
    operations: Arc<Mutex<OperationCounts>>,
    pending_conflicts: Arc<Mutex<usize>>,
    rollouts: Arc<Mutex<Vec<String>>>,
}

impl<K> Clone for MockObjects<K> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            store: Arc::clone(&self.store),
            scripts: Arc::clone(&self.scripts),
            operations: Arc::clone(&self.operations),
            pending_conflicts: Arc::clone(&self.pending_conflicts),
            rollouts: Arc::clone(&self.rollouts),
        }
    }
}

impl<K> MockObjects<K>
where
    K: Kinded + kube::Resource + Clone + Send + Sync + 'static,
{
    fn with_scope(namespace: Option<&str>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            store: Arc::new(Mutex::new(BTreeMap::new())),
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            operations: Arc::new(Mutex::new(OperationCounts::default())),
            pending_conflicts: Arc::new(Mutex::new(0)),
            rollouts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Session over a namespaced kind
    pub fn namespaced(namespace: &str) -> Self {
        Self::with_scope(Some(namespace))
    }

    /// Session over a cluster-scoped kind
    pub fn cluster() -> Self {
        Self::with_scope(None)
    }

    /// Store an object under its name
    pub fn insert(&self, object: K) {
        let name = object.object_name().to_string();
        lock(&self.store).insert(name, object);
    }

    /// Stored object by name
    pub fn object(&self, name: &str) -> Option<K> {
        lock(&self.store).get(name).cloned()
    }

    /// Next watch yields `events` then the server closes the stream
    pub fn script_watch(&self, events: Vec<ObservedEvent<K>>) {
        lock(&self.scripts).push_back(WatchScript { events, hang: false });
    }

    /// Next watch yields `events` then stays silent
    pub fn script_watch_then_hang(&self, events: Vec<ObservedEvent<K>>) {
        lock(&self.scripts).push_back(WatchScript { events, hang: true });
    }

    /// Reject the next `count` updates with a conflict
    pub fn fail_updates_with_conflict(&self, count: usize) {
        *lock(&self.pending_conflicts) = count;
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        lock(&self.operations).clone()
    }

    /// Names passed to `trigger_rollout`, in call order
    pub fn triggered_rollouts(&self) -> Vec<String> {
        lock(&self.rollouts).clone()
    }
}

#[async_trait]
impl<K> ObjectSession<K> for MockObjects<K>
where
    K: Kinded + kube::Resource + Clone + Send + Sync + 'static,
{
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    async fn get(&self, name: &str) -> Result<K> {
        lock(&self.operations).gets += 1;
        self.object(name).ok_or_else(|| KubeError::NotFound {
            resource: self.reference(name),
        })
    }

    async fn update(&self, object: &K) -> Result<K> {
        lock(&self.operations).updates += 1;
        let name = object.object_name();
        let resource = self.reference(name);

        {
            let mut conflicts = lock(&self.pending_conflicts);
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(KubeError::Conflict {
                    resource,
                    message: "the object has been modified".to_string(),
                });
            }
        }

        let mut store = lock(&self.store);
        if !store.contains_key(name) {
            return Err(KubeError::NotFound { resource });
        }
        store.insert(name.to_string(), object.clone());
        Ok(object.clone())
    }

    async fn watch(&self, selector: &Selector) -> Result<WatchSession<K>> {
        lock(&self.operations).watches_opened += 1;
        let script = lock(&self.scripts).pop_front().unwrap_or(WatchScript {
            events: Vec::new(),
            hang: true,
        });

        let resource = self.watch_reference(selector);
        let selector = selector.clone();
        let events = script.events.into_iter().filter(move |event| match &event.object {
            Some(obj) => {
                let labels = obj.meta().labels.clone().unwrap_or_default();
                selector.matches(obj.object_name(), &labels)
            }
            None => true,
        });
        let stream = futures::stream::iter(events);
        let stream = if script.hang {
            stream.chain(futures::stream::pending()).boxed()
        } else {
            stream.boxed()
        };

        let operations = Arc::clone(&self.operations);
        Ok(WatchSession::new(
            resource,
            stream,
            move || lock(&operations).watches_closed += 1,
        ))
    }
}

#[async_trait]
impl<K> Rollouts for MockObjects<K>
where
    K: Kinded + kube::Resource + Clone + Send + Sync + 'static,
{
    async fn trigger_rollout(&self, name: &str) -> Result<()> {
        if self.object(name).is_none() {
            return Err(KubeError::NotFound {
                resource: self.reference(name),
            });
        }
        lock(&self.operations).rollouts_triggered += 1;
        lock(&self.rollouts).push(name.to_string());
        Ok(())
    }
}

/// A command run through [`MockExec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub pod: String,
    pub command: Vec<String>,
    /// Everything read from stdin
    pub stdin: Vec<u8>,
}

/// In-memory [`RemoteExec`] recording every command
#[derive(Clone, Default)]
pub struct MockExec {
    calls: Arc<Mutex<Vec<ExecCall>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MockExec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every command fail without reading its stdin
    pub fn fail_with(&self, message: &str) {
        *lock(&self.failure) = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<ExecCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl RemoteExec for MockExec {
    async fn exec(&self, pod: &str, command: &[String], stdin: Option<ExecInput>) -> Result<ExecOutput> {
        let failure = lock(&self.failure).clone();
        let mut call = ExecCall {
            pod: pod.to_string(),
            command: command.to_vec(),
            stdin: Vec::new(),
        };

        if let Some(message) = failure {
            drop(stdin);
            lock(&self.calls).push(call);
            return Err(KubeError::Exec {
                pod: pod.to_string(),
                command: command.to_vec(),
                message,
            });
        }

        if let Some(mut input) = stdin {
            input
                .read_to_end(&mut call.stdin)
                .await
                .map_err(|e| KubeError::Stream(e.to_string()))?;
        }
        lock(&self.calls).push(call);
        Ok(ExecOutput::default())
    }
}

/// In-memory [`BuilderImages`]
#[derive(Clone, Default)]
pub struct MockImages {
    images: Arc<Mutex<BTreeMap<String, BuilderMetadata>>>,
}

impl MockImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register metadata for an image reference such as `openshift/nodejs:8`
    pub fn with_image(self, image: &ImageRef, metadata: BuilderMetadata) -> Self {
        lock(&self.images).insert(image.to_string(), metadata);
        self
    }
}

#[async_trait]
impl BuilderImages for MockImages {
    async fn metadata(&self, image: &ImageRef) -> Result<BuilderMetadata> {
        lock(&self.images)
            .get(&image.to_string())
            .cloned()
            .ok_or_else(|| KubeError::NotFound {
                resource: ResourceRef::namespaced(
                    ResourceKind::ImageStreamTag,
                    image.namespace.as_deref().unwrap_or("openshift"),
                    &image.lookup_name(),
                ),
            })
    }
}
