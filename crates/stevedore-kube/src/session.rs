//! Narrow collaborator surface consumed by the engine
//!
//! The engine never talks to the cluster directly. It goes through:
//! - [`ObjectSession`]: get, update and watch for one resource kind
//! - [`Rollouts`]: instantiate a new rollout of a deployment
//! - [`RemoteExec`]: run a command in a pod with an optional stdin stream
//! - [`BuilderImages`]: labels and working directory of a builder image
//!
//! [`crate::client`] implements these on top of kube-rs, [`crate::mock`]
//! in memory.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use stevedore_core::{BuilderMetadata, ImageRef};
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::resource::{Kinded, ResourceRef, Selector};

/// Kind of change carried by a watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Error,
}

/// One (eventType, observedState) pair from a watch
#[derive(Debug, Clone)]
pub struct ObservedEvent<K> {
    pub event_type: EventType,

    /// Observed object, absent on `Error` events
    pub object: Option<K>,

    /// Server message for `Error` events
    pub message: Option<String>,
}

impl<K> ObservedEvent<K> {
    pub fn added(object: K) -> Self {
        Self::with_object(EventType::Added, object)
    }

    pub fn modified(object: K) -> Self {
        Self::with_object(EventType::Modified, object)
    }

    pub fn deleted(object: K) -> Self {
        Self::with_object(EventType::Deleted, object)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Error,
            object: None,
            message: Some(message.into()),
        }
    }

    fn with_object(event_type: EventType, object: K) -> Self {
        Self {
            event_type,
            object: Some(object),
            message: None,
        }
    }
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// A live subscription bound to one resource reference and selector
///
/// Owns the event stream. The subscription is terminated by [`close`], and
/// dropping the session closes it as well, so every exit path of a waiter
/// releases it.
///
/// [`close`]: WatchSession::close
pub struct WatchSession<K> {
    resource: ResourceRef,
    events: BoxStream<'static, ObservedEvent<K>>,
    on_close: Option<CloseHook>,
}

impl<K> WatchSession<K> {
    /// Wrap an event stream; `on_close` runs exactly once when the session ends
    pub fn new(
        resource: ResourceRef,
        events: BoxStream<'static, ObservedEvent<K>>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        tracing::debug!(resource = %resource, "watch opened");
        Self {
            resource,
            events,
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// Next event in receipt order, `None` once the server closed the stream
    pub async fn next(&mut self) -> Option<ObservedEvent<K>> {
        if self.on_close.is_none() {
            return None;
        }
        self.events.next().await
    }

    pub fn is_closed(&self) -> bool {
        self.on_close.is_none()
    }

    /// Terminate the subscription
    pub fn close(mut self) {
        self.terminate();
    }

    fn terminate(&mut self) {
        if let Some(hook) = self.on_close.take() {
            tracing::debug!(resource = %self.resource, "watch closed");
            hook();
        }
    }
}

impl<K> Drop for WatchSession<K> {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl<K> std::fmt::Debug for WatchSession<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("resource", &self.resource)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// get / update / watch for one resource kind in one scope
#[async_trait]
pub trait ObjectSession<K>: Send + Sync
where
    K: Kinded + Clone + Send + Sync + 'static,
{
    /// Namespace the session is bound to, `None` for cluster-scoped kinds
    fn namespace(&self) -> Option<&str>;

    /// Get an object by name
    async fn get(&self, name: &str) -> Result<K>;

    /// Replace a whole object
    async fn update(&self, object: &K) -> Result<K>;

    /// Open a watch scoped by `selector`
    async fn watch(&self, selector: &Selector) -> Result<WatchSession<K>>;

    /// Reference to the named object in this session's scope
    fn reference(&self, name: &str) -> ResourceRef {
        match self.namespace() {
            Some(ns) => ResourceRef::namespaced(K::KIND, ns, name),
            None => ResourceRef::cluster(K::KIND, name),
        }
    }

    /// Reference describing whatever a watch with `selector` observes
    fn watch_reference(&self, selector: &Selector) -> ResourceRef {
        match (selector.name(), self.namespace()) {
            (Some(name), _) => self.reference(name),
            (None, Some(ns)) => ResourceRef::selected(K::KIND, ns, &selector.to_string()),
            (None, None) => ResourceRef::cluster(K::KIND, &format!("[{}]", selector)),
        }
    }
}

/// Instantiates new rollouts of a deployment
#[async_trait]
pub trait Rollouts: Send + Sync {
    async fn trigger_rollout(&self, name: &str) -> Result<()>;
}

/// Boxed stdin stream handed to a remote command
pub type ExecInput = Box<dyn AsyncRead + Send + Unpin>;

/// Captured output of a finished remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs commands inside a pod
///
/// Non-zero exit and transport failures are reported as errors.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn exec(
        &self,
        pod: &str,
        command: &[String],
        stdin: Option<ExecInput>,
    ) -> Result<ExecOutput>;
}

/// Looks up builder-image metadata
#[async_trait]
pub trait BuilderImages: Send + Sync {
    async fn metadata(&self, image: &ImageRef) -> Result<BuilderMetadata>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_session(closed: Arc<AtomicUsize>, events: Vec<ObservedEvent<u32>>) -> WatchSession<u32> {
        WatchSession::new(
            ResourceRef::namespaced(ResourceKind::Pod, "dev", "p"),
            futures::stream::iter(events).boxed(),
            move || {
                closed.fetch_add(1, Ordering::SeqCst);
            },
        )
    }

    #[tokio::test]
    async fn test_session_yields_events_in_order() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut session = counting_session(
            closed.clone(),
            vec![ObservedEvent::added(1), ObservedEvent::modified(2)],
        );

        assert_eq!(session.next().await.and_then(|e| e.object), Some(1));
        assert_eq!(session.next().await.and_then(|e| e.object), Some(2));
        assert!(session.next().await.is_none());
        session.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_closes_exactly_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let session = counting_session(closed.clone(), vec![]);
        drop(session);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_event_has_no_object() {
        let event: ObservedEvent<u32> = ObservedEvent::error("too old resource version");
        assert_eq!(event.event_type, EventType::Error);
        assert!(event.object.is_none());
        assert_eq!(event.message.as_deref(), Some("too old resource version"));
    }
}
