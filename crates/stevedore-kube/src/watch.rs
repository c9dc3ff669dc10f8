//! Condition watching
//!
//! [`await_condition`] turns a watch event stream into a blocking,
//! deadline-bounded wait. It races the deadline against event consumption
//! and resolves on the first of:
//! - the condition reports [`Verdict::Done`] for an observed object
//! - the condition reports [`Verdict::Failed`] (terminal object state)
//! - the server sends an `Error` event
//! - the server closes the stream
//! - the deadline elapses
//!
//! Exactly one watch session is opened and closed per call.

use std::time::Duration;

use crate::error::{KubeError, Result};
use crate::resource::{Kinded, Selector};
use crate::session::{EventType, ObjectSession};

/// Outcome of evaluating a condition against one observed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Keep watching
    Pending,
    /// The awaited state was reached
    Done,
    /// The object reached a terminal failure state
    Failed(String),
}

/// Predicate evaluated for every observed `Added`, `Modified` or `Deleted` event
///
/// Conditions decide what a `Deleted` event means: the specialised waits treat
/// it as a terminal failure, except a project deletion wait where it is success.
pub trait Condition<K>: Send + Sync {
    fn check(&self, event: EventType, object: &K) -> Verdict;
}

impl<K, F> Condition<K> for F
where
    F: Fn(EventType, &K) -> Verdict + Send + Sync,
{
    fn check(&self, event: EventType, object: &K) -> Verdict {
        self(event, object)
    }
}

/// Wait until `condition` holds for an object matching `selector`
///
/// Returns the first observed object for which the condition is done.
pub async fn await_condition<K, S, C>(
    source: &S,
    selector: &Selector,
    condition: C,
    timeout: Duration,
) -> Result<K>
where
    K: Kinded + Clone + Send + Sync + 'static,
    S: ObjectSession<K> + ?Sized,
    C: Condition<K>,
{
    let mut session = source.watch(selector).await?;
    let resource = session.resource().clone();

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::debug!(resource = %resource, ?timeout, "deadline elapsed");
                break Err(KubeError::Timeout {
                    resource: resource.clone(),
                    elapsed: timeout,
                });
            }
            event = session.next() => {
                let Some(event) = event else {
                    break Err(KubeError::StreamClosed {
                        resource: resource.clone(),
                    });
                };

                if event.event_type == EventType::Error {
                    break Err(KubeError::WatchFailed {
                        resource: resource.clone(),
                        message: event.message.unwrap_or_default(),
                    });
                }

                let Some(object) = event.object else {
                    continue;
                };

                tracing::debug!(
                    resource = %resource,
                    object = object.object_name(),
                    event = ?event.event_type,
                    "event observed"
                );

                match condition.check(event.event_type, &object) {
                    Verdict::Pending => continue,
                    Verdict::Done => break Ok(object),
                    Verdict::Failed(state) => {
                        let mut failed = resource.clone();
                        if !object.object_name().is_empty() {
                            failed.name = object.object_name().to_string();
                        }
                        break Err(KubeError::TerminalFailure {
                            resource: failed,
                            state,
                        });
                    }
                }
            }
        }
    };

    session.close();
    outcome
}
