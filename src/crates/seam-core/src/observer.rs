//! Observer bus
//!
//! Synchronous fan-out of lifecycle events: handlers run in registration
//! order, inline with execution. A handler that errors, panics, or blows
//! its wall-clock budget is logged and abandoned for that event - nothing a
//! handler does can poison the execution. Handlers receive owned copies of
//! the event, so they cannot reach back into execution state.

use seam_node::event::{Event, Observer};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Fan-out of events to registered handlers.
pub struct ObserverBus {
    handlers: Vec<Arc<dyn Observer>>,
    handler_timeout: Duration,
}

impl ObserverBus {
    pub fn new(handler_timeout: Duration) -> Self {
        Self {
            handlers: Vec::new(),
            handler_timeout,
        }
    }

    /// Register a handler; handlers run in registration order.
    pub fn register(&mut self, handler: Arc<dyn Observer>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver one event to every handler.
    pub async fn emit(&self, event: Event) {
        for handler in &self.handlers {
            let call = AssertUnwindSafe(handler.on_event(event.clone())).catch_unwind();
            match tokio::time::timeout(self.handler_timeout, call).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(message))) => {
                    tracing::warn!(kind = ?event.kind, error = %message, "observer handler failed");
                }
                Ok(Err(_panic)) => {
                    tracing::warn!(kind = ?event.kind, "observer handler panicked");
                }
                Err(_) => {
                    tracing::warn!(
                        kind = ?event.kind,
                        budget_ms = self.handler_timeout.as_millis() as u64,
                        "observer handler exceeded its time budget"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for ObserverBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverBus")
            .field("handlers", &self.handlers.len())
            .field("handler_timeout", &self.handler_timeout)
            .finish()
    }
}

/// An observer that forwards events into a channel, for callers that want
/// to consume the lifecycle as a stream instead of writing a handler.
pub struct ChannelObserver {
    tx: mpsc::Sender<Event>,
}

impl ChannelObserver {
    /// Build the observer plus the stream of events it forwards. Events
    /// are dropped (not blocked on) when the consumer falls more than
    /// `capacity` events behind.
    pub fn channel(capacity: usize) -> (Arc<Self>, ReceiverStream<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self { tx }), ReceiverStream::new(rx))
    }
}

#[async_trait::async_trait]
impl Observer for ChannelObserver {
    async fn on_event(&self, event: Event) -> std::result::Result<(), String> {
        self.tx.try_send(event).map_err(|e| e.to_string())
    }
}
