//! Ordered, first-match message dispatch.
//!
//! Every listener in the CDC pipeline shares the same shape: an ordered list
//! of handlers is consulted for each incoming message, and **at most one**
//! handler runs: the first whose `can_handle` returns true. Registration
//! order is the tie-break, so handler sets are kept as a `Vec`, never a map.
//!
//! The dispatch result maps directly onto broker acknowledgement:
//! a handled or unhandled message is acked, a failed handler discards the
//! message (no requeue, no retry state).

use async_trait::async_trait;
use tracing::{debug, error};

/// A predicate + action pair over a specific message shape.
///
/// `can_handle` must be a pure predicate over the message content; all side
/// effects live in `handle`. Because delivery is at-least-once, `handle` is
/// expected to perform only idempotent writes.
#[async_trait]
pub trait Handler<M>: Send + Sync {
    /// Short name used in dispatch logs.
    fn name(&self) -> &'static str;

    fn can_handle(&self, message: &M) -> bool;

    async fn handle(&self, message: &M) -> anyhow::Result<()>;
}

/// How the consumer should settle the message with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Positive acknowledgement: the offset advances and the message is done.
    Ack,
    /// The message is dropped without requeue. The offset still advances;
    /// there is no dead-letter routing.
    Discard,
}

/// Outcome of a single dispatch.
#[derive(Debug)]
pub enum Dispatch {
    /// The first matching handler ran to completion.
    Handled { handler: &'static str },
    /// No registered handler was interested. Intentionally acked so that
    /// genuinely irrelevant messages are not redelivered forever.
    Unhandled,
    /// The matching handler returned an error.
    Failed {
        handler: &'static str,
        error: anyhow::Error,
    },
}

impl Dispatch {
    pub fn disposition(&self) -> Disposition {
        match self {
            Dispatch::Handled { .. } | Dispatch::Unhandled => Disposition::Ack,
            Dispatch::Failed { .. } => Disposition::Discard,
        }
    }
}

/// An ordered collection of handlers for one message shape.
pub struct HandlerSet<M> {
    handlers: Vec<Box<dyn Handler<M>>>,
}

impl<M: Send + Sync> Default for HandlerSet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send + Sync> HandlerSet<M> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Append a handler. Order of registration is load-bearing: dispatch
    /// stops at the first matching handler.
    pub fn register<H>(mut self, handler: H) -> Self
    where
        H: Handler<M> + 'static,
    {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the first matching handler, if any.
    pub async fn dispatch(&self, message: &M) -> Dispatch {
        let Some(handler) = self.handlers.iter().find(|h| h.can_handle(message)) else {
            debug!("No handler matched the message, acking as no-op");
            return Dispatch::Unhandled;
        };

        match handler.handle(message).await {
            Ok(()) => Dispatch::Handled {
                handler: handler.name(),
            },
            Err(error) => {
                error!(handler = handler.name(), "Handler failed: {error:#}");
                Dispatch::Failed {
                    handler: handler.name(),
                    error,
                }
            }
        }
    }
}
