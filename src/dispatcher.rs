// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Handler Registry and Dispatcher
//!
//! Applications subscribe handlers per queue. The registry keeps them in
//! registration order and remembers whether a transport consumer was already
//! bound for the queue, so the consumer is bound exactly once however many
//! handlers are added.
//!
//! For every inbound message the dispatcher runs the queue's handlers one after
//! the other. The message is acknowledged when all of them succeed. It is
//! rejected when the queue has no handler, or as soon as one handler fails or
//! panics; the handlers after the failing one are not invoked.

use crate::handler::{ConsumerHandler, InboundMessage, Outcome};
use futures_util::FutureExt;
use opentelemetry::Context;
use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

#[derive(Default)]
struct QueueEntry {
    handlers: Vec<Arc<dyn ConsumerHandler>>,
    bound: bool,
}

/// Handlers per queue, in registration order. Entries are never removed.
#[derive(Default)]
pub struct HandlerRegistry {
    queues: RwLock<HashMap<String, QueueEntry>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the queue and returns how many it now has.
    pub async fn register(&self, queue: &str, handler: Arc<dyn ConsumerHandler>) -> usize {
        let mut queues = self.queues.write().await;
        let entry = queues.entry(queue.to_owned()).or_default();
        entry.handlers.push(handler);
        entry.handlers.len()
    }

    /// Whether a transport consumer was already bound for `queue`.
    ///
    /// # Parameters
    /// * `queue` - The queue name
    ///
    /// # Returns
    /// `true` once the first subscription to the queue has bound its consumer
    pub async fn is_bound(&self, queue: &str) -> bool {
        self.queues
            .read()
            .await
            .get(queue)
            .is_some_and(|entry| entry.bound)
    }

    /// Flags the queue's consumer as bound. Returns `false` if it already was.
    pub(crate) async fn mark_bound(&self, queue: &str) -> bool {
        let mut queues = self.queues.write().await;
        let entry = queues.entry(queue.to_owned()).or_default();
        !std::mem::replace(&mut entry.bound, true)
    }

    /// Drops a queue whose consumer never got bound.
    pub(crate) async fn discard_unbound(&self, queue: &str) {
        let mut queues = self.queues.write().await;
        if queues.get(queue).is_some_and(|entry| !entry.bound) {
            queues.remove(queue);
        }
    }

    /// Snapshot of the queue's handlers; `None` when nothing was registered.
    pub async fn handlers(&self, queue: &str) -> Option<Vec<Arc<dyn ConsumerHandler>>> {
        self.queues
            .read()
            .await
            .get(queue)
            .filter(|entry| !entry.handlers.is_empty())
            .map(|entry| entry.handlers.clone())
    }
}

/// Runs the registered handler chain for inbound messages.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher running the handlers of `registry`.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Dispatcher { registry }
    }

    /// Dispatches one message from `queue` and returns its settlement.
    pub async fn dispatch(&self, queue: &str, ctx: &Context, msg: &InboundMessage) -> Outcome {
        let Some(handlers) = self.registry.handlers(queue).await else {
            warn!(queue, "rejecting message - reason: no handler registered");
            return Outcome::Reject;
        };

        for (index, handler) in handlers.iter().enumerate() {
            match AssertUnwindSafe(handler.exec(ctx, msg)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        error = err.to_string(),
                        queue,
                        handler = index,
                        "rejecting message - reason: handler failure"
                    );
                    return Outcome::Reject;
                }
                Err(_) => {
                    error!(queue, handler = index, "rejecting message - reason: handler panicked");
                    return Outcome::Reject;
                }
            }
        }

        debug!(queue, "message successfully processed");
        Outcome::Ack
    }

    /// Creates the sink a transport feeds with the deliveries of `queue`.
    pub fn sink(&self, queue: &str) -> DeliverySink {
        DeliverySink {
            queue: queue.to_owned(),
            dispatcher: self.clone(),
        }
    }
}

/// Entry point of a bound queue into the dispatcher.
#[derive(Clone)]
pub struct DeliverySink {
    queue: String,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for DeliverySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverySink").field("queue", &self.queue).finish()
    }
}

impl DeliverySink {
    /// Queue whose deliveries this sink receives.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Runs the queue's handler chain for one message.
    ///
    /// # Parameters
    /// * `ctx` - Trace context of the delivery
    /// * `msg` - The delivered message
    ///
    /// # Returns
    /// The settlement the transport must apply to the delivery
    pub async fn deliver(&self, ctx: &Context, msg: &InboundMessage) -> Outcome {
        self.dispatcher.dispatch(&self.queue, ctx, msg).await
    }
}
