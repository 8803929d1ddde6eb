// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # In-Memory Transport
//!
//! In-process `Transport` for tests and local runs. It keeps one buffer per
//! queue, routes published messages to queues through the configured bindings,
//! and runs one worker per consumed queue that hands messages to the sink one
//! at a time.
//!
//! Routing is deliberately simple: a binding matches when its routing keys
//! contain the message's routing key exactly, and fanout exchanges ignore the
//! key. Rejected messages are reported as settlements and not redelivered.
//!
//! Connectivity is controlled by the caller: [`MemoryTransport::new`] reports
//! `Connected` as soon as it is configured, [`MemoryTransport::manual`] waits
//! for [`MemoryTransport::emit`].
//!
//! A transport can serve several sessions in a row: `shutdown` drops the
//! queues and consumers of the current one.

use crate::{
    config::ResolvedConfig,
    dispatcher::DeliverySink,
    errors::BusError,
    exchange::ExchangeKind,
    handler::{InboundMessage, OutboundMessage, Outcome},
    transport::{EventSender, Transport, TransportEvent},
};
use async_trait::async_trait;
use opentelemetry::Context;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::{
    sync::{mpsc, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::debug;

/// A message accepted by [`MemoryTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub exchange: String,
    pub message: OutboundMessage,
}

/// How a delivered message was settled by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub queue: String,
    pub message: InboundMessage,
    pub outcome: Outcome,
}

struct QueueSlot {
    tx: mpsc::UnboundedSender<InboundMessage>,
    rx: Option<mpsc::UnboundedReceiver<InboundMessage>>,
    consumers: usize,
}

impl QueueSlot {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        QueueSlot {
            tx,
            rx: Some(rx),
            consumers: 0,
        }
    }
}

pub struct MemoryTransport {
    connect_on_configure: bool,
    config: RwLock<Option<ResolvedConfig>>,
    events: Mutex<Option<EventSender>>,
    queues: Mutex<HashMap<String, QueueSlot>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    published: Mutex<Vec<Published>>,
    settlements_tx: mpsc::UnboundedSender<Settlement>,
    settlements_rx: Mutex<Option<mpsc::UnboundedReceiver<Settlement>>>,
    shut_down: AtomicBool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Transport that reports `Connected` once configured.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Transport that reports connectivity only through [`MemoryTransport::emit`].
    pub fn manual() -> Self {
        Self::build(false)
    }

    fn build(connect_on_configure: bool) -> Self {
        let (settlements_tx, settlements_rx) = mpsc::unbounded_channel();
        MemoryTransport {
            connect_on_configure,
            config: RwLock::new(None),
            events: Mutex::new(None),
            queues: Mutex::new(HashMap::new()),
            workers: Mutex::new(vec![]),
            published: Mutex::new(vec![]),
            settlements_tx,
            settlements_rx: Mutex::new(Some(settlements_rx)),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Reports a connectivity event to the bus. Returns `false` before the
    /// transport is configured.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        match self.events.lock().await.as_ref() {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    /// Every message published so far, in order.
    pub async fn published(&self) -> Vec<Published> {
        self.published.lock().await.clone()
    }

    /// Receiver of settlements. Can be taken once.
    pub async fn settlements(&self) -> Option<mpsc::UnboundedReceiver<Settlement>> {
        self.settlements_rx.lock().await.take()
    }

    /// Number of consumers bound to `queue`.
    pub async fn consumers(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map_or(0, |slot| slot.consumers)
    }

    /// Puts a message on `queue` as if the broker had routed it there.
    pub async fn deliver(&self, queue: &str, mut msg: InboundMessage) -> Result<(), BusError> {
        msg.queue = queue.to_owned();
        let mut queues = self.queues.lock().await;
        let slot = queues.entry(queue.to_owned()).or_insert_with(QueueSlot::new);
        slot.tx.send(msg).map_err(|_| BusError::DeclareQueueError(queue.to_owned()))
    }

    async fn route(&self, exchange: &str, msg: &OutboundMessage) -> Vec<String> {
        let config = self.config.read().await;
        let Some(config) = config.as_ref() else {
            return vec![];
        };

        let fanout = config
            .exchange(exchange)
            .is_some_and(|e| e.kind == ExchangeKind::Fanout);

        config
            .bindings
            .iter()
            .filter(|b| b.exchange == exchange)
            .filter(|b| fanout || b.routing_keys().contains(&msg.routing_key.as_str()))
            .map(|b| b.target.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn configure(&self, config: &ResolvedConfig, events: EventSender) -> Result<(), BusError> {
        self.shut_down.store(false, Ordering::SeqCst);

        {
            let mut queues = self.queues.lock().await;
            for queue in &config.queues {
                queues.entry(queue.name.clone()).or_insert_with(QueueSlot::new);
            }
        }

        *self.config.write().await = Some(config.clone());

        if self.connect_on_configure {
            let _ = events.send(TransportEvent::Connected);
        }
        *self.events.lock().await = Some(events);

        Ok(())
    }

    async fn publish(&self, _ctx: &Context, exchange: &str, msg: OutboundMessage) -> Result<(), BusError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(BusError::PublishingError);
        }

        let targets = self.route(exchange, &msg).await;
        for queue in targets {
            let inbound = InboundMessage {
                queue: queue.clone(),
                exchange: exchange.to_owned(),
                routing_key: msg.routing_key.clone(),
                body: msg.body.clone(),
                content_type: Some(msg.content_type.clone()),
                message_id: Some(msg.message_id.clone()),
                redelivered: false,
            };
            debug!(exchange, queue, "routing message");
            self.deliver(&queue, inbound).await?;
        }

        self.published.lock().await.push(Published {
            exchange: exchange.to_owned(),
            message: msg,
        });
        Ok(())
    }

    async fn consume(&self, queue: &str, sink: DeliverySink) -> Result<(), BusError> {
        let mut rx = {
            let mut queues = self.queues.lock().await;
            let slot = queues.entry(queue.to_owned()).or_insert_with(QueueSlot::new);
            let rx = slot
                .rx
                .take()
                .ok_or_else(|| BusError::BindingConsumerError(queue.to_owned()))?;
            slot.consumers += 1;
            rx
        };

        let settlements = self.settlements_tx.clone();
        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let outcome = sink.deliver(&Context::new(), &message).await;
                let _ = settlements.send(Settlement {
                    queue: sink.queue().to_owned(),
                    message,
                    outcome,
                });
            }
        });

        self.workers.lock().await.push(worker);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BusError> {
        self.shut_down.store(true, Ordering::SeqCst);

        for worker in self.workers.lock().await.drain(..) {
            worker.abort();
        }
        // Buffers of this session go away; the next `configure` starts fresh.
        self.queues.lock().await.clear();

        if let Some(events) = self.events.lock().await.take() {
            let _ = events.send(TransportEvent::Closed);
        }
        Ok(())
    }
}
