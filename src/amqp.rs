// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Transport
//!
//! `Transport` implementation on top of lapin.
//!
//! A supervisor task owns the connection lifecycle. It connects, installs the
//! topology, re-binds every consumer registered so far, and reports
//! `Connected`. When lapin signals a connection error, or the broker closes the
//! channel (for instance after a publish to an undeclared exchange), it reports
//! `Failed`, closes what is left of the connection and reconnects following the
//! configured [`Backoff`]. Once the backoff gives up it reports `Unreachable`
//! and stops.
//!
//! `shutdown` forgets the consumers registered so far, so the transport can be
//! configured again for a new session.
//!
//! Messages published to an exchange declared as persistent are sent with the
//! persistent delivery mode. The routing key is also sent as the message type.

use crate::{
    channel::new_amqp_channel,
    config::ResolvedConfig,
    consumer,
    dispatcher::DeliverySink,
    errors::BusError,
    handler::OutboundMessage,
    otel,
    retry::Backoff,
    topology::AmqpTopology,
    transport::{EventSender, Transport, TransportEvent},
};
use async_trait::async_trait;
use lapin::{
    options::{BasicConsumeOptions, BasicPublishOptions},
    types::{FieldTable, ShortString},
    BasicProperties, Channel, Connection,
};
use opentelemetry::Context;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    sync::{oneshot, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// AMQP transport. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct AmqpTransport {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    config: RwLock<Option<ResolvedConfig>>,
    events: Mutex<Option<EventSender>>,
    connection: Mutex<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
    sinks: RwLock<HashMap<String, DeliverySink>>,
    consumers: Mutex<HashMap<String, JoinHandle<()>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    closing: AtomicBool,
}

impl AmqpTransport {
    /// Creates an unconfigured transport. Nothing connects before `configure`.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Fires once with the reason the connection or its channel went away.
#[derive(Clone)]
struct LostSignal(Arc<std::sync::Mutex<Option<oneshot::Sender<String>>>>);

impl LostSignal {
    fn new() -> (LostSignal, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (LostSignal(Arc::new(std::sync::Mutex::new(Some(tx)))), rx)
    }

    fn fire(&self, reason: String) {
        if let Some(tx) = self.0.lock().ok().and_then(|mut tx| tx.take()) {
            let _ = tx.send(reason);
        }
    }
}

async fn close_connection(connection: &Connection, reason: &str) {
    if !connection.status().connected() {
        return;
    }
    if let Err(err) = connection.close(200, reason).await {
        debug!(error = err.to_string(), "connection already closed");
    }
}

impl Shared {
    /// Opens a connection, installs the topology and re-binds consumers.
    ///
    /// Resolves the returned receiver with the reason once the connection fails
    /// or the broker closes the channel.
    async fn establish(&self, config: &ResolvedConfig) -> Result<oneshot::Receiver<String>, BusError> {
        let (connection, channel) = new_amqp_channel(&config.connection).await?;

        let (lost, lost_rx) = LostSignal::new();
        connection.on_error({
            let lost = lost.clone();
            move |err| lost.fire(format!("connection error: {err}"))
        });
        channel.on_error(move |err| lost.fire(format!("channel closed: {err}")));

        if let Err(err) = AmqpTopology::new(&channel, config).install().await {
            close_connection(&connection, "Topology failure").await;
            return Err(err);
        }

        *self.channel.write().await = Some(channel.clone());
        *self.connection.lock().await = Some(connection);

        let sinks: Vec<DeliverySink> = self.sinks.read().await.values().cloned().collect();
        for sink in sinks {
            self.start_consumer(&channel, sink).await?;
        }

        Ok(lost_rx)
    }

    async fn start_consumer(&self, channel: &Channel, sink: DeliverySink) -> Result<(), BusError> {
        let queue = sink.queue().to_owned();
        let tag = format!("{}-{}", queue, Uuid::new_v4());

        let consumer = match channel
            .basic_consume(
                &queue,
                &tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), queue, "failure to create the consumer");
                Err(BusError::BindingConsumerError(queue.clone()))
            }
            Ok(c) => Ok(c),
        }?;

        debug!(queue, tag, "consumer started");
        let handle = consumer::spawn(consumer, sink);
        if let Some(previous) = self.consumers.lock().await.insert(queue, handle) {
            previous.abort();
        }

        Ok(())
    }

    /// Closes and forgets a broken connection. Registered sinks are kept for
    /// re-binding.
    async fn drop_connection(&self) {
        for (_, handle) in self.consumers.lock().await.drain() {
            handle.abort();
        }
        self.channel.write().await.take();
        if let Some(connection) = self.connection.lock().await.take() {
            close_connection(&connection, "Reconnecting").await;
        }
    }

    async fn emit(&self, event: TransportEvent) {
        if let Some(events) = self.events.lock().await.as_ref() {
            let _ = events.send(event);
        }
    }
}

async fn supervise(
    shared: Arc<Shared>,
    config: ResolvedConfig,
    first: oneshot::Sender<Result<(), BusError>>,
) {
    let mut first = Some(first);
    let mut backoff = Backoff::new(&config.connection.options);

    loop {
        match shared.establish(&config).await {
            Ok(lost) => {
                backoff.reset();
                if let Some(tx) = first.take() {
                    let _ = tx.send(Ok(()));
                }
                shared.emit(TransportEvent::Connected).await;

                let reason = lost.await.unwrap_or_else(|_| "connection dropped".to_owned());
                if shared.closing.load(Ordering::SeqCst) {
                    return;
                }

                warn!(reason, "amqp connection lost");
                shared.drop_connection().await;
                shared.emit(TransportEvent::Failed(reason)).await;
            }
            Err(err) => {
                if shared.closing.load(Ordering::SeqCst) {
                    return;
                }

                shared.drop_connection().await;
                shared.emit(TransportEvent::Failed(err.to_string())).await;
                if let Some(tx) = first.take() {
                    let _ = tx.send(Err(err));
                }
            }
        }

        match backoff.next_delay() {
            Some(delay) => {
                debug!(?delay, attempt = backoff.attempts(), "reconnecting to amqp broker");
                tokio::time::sleep(delay).await;
            }
            None => {
                error!(attempts = backoff.attempts(), "giving up reconnecting to amqp broker");
                shared.emit(TransportEvent::Unreachable).await;
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    /// Starts the supervisor and waits for the outcome of the first connection
    /// attempt. The supervisor keeps retrying after a failed first attempt.
    async fn configure(&self, config: &ResolvedConfig, events: EventSender) -> Result<(), BusError> {
        self.shared.closing.store(false, Ordering::SeqCst);
        *self.shared.config.write().await = Some(config.clone());
        *self.shared.events.lock().await = Some(events);

        let (first_tx, first_rx) = oneshot::channel();
        let handle = tokio::spawn(supervise(self.shared.clone(), config.clone(), first_tx));
        if let Some(previous) = self.shared.supervisor.lock().await.replace(handle) {
            previous.abort();
        }

        first_rx.await.unwrap_or(Err(BusError::InternalError))
    }

    async fn publish(&self, ctx: &Context, exchange: &str, msg: OutboundMessage) -> Result<(), BusError> {
        let channel = self.shared.channel.read().await.clone();
        let Some(channel) = channel.filter(|channel| channel.status().connected()) else {
            error!(exchange, "error publishing message - reason: not connected");
            return Err(BusError::ConnectionError);
        };

        let persistent = self
            .shared
            .config
            .read()
            .await
            .as_ref()
            .and_then(|config| config.exchange(exchange).map(|e| e.persistent))
            .unwrap_or(false);

        let mut headers = BTreeMap::new();
        otel::inject(ctx, &mut headers);

        let mut properties = BasicProperties::default()
            .with_content_type(ShortString::from(msg.content_type))
            .with_type(ShortString::from(msg.routing_key.clone()))
            .with_message_id(ShortString::from(msg.message_id))
            .with_headers(FieldTable::from(headers));
        if persistent {
            properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }

        match channel
            .basic_publish(
                exchange,
                &msg.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &msg.body,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), exchange, "error publishing message");
                Err(BusError::PublishingError)
            }
            _ => Ok(()),
        }
    }

    /// Registers the sink and starts consuming when connected. Otherwise the
    /// consumer starts with the next connection.
    async fn consume(&self, queue: &str, sink: DeliverySink) -> Result<(), BusError> {
        self.shared
            .sinks
            .write()
            .await
            .insert(queue.to_owned(), sink.clone());

        let channel = self.shared.channel.read().await.clone();
        match channel {
            Some(channel) => self.shared.start_consumer(&channel, sink).await,
            None => {
                debug!(queue, "consumer deferred until connected");
                Ok(())
            }
        }
    }

    async fn shutdown(&self) -> Result<(), BusError> {
        self.shared.closing.store(true, Ordering::SeqCst);

        if let Some(handle) = self.shared.supervisor.lock().await.take() {
            handle.abort();
        }
        for (_, handle) in self.shared.consumers.lock().await.drain() {
            handle.abort();
        }
        self.shared.sinks.write().await.clear();

        if let Some(channel) = self.shared.channel.write().await.take() {
            if let Err(err) = channel.close(200, "Normal shutdown").await {
                debug!(error = err.to_string(), "channel already closed");
            }
        }

        let result = match self.shared.connection.lock().await.take() {
            Some(connection) => connection.close(200, "Normal shutdown").await.map_err(|err| {
                error!(error = err.to_string(), "failure to close the connection");
                BusError::ConnectionError
            }),
            None => Ok(()),
        };

        self.shared.emit(TransportEvent::Closed).await;
        debug!("amqp transport shut down");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Dispatcher, HandlerRegistry};
    use serde_json::json;

    fn sink(queue: &str) -> DeliverySink {
        Dispatcher::new(Arc::new(HandlerRegistry::new())).sink(queue)
    }

    #[tokio::test]
    async fn lost_signal_keeps_the_first_reason() {
        let (lost, rx) = LostSignal::new();

        lost.clone().fire("channel closed: NOT_FOUND".to_owned());
        lost.fire("connection error: reset".to_owned());

        assert_eq!(rx.await.unwrap(), "channel closed: NOT_FOUND");
    }

    #[tokio::test]
    async fn consumers_wait_for_a_connection() {
        let transport = AmqpTransport::new();

        transport.consume("orders", sink("orders")).await.unwrap();

        assert!(transport.shared.sinks.read().await.contains_key("orders"));
        assert!(transport.shared.consumers.lock().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_forgets_consumers_of_the_session() {
        let transport = AmqpTransport::new();
        let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
        *transport.shared.events.lock().await = Some(events_tx);
        transport.consume("orders", sink("orders")).await.unwrap();

        transport.shutdown().await.unwrap();

        assert!(transport.shared.sinks.read().await.is_empty());
        assert_eq!(events_rx.recv().await, Some(TransportEvent::Closed));
    }

    #[tokio::test]
    async fn publish_without_channel_fails() {
        let transport = AmqpTransport::new();
        let msg = OutboundMessage::json("route.a", &json!({"id": 1})).unwrap();

        let result = transport.publish(&Context::new(), "ex1", msg).await;

        assert_eq!(result, Err(BusError::ConnectionError));
    }
}
