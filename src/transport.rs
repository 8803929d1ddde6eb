// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Transport Abstraction
//!
//! The bus core never talks to a broker directly. A `Transport` owns the network
//! side: opening (and re-opening) the connection, declaring the topology,
//! publishing, and running one consumer per bound queue. It reports connectivity
//! back to the bus through `TransportEvent`s.
//!
//! Two implementations ship with the crate: [`crate::amqp::AmqpTransport`] on top
//! of lapin and [`crate::memory::MemoryTransport`] for tests and local runs.

use crate::{
    config::ResolvedConfig, dispatcher::DeliverySink, errors::BusError, handler::OutboundMessage,
};
use async_trait::async_trait;
use opentelemetry::Context;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connectivity changes reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    /// The connection dropped; the transport keeps reconnecting.
    Failed(String),
    /// The connection was closed.
    Closed,
    /// The transport gave up reconnecting.
    Unreachable,
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

pub type TransportPtr = Arc<dyn Transport>;

/// Broker-facing side of the bus.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Applies the resolved configuration and starts connecting.
    ///
    /// Connectivity is reported only through `events`; returning `Ok` does not
    /// mean the connection is up.
    async fn configure(&self, config: &ResolvedConfig, events: EventSender)
        -> Result<(), BusError>;

    /// Publishes one message to `exchange`.
    async fn publish(
        &self,
        ctx: &Context,
        exchange: &str,
        msg: OutboundMessage,
    ) -> Result<(), BusError>;

    /// Starts delivering the messages of `queue` to `sink`, one at a time, and
    /// settles each delivery with the outcome the sink returns.
    async fn consume(&self, queue: &str, sink: DeliverySink) -> Result<(), BusError>;

    /// Closes the connection and stops every consumer.
    async fn shutdown(&self) -> Result<(), BusError>;
}
