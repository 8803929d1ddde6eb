// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Message Bus
//!
//! This module provides the single error type used across the bus. The `BusError`
//! enum covers precondition failures surfaced at call time (missing defaults,
//! readiness timeouts), asynchronous connectivity failures delivered through the
//! error handler, and the transport-level failures raised by the AMQP layer.

use std::time::Duration;
use thiserror::Error;

/// Error returned by application handlers.
///
/// Handler errors never escape dispatch; they only turn a delivery into a reject.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Represents errors that can occur while using the message bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// The readiness wait exceeded its window
    #[error("message bus connection timeout, {}s", .0.as_secs())]
    ConnectionTimeout(Duration),

    /// `publish` was called without an exchange and setup declared zero or several
    #[error(
        "unable to publish to default exchange, either pass an exchange name \
         or call setup() with only one exchange"
    )]
    NoDefaultExchange,

    /// `subscribe` was called without a queue and setup declared zero or several
    #[error(
        "unable to subscribe to default queue, either pass a queue name \
         or call setup() with only one queue"
    )]
    NoDefaultQueue,

    /// The transport gave up reconnecting
    #[error("message bus connection unreachable, won't try to reconnect more")]
    Unreachable,

    /// The connection string could not be parsed
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// The bus was terminated and needs a new setup
    #[error("message bus was terminated")]
    Terminated,

    /// Error establishing a connection to the broker
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error binding a consumer to a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error serializing or parsing a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,
}
