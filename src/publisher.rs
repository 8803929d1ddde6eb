// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! Resolves the target exchange, waits for the connection, and hands the
//! message to the transport. Nothing is buffered: when the connection does not
//! come up within the readiness window the call fails and the caller decides
//! whether to retry.

use crate::{
    connectivity::{ReadinessGate, CONNECTION_TIMEOUT},
    errors::BusError,
    handler::OutboundMessage,
    transport::TransportPtr,
};
use opentelemetry::Context;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error};

pub struct Publisher {
    transport: TransportPtr,
    gate: Arc<ReadinessGate>,
    default_exchange: Option<String>,
    timeout: Duration,
}

impl Publisher {
    /// Creates a publisher over `transport`.
    ///
    /// # Parameters
    /// * `transport` - Where messages are sent
    /// * `gate` - Readiness gate every publish waits on
    /// * `default_exchange` - Exchange used when a publish names none
    ///
    /// # Returns
    /// A publisher waiting up to [`CONNECTION_TIMEOUT`] for the connection
    pub fn new(
        transport: TransportPtr,
        gate: Arc<ReadinessGate>,
        default_exchange: Option<String>,
    ) -> Self {
        Publisher {
            transport,
            gate,
            default_exchange,
            timeout: CONNECTION_TIMEOUT,
        }
    }

    /// Picks `exchange` or, when omitted, the exchange recorded at setup.
    pub fn resolve_exchange<'a>(&'a self, exchange: Option<&'a str>) -> Result<&'a str, BusError> {
        exchange
            .or(self.default_exchange.as_deref())
            .ok_or(BusError::NoDefaultExchange)
    }

    /// Publishes `data` as JSON with the given routing key.
    pub async fn publish<T>(
        &self,
        ctx: &Context,
        exchange: Option<&str>,
        routing_key: &str,
        data: &T,
    ) -> Result<(), BusError>
    where
        T: Serialize + ?Sized,
    {
        let exchange = self.resolve_exchange(exchange)?;
        let msg = OutboundMessage::json(routing_key, data)?;

        self.gate.wait(self.timeout).await.inspect_err(|err| {
            error!(error = err.to_string(), exchange, routing_key, "publish not sent");
        })?;

        debug!(exchange, routing_key, "publishing message");
        self.transport.publish(ctx, exchange, msg).await
    }
}
