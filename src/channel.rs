// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module opens the AMQP connection described by the resolved connection
//! settings and creates the channel used for declaring, publishing and
//! consuming.

use crate::{config::ConnectionSettings, errors::BusError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use tracing::{debug, error};

/// Creates a new AMQP connection and channel.
///
/// The attempt is bounded by the configured connection timeout; the heartbeat
/// travels in the URI query.
///
/// # Example
/// ```ignore
/// let (conn, channel) = new_amqp_channel(&resolved.connection).await?;
/// ```
pub async fn new_amqp_channel(
    settings: &ConnectionSettings,
) -> Result<(Connection, Channel), BusError> {
    debug!(
        host = settings.target.host,
        port = settings.target.port,
        "creating amqp connection..."
    );
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(settings.options.name.clone()));

    let connect = Connection::connect_uri(settings.uri(), options);
    let conn = match tokio::time::timeout(settings.options.timeout, connect).await {
        Ok(Ok(c)) => Ok(c),
        Ok(Err(err)) => {
            error!(error = err.to_string(), "failure to connect");
            Err(BusError::ConnectionError)
        }
        Err(_) => {
            error!(timeout = ?settings.options.timeout, "failure to connect - reason: timeout");
            Err(BusError::ConnectionError)
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((conn, c))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(BusError::ChannelError)
        }
    }
}
