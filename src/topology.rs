// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Topology Installation
//!
//! Declares the exchanges, queues and bindings of a resolved configuration on a
//! channel. It runs on every (re)connection, so every declaration is idempotent
//! on the broker side.

use crate::{config::ResolvedConfig, errors::BusError};
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel,
};
use tracing::{debug, error};

/// Declares the topology described by a resolved configuration.
pub struct AmqpTopology<'tp> {
    channel: &'tp Channel,
    config: &'tp ResolvedConfig,
}

impl<'tp> AmqpTopology<'tp> {
    pub fn new(channel: &'tp Channel, config: &'tp ResolvedConfig) -> AmqpTopology<'tp> {
        AmqpTopology { channel, config }
    }

    /// Creates all exchanges, then all queues (and the reply queue when
    /// requested), then binds queues to exchanges.
    pub async fn install(&self) -> Result<(), BusError> {
        self.install_exchanges().await?;
        self.install_queues().await?;
        self.install_reply_queue().await?;
        self.binding_queues().await
    }

    async fn install_exchanges(&self) -> Result<(), BusError> {
        for exch in &self.config.exchanges {
            debug!("creating exchange: {}", exch.name);

            match self
                .channel
                .exchange_declare(
                    &exch.name,
                    exch.kind.into(),
                    ExchangeDeclareOptions {
                        passive: false,
                        durable: exch.persistent,
                        auto_delete: exch.auto_delete,
                        internal: false,
                        nowait: false,
                    },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        name = exch.name,
                        "error to declare the exchange"
                    );
                    Err(BusError::DeclareExchangeError(exch.name.clone()))
                }
                _ => Ok(()),
            }?;

            debug!("exchange: {} was created", exch.name);
        }

        Ok(())
    }

    async fn install_queues(&self) -> Result<(), BusError> {
        for queue in &self.config.queues {
            self.declare_queue(
                &queue.name,
                QueueDeclareOptions {
                    durable: queue.durable,
                    auto_delete: queue.auto_delete,
                    ..Default::default()
                },
            )
            .await?;
        }

        Ok(())
    }

    /// Declares an exclusive, auto-deleted queue named after the connection.
    async fn install_reply_queue(&self) -> Result<(), BusError> {
        let options = &self.config.connection.options;
        if !options.reply_queue {
            return Ok(());
        }

        self.declare_queue(
            &reply_queue_name(&options.name),
            QueueDeclareOptions {
                exclusive: true,
                auto_delete: true,
                ..Default::default()
            },
        )
        .await
    }

    async fn declare_queue(&self, name: &str, options: QueueDeclareOptions) -> Result<(), BusError> {
        debug!("creating queue: {}", name);

        match self
            .channel
            .queue_declare(name, options, FieldTable::default())
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), name, "error to declare the queue");
                Err(BusError::DeclareQueueError(name.to_owned()))
            }
            _ => {
                debug!("queue: {} was created", name);
                Ok(())
            }
        }
    }

    async fn binding_queues(&self) -> Result<(), BusError> {
        for binding in &self.config.bindings {
            for key in binding.routing_keys() {
                debug!(
                    "binding queue: {} to the exchange: {} with the key: {}",
                    binding.target, binding.exchange, key
                );

                match self
                    .channel
                    .queue_bind(
                        &binding.target,
                        &binding.exchange,
                        key,
                        QueueBindOptions { nowait: false },
                        FieldTable::default(),
                    )
                    .await
                {
                    Err(err) => {
                        error!(error = err.to_string(), "error to bind queue to exchange");

                        Err(BusError::BindingExchangeToQueueError(
                            binding.exchange.clone(),
                            binding.target.clone(),
                        ))
                    }
                    _ => Ok(()),
                }?;
            }
        }

        Ok(())
    }
}

/// Name of the reply queue declared for a connection.
pub fn reply_queue_name(connection_name: &str) -> String {
    format!("{}.{}.response", connection_name, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_queue_is_scoped_to_connection_and_process() {
        let name = reply_queue_name("billing");

        assert!(name.starts_with("billing."));
        assert!(name.ends_with(".response"));
        assert!(name.contains(&std::process::id().to_string()));
    }
}
