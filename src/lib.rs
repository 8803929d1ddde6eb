// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod consumer;
mod otel;

pub mod amqp;
pub mod bus;
pub mod channel;
pub mod config;
pub mod connectivity;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod memory;
pub mod publisher;
pub mod queue;
pub mod retry;
pub mod topology;
pub mod transport;

pub use amqp::AmqpTransport;
pub use bus::{Bus, BusBuilder, ErrorHandler};
pub use config::{BusConfig, ConnectionOverrides, Defaults, ResolvedConfig};
pub use connectivity::{ConnectivityState, CONNECTION_TIMEOUT};
pub use errors::{BusError, HandlerError};
pub use exchange::{ExchangeConfig, ExchangeKind, ExchangeSpec};
pub use handler::{handler_fn, ConsumerHandler, InboundMessage, OutboundMessage, Outcome};
pub use memory::MemoryTransport;
pub use queue::{BindingConfig, QueueConfig, QueueSpec};
pub use transport::{Transport, TransportEvent};
