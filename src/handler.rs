// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messages and Handlers
//!
//! Message shapes exchanged with the transport and the handler trait that
//! applications implement to process inbound messages.

use crate::errors::{BusError, HandlerError};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::{de::DeserializeOwned, Serialize};
use std::{future::Future, sync::Arc};
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message delivered from a queue.
///
/// Owned by the transport for one dispatch and settled exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub message_id: Option<String>,
    pub redelivered: bool,
}

impl InboundMessage {
    pub fn new(queue: &str, routing_key: &str, body: &[u8]) -> InboundMessage {
        InboundMessage {
            queue: queue.to_owned(),
            routing_key: routing_key.to_owned(),
            body: body.to_vec(),
            ..Default::default()
        }
    }

    /// Decodes the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        serde_json::from_slice(&self.body).map_err(|_| BusError::ParsePayloadError)
    }
}

/// A message handed to the transport for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub message_id: String,
}

impl OutboundMessage {
    /// Serializes `data` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(routing_key: &str, data: &T) -> Result<Self, BusError> {
        let body = serde_json::to_vec(data).map_err(|_| BusError::ParsePayloadError)?;
        Ok(OutboundMessage {
            routing_key: routing_key.to_owned(),
            body,
            content_type: JSON_CONTENT_TYPE.to_owned(),
            message_id: Uuid::new_v4().to_string(),
        })
    }
}

/// Terminal settlement of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    /// Processing failed or nobody listens on the queue; the broker should redeliver.
    Reject,
}

/// Processes messages delivered to a subscribed queue.
///
/// Returning an error rejects the message and stops the handler chain for it.
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn exec(&self, ctx: &Context, msg: &InboundMessage) -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ConsumerHandler for FnHandler<F>
where
    F: Fn(InboundMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn exec(&self, _ctx: &Context, msg: &InboundMessage) -> Result<(), HandlerError> {
        (self.0)(msg.clone()).await
    }
}

/// Wraps an async closure as a handler.
///
/// ```ignore
/// bus.subscribe(None, handler_fn(|msg| async move {
///     let order: Order = msg.json()?;
///     Ok(())
/// }))
/// .await?;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ConsumerHandler>
where
    F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
