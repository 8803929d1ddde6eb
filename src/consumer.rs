// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Message Consumer
//!
//! Runs the delivery loop of one bound queue. Deliveries are handed to the
//! queue's sink one at a time, so a queue's messages are processed in order,
//! and each delivery is acked or nacked (with requeue) according to the
//! outcome. Trace context is extracted from the message headers and a consumer
//! span covers the processing; handlers receive a context carrying that span.

use crate::{
    dispatcher::DeliverySink,
    errors::BusError,
    handler::{InboundMessage, Outcome},
    otel,
};
use futures_util::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    Consumer,
};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Status, TraceContextExt},
};
use std::borrow::Cow;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Spawns the delivery loop of `consumer`.
///
/// The loop ends when the consumer stream ends, which happens when the channel
/// or connection goes away. The transport starts a new loop once it has
/// reconnected.
pub(crate) fn spawn(mut consumer: Consumer, sink: DeliverySink) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tracer = global::tracer("amqp consumer");

        while let Some(result) = consumer.next().await {
            match result {
                Ok(delivery) => {
                    if let Err(err) = consume(&tracer, &delivery, &sink).await {
                        error!(error = err.to_string(), queue = sink.queue(), "error consume msg");
                    }
                }
                Err(err) => error!(error = err.to_string(), queue = sink.queue(), "errors consume msg"),
            }
        }

        warn!(queue = sink.queue(), "consumer stream ended");
    })
}

/// Dispatches one delivery and settles it.
pub(crate) async fn consume(
    tracer: &BoxedTracer,
    delivery: &Delivery,
    sink: &DeliverySink,
) -> Result<Outcome, BusError> {
    let msg = inbound_message(sink.queue(), delivery);

    let ctx = otel::consumer_context(&delivery.properties, tracer, &msg.routing_key);
    let span = ctx.span();

    debug!(
        "received: {} - exchange: {} - queue: {}",
        msg.routing_key,
        msg.exchange,
        sink.queue(),
    );

    let outcome = sink.deliver(&ctx, &msg).await;

    match outcome {
        Outcome::Ack => {
            if let Err(e) = delivery.ack(BasicAckOptions { multiple: false }).await {
                error!("error whiling ack msg");
                span.record_error(&e);
                span.set_status(Status::Error {
                    description: Cow::from("error to ack msg"),
                });
                return Err(BusError::AckMessageError);
            }
            span.set_status(Status::Ok);
        }
        Outcome::Reject => {
            span.set_status(Status::Error {
                description: Cow::from("message rejected"),
            });
            if let Err(e) = delivery
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue: true,
                })
                .await
            {
                error!("error whiling nack msg");
                span.record_error(&e);
                return Err(BusError::NackMessageError);
            }
        }
    }

    Ok(outcome)
}

fn inbound_message(queue: &str, delivery: &Delivery) -> InboundMessage {
    let props = &delivery.properties;

    InboundMessage {
        queue: queue.to_owned(),
        exchange: delivery.exchange.as_str().to_owned(),
        routing_key: delivery.routing_key.as_str().to_owned(),
        body: delivery.data.clone(),
        content_type: props.content_type().as_ref().map(|v| v.as_str().to_owned()),
        message_id: props.message_id().as_ref().map(|v| v.as_str().to_owned()),
        redelivered: delivery.redelivered,
    }
}
