// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Reconnect Backoff
//!
//! Delay schedule used by the AMQP transport after losing (or failing to open)
//! its connection. The delay starts at `wait_min`, grows by `wait_increment` on
//! every attempt and is capped at `wait_max`. Reconnecting stops after
//! `retry_limit` attempts or once `fail_after` has passed since the first
//! failure, at which point the broker is considered unreachable.

use crate::config::ConnectionOptions;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Backoff {
    wait_min: Duration,
    wait_max: Duration,
    wait_increment: Duration,
    retry_limit: u32,
    fail_after: Duration,
    attempts: u32,
    since: Option<Instant>,
}

impl Backoff {
    /// Schedule built from the reconnect settings of a connection profile.
    pub fn new(options: &ConnectionOptions) -> Self {
        Backoff {
            wait_min: options.wait_min,
            wait_max: options.wait_max,
            wait_increment: options.wait_increment,
            retry_limit: options.retry_limit,
            fail_after: options.fail_after,
            attempts: 0,
            since: None,
        }
    }

    /// Delay before the next attempt, or `None` when reconnecting should stop.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let since = *self.since.get_or_insert_with(Instant::now);

        if self.attempts >= self.retry_limit || since.elapsed() >= self.fail_after {
            return None;
        }

        let grown = self
            .wait_increment
            .checked_mul(self.attempts)
            .and_then(|extra| self.wait_min.checked_add(extra))
            .unwrap_or(self.wait_max);

        self.attempts += 1;
        Some(grown.min(self.wait_max))
    }

    /// Starts over after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.since = None;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
