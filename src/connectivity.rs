// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connectivity Tracking
//!
//! Holds the connectivity state reported by the transport and lets callers wait,
//! with a bound, until the broker connection is usable.

use crate::errors::BusError;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// How long gated operations wait for the connection before failing.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Connectivity of the underlying transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectivityState {
    #[default]
    Disconnected,
    Connected,
    /// The transport stopped reconnecting. Terminal until the next setup.
    Unreachable,
}

impl ConnectivityState {
    /// Returns `true` only for [`ConnectivityState::Connected`].
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityState::Connected)
    }
}

/// Gate that publish/subscribe calls pass through before touching the transport.
///
/// State changes are broadcast over a `watch` channel, so waiters wake as soon as
/// the transport reports a connection instead of polling.
#[derive(Debug)]
pub struct ReadinessGate {
    state: watch::Sender<ConnectivityState>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    /// Creates a gate in the `Disconnected` state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectivityState::Disconnected);
        ReadinessGate { state }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Synchronous check used by callers that must not wait.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that observes every later state change.
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Publishes a new state to every waiter and watcher.
    pub(crate) fn set(&self, next: ConnectivityState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "connectivity changed");
        }
    }

    /// Waits until the state becomes `Connected`.
    ///
    /// Returns `BusError::ConnectionTimeout` once `timeout` elapses without a
    /// connection.
    pub async fn wait(&self, timeout: Duration) -> Result<(), BusError> {
        let mut rx = self.watch();
        let ready = async move { rx.wait_for(|s| s.is_connected()).await.map(|_| ()) };

        match tokio::time::timeout(timeout, ready).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(BusError::InternalError),
            Err(_) => Err(BusError::ConnectionTimeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn starts_disconnected() {
        let gate = ReadinessGate::new();
        assert_eq!(gate.state(), ConnectivityState::Disconnected);
        assert!(!gate.is_connected());
    }

    #[test]
    fn reflects_every_transition() {
        let gate = ReadinessGate::new();

        gate.set(ConnectivityState::Connected);
        assert!(gate.is_connected());

        gate.set(ConnectivityState::Disconnected);
        assert!(!gate.is_connected());

        gate.set(ConnectivityState::Unreachable);
        assert!(!gate.is_connected());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_connected() {
        let gate = ReadinessGate::new();
        gate.set(ConnectivityState::Connected);

        assert_eq!(gate.wait(Duration::from_millis(1)).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_after_the_window() {
        let gate = ReadinessGate::new();
        let started = Instant::now();

        let result = gate.wait(CONNECTION_TIMEOUT).await;

        assert_eq!(result, Err(BusError::ConnectionTimeout(CONNECTION_TIMEOUT)));
        assert!(started.elapsed() >= CONNECTION_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_wakes_up_when_connection_arrives() {
        let gate = Arc::new(ReadinessGate::new());

        let setter = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            setter.set(ConnectivityState::Connected);
        });

        let started = Instant::now();
        assert_eq!(gate.wait(CONNECTION_TIMEOUT).await, Ok(()));
        assert!(started.elapsed() < CONNECTION_TIMEOUT);
    }
}
