// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Configuration
//!
//! Queue declarations and queue-to-exchange bindings accepted by `setup`.

use serde::Deserialize;

/// Definition of a queue.
///
/// `QueueConfig::new` applies the bare-name defaults: durable, not auto-deleted,
/// and marked for subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    pub name: String,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default = "enabled_by_default")]
    pub subscribe: bool,
    #[serde(default = "enabled_by_default")]
    pub durable: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl QueueConfig {
    /// Creates a queue config with the default settings.
    pub fn new(name: impl Into<String>) -> QueueConfig {
        QueueConfig {
            name: name.into(),
            auto_delete: false,
            subscribe: true,
            durable: true,
        }
    }

    /// Sets the queue to auto-delete when no longer used.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Declares the queue without persisting it across broker restarts.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Declares the queue without marking it for subscription.
    pub fn no_subscribe(mut self) -> Self {
        self.subscribe = false;
        self
    }
}

/// A queue entry in a setup call: a bare name or a full config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QueueSpec {
    Name(String),
    Full(QueueConfig),
}

impl From<&str> for QueueSpec {
    fn from(name: &str) -> Self {
        QueueSpec::Name(name.to_owned())
    }
}

impl From<String> for QueueSpec {
    fn from(name: String) -> Self {
        QueueSpec::Name(name)
    }
}

impl From<QueueConfig> for QueueSpec {
    fn from(config: QueueConfig) -> Self {
        QueueSpec::Full(config)
    }
}

impl From<QueueSpec> for QueueConfig {
    fn from(spec: QueueSpec) -> Self {
        match spec {
            QueueSpec::Name(name) => QueueConfig::new(name),
            QueueSpec::Full(config) => config,
        }
    }
}

/// Configuration for binding a queue to an exchange.
///
/// An empty `keys` list binds with the empty routing key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BindingConfig {
    pub exchange: String,
    pub target: String,
    #[serde(default)]
    pub keys: Vec<String>,
}

impl BindingConfig {
    /// Creates a binding from `exchange` to the `target` queue.
    ///
    /// # Parameters
    /// * `exchange` - The source exchange
    /// * `target` - The destination queue
    ///
    /// # Returns
    /// A binding without routing keys, bound with the empty key
    pub fn new(exchange: impl Into<String>, target: impl Into<String>) -> BindingConfig {
        BindingConfig {
            exchange: exchange.into(),
            target: target.into(),
            keys: vec![],
        }
    }

    /// Adds a routing key to the binding.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// Routing keys to bind with, never empty.
    pub fn routing_keys(&self) -> Vec<&str> {
        if self.keys.is_empty() {
            return vec![""];
        }
        self.keys.iter().map(String::as_str).collect()
    }
}
