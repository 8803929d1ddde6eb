// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Configuration
//!
//! Exchange declarations accepted by `setup`. An exchange may be given as a bare
//! name, in which case the defaults below apply, or as a full object.

use serde::Deserialize;

/// Represents the types of exchanges a setup may declare.
///
/// Routing behavior belongs to the broker:
/// - Direct: exact match of routing keys
/// - Fanout: every bound queue regardless of routing key
/// - Topic: wildcard pattern match of routing keys
/// - Headers: match on header values instead of routing keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

/// Full definition of an exchange.
///
/// `ExchangeConfig::new` applies the bare-name defaults: a direct exchange that
/// is not auto-deleted and whose messages are persistent. The remaining methods
/// follow the builder pattern.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: ExchangeKind,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default = "persistent_by_default")]
    pub persistent: bool,
}

fn persistent_by_default() -> bool {
    true
}

impl ExchangeConfig {
    /// Creates an exchange config with the default settings.
    pub fn new(name: impl Into<String>) -> ExchangeConfig {
        ExchangeConfig {
            name: name.into(),
            kind: ExchangeKind::Direct,
            auto_delete: false,
            persistent: true,
        }
    }

    /// Sets the exchange type.
    ///
    /// # Parameters
    /// * `kind` - The exchange type
    ///
    /// # Returns
    /// Self for method chaining
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the exchange type to direct.
    pub fn direct(self) -> Self {
        self.kind(ExchangeKind::Direct)
    }

    /// Sets the exchange type to fanout.
    pub fn fanout(self) -> Self {
        self.kind(ExchangeKind::Fanout)
    }

    /// Sets the exchange type to topic.
    pub fn topic(self) -> Self {
        self.kind(ExchangeKind::Topic)
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Publishes to this exchange without the persistent delivery mode.
    pub fn transient(mut self) -> Self {
        self.persistent = false;
        self
    }
}

/// An exchange entry in a setup call: a bare name or a full config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExchangeSpec {
    Name(String),
    Full(ExchangeConfig),
}

impl From<&str> for ExchangeSpec {
    fn from(name: &str) -> Self {
        ExchangeSpec::Name(name.to_owned())
    }
}

impl From<String> for ExchangeSpec {
    fn from(name: String) -> Self {
        ExchangeSpec::Name(name)
    }
}

impl From<ExchangeConfig> for ExchangeSpec {
    fn from(config: ExchangeConfig) -> Self {
        ExchangeSpec::Full(config)
    }
}

impl From<ExchangeSpec> for ExchangeConfig {
    fn from(spec: ExchangeSpec) -> Self {
        match spec {
            ExchangeSpec::Name(name) => ExchangeConfig::new(name),
            ExchangeSpec::Full(config) => config,
        }
    }
}
