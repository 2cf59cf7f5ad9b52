// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus configuration.
//!
//! The routing mode is resolved once when the process starts and injected
//! into every publisher, subscriber and handle. Nothing reads it from
//! global state afterwards.
//!
//! # Examples
//!
//! ```
//! use event_notify::{BusConfig, RoutingMode};
//!
//! // Built in code
//! let config = BusConfig::builder()
//!     .proxied("inproc://bus.front", "inproc://bus.back")
//!     .worker_count(2)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.publish_address(), "inproc://bus.front");
//! assert_eq!(config.subscribe_address(), "inproc://bus.back");
//!
//! // Loaded from a JSON document
//! let config = BusConfig::from_json(r#"{ "routing": { "mode": "direct", "endpoint": "inproc://bus" } }"#).unwrap();
//! assert_eq!(config.routing, RoutingMode::direct("inproc://bus"));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::transport::DEFAULT_CHANNEL_CAPACITY;

/// Shared endpoint used by both sides in direct mode.
pub const DEFAULT_DIRECT_ENDPOINT: &str = "inproc://event_notify";

/// Address publishers use in proxy-routed mode.
pub const DEFAULT_PROXY_FRONTEND: &str = "inproc://event_notify.frontend";

/// Address subscribers use in proxy-routed mode.
pub const DEFAULT_PROXY_BACKEND: &str = "inproc://event_notify.backend";

/// Default number of subscriber workers.
pub const DEFAULT_WORKER_COUNT: usize = 1;

/// How publishers and subscribers reach each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoutingMode {
    /// Both sides share one local endpoint.
    Direct {
        /// The shared endpoint address.
        endpoint: String,
    },
    /// Frames pass through a forwarding broker.
    Proxied {
        /// Address publishers send to.
        frontend: String,
        /// Address subscribers receive from.
        backend: String,
    },
}

impl RoutingMode {
    /// Direct routing over `endpoint`.
    #[must_use]
    pub fn direct(endpoint: impl Into<String>) -> Self {
        Self::Direct {
            endpoint: endpoint.into(),
        }
    }

    /// Proxy routing over the given frontend and backend.
    #[must_use]
    pub fn proxied(frontend: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::Proxied {
            frontend: frontend.into(),
            backend: backend.into(),
        }
    }

    /// Address a publisher connects to.
    #[must_use]
    pub fn publish_address(&self) -> &str {
        match self {
            Self::Direct { endpoint } => endpoint,
            Self::Proxied { frontend, .. } => frontend,
        }
    }

    /// Address a subscriber connects to.
    #[must_use]
    pub fn subscribe_address(&self) -> &str {
        match self {
            Self::Direct { endpoint } => endpoint,
            Self::Proxied { backend, .. } => backend,
        }
    }

    /// Returns `true` for proxy routing.
    #[must_use]
    pub fn is_proxied(&self) -> bool {
        matches!(self, Self::Proxied { .. })
    }
}

impl Default for RoutingMode {
    fn default() -> Self {
        Self::direct(DEFAULT_DIRECT_ENDPOINT)
    }
}

/// Configuration for an event bus endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Routing mode and addresses.
    pub routing: RoutingMode,
    /// Frames buffered per endpoint by the in-process transport.
    pub channel_capacity: usize,
    /// Workers started by [`EventHandle::start_listening`](crate::EventHandle::start_listening)
    /// when no explicit count is given.
    pub worker_count: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            routing: RoutingMode::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl BusConfig {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder::default()
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed JSON and
    /// [`ConfigError::Invalid`] for unusable values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("worker_count must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be at least 1".into(),
            ));
        }
        match &self.routing {
            RoutingMode::Direct { endpoint } if endpoint.is_empty() => Err(ConfigError::Invalid(
                "direct endpoint is required".into(),
            )),
            RoutingMode::Proxied { frontend, backend } if frontend.is_empty() || backend.is_empty() => {
                Err(ConfigError::Invalid(
                    "proxy frontend and backend are required".into(),
                ))
            }
            RoutingMode::Proxied { frontend, backend } if frontend == backend => Err(
                ConfigError::Invalid("proxy frontend and backend must differ".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Address a publisher connects to.
    #[must_use]
    pub fn publish_address(&self) -> &str {
        self.routing.publish_address()
    }

    /// Address a subscriber connects to.
    #[must_use]
    pub fn subscribe_address(&self) -> &str {
        self.routing.subscribe_address()
    }
}

/// Builder for [`BusConfig`].
#[derive(Debug, Default)]
pub struct BusConfigBuilder {
    config: BusConfig,
}

impl BusConfigBuilder {
    /// Uses direct routing over `endpoint`.
    #[must_use]
    pub fn direct(mut self, endpoint: impl Into<String>) -> Self {
        self.config.routing = RoutingMode::direct(endpoint);
        self
    }

    /// Uses proxy routing with the given frontend and backend.
    #[must_use]
    pub fn proxied(mut self, frontend: impl Into<String>, backend: impl Into<String>) -> Self {
        self.config.routing = RoutingMode::proxied(frontend, backend);
        self
    }

    /// Uses proxy routing with the default frontend and backend.
    #[must_use]
    pub fn default_proxy(self) -> Self {
        self.proxied(DEFAULT_PROXY_FRONTEND, DEFAULT_PROXY_BACKEND)
    }

    /// Sets the per-endpoint frame buffer (default: 256).
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Sets the default worker count (default: 1).
    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value is unusable.
    pub fn build(self) -> Result<BusConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
