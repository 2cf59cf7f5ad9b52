// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `event_notify` - topic-addressed event notification for on-device
//! subsystems.
//!
//! Subsystems (recording, video source, encoder, storage) announce state
//! changes and errors on dot-delimited topics. Any number of local
//! listeners subscribe by topic prefix, without the subsystems depending on
//! one another.
//!
//! # Layers
//!
//! - [`codec`]: fixed-layout binary envelope, encode and validating decode
//! - [`transport`]: pub/sub socket traits, in-process transport, forwarder
//! - [`Publisher`]: stamps sequence numbers and sends frames
//! - [`Subscriber`]: worker pool relaying received frames to a handler
//! - [`EventHandle`]: one publisher and one subscriber per endpoint
//!
//! Delivery is fire-and-forget: at most once, no replay.
//!
//! # Quick Start
//!
//! ```no_run
//! use event_notify::codec::DecodedEvent;
//! use event_notify::subscriber::TopicHandler;
//! use event_notify::{BusConfig, EventHandle, topic};
//!
//! #[tokio::main]
//! async fn main() -> event_notify::Result<()> {
//!     let handle = EventHandle::inproc(BusConfig::default())?;
//!
//!     handle.start_listening(TopicHandler::new(topic::STOR_ERROR, |event: &DecodedEvent<'_>| {
//!         println!("{} {:?}", event.utc_string(), event.payload());
//!     }))?;
//!     handle.subscribe(topic::STOR)?;
//!
//!     handle.publish(topic::STOR_ERROR, &[0x01, 0x02, 0x03])?;
//!
//!     handle.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Proxy-routed deployment
//!
//! Publishers send to a frontend address and subscribers receive from a
//! backend address; a [`Proxy`](transport::Proxy) forwards between them.
//! [`EventHandle::inproc`] starts the process-wide context's proxy on first
//! use. Other transports run one with [`Proxy::spawn`](transport::Proxy::spawn).
//!
//! ```no_run
//! use event_notify::{BusConfig, EventHandle, topic};
//!
//! # async fn example() -> event_notify::Result<()> {
//! let config = BusConfig::builder().default_proxy().build()?;
//! let encoder = EventHandle::inproc(config.clone())?;
//! let recorder = EventHandle::inproc(config)?;
//!
//! recorder.start_listening(|frame: &[u8]| println!("{} bytes", frame.len()))?;
//! recorder.subscribe(topic::VENC)?;
//! encoder.publish(topic::VENC_STATUS_CONFIG_CHANGED, b"1080p")?;
//!
//! recorder.close().await;
//! encoder.close().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
mod handle;
mod publisher;
pub mod subscriber;
pub mod topic;
pub mod transport;

pub use codec::{AuxHeader, DecodedEvent, EventCheck, check_event_with_topic, decode, encode};
pub use config::{BusConfig, BusConfigBuilder, RoutingMode};
pub use error::{ConfigError, DecodeError, EncodingError, Error, Result, TransportError};
pub use handle::{EventHandle, HandleId};
pub use publisher::Publisher;
pub use subscriber::{EventHandler, Subscriber, SubscriberState};
