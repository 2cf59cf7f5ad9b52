// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message transport seam.
//!
//! The publisher and subscriber never touch sockets directly; they go
//! through the traits in this module. A transport offers:
//!
//! - [`Transport::open_publisher`] / [`Transport::open_subscriber`] to
//!   connect to an endpoint address
//! - [`PublishSocket::send`] to hand one frame to the transport
//! - [`SubscribeSocket::subscribe`] / [`SubscribeSocket::unsubscribe`] to
//!   manage prefix interest
//! - [`SubscribeSocket::recv`], the only blocking point, cancelled by
//!   dropping the returned future
//!
//! # Implementations
//!
//! - [`InprocTransport`]: process-local endpoints (`inproc://name`)
//! - [`Proxy`]: forwards every frame from a frontend endpoint to a backend
//!   endpoint, for proxy-routed deployments

mod inproc;
mod proxy;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use inproc::{DEFAULT_CHANNEL_CAPACITY, INPROC_SCHEME, InprocTransport};
pub use proxy::Proxy;

use crate::error::TransportError;

/// One encoded frame, shared cheaply between receivers.
pub type Frame = Arc<[u8]>;

/// Future returned by [`SubscribeSocket::recv`].
pub type RecvFuture<'a> = Pin<Box<dyn Future<Output = Result<Frame, TransportError>> + Send + 'a>>;

/// A pub/sub transport able to open connections to endpoint addresses.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Opens an outbound connection to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the address is unusable or the
    /// transport is unavailable.
    fn open_publisher(&self, address: &str) -> Result<Arc<dyn PublishSocket>, TransportError>;

    /// Opens an inbound connection to `address`.
    ///
    /// A new connection has no subscriptions and receives nothing until
    /// [`SubscribeSocket::subscribe`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the address is unusable or the
    /// transport is unavailable.
    fn open_subscriber(&self, address: &str) -> Result<Arc<dyn SubscribeSocket>, TransportError>;
}

/// Outbound half of a connection.
///
/// Implementations must be safe to share between producer threads.
pub trait PublishSocket: Send + Sync {
    /// Hands a frame to the transport.
    ///
    /// Success means the transport accepted the frame, not that any
    /// subscriber received it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the frame was not accepted.
    fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Returns the endpoint this connection is attached to.
    fn address(&self) -> &str;
}

/// Inbound half of a connection.
pub trait SubscribeSocket: Send + Sync {
    /// Adds a prefix to the set of accepted frames. The empty prefix accepts
    /// everything.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the transport rejects the change.
    fn subscribe(&self, prefix: &[u8]) -> Result<(), TransportError>;

    /// Removes a prefix. Removing an unknown prefix is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the transport rejects the change.
    fn unsubscribe(&self, prefix: &[u8]) -> Result<(), TransportError>;

    /// Waits for the next frame matching a subscribed prefix.
    ///
    /// Several tasks may wait on the same connection; each frame is handed
    /// to exactly one of them.
    fn recv(&self) -> RecvFuture<'_>;

    /// Returns the endpoint this connection is attached to.
    fn address(&self) -> &str;
}
