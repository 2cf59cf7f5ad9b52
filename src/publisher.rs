// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event publisher.
//!
//! A [`Publisher`] stamps each event with its own sequence number, encodes
//! it and hands the frame to the transport. The outbound connection is
//! opened on first publish and reopened on a later publish if opening
//! failed.
//!
//! # Sequence numbers
//!
//! The counter starts at 0 and advances on every publish attempt, including
//! failed ones. A gap seen by a subscriber therefore signals a transient
//! publish failure, not corruption.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::codec::{self, AuxHeader};
use crate::config::RoutingMode;
use crate::error::{Error, Result};
use crate::transport::{PublishSocket, Transport};

/// Publishes events to one endpoint.
///
/// A publisher can be shared between producer threads: the sequence
/// counter is atomic and the transport connection is required to accept
/// concurrent sends.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use event_notify::{Publisher, RoutingMode};
/// use event_notify::transport::{InprocTransport, Transport};
///
/// let transport = InprocTransport::new();
/// let publisher = Publisher::new(Arc::new(transport.clone()), &RoutingMode::direct("inproc://doc"));
///
/// // Nobody listens yet: the publish fails but still consumes sequence 0.
/// assert!(publisher.publish("stor.status", b"").is_err());
/// assert_eq!(publisher.next_sequence(), 1);
/// ```
pub struct Publisher {
    transport: Arc<dyn Transport>,
    address: String,
    socket: Mutex<Option<Arc<dyn PublishSocket>>>,
    sequence: AtomicU32,
}

impl Publisher {
    /// Creates a publisher for the routing mode's publish address.
    ///
    /// No connection is opened until the first publish.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, routing: &RoutingMode) -> Self {
        Self {
            transport,
            address: routing.publish_address().to_string(),
            socket: Mutex::new(None),
            sequence: AtomicU32::new(0),
        }
    }

    /// Returns the address this publisher sends to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns `true` once the outbound connection has been opened.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.socket.lock().is_some()
    }

    /// Returns the sequence number the next publish will use.
    #[must_use]
    pub fn next_sequence(&self) -> u32 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Publishes `payload` on `topic` with an empty auxiliary header.
    ///
    /// Returns the sequence number stamped on the event.
    ///
    /// # Errors
    ///
    /// - [`Error::Construction`] if the connection cannot be opened
    /// - [`Error::Encoding`] if the topic or payload is unusable
    /// - [`Error::Transport`] if the transport does not accept the frame
    pub fn publish(&self, topic: &str, payload: &[u8]) -> Result<u32> {
        self.publish_with_header(topic, &AuxHeader::empty(), payload)
    }

    /// Publishes `payload` on `topic` with auxiliary header fields.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish`].
    pub fn publish_with_header(&self, topic: &str, aux: &AuxHeader, payload: &[u8]) -> Result<u32> {
        // fetch_add wraps on overflow
        let sequence_id = self.sequence.fetch_add(1, Ordering::AcqRel);

        let socket = self.connection()?;
        let frame = codec::encode_with_header(topic, aux, payload, sequence_id)?;

        socket.send(Arc::from(frame)).map_err(|e| {
            tracing::debug!(
                topic = %topic,
                sequence_id,
                error = %e,
                "Publish not accepted by transport"
            );
            Error::Transport(e)
        })?;

        tracing::trace!(topic = %topic, sequence_id, len = payload.len(), "Published event");
        Ok(sequence_id)
    }

    /// Returns the open connection, opening it if needed.
    fn connection(&self) -> Result<Arc<dyn PublishSocket>> {
        let mut socket = self.socket.lock();
        if let Some(socket) = socket.as_ref() {
            return Ok(Arc::clone(socket));
        }

        let opened = self.transport.open_publisher(&self.address).map_err(|e| {
            tracing::warn!(address = %self.address, error = %e, "Failed to open publisher connection");
            Error::Construction(format!("cannot open publisher on {}: {e}", self.address))
        })?;
        tracing::debug!(address = %self.address, "Publisher connected");

        *socket = Some(Arc::clone(&opened));
        Ok(opened)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("address", &self.address)
            .field("connected", &self.is_connected())
            .field("next_sequence", &self.next_sequence())
            .finish_non_exhaustive()
    }
}
