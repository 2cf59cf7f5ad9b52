// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handlers invoked by subscriber workers.
//!
//! The subscriber is a relay: it hands every received frame to the handler
//! as raw bytes and does not decode it. Handlers that want structured
//! access use the [`codec`](crate::codec), or wrap a closure in
//! [`TopicHandler`] / [`DecodedHandler`].
//!
//! # Contract
//!
//! Handlers run on worker tasks. They must not block indefinitely. A
//! handler that panics is contained: the panic is logged and the worker
//! moves on to the next frame.

use std::sync::Arc;

use crate::codec::{DecodedEvent, EventCheck, check_event_with_topic, decode, peek_topic};

/// Receives raw frames from a subscriber.
///
/// Any `Fn(&[u8]) + Send + Sync + 'static` closure is a handler. State the
/// handler needs is captured by the closure.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use event_notify::subscriber::EventHandler;
///
/// let count = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&count);
/// let handler = move |frame: &[u8]| {
///     counter.fetch_add(frame.len(), Ordering::Relaxed);
/// };
///
/// handler.on_message(&[1, 2, 3]);
/// assert_eq!(count.load(Ordering::Relaxed), 3);
/// ```
pub trait EventHandler: Send + Sync + 'static {
    /// Called once per received frame.
    fn on_message(&self, frame: &[u8]);
}

impl<F> EventHandler for F
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    fn on_message(&self, frame: &[u8]) {
        self(frame);
    }
}

/// A handler shared by every worker of a pool.
pub type SharedHandler = Arc<dyn EventHandler>;

/// Calls a closure with events of exactly one topic.
///
/// Frames of other topics are skipped silently; malformed frames are
/// logged and skipped.
///
/// # Examples
///
/// ```
/// use event_notify::codec::{DecodedEvent, encode};
/// use event_notify::subscriber::{EventHandler, TopicHandler};
///
/// let handler = TopicHandler::new("stor.error", |event: &DecodedEvent<'_>| {
///     assert_eq!(event.payload(), &[1, 2, 3]);
/// });
///
/// handler.on_message(&encode("stor.error", &[1, 2, 3], 0).unwrap());
/// handler.on_message(&encode("stor.status", &[], 0).unwrap()); // skipped
/// ```
pub struct TopicHandler<F> {
    topic: String,
    callback: F,
}

impl<F> TopicHandler<F>
where
    F: Fn(&DecodedEvent<'_>) + Send + Sync + 'static,
{
    /// Creates a handler for `topic`.
    pub fn new(topic: impl Into<String>, callback: F) -> Self {
        Self {
            topic: topic.into(),
            callback,
        }
    }

    /// Returns the topic this handler accepts.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<F> EventHandler for TopicHandler<F>
where
    F: Fn(&DecodedEvent<'_>) + Send + Sync + 'static,
{
    fn on_message(&self, frame: &[u8]) {
        match check_event_with_topic(&self.topic, frame) {
            EventCheck::Accepted(event) => (self.callback)(&event),
            EventCheck::Filtered => {}
            EventCheck::Malformed(err) => {
                tracing::warn!(
                    topic = %self.topic,
                    len = frame.len(),
                    error = %err,
                    "Malformed event frame"
                );
            }
        }
    }
}

/// Calls a closure with every valid event, whatever its topic.
///
/// The frame's own topic is read first and then used to validate the
/// frame. Malformed frames are logged and skipped.
pub struct DecodedHandler<F> {
    callback: F,
}

impl<F> DecodedHandler<F>
where
    F: Fn(&DecodedEvent<'_>) + Send + Sync + 'static,
{
    /// Creates a catch-all decoding handler.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventHandler for DecodedHandler<F>
where
    F: Fn(&DecodedEvent<'_>) + Send + Sync + 'static,
{
    fn on_message(&self, frame: &[u8]) {
        let Some(topic) = peek_topic(frame) else {
            tracing::warn!(len = frame.len(), "Event frame without readable topic");
            return;
        };

        match decode(frame, topic) {
            Ok(event) => (self.callback)(&event),
            Err(err) => {
                tracing::warn!(
                    topic = %topic,
                    len = frame.len(),
                    error = %err,
                    "Malformed event frame"
                );
            }
        }
    }
}
