// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event handle: one publisher and one subscriber per endpoint.
//!
//! An [`EventHandle`] is what a subsystem holds to talk on the bus. It is
//! created empty:
//!
//! - the [`Publisher`] is built on the first publish
//! - a [`Subscriber`] is attached by [`EventHandle::start_listening`] and
//!   detached by [`EventHandle::stop_listening`]
//!
//! [`EventHandle::close`] stops the subscriber, joining its workers, before
//! the publisher is released. Dropping a handle does the same without
//! awaiting: running handlers are waited for, then the workers are torn
//! down and the publisher released. Dropping a handle from inside its own
//! handler deadlocks; call `close` from a task instead.
//!
//! # Examples
//!
//! Handles created with [`EventHandle::inproc`] share the process-wide
//! context, so a storage subsystem and a monitor reach each other:
//!
//! ```no_run
//! use event_notify::{BusConfig, EventHandle};
//! use event_notify::codec::DecodedEvent;
//! use event_notify::subscriber::TopicHandler;
//! use event_notify::topic;
//!
//! # async fn example() -> event_notify::Result<()> {
//! let storage = EventHandle::inproc(BusConfig::default())?;
//! let monitor = EventHandle::inproc(BusConfig::default())?;
//!
//! monitor.start_listening(TopicHandler::new(topic::STOR_ERROR, |event: &DecodedEvent<'_>| {
//!     println!("storage error #{}: {:?}", event.sequence_id(), event.payload());
//! }))?;
//! monitor.subscribe(topic::STOR)?;
//!
//! storage.publish(topic::STOR_ERROR, &[1, 2, 3])?;
//!
//! monitor.close().await;
//! storage.close().await;
//! # Ok(())
//! # }
//! ```

mod handle_id;

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

pub use handle_id::HandleId;

use crate::codec::AuxHeader;
use crate::config::{BusConfig, RoutingMode};
use crate::error::{Error, Result};
use crate::publisher::Publisher;
use crate::subscriber::{EventHandler, Subscriber, SubscriberState};
use crate::transport::{InprocTransport, Transport};

/// A subsystem's connection to the event bus.
pub struct EventHandle {
    id: HandleId,
    transport: Arc<dyn Transport>,
    config: BusConfig,
    publisher: OnceLock<Publisher>,
    subscriber: Mutex<Option<Arc<Subscriber>>>,
}

impl EventHandle {
    /// Creates an empty handle on `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` does not validate.
    pub fn new(transport: Arc<dyn Transport>, config: BusConfig) -> Result<Self> {
        config.validate()?;
        let id = HandleId::new();
        tracing::debug!(
            handle = %id,
            publish = %config.publish_address(),
            subscribe = %config.subscribe_address(),
            "Event handle created"
        );
        Ok(Self {
            id,
            transport,
            config,
            publisher: OnceLock::new(),
            subscriber: Mutex::new(None),
        })
    }

    /// Creates a handle on the process-wide in-process context.
    ///
    /// `config.channel_capacity` sizes the context only if this is its
    /// first use. With proxied routing, the context's [`Proxy`] for the
    /// configured frontend and backend is started if it is not running.
    ///
    /// [`Proxy`]: crate::transport::Proxy
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `config` does not validate
    /// - [`Error::Construction`] if a proxy must be started outside a
    ///   tokio runtime
    /// - [`Error::Transport`] if the process-wide context was shut down
    pub fn inproc(config: BusConfig) -> Result<Self> {
        config.validate()?;
        let transport = InprocTransport::global_with_capacity(config.channel_capacity);
        if let RoutingMode::Proxied { frontend, backend } = &config.routing {
            transport.ensure_proxy(frontend, backend)?;
        }
        Self::new(Arc::new(transport), config)
    }

    /// Returns this handle's identifier.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Returns the configuration the handle was built with.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Returns `true` once the publisher has been built.
    #[must_use]
    pub fn has_publisher(&self) -> bool {
        self.publisher.get().is_some()
    }

    /// Returns `true` while a subscriber is attached and running.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.subscriber
            .lock()
            .as_ref()
            .is_some_and(|s| s.state() == SubscriberState::Started)
    }

    /// Returns the prefixes the attached subscriber is registered for.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriber
            .lock()
            .as_ref()
            .map(|s| s.subscriptions())
            .unwrap_or_default()
    }

    /// Publishes `payload` on `topic`.
    ///
    /// Returns the event's sequence number.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish`].
    pub fn publish(&self, topic: &str, payload: &[u8]) -> Result<u32> {
        self.publisher().publish(topic, payload)
    }

    /// Publishes `payload` on `topic` with auxiliary header fields.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish`].
    pub fn publish_with_header(&self, topic: &str, aux: &AuxHeader, payload: &[u8]) -> Result<u32> {
        self.publisher().publish_with_header(topic, aux, payload)
    }

    /// Attaches a subscriber running the configured number of workers.
    ///
    /// # Errors
    ///
    /// See [`EventHandle::start_listening_with`].
    pub fn start_listening<H: EventHandler>(&self, handler: H) -> Result<()> {
        self.start_listening_with(handler, self.config.worker_count)
    }

    /// Attaches a subscriber running `worker_count` workers.
    ///
    /// After [`EventHandle::stop_listening`] a new subscriber may be
    /// attached.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyActive`] if a subscriber is already running
    /// - any error of [`Subscriber::start`]
    pub fn start_listening_with<H: EventHandler>(&self, handler: H, worker_count: usize) -> Result<()> {
        let mut slot = self.subscriber.lock();
        if slot
            .as_ref()
            .is_some_and(|s| s.state() == SubscriberState::Started)
        {
            return Err(Error::AlreadyActive);
        }

        let subscriber = Subscriber::new(Arc::clone(&self.transport), &self.config.routing);
        subscriber.start(handler, worker_count)?;
        *slot = Some(Arc::new(subscriber));

        tracing::debug!(handle = %self.id, workers = worker_count, "Listening");
        Ok(())
    }

    /// Adds a topic prefix to the attached subscriber.
    ///
    /// # Errors
    ///
    /// - [`Error::NotStarted`] if not listening
    /// - any error of [`Subscriber::subscribe`]
    pub fn subscribe(&self, prefix: &str) -> Result<()> {
        self.listener()?.subscribe(prefix)
    }

    /// Removes a topic prefix from the attached subscriber.
    ///
    /// # Errors
    ///
    /// Same as [`EventHandle::subscribe`].
    pub fn unsubscribe(&self, prefix: &str) -> Result<()> {
        self.listener()?.unsubscribe(prefix)
    }

    /// Stops and detaches the subscriber.
    ///
    /// Returns once every worker has exited. Calling it when not listening,
    /// or from several tasks at once, is harmless.
    pub async fn stop_listening(&self) {
        let Some(subscriber) = self.subscriber.lock().clone() else {
            return;
        };

        subscriber.stop().await;

        let mut slot = self.subscriber.lock();
        if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, &subscriber)) {
            *slot = None;
            tracing::debug!(handle = %self.id, "Stopped listening");
        }
    }

    /// Tears the handle down: the subscriber is stopped and joined, then the
    /// publisher is released.
    pub async fn close(mut self) {
        self.stop_listening().await;
        if self.publisher.take().is_some() {
            tracing::debug!(handle = %self.id, "Publisher released");
        }
        tracing::debug!(handle = %self.id, "Event handle closed");
    }

    fn publisher(&self) -> &Publisher {
        self.publisher.get_or_init(|| {
            tracing::debug!(handle = %self.id, address = %self.config.publish_address(), "Creating publisher");
            Publisher::new(Arc::clone(&self.transport), &self.config.routing)
        })
    }

    fn listener(&self) -> Result<Arc<Subscriber>> {
        self.subscriber.lock().clone().ok_or(Error::NotStarted)
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        // Subscriber first: its pool waits for running handlers.
        if let Some(subscriber) = self.subscriber.get_mut().take() {
            drop(subscriber);
            tracing::debug!(handle = %self.id, "Subscriber released on drop");
        }
        drop(self.publisher.take());
    }
}

impl std::fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandle")
            .field("id", &self.id)
            .field("routing", &self.config.routing)
            .field("has_publisher", &self.has_publisher())
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::ConfigError;

    fn handle(endpoint: &str) -> EventHandle {
        EventHandle::inproc(BusConfig::builder().direct(endpoint).build().unwrap()).unwrap()
    }

    #[test]
    fn new_handle_is_empty() {
        let handle = handle("inproc://empty");
        assert!(!handle.has_publisher());
        assert!(!handle.is_listening());
        assert!(handle.subscriptions().is_empty());
    }

    #[test]
    fn invalid_config_rejected() {
        let config = BusConfig {
            worker_count: 0,
            ..BusConfig::default()
        };
        assert!(matches!(
            EventHandle::inproc(config),
            Err(Error::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn publisher_is_built_on_first_publish() {
        let handle = handle("inproc://lazy-pub");
        let _ = handle.publish("rec.status.started", b"");
        assert!(handle.has_publisher());
    }

    #[test]
    fn subscribe_without_listening_fails() {
        let handle = handle("inproc://not-listening");
        assert!(matches!(handle.subscribe("rec."), Err(Error::NotStarted)));
        assert!(matches!(handle.unsubscribe("rec."), Err(Error::NotStarted)));
    }

    #[tokio::test]
    async fn second_start_listening_rejected() {
        let handle = handle("inproc://second");
        handle.start_listening(|_: &[u8]| {}).unwrap();
        assert!(matches!(
            handle.start_listening(|_: &[u8]| {}),
            Err(Error::AlreadyActive)
        ));
        handle.close().await;
    }

    #[tokio::test]
    async fn stop_listening_is_idempotent_and_allows_restart() {
        let handle = handle("inproc://restart");
        handle.stop_listening().await;

        handle.start_listening(|_: &[u8]| {}).unwrap();
        handle.subscribe("vsrc.").unwrap();
        assert_eq!(handle.subscriptions(), vec!["vsrc.".to_string()]);

        handle.stop_listening().await;
        handle.stop_listening().await;
        assert!(!handle.is_listening());
        assert!(matches!(handle.subscribe("vsrc."), Err(Error::NotStarted)));

        handle.start_listening_with(|_: &[u8]| {}, 2).unwrap();
        assert!(handle.is_listening());
        handle.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_joins_workers_before_returning() {
        let handle = handle("inproc://close");
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        handle
            .start_listening_with(
                move |_: &[u8]| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                3,
            )
            .unwrap();
        handle.subscribe("").unwrap();

        handle.publish("venc.error", b"").unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while count.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("event delivered");

        tokio::time::timeout(Duration::from_secs(2), handle.close())
            .await
            .expect("close should not hang");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_output() {
        let handle = handle("inproc://debug");
        let debug = format!("{handle:?}");
        assert!(debug.contains("EventHandle"));
        assert!(debug.contains("inproc://debug"));
    }
}
