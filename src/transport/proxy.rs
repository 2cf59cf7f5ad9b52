// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forwarding broker for proxy-routed deployments.
//!
//! ```text
//! Publisher ──► frontend ──► Proxy task ──► backend ──► Subscriber
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{PublishSocket, SubscribeSocket, Transport};
use crate::error::{Error, TransportError};

/// A running forwarder between two endpoints.
///
/// Every frame published to the frontend is re-sent, unchanged, on the
/// backend. Frames arriving while nobody listens on the backend are
/// dropped.
///
/// # Examples
///
/// ```no_run
/// use event_notify::transport::{InprocTransport, Proxy};
///
/// # async fn example() -> event_notify::Result<()> {
/// let transport = InprocTransport::new();
/// let proxy = Proxy::spawn(&transport, "inproc://front", "inproc://back")?;
///
/// // publishers connect to inproc://front, subscribers to inproc://back
///
/// proxy.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Proxy {
    frontend: String,
    backend: String,
    forwarded: Arc<AtomicU64>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Proxy {
    /// Connects to both endpoints and starts forwarding on a tokio task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Construction`] if called outside a tokio runtime,
    /// or [`Error::Transport`] if either endpoint cannot be opened.
    pub fn spawn(transport: &dyn Transport, frontend: &str, backend: &str) -> Result<Self, Error> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Construction(format!("proxy needs a tokio runtime: {e}")))?;

        let inbound = transport.open_subscriber(frontend)?;
        inbound.subscribe(b"")?;
        let outbound = transport.open_publisher(backend)?;

        let forwarded = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = runtime.spawn(forward(
            inbound,
            outbound,
            shutdown_rx,
            Arc::clone(&forwarded),
        ));

        tracing::info!(frontend = %frontend, backend = %backend, "Proxy started");

        Ok(Self {
            frontend: frontend.to_string(),
            backend: backend.to_string(),
            forwarded,
            shutdown_tx,
            task: Some(task),
        })
    }

    /// Returns the frontend address publishers connect to.
    #[must_use]
    pub fn frontend(&self) -> &str {
        &self.frontend
    }

    /// Returns the backend address subscribers connect to.
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Returns the number of frames forwarded to at least one subscriber.
    #[must_use]
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Returns `true` while the forwarding task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops forwarding and waits for the forwarding task to exit.
    pub async fn shutdown(mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Proxy task ended abnormally");
        }
        tracing::info!(frontend = %self.frontend, backend = %self.backend, "Proxy stopped");
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.shutdown_tx.send_replace(true);
            task.abort();
        }
    }
}

async fn forward(
    inbound: Arc<dyn SubscribeSocket>,
    outbound: Arc<dyn PublishSocket>,
    mut shutdown_rx: watch::Receiver<bool>,
    forwarded: Arc<AtomicU64>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            received = inbound.recv() => match received {
                Ok(frame) => match outbound.send(frame) {
                    Ok(()) => {
                        forwarded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TransportError::NoSubscribers) => {
                        tracing::trace!(backend = %outbound.address(), "No backend subscribers, frame dropped");
                    }
                    Err(e) => {
                        tracing::error!(backend = %outbound.address(), error = %e, "Proxy send failed");
                        break;
                    }
                },
                Err(e) => {
                    tracing::error!(frontend = %inbound.address(), error = %e, "Proxy receive failed");
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InprocTransport;

    #[test]
    fn spawn_outside_runtime_fails() {
        let transport = InprocTransport::new();
        let result = Proxy::spawn(&transport, "inproc://f", "inproc://b");
        assert!(matches!(result, Err(Error::Construction(_))));
    }

    #[tokio::test]
    async fn spawn_rejects_bad_address() {
        let transport = InprocTransport::new();
        let result = Proxy::spawn(&transport, "tcp://x", "inproc://b");
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::InvalidAddress(_)))
        ));
    }

    #[tokio::test]
    async fn forwards_frontend_to_backend() {
        let transport = InprocTransport::new();
        let proxy = Proxy::spawn(&transport, "inproc://front", "inproc://back").unwrap();
        assert_eq!(proxy.frontend(), "inproc://front");
        assert_eq!(proxy.backend(), "inproc://back");

        let subscriber = transport.open_subscriber("inproc://back").unwrap();
        subscriber.subscribe(b"stor.").unwrap();

        let publisher = transport.open_publisher("inproc://front").unwrap();
        publisher.send(Arc::from(&b"stor.error"[..])).unwrap();

        let frame = tokio::time::timeout(std::time::Duration::from_secs(2), subscriber.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&*frame, b"stor.error");
        assert_eq!(proxy.forwarded(), 1);
        assert!(proxy.is_running());

        proxy.shutdown().await;
    }
}
