// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Worker pool that pulls frames off a subscriber connection.
//!
//! ```text
//!                ┌── worker 0 ──► handler
//! connection ────┼── worker 1 ──► handler
//!                └── worker N ──► handler
//! ```
//!
//! Every worker waits on the same connection, so each frame is handled by
//! exactly one worker. With more than one worker, frames may be handled out
//! of publish order.
//!
//! Each handler call runs under a shared read guard of the pool's in-flight
//! gate. Dropping the pool takes the write side, so it returns only after
//! every running handler has finished. Dropping a pool from inside one of
//! its own handlers therefore deadlocks.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::handler::SharedHandler;
use crate::error::TransportError;
use crate::transport::SubscribeSocket;

/// Counters shared by all workers of a pool.
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    dispatched: AtomicU64,
    panicked: AtomicU64,
}

impl PoolStats {
    pub(crate) fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub(crate) fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

/// A running set of workers.
pub(crate) struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    gate: Arc<RwLock<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `count` workers on `runtime`.
    pub(crate) fn spawn(
        runtime: &RuntimeHandle,
        socket: &Arc<dyn SubscribeSocket>,
        handler: &SharedHandler,
        count: usize,
        stats: &Arc<PoolStats>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let gate = Arc::new(RwLock::new(()));

        let workers = (0..count)
            .map(|index| {
                runtime.spawn(run_worker(
                    index,
                    Arc::clone(socket),
                    Arc::clone(handler),
                    shutdown_tx.subscribe(),
                    Arc::clone(&gate),
                    Arc::clone(stats),
                ))
            })
            .collect();

        Self {
            shutdown_tx,
            gate,
            workers,
        }
    }

    /// Signals every worker and waits for all of them to exit.
    pub(crate) async fn stop(mut self) {
        self.shutdown_tx.send_replace(true);
        for (index, worker) in std::mem::take(&mut self.workers).into_iter().enumerate() {
            if let Err(e) = worker.await {
                tracing::warn!(worker = index, error = %e, "Worker ended abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shutdown_tx.send_replace(true);
        for worker in &self.workers {
            worker.abort();
        }
        // Wait out handlers that were already running.
        drop(self.gate.write());
        tracing::debug!(
            workers = self.workers.len(),
            "Worker pool dropped without stop; in-flight handlers joined"
        );
    }
}

async fn run_worker(
    index: usize,
    socket: Arc<dyn SubscribeSocket>,
    handler: SharedHandler,
    mut shutdown_rx: watch::Receiver<bool>,
    gate: Arc<RwLock<()>>,
    stats: Arc<PoolStats>,
) {
    tracing::trace!(worker = index, address = %socket.address(), "Worker started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            received = socket.recv() => match received {
                Ok(frame) => {
                    if !dispatch_gated(index, &handler, &frame, &stats, &gate, &shutdown_rx) {
                        break;
                    }
                }
                Err(TransportError::Closed) => {
                    tracing::warn!(worker = index, address = %socket.address(), "Connection closed, worker exiting");
                    break;
                }
                Err(e) => {
                    tracing::warn!(worker = index, error = %e, "Receive failed");
                    tokio::task::yield_now().await;
                }
            },
        }
    }

    tracing::trace!(worker = index, "Worker stopped");
}

/// Runs the handler under the in-flight gate.
///
/// Returns `false` without calling the handler once shutdown was signalled.
fn dispatch_gated(
    index: usize,
    handler: &SharedHandler,
    frame: &[u8],
    stats: &PoolStats,
    gate: &RwLock<()>,
    shutdown_rx: &watch::Receiver<bool>,
) -> bool {
    let _in_flight = gate.read();
    if *shutdown_rx.borrow() {
        return false;
    }
    dispatch(index, handler, frame, stats);
    true
}

fn dispatch(index: usize, handler: &SharedHandler, frame: &[u8], stats: &PoolStats) {
    stats.dispatched.fetch_add(1, Ordering::Relaxed);
    if catch_unwind(AssertUnwindSafe(|| handler.on_message(frame))).is_err() {
        stats.panicked.fetch_add(1, Ordering::Relaxed);
        tracing::error!(worker = index, len = frame.len(), "Event handler panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use super::*;
    use crate::transport::{InprocTransport, Transport};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_joins_idle_workers() {
        let transport = InprocTransport::new();
        let socket = transport.open_subscriber("inproc://idle").unwrap();
        let handler: SharedHandler = Arc::new(|_: &[u8]| {});
        let stats = Arc::new(PoolStats::default());

        let pool = WorkerPool::spawn(&RuntimeHandle::current(), &socket, &handler, 4, &stats);
        tokio::time::timeout(Duration::from_secs(2), pool.stop())
            .await
            .expect("stop should not hang");
        assert_eq!(stats.dispatched(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_handler_does_not_kill_worker() {
        let transport = InprocTransport::new();
        let socket = transport.open_subscriber("inproc://panic").unwrap();
        socket.subscribe(b"").unwrap();
        let publisher = transport.open_publisher("inproc://panic").unwrap();

        let handler: SharedHandler = Arc::new(|frame: &[u8]| {
            assert!(frame != b"boom", "handler failure");
        });
        let stats = Arc::new(PoolStats::default());
        let pool = WorkerPool::spawn(&RuntimeHandle::current(), &socket, &handler, 1, &stats);

        publisher.send(Arc::from(&b"boom"[..])).unwrap();
        publisher.send(Arc::from(&b"fine"[..])).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while stats.dispatched() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both frames dispatched");

        assert_eq!(stats.panicked(), 1);
        pool.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drop_waits_for_running_handler() {
        let transport = InprocTransport::new();
        let socket = transport.open_subscriber("inproc://drop-busy").unwrap();
        socket.subscribe(b"").unwrap();
        let publisher = transport.open_publisher("inproc://drop-busy").unwrap();

        let entered = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let handler: SharedHandler = {
            let entered = Arc::clone(&entered);
            let finished = Arc::clone(&finished);
            Arc::new(move |_: &[u8]| {
                entered.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                finished.store(true, Ordering::SeqCst);
            })
        };
        let stats = Arc::new(PoolStats::default());
        let pool = WorkerPool::spawn(&RuntimeHandle::current(), &socket, &handler, 2, &stats);

        publisher.send(Arc::from(&b"slow"[..])).unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !entered.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("handler entered");

        drop(pool);
        assert!(finished.load(Ordering::SeqCst));

        publisher.send(Arc::from(&b"late"[..])).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.dispatched(), 1);
    }

    #[test]
    fn shutdown_signal_skips_handler() {
        let handler: SharedHandler = Arc::new(|_: &[u8]| {});
        let stats = PoolStats::default();
        let gate = RwLock::new(());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send_replace(true);

        assert!(!dispatch_gated(0, &handler, b"frame", &stats, &gate, &shutdown_rx));
        assert_eq!(stats.dispatched(), 0);
    }
}
