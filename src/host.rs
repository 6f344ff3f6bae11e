//! Owner-thread request channel.
//!
//! Live host state (`LiveWorld`) is not shareable across threads. Pool tasks
//! that need it send a closure through a `HostHandle` and await the reply;
//! the owner thread runs queued closures whenever it calls
//! `HostQueue::pump`, typically once per host tick.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::provider::LiveWorld;

type HostJob = Box<dyn FnOnce(&dyn LiveWorld) + Send>;

/// Create a connected handle/queue pair.
pub fn host_channel() -> (HostHandle, HostQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HostHandle { tx }, HostQueue { rx })
}

/// Sending side, cloned into pool tasks.
#[derive(Clone)]
pub struct HostHandle {
    tx: mpsc::UnboundedSender<HostJob>,
}

impl HostHandle {
    /// Run `f` on the owner thread and wait for its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, HostError>
    where
        F: FnOnce(&dyn LiveWorld) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: HostJob = Box::new(move |world| {
            let _ = reply_tx.send(f(world));
        });
        self.tx.send(job).map_err(|_| HostError::Closed)?;
        reply_rx.await.map_err(|_| HostError::Closed)
    }
}

/// Receiving side, owned by the host thread.
pub struct HostQueue {
    rx: mpsc::UnboundedReceiver<HostJob>,
}

impl HostQueue {
    /// Run every queued request against `world`. Returns how many ran.
    pub fn pump(&mut self, world: &dyn LiveWorld) -> usize {
        let mut served = 0;
        while let Ok(job) = self.rx.try_recv() {
            job(world);
            served += 1;
        }
        served
    }

    /// Keep serving requests until `done` returns true or `timeout` elapses.
    /// Returns whether `done` was reached.
    pub fn serve_until<F: FnMut() -> bool>(
        &mut self,
        world: &dyn LiveWorld,
        timeout: Duration,
        mut done: F,
    ) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            self.pump(world);
            if done() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Errors from a host round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostError {
    /// The owner thread dropped its queue
    Closed,
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::Closed => write!(f, "host thread is no longer serving requests"),
        }
    }
}

impl std::error::Error for HostError {}
