//! Shared worker pool.
//!
//! A dedicated multi-threaded tokio runtime. Every render stage (pass
//! drivers, region tasks, parse and raster batches) is spawned through a
//! `PoolHandle`, which counts outstanding tasks so shutdown can report how
//! much work it abandoned.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, trace, warn};
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::config::{MAX_PRIORITY, MIN_PRIORITY};

/// Result of shutting the pool down
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks still outstanding when the grace period ran out
    pub abandoned: usize,
    pub elapsed: Duration,
}

/// Decrements the outstanding counter when a task ends or is dropped.
struct TaskGuard(Arc<AtomicUsize>);

impl TaskGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cloneable spawner for the pool.
#[derive(Clone)]
pub struct PoolHandle {
    handle: Handle,
    workers: usize,
    outstanding: Arc<AtomicUsize>,
}

impl PoolHandle {
    /// Spawn a tracked task on the pool.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = TaskGuard::new(self.outstanding.clone());
        self.handle.spawn(async move {
            let _guard = guard;
            future.await
        })
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tasks spawned and not yet finished
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

/// Map a 1..=10 worker priority onto the 0..=99 cross-platform scale
fn os_priority(priority: u8) -> u8 {
    let priority = priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
    ((priority - MIN_PRIORITY) as u32 * 99 / (MAX_PRIORITY - MIN_PRIORITY) as u32) as u8
}

/// Apply `priority` to the calling thread. The OS may refuse, for example
/// when raising priority needs privileges the process lacks.
fn apply_priority(priority: u8) {
    let value = match ThreadPriorityValue::try_from(os_priority(priority)) {
        Ok(value) => value,
        Err(e) => {
            warn!("worker priority {} out of range: {:?}", priority, e);
            return;
        }
    };
    match set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
        Ok(()) => trace!("render worker started at priority {}", priority),
        Err(e) => warn!("could not set render worker priority {}: {:?}", priority, e),
    }
}

/// Owns the worker threads.
pub struct RenderPool {
    runtime: Option<Runtime>,
    handle: PoolHandle,
}

impl RenderPool {
    /// Start `workers` threads (at least one), each set to `priority` (1-10).
    pub fn new(workers: usize, priority: u8) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let thread_counter = Arc::new(AtomicUsize::new(0));

        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name_fn(move || format!("voxmap-worker-{}", thread_counter.fetch_add(1, Ordering::SeqCst)))
            .on_thread_start(move || apply_priority(priority))
            .enable_time()
            .build()?;

        info!("spawned {} render worker threads", workers);

        let handle = PoolHandle {
            handle: runtime.handle().clone(),
            workers,
            outstanding: Arc::new(AtomicUsize::new(0)),
        };

        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    pub fn workers(&self) -> usize {
        self.handle.workers
    }

    /// Wait up to `grace` for outstanding tasks, then drop whatever is left.
    ///
    /// Must not be called from inside the pool.
    pub fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        let start = Instant::now();
        while self.handle.outstanding() > 0 && start.elapsed() < grace {
            std::thread::sleep(Duration::from_millis(10));
        }

        let abandoned = self.handle.outstanding();
        if abandoned > 0 {
            error!(
                "render pool did not finish within {:?}, forcefully shut down with {} tasks remaining",
                grace, abandoned
            );
        } else {
            info!("render pool shut down cleanly");
        }

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }

        ShutdownReport {
            abandoned,
            elapsed: start.elapsed(),
        }
    }
}

impl Drop for RenderPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_are_tracked() {
        let pool = RenderPool::new(2, 3).unwrap();
        let handle = pool.handle();
        assert_eq!(handle.workers(), 2);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let _ = handle.spawn(async move {
            let _ = rx.await;
        });
        assert_eq!(handle.outstanding(), 1);

        tx.send(()).unwrap();
        let start = Instant::now();
        while handle.outstanding() > 0 && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.outstanding(), 0);

        let report = pool.shutdown(Duration::from_secs(1));
        assert_eq!(report.abandoned, 0);
    }

    #[test]
    fn test_shutdown_reports_abandoned() {
        let pool = RenderPool::new(1, 3).unwrap();
        let handle = pool.handle();
        for _ in 0..3 {
            let _ = handle.spawn(std::future::pending::<()>());
        }

        let report = pool.shutdown(Duration::from_millis(50));
        assert_eq!(report.abandoned, 3);
        assert!(report.elapsed >= Duration::from_millis(50));
    }

    #[test]
    fn test_priority_scale() {
        assert_eq!(os_priority(MIN_PRIORITY), 0);
        assert_eq!(os_priority(5), 44);
        assert_eq!(os_priority(MAX_PRIORITY), 99);
        assert_eq!(os_priority(0), 0);
        assert_eq!(os_priority(200), 99);
        assert!(os_priority(3) < os_priority(4));
    }

    #[test]
    fn test_zero_workers_clamped() {
        let pool = RenderPool::new(0, 3).unwrap();
        assert_eq!(pool.workers(), 1);
    }
}
