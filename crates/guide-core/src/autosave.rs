//! Autosave Scheduler building blocks.
//!
//! - `Debouncer` - cancellable quiet-period timer
//! - `RateLimiter` - minimum spacing between acknowledged writes
//! - `SaveQueue` - single-consumer task running writes one at a time, in
//!   submission order
//!
//! The session wires these together in its flush path.

use crate::model::Guide;
use crate::remote::RemoteError;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::error;

/// Successful results of a flush.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// The remote store acknowledged the write.
    Saved(Guide),
    /// The candidate matches the last acknowledged snapshot; nothing sent.
    Unchanged,
    /// A write was acknowledged too recently; the candidate stays pending and
    /// is retried once the window has passed.
    RateLimited { retry_in: Duration },
    /// No candidate to flush.
    NothingPending,
}

impl FlushOutcome {
    /// Whether a remote write happened.
    pub fn wrote(&self) -> bool {
        matches!(self, FlushOutcome::Saved(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlushError {
    #[error("Conversation guide {0} has no conversation to save into")]
    MissingScopeContext(String),

    #[error("Remote save failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Save queue closed")]
    QueueClosed,
}

pub type FlushResult = std::result::Result<FlushOutcome, FlushError>;

/// Quiet-period timer. Arming it again cancels the previous timer.
///
/// Each arm gets a generation number; a timer task that wakes up must call
/// [`Debouncer::fire`] with its generation before acting, which disarms the
/// debouncer without aborting the task itself.
#[derive(Debug, Default)]
pub struct Debouncer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any armed timer and reserve a generation for the next one.
    pub fn rearm(&mut self) -> u64 {
        self.cancel();
        self.generation += 1;
        self.generation
    }

    /// Attach the task spawned for `generation`.
    pub fn attach(&mut self, generation: u64, handle: JoinHandle<()>) {
        if generation == self.generation {
            self.handle = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// Called by a woken timer. Returns false if the timer was superseded.
    pub fn fire(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.handle.is_none() {
            return false;
        }
        // Detach rather than abort: the caller is running inside this task.
        self.handle = None;
        true
    }

    /// Cancel the armed timer. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Tracks when the last write was acknowledged.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_saved_at: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_saved_at: None,
        }
    }

    /// Remaining wait if a write was acknowledged less than the interval ago.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_saved_at?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.min_interval).then(|| self.min_interval - elapsed)
    }

    pub fn record(&mut self, at: Instant) {
        self.last_saved_at = Some(at);
    }
}

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Serialized write queue: one job in flight at a time, in submission order.
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

impl SaveQueue {
    /// Spawn the consumer task. Must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    error!("Guide save job panicked; continuing with the next one");
                }
            }
        });
        Self { tx, worker }
    }

    /// Enqueue `job` behind every previously submitted job and wait for its result.
    ///
    /// The job is queued before this function first yields, so the order of
    /// calls is the order of execution.
    pub fn submit<F, T>(&self, job: F) -> impl Future<Output = Result<T, FlushError>> + Send + use<F, T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let queued = self
            .tx
            .send(Box::pin(async move {
                let _ = done_tx.send(job.await);
            }))
            .is_ok();

        async move {
            if !queued {
                return Err(FlushError::QueueClosed);
            }
            done_rx.await.map_err(|_| FlushError::QueueClosed)
        }
    }
}

impl Drop for SaveQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn test_save_queue_runs_in_submission_order() {
        let queue = SaveQueue::spawn();
        let log = Arc::new(Mutex::new(Vec::new()));

        // The first job is slower; it must still finish first.
        let slow_log = Arc::clone(&log);
        let slow = queue.submit(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            slow_log.lock().unwrap().push("slow");
        });
        let fast_log = Arc::clone(&log);
        let fast = queue.submit(async move {
            fast_log.lock().unwrap().push("fast");
        });

        let (a, b) = tokio::join!(fast, slow);
        a.unwrap();
        b.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_save_queue_survives_panicking_job() {
        let queue = SaveQueue::spawn();

        let failed = queue.submit(async {
            if true {
                panic!("boom");
            }
        });
        let next = queue.submit(async { 7 });

        assert_eq!(failed.await, Err(FlushError::QueueClosed));
        assert_eq!(next.await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_rearm_cancels_previous() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut debouncer = Debouncer::new();

        for n in 0..3 {
            let generation = debouncer.rearm();
            let fired = Arc::clone(&fired);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                fired.lock().unwrap().push(n);
            });
            debouncer.attach(generation, handle);
        }

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*fired.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_debouncer_fire_checks_generation() {
        let mut debouncer = Debouncer::new();
        let first = debouncer.rearm();
        debouncer.attach(first, tokio::spawn(async {}));
        let second = debouncer.rearm();
        debouncer.attach(second, tokio::spawn(async {}));

        assert!(!debouncer.fire(first));
        assert!(debouncer.fire(second));
        assert!(!debouncer.is_armed());
        assert!(!debouncer.fire(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_window() {
        let mut limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        assert_eq!(limiter.remaining(start), None);

        limiter.record(start);
        assert_eq!(
            limiter.remaining(start + Duration::from_millis(500)),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(limiter.remaining(start + Duration::from_secs(2)), None);
    }
}
