//! Worker pool for page generation.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, TryRecvError};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use sylvan_core::{Error, Result};

/// Configuration for the generation worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Worker thread count (0 = one per logical core).
    pub threads: usize,
    /// Run tasks on the submitting thread instead of a pool.
    pub inline: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            inline: false,
        }
    }
}

/// Cooperative cancellation flag shared between a task and its handle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Pollable result of a submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    result_rx: Receiver<std::thread::Result<T>>,
    token: CancelToken,
}

impl<T> TaskHandle<T> {
    /// Take the result if the task has finished (non-blocking).
    ///
    /// A panic inside the task comes back as [`Error::Generation`].
    pub fn poll(&mut self) -> Option<Result<T>> {
        match self.result_rx.try_recv() {
            Ok(Ok(value)) => Some(Ok(value)),
            Ok(Err(payload)) => Some(Err(Error::Generation(panic_message(payload.as_ref())))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::Generation(
                "task dropped without producing a result".to_string(),
            ))),
        }
    }

    /// Check whether a result is waiting.
    pub fn is_finished(&self) -> bool {
        !self.result_rx.is_empty()
    }

    /// Request best-effort cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Shared executor running generation tasks off the coordinator thread.
pub struct Executor {
    pool: Option<ThreadPool>,
    in_flight: Arc<AtomicUsize>,
}

impl Executor {
    /// Create an executor from configuration.
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        if config.inline {
            return Ok(Self::inline());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("page-worker-{i}"))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build worker pool: {e}")))?;
        tracing::debug!("Page worker pool started with {} threads", pool.current_num_threads());
        Ok(Self {
            pool: Some(pool),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Executor that runs every task during `submit`.
    pub fn inline() -> Self {
        Self {
            pool: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Check if this executor runs tasks on worker threads.
    pub const fn is_async(&self) -> bool {
        self.pool.is_some()
    }

    /// Tasks submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Submit a task and return a handle to poll for its result.
    ///
    /// Tasks cancelled before they start are skipped entirely.
    pub fn submit<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        let (result_tx, result_rx) = channel::bounded(1);
        let token = CancelToken::default();
        let task_token = token.clone();
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::AcqRel);

        let run = move || {
            if !task_token.is_cancelled() {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&task_token)));
                // Receiver gone means the page was dropped; nothing to report.
                let _ = result_tx.send(outcome);
            }
            in_flight.fetch_sub(1, Ordering::AcqRel);
        };

        match &self.pool {
            Some(pool) => pool.spawn(run),
            None => run(),
        }

        TaskHandle { result_rx, token }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field(
                "threads",
                &self.pool.as_ref().map(ThreadPool::current_num_threads),
            )
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
