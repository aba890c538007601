//! Single-flight work queue driving per-item processing.
//!
//! One executor owns one queue and at most one worker task. Items are
//! processed sequentially in FIFO order. A store lock re-queues the item at
//! the front and retries the rest of the batch after `retry_delay`; work
//! appended while a worker runs is drained after `drain_delay`. Every batch
//! ends with one [`BatchReport`] on the report channel.

use crate::error::{PrdbError, Result};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The item changed; callers want to hear about it.
    Succeeded,
    Skipped,
}

#[async_trait]
pub trait Processor<T: Send>: Send + Sync + 'static {
    async fn process(&self, item: &mut T, cancel: &CancellationToken) -> Result<Outcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub retry_delay_ms: u64,
    pub drain_delay_ms: u64,
    /// Consecutive locks tolerated per item; `None` retries until cancelled.
    pub max_lock_retries: Option<u32>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1000,
            drain_delay_ms: 100,
            max_lock_retries: None,
        }
    }
}

impl ExecutorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }
}

#[derive(Debug)]
pub struct BatchReport<T> {
    pub succeeded: Vec<T>,
    pub skipped: usize,
    pub failed: Vec<(T, PrdbError)>,
    /// Terminal error of the batch, e.g. cancellation.
    pub error: Option<PrdbError>,
    pub retry_scheduled: bool,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            skipped: 0,
            failed: Vec::new(),
            error: None,
            retry_scheduled: false,
        }
    }
}

impl<T> BatchReport<T> {
    /// Items whose processing is final.
    pub fn settled(&self) -> usize {
        self.succeeded.len() + self.skipped + self.failed.len()
    }

    fn is_empty(&self) -> bool {
        self.settled() == 0 && self.error.is_none() && !self.retry_scheduled
    }
}

struct Queued<T> {
    item: T,
    lock_retries: u32,
}

struct State<T> {
    queue: VecDeque<Queued<T>>,
    running: bool,
    timer_pending: bool,
}

struct Inner<T, P> {
    processor: P,
    config: ExecutorConfig,
    cancel: CancellationToken,
    state: Mutex<State<T>>,
    reports: mpsc::UnboundedSender<BatchReport<T>>,
}

pub struct TaskExecutor<T, P> {
    inner: Arc<Inner<T, P>>,
}

impl<T, P> Clone for TaskExecutor<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, P> TaskExecutor<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    /// Creates an idle executor and the receiving end of its reports.
    ///
    /// Cancelling `cancel` has the same effect as [`TaskExecutor::cancel`].
    pub fn new(
        processor: P,
        config: ExecutorConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<BatchReport<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            processor,
            config,
            cancel,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                running: false,
                timer_pending: false,
            }),
            reports: tx,
        });
        (Self { inner }, rx)
    }

    /// Queues `items` behind pending work and starts a worker if none is
    /// running or scheduled. Once cancelled, nothing is queued and the items
    /// are handed back.
    pub fn append(&self, items: Vec<T>) -> std::result::Result<(), Vec<T>> {
        if self.inner.cancel.is_cancelled() {
            return Err(items);
        }
        let spawn = {
            let mut st = self.inner.state();
            st.queue.extend(items.into_iter().map(|item| Queued {
                item,
                lock_retries: 0,
            }));
            let idle = !st.running && !st.timer_pending && !st.queue.is_empty();
            if idle {
                st.running = true;
            }
            idle
        };
        if spawn {
            debug!("spawning worker");
            tokio::spawn(run_worker(Arc::clone(&self.inner)));
        }
        Ok(())
    }

    /// Stops the executor. Queued items are reported as failed with
    /// [`PrdbError::Cancelled`]; an item being processed still finishes.
    pub fn cancel(&self) {
        info!("cancelling executor");
        self.inner.cancel.cancel();
        let running = self.inner.state().running;
        if !running {
            self.inner.drain_cancelled(BatchReport::default());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn queued(&self) -> usize {
        self.inner.state().queue.len()
    }

    /// No worker running and none scheduled.
    pub fn is_idle(&self) -> bool {
        let st = self.inner.state();
        !st.running && !st.timer_pending
    }
}

impl<T, P> Inner<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, report: BatchReport<T>) {
        if !report.is_empty() {
            // Receiver gone means nobody is listening any more.
            let _ = self.reports.send(report);
        }
    }

    /// Fails everything still queued and emits `report` with those failures.
    fn drain_cancelled(&self, mut report: BatchReport<T>) {
        let drained: Vec<Queued<T>> = {
            let mut st = self.state();
            st.running = false;
            st.timer_pending = false;
            st.queue.drain(..).collect()
        };
        if !drained.is_empty() {
            debug!(queued = drained.len(), "failing queued items after cancellation");
            report.error = Some(PrdbError::Cancelled);
        }
        report.failed.extend(
            drained
                .into_iter()
                .map(|q| (q.item, PrdbError::Cancelled)),
        );
        self.send(report);
    }
}

fn schedule<T, P>(inner: Arc<Inner<T, P>>, delay: Duration)
where
    T: Send + 'static,
    P: Processor<T>,
{
    let cancel = inner.cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let start = {
                    let mut st = inner.state();
                    st.timer_pending = false;
                    let start = !st.running && !st.queue.is_empty();
                    if start {
                        st.running = true;
                    }
                    start
                };
                if start {
                    run_worker(inner).await;
                }
            }
            _ = cancel.cancelled() => {
                inner.drain_cancelled(BatchReport::default());
            }
        }
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// A panicking processor fails the item it was given, not the worker.
async fn process_item<T, P>(inner: &Inner<T, P>, item: &mut T) -> Result<Outcome>
where
    T: Send + 'static,
    P: Processor<T>,
{
    match AssertUnwindSafe(inner.processor.process(item, &inner.cancel))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            warn!(panic = msg, "processor panicked");
            Err(PrdbError::Store(format!("processor panicked: {msg}")))
        }
    }
}

/// Processes the items queued when the worker started.
async fn run_worker<T, P>(inner: Arc<Inner<T, P>>)
where
    T: Send + 'static,
    P: Processor<T>,
{
    let mut report = BatchReport::default();
    let batch = inner.state().queue.len();

    for _ in 0..batch {
        if inner.cancel.is_cancelled() {
            inner.drain_cancelled(report);
            return;
        }
        let Some(Queued {
            mut item,
            lock_retries,
        }) = inner.state().queue.pop_front()
        else {
            break;
        };

        match process_item(&inner, &mut item).await {
            Ok(Outcome::Succeeded) => report.succeeded.push(item),
            Ok(Outcome::Skipped) => report.skipped += 1,
            Err(err) if err.is_locked() => {
                if inner
                    .config
                    .max_lock_retries
                    .map_or(false, |max| lock_retries >= max)
                {
                    warn!(lock_retries, "giving up on locked item");
                    report.failed.push((item, err));
                    continue;
                }
                {
                    let mut st = inner.state();
                    st.queue.push_front(Queued {
                        item,
                        lock_retries: lock_retries + 1,
                    });
                    st.running = false;
                    st.timer_pending = true;
                }
                info!(
                    delay_ms = inner.config.retry_delay_ms,
                    "store locked, retry scheduled"
                );
                report.retry_scheduled = true;
                schedule(Arc::clone(&inner), inner.config.retry_delay());
                inner.send(report);
                return;
            }
            Err(err) => {
                debug!(error = %err, "item failed");
                report.failed.push((item, err));
            }
        }
    }

    if inner.cancel.is_cancelled() {
        inner.drain_cancelled(report);
        return;
    }
    let pending = {
        let mut st = inner.state();
        st.running = false;
        let pending = st.queue.len();
        if pending > 0 {
            st.timer_pending = true;
        }
        pending
    };
    if pending > 0 {
        debug!(queued = pending, "drain scheduled");
        schedule(Arc::clone(&inner), inner.config.drain_delay());
    }
    inner.send(report);
}

/// Aggregate of all reports for one set of items.
#[derive(Debug)]
pub struct TaskTotals<T> {
    pub succeeded: Vec<T>,
    pub skipped: usize,
    pub failed: Vec<(T, PrdbError)>,
    pub error: Option<PrdbError>,
    pub retries: usize,
}

impl<T> Default for TaskTotals<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            skipped: 0,
            failed: Vec::new(),
            error: None,
            retries: 0,
        }
    }
}

impl<T> TaskTotals<T> {
    pub fn settled(&self) -> usize {
        self.succeeded.len() + self.skipped + self.failed.len()
    }

    pub fn absorb(&mut self, report: BatchReport<T>) {
        self.succeeded.extend(report.succeeded);
        self.skipped += report.skipped;
        self.failed.extend(report.failed);
        if report.retry_scheduled {
            self.retries += 1;
        }
        if report.error.is_some() {
            self.error = report.error;
        }
    }
}

/// Runs `items` through a fresh executor and waits until each one settled.
pub async fn run_all<T, P>(
    processor: P,
    items: Vec<T>,
    config: ExecutorConfig,
    cancel: &CancellationToken,
) -> TaskTotals<T>
where
    T: Send + 'static,
    P: Processor<T>,
{
    let total = items.len();
    let mut totals = TaskTotals::default();
    if total == 0 {
        return totals;
    }
    let (executor, mut reports) = TaskExecutor::new(processor, config, cancel.child_token());
    if let Err(rejected) = executor.append(items) {
        totals
            .failed
            .extend(rejected.into_iter().map(|item| (item, PrdbError::Cancelled)));
        totals.error = Some(PrdbError::Cancelled);
        return totals;
    }
    while totals.settled() < total {
        match reports.recv().await {
            Some(report) => totals.absorb(report),
            None => break,
        }
    }
    info!(
        succeeded = totals.succeeded.len(),
        skipped = totals.skipped,
        failed = totals.failed.len(),
        "all items settled"
    );
    totals
}
