//! `AutoscaledPool` (§4.3): runs a stream of tasks at a concurrency level
//! that climbs toward `max_concurrency` while the system has headroom and
//! backs off toward `min_concurrency` under load.
//!
//! Grounded on the teacher's `orchestrator.rs` dispatch loop: a
//! `FuturesUnordered` of in-flight `tokio::spawn` handles bounded by a
//! `Semaphore`, with a separate periodic tick adjusting how many permits
//! are in circulation.

use crate::system::SystemStatus;
use crate::utils::{
    DEFAULT_DESIRED_CONCURRENCY_RATIO, DEFAULT_MAX_CONCURRENCY, DEFAULT_MIN_CONCURRENCY,
    DEFAULT_SCALE_STEP_RATIO,
};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tokio::time::{Duration, Instant};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct AutoscaledPoolOptions {
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub desired_concurrency_ratio: f64,
    pub scale_step_ratio: f64,
    pub maybe_run_interval: Duration,
    pub autoscale_interval: Duration,
}

impl AutoscaledPoolOptions {
    /// An alternative default sized to the host: `max_concurrency` becomes
    /// `num_cpus::get() * 25`, the same rough multiplier the teacher uses
    /// to size its browser worker pool off core count rather than a fixed
    /// constant.
    #[must_use]
    pub fn sized_to_host() -> Self {
        Self {
            max_concurrency: (num_cpus::get() * 25).max(DEFAULT_MIN_CONCURRENCY),
            ..Self::default()
        }
    }
}

impl Default for AutoscaledPoolOptions {
    fn default() -> Self {
        Self {
            min_concurrency: DEFAULT_MIN_CONCURRENCY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            desired_concurrency_ratio: DEFAULT_DESIRED_CONCURRENCY_RATIO,
            scale_step_ratio: DEFAULT_SCALE_STEP_RATIO,
            maybe_run_interval: Duration::from_millis(500),
            autoscale_interval: Duration::from_secs(10),
        }
    }
}

/// Caller-supplied hooks: a task runner, a readiness gate, and a
/// finished gate. `is_task_ready`/`is_finished` are polled each tick rather
/// than passed a fixed task count, since the task source (a `RequestQueue`)
/// is itself unbounded and mutating concurrently.
pub struct AutoscaledPool {
    options: AutoscaledPoolOptions,
    current_concurrency: Arc<AtomicUsize>,
    desired_concurrency: Arc<AtomicUsize>,
    aborted: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    resume_notify: Arc<Notify>,
}

impl AutoscaledPool {
    #[must_use]
    pub fn new(options: AutoscaledPoolOptions) -> Self {
        let desired = options.min_concurrency.max(1);
        Self {
            current_concurrency: Arc::new(AtomicUsize::new(0)),
            desired_concurrency: Arc::new(AtomicUsize::new(desired)),
            aborted: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            resume_notify: Arc::new(Notify::new()),
            options,
        }
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.resume_notify.notify_waiters();
    }

    /// Idempotent: pausing an already-paused pool is a no-op, matching the
    /// teacher's `CircuitBreaker` state-transition style where re-entering
    /// a state is never an error (§9 Open Question, resolved in
    /// DESIGN.md).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resume_notify.notify_waiters();
    }

    #[must_use]
    pub fn current_concurrency(&self) -> usize {
        self.current_concurrency.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn desired_concurrency(&self) -> usize {
        self.desired_concurrency.load(Ordering::SeqCst)
    }

    /// Drives `run_task` to completion for every ready task, at a
    /// concurrency that autoscales against `status`, until `is_finished`
    /// reports true or `abort()` is called.
    ///
    /// `run_task` returns `None` when no task is currently ready (the
    /// source is temporarily drained but not finished); the loop then
    /// waits `maybe_run_interval` before asking again instead of busy
    /// spinning.
    pub async fn run<R, F>(&self, status: &SystemStatus, mut run_task: R, mut is_finished: F) -> anyhow::Result<()>
    where
        R: FnMut() -> Option<BoxFuture<'static, anyhow::Result<()>>>,
        F: FnMut() -> bool,
    {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency));
        let mut in_flight = FuturesUnordered::new();
        let mut last_autoscale = Instant::now();

        loop {
            if self.aborted.load(Ordering::SeqCst) {
                break;
            }
            if self.paused.load(Ordering::SeqCst) {
                self.resume_notify.notified().await;
                continue;
            }
            if is_finished() && in_flight.is_empty() {
                break;
            }

            if last_autoscale.elapsed() >= self.options.autoscale_interval {
                self.autoscale(status);
                last_autoscale = Instant::now();
            }

            let desired = self.desired_concurrency();
            let current = self.current_concurrency.load(Ordering::SeqCst);

            if current < desired {
                if let Some(task) = run_task() {
                    let permit = semaphore.clone().acquire_owned().await?;
                    self.current_concurrency.fetch_add(1, Ordering::SeqCst);
                    let concurrency = self.current_concurrency.clone();
                    in_flight.push(tokio::spawn(async move {
                        let result = task.await;
                        concurrency.fetch_sub(1, Ordering::SeqCst);
                        drop(permit);
                        result
                    }));
                    continue;
                }
            }

            if let Some(joined) = in_flight.next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!("autoscaled pool task failed: {err:#}"),
                    Err(join_err) => warn!("autoscaled pool task panicked: {join_err}"),
                }
            } else {
                tokio::time::sleep(self.options.maybe_run_interval).await;
            }
        }

        while let Some(joined) = in_flight.next().await {
            if let Ok(Err(err)) = joined {
                warn!("autoscaled pool task failed during drain: {err:#}");
            }
        }

        Ok(())
    }

    /// One autoscale step (§4.3). Gated first on utilization: if the pool
    /// isn't actually using most of its current `desired_concurrency`, a
    /// verdict either way is premature, so the step is skipped before
    /// `status` is even consulted. Once past the gate, scale-down reads the
    /// short current-window verdict and scale-up reads the full historical
    /// window, so a brief recent spike doesn't block growth the system has
    /// otherwise had headroom for, while a brief recent calm doesn't by
    /// itself justify growing through a sustained overload.
    fn autoscale(&self, status: &SystemStatus) {
        let now_millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let desired = self.desired_concurrency();
        let current = self.current_concurrency();

        let utilization = current as f64 / desired.max(1) as f64;
        if utilization < self.options.desired_concurrency_ratio {
            return;
        }

        let step = ((desired as f64) * self.options.scale_step_ratio).ceil() as usize;
        let step = step.max(1);

        let next = if status.is_currently_overloaded(now_millis) {
            desired.saturating_sub(step)
        } else if !status.is_historically_overloaded(now_millis) {
            desired + step
        } else {
            desired
        };

        let clamped = next.clamp(self.options.min_concurrency.max(1), self.options.max_concurrency.max(1));
        debug!("autoscale: {desired} -> {clamped}");
        self.desired_concurrency.store(clamped, Ordering::SeqCst);
    }
}
