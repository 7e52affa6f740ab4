//! Bounded worker pool driving a dataset through the aggregation service.
//!
//! A pass partitions the dataset into contiguous slices, one per worker, and
//! every worker inserts its slice through the shared service. The service
//! serializes the insertions; the pool only controls how many calls are in
//! flight at once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use privsum::{Error, Result};
use privsum_traits::{AggregationService, NoiseSource};
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::config::Parallelism;

/// Standard deviation of the noise added to every value after a pass.
pub const PERTURBATION_STD_DEV: f64 = 0.001;

/// Default time a finished pass waits for its worker threads to exit.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Cooperative interruption flag shared between a caller and running passes.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// A lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask running and future passes to stop.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Lower the flag again.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether the flag is raised.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A rayon pool whose threads are joined when it goes away.
///
/// Dropping the pool asks its threads to exit, then waits up to the grace
/// period for them. Threads still running after that are detached with a
/// warning.
pub struct WorkerPool {
    // Field order matters: the pool must be dropped before its threads are
    // reaped.
    pool: ThreadPool,
    reaper: Reaper,
    live: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawns exactly `threads` worker threads.
    pub fn build(threads: usize, grace_period: Duration) -> Result<Self> {
        Self::build_counted(threads, grace_period, Arc::default())
    }

    /// Like [`WorkerPool::build`], counting running threads in `live`.
    ///
    /// The counter is raised before a thread starts and lowered when it
    /// exits, so it can be shared by successive pools.
    pub fn build_counted(
        threads: usize,
        grace_period: Duration,
        live: Arc<AtomicUsize>,
    ) -> Result<Self> {
        if threads == 0 {
            return Err(Error::invalid_configuration(
                "worker pool needs at least one thread",
            ));
        }
        let mut handles = Vec::with_capacity(threads);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .spawn_handler(|worker| {
                live.fetch_add(1, Ordering::SeqCst);
                let exit = LiveGuard(live.clone());
                let handle = thread::Builder::new()
                    .name(format!("privsum-worker-{}", worker.index()))
                    .spawn(move || {
                        let _exit = exit;
                        worker.run()
                    })?;
                handles.push(handle);
                Ok(())
            })
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        debug!(threads, "created worker pool");
        Ok(Self {
            pool,
            reaper: Reaper {
                handles,
                grace_period,
            },
            live,
        })
    }

    /// The number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// The number of counted threads that have not exited yet.
    pub fn live_threads(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Runs `op` inside the pool and waits for every task it spawns.
    pub fn scope<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&Scope<'scope>) -> R + Send,
        R: Send,
    {
        self.pool.scope(op)
    }

    /// Tears the pool down and returns the number of threads still running
    /// after the grace period.
    pub fn shutdown(self) -> usize {
        let Self { pool, mut reaper, .. } = self;
        drop(pool);
        reaper.reap()
    }
}

/// Lowers the live-thread count when a worker thread exits, even by
/// unwinding or when it never started.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Reaper {
    handles: Vec<JoinHandle<()>>,
    grace_period: Duration,
}

impl Reaper {
    fn reap(&mut self) -> usize {
        let deadline = Instant::now() + self.grace_period;
        while self.handles.iter().any(|h| !h.is_finished()) && Instant::now() < deadline {
            thread::sleep(Duration::from_micros(100));
        }
        let mut stragglers = 0;
        for handle in self.handles.drain(..) {
            if handle.is_finished() {
                // A panicking worker has already been reported by rayon.
                let _ = handle.join();
            } else {
                stragglers += 1;
            }
        }
        if stragglers > 0 {
            warn!(
                stragglers,
                grace_ms = self.grace_period.as_millis() as u64,
                "worker threads still running after the grace period, detaching"
            );
        }
        stragglers
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.reap();
        }
    }
}

/// Executes passes over datasets with a ceiling on concurrent workers.
#[derive(Debug, Clone)]
pub struct BoundedWorkerPool {
    parallelism: Parallelism,
    grace_period: Duration,
    interrupt: Interrupt,
    live_workers: Arc<AtomicUsize>,
}

impl BoundedWorkerPool {
    /// A pool never running more than `parallelism` workers at once.
    pub fn new(parallelism: Parallelism) -> Self {
        Self {
            parallelism,
            grace_period: DEFAULT_GRACE_PERIOD,
            interrupt: Interrupt::new(),
            live_workers: Arc::default(),
        }
    }

    /// Sets the time a pass waits for its threads to exit.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Shares `interrupt` with the caller.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// The ceiling on concurrent workers.
    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Worker threads of earlier passes that are still running. Zero unless
    /// a pass had to detach threads after its grace period.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// The number of workers that run when `requested` are asked for.
    pub fn effective_threads(&self, requested: usize) -> usize {
        self.parallelism.cap(requested)
    }

    /// Inserts all of `dataset` through `service` and returns the final
    /// private sum.
    ///
    /// The service is initialized for `dataset.len()` values. The dataset is
    /// split into contiguous slices of `ceil(len / workers)` values and each
    /// slice is inserted in order by its own worker. The interleaving of
    /// workers is unspecified, so the value returned by the final read is
    /// the prefix sum released by whichever insertion completed last. On
    /// success every value of `dataset` is then perturbed with Gaussian
    /// noise drawn from `noise`.
    pub fn run<S, N>(
        &self,
        service: &S,
        dataset: &mut [f64],
        sigma: f64,
        requested_threads: usize,
        noise: &mut N,
    ) -> Result<f64>
    where
        S: AggregationService<Error = Error>,
        N: NoiseSource + ?Sized,
    {
        if self.interrupt.is_raised() {
            return Err(Error::Interrupted);
        }
        let threads = self.effective_threads(requested_threads);
        service.initialize(dataset.len(), sigma)?;
        let chunk_size = dataset.len().div_ceil(threads).max(1);

        let failure = OnceLock::new();
        let cancelled = AtomicBool::new(false);
        {
            let pool =
                WorkerPool::build_counted(threads, self.grace_period, self.live_workers.clone())?;
            let values: &[f64] = dataset;
            let (failure, cancelled, interrupt) = (&failure, &cancelled, &self.interrupt);
            pool.scope(|scope| {
                for (worker, slice) in values.chunks(chunk_size).enumerate() {
                    scope.spawn(move |_| {
                        for value in slice {
                            if cancelled.load(Ordering::Acquire) {
                                return;
                            }
                            if interrupt.is_raised() {
                                cancelled.store(true, Ordering::Release);
                                return;
                            }
                            if let Err(e) = service.insert(*value) {
                                let _ = failure.set(Error::worker_failure(worker, e));
                                cancelled.store(true, Ordering::Release);
                                return;
                            }
                        }
                    });
                }
            });
        }

        if let Some(error) = failure.into_inner() {
            debug!(%error, "pass failed");
            return Err(error);
        }
        if self.interrupt.is_raised() {
            warn!("pass interrupted");
            return Err(Error::Interrupted);
        }

        let total = service.read_sum()?;
        perturb(dataset, noise);
        if !total.is_finite() {
            return Err(Error::computation_nan("aggregation sum"));
        }
        Ok(total)
    }
}

/// Adds small independent noise to every value.
pub fn perturb<N: NoiseSource + ?Sized>(dataset: &mut [f64], noise: &mut N) {
    for value in dataset.iter_mut() {
        *value += noise.sample(PERTURBATION_STD_DEV);
    }
}
