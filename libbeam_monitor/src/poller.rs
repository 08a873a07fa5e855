use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::error::PollerError;

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No new samples since the previous tick
    Idle,
    /// New rows were aligned and the sink was notified
    Updated { rows: usize },
}

/// The work a poller runs once per period.
pub trait Pipeline: Send + 'static {
    type Error: std::error::Error;

    fn tick(&mut self) -> Result<TickOutcome, Self::Error>;

    fn select_channel(&mut self, channel: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Stopped,
    Running,
}

/// Counters of the tick loop, readable from any thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub ticks: u64,
    pub updates: u64,
    pub failures: u64,
    pub overruns: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    updates: AtomicU64,
    failures: AtomicU64,
    overruns: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PollerStats {
        PollerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

enum Command {
    Stop,
}

struct Worker {
    tx: Sender<Command>,
    handle: JoinHandle<()>,
}

fn lock<P>(pipeline: &Mutex<P>) -> MutexGuard<'_, P> {
    pipeline.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run one tick, turning errors and panics into log messages
fn run_tick<P: Pipeline>(pipeline: &Mutex<P>, counters: &Counters) {
    counters.ticks.fetch_add(1, Ordering::Relaxed);
    let result = catch_unwind(AssertUnwindSafe(|| lock(pipeline).tick()));
    match result {
        Ok(Ok(TickOutcome::Updated { rows })) => {
            counters.updates.fetch_add(1, Ordering::Relaxed);
            log::debug!("Tick aligned {rows} new rows");
        }
        Ok(Ok(TickOutcome::Idle)) => (),
        Ok(Err(e)) => {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            log::error!("Tick failed: {e}");
        }
        Err(_) => {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            log::error!("Tick panicked; the poller keeps running");
        }
    }
}

fn tick_loop<P: Pipeline>(
    pipeline: Arc<Mutex<P>>,
    counters: Arc<Counters>,
    rx: mpsc::Receiver<Command>,
    period: Duration,
) {
    let mut deadline = Instant::now() + period;
    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => (),
        }
        run_tick(&pipeline, &counters);

        deadline += period;
        let now = Instant::now();
        if now > deadline {
            counters.overruns.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "Tick overran its period of {} ms by {} ms; skipping missed ticks",
                period.as_millis(),
                (now - deadline).as_millis()
            );
            deadline = now + period;
        }
    }
}

/// RateLimitedPoller runs a pipeline's tick at a fixed period on its own thread.
///
/// A tick that takes longer than the period is allowed to finish; the ticks it
/// missed are dropped rather than queued. Errors and panics inside a tick are
/// logged and counted, they never stop the loop. The pipeline sits behind a mutex so
/// selection changes from other threads always land between two ticks.
pub struct RateLimitedPoller<P: Pipeline> {
    pipeline: Arc<Mutex<P>>,
    period: Duration,
    counters: Arc<Counters>,
    worker: Option<Worker>,
}

impl<P: Pipeline> RateLimitedPoller<P> {
    pub fn new(pipeline: P, period: Duration) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            period,
            counters: Arc::new(Counters::default()),
            worker: None,
        }
    }

    pub fn state(&self) -> PollerState {
        match self.worker {
            Some(_) => PollerState::Running,
            None => PollerState::Stopped,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> PollerStats {
        self.counters.snapshot()
    }

    /// Start ticking. Starting a running poller does nothing.
    pub fn start(&mut self) -> Result<(), PollerError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let (tx, rx) = mpsc::channel();
        let pipeline = self.pipeline.clone();
        let counters = self.counters.clone();
        let period = self.period;
        let handle = std::thread::Builder::new()
            .name(String::from("beam_monitor_poller"))
            .spawn(move || tick_loop(pipeline, counters, rx, period))?;
        self.worker = Some(Worker { tx, handle });
        log::info!("Poller started with a period of {} ms", period.as_millis());
        Ok(())
    }

    /// Stop ticking and wait for an in-flight tick to finish
    pub fn stop(&mut self) -> Result<(), PollerError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        // A send error only means the loop already exited
        let _ = worker.tx.send(Command::Stop);
        worker.handle.join().map_err(|_| PollerError::WorkerPanicked)?;
        log::info!("Poller stopped");
        Ok(())
    }

    /// Run one tick on the calling thread, regardless of state
    pub fn tick_now(&self) {
        run_tick(&self.pipeline, &self.counters);
    }

    /// Change the plotted channel between two ticks
    pub fn select_channel(&self, channel: &str) -> Result<(), P::Error> {
        lock(&self.pipeline).select_channel(channel)
    }

    /// Access the pipeline while no tick is running
    pub fn with_pipeline<T>(&self, f: impl FnOnce(&mut P) -> T) -> T {
        f(&mut lock(&self.pipeline))
    }
}

impl<P: Pipeline> Drop for RateLimitedPoller<P> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Failed to stop poller: {e}");
        }
    }
}
