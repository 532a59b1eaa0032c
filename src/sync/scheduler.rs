//! Periodic driver for the two synchronizer cycles
//!
//! Each cycle has its own timer task and its own busy flag. A tick that
//! arrives while the previous run of the same cycle is still going is
//! skipped, never queued. The two cycles may overlap each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::synchronizer::{CycleKind, MarketDataSynchronizer};
use crate::config::types::SyncConfig;

/// Held for the duration of one run; releases the busy flag on drop
#[derive(Debug)]
pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

impl RunGuard {
    /// `None` if a run already holds the flag
    pub fn try_acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy: busy.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Timing of one scheduled cycle
#[derive(Debug, Clone, Copy)]
struct Job {
    kind: CycleKind,
    period: Duration,
    run_at_start: bool,
}

pub struct SyncScheduler {
    synchronizer: Arc<MarketDataSynchronizer>,
    full_interval: Duration,
    price_interval: Duration,
    full_refresh_on_start: bool,
}

impl SyncScheduler {
    pub fn new(synchronizer: Arc<MarketDataSynchronizer>, config: &SyncConfig) -> Self {
        Self {
            synchronizer,
            full_interval: config.full_refresh_interval(),
            price_interval: config.price_refresh_interval(),
            full_refresh_on_start: false,
        }
    }

    /// Run a full refresh immediately instead of waiting one full period
    pub fn with_full_refresh_on_start(mut self, enabled: bool) -> Self {
        self.full_refresh_on_start = enabled;
        self
    }

    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let jobs = [
            Job {
                kind: CycleKind::Full,
                period: self.full_interval,
                run_at_start: self.full_refresh_on_start,
            },
            Job {
                kind: CycleKind::Price,
                period: self.price_interval,
                run_at_start: true,
            },
        ];

        let tasks = jobs
            .into_iter()
            .map(|job| {
                let busy = Arc::new(AtomicBool::new(false));
                let task = tokio::spawn(job_loop(
                    self.synchronizer.clone(),
                    job,
                    busy.clone(),
                    shutdown_rx.clone(),
                ));
                (job.kind, busy, task)
            })
            .collect();

        info!(
            "Sync scheduler started: full refresh every {:?}, price refresh every {:?}",
            self.full_interval, self.price_interval
        );
        SchedulerHandle {
            shutdown: shutdown_tx,
            jobs: tasks,
        }
    }
}

async fn job_loop(
    synchronizer: Arc<MarketDataSynchronizer>,
    job: Job,
    busy: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(job.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    if !job.run_at_start {
        // the first tick completes immediately
        ticker.tick().await;
    }

    let mut in_flight: Option<JoinHandle<()>> = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => match RunGuard::try_acquire(&busy) {
                Some(guard) => {
                    let synchronizer = synchronizer.clone();
                    in_flight = Some(tokio::spawn(async move {
                        let _guard = guard;
                        synchronizer.run(job.kind).await;
                    }));
                }
                None => warn!("Previous {} still running, skipping this tick", job.kind),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // runs are not cancelled mid-flight
    if let Some(run) = in_flight {
        if !run.is_finished() {
            info!("Waiting for in-flight {} to finish", job.kind);
        }
        if let Err(e) = run.await {
            warn!("{} run ended abnormally: {}", job.kind, e);
        }
    }
}

/// Running scheduler
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    jobs: Vec<(CycleKind, Arc<AtomicBool>, JoinHandle<()>)>,
}

impl SchedulerHandle {
    pub fn is_running(&self, kind: CycleKind) -> bool {
        self.jobs
            .iter()
            .any(|(k, busy, _)| *k == kind && busy.load(Ordering::Acquire))
    }

    /// Stop ticking and wait for in-flight runs
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (kind, _, task) in self.jobs {
            if let Err(e) = task.await {
                warn!("{} scheduler task ended abnormally: {}", kind, e);
            }
        }
        info!("Sync scheduler stopped");
    }
}
