// Periodic collection scheduler.
// Start runs one cycle immediately, then a background loop runs one cycle per period
// until Stop or cancellation. Modules within a cycle run concurrently and fail independently.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// A unit of work run once per cycle.
#[async_trait]
pub trait MetricsModule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn collect_and_save(&self, cancel: &CancellationToken) -> anyhow::Result<()>;
}

/// Outcome of one cycle, by module name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub succeeded: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

/// Runs every module once, concurrently. Errors and panics are logged and reported;
/// they never stop the other modules.
pub async fn run_cycle(
    modules: &[Arc<dyn MetricsModule>],
    cancel: &CancellationToken,
) -> CycleReport {
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    let mut names = HashMap::with_capacity(modules.len());
    for module in modules {
        let module = module.clone();
        let cancel = cancel.clone();
        let name = module.name();
        let handle = tasks.spawn(async move { module.collect_and_save(&cancel).await });
        names.insert(handle.id(), name);
    }

    let mut report = CycleReport::default();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, Ok(()))) => report.succeeded.push(names.get(&id).copied().unwrap_or("?")),
            Ok((id, Err(e))) => {
                let module = names.get(&id).copied().unwrap_or("?");
                tracing::warn!(error = %e, module, "collect_and_save failed");
                report.failed.push(module);
            }
            Err(e) => {
                let module = names.get(&e.id()).copied().unwrap_or("?");
                tracing::warn!(error = %e, module, panicked = e.is_panic(), "module task failed");
                report.failed.push(module);
            }
        }
    }
    report.succeeded.sort_unstable();
    report.failed.sort_unstable();
    tracing::debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "collection cycle finished"
    );
    report
}

enum SchedulerState {
    Stopped,
    Running {
        stop_tx: oneshot::Sender<()>,
        handle: tokio::task::JoinHandle<()>,
    },
}

pub struct CollectionScheduler {
    modules: Arc<[Arc<dyn MetricsModule>]>,
    state: Mutex<SchedulerState>,
}

impl CollectionScheduler {
    pub fn new(modules: Vec<Arc<dyn MetricsModule>>) -> Self {
        Self {
            modules: modules.into(),
            state: Mutex::new(SchedulerState::Stopped),
        }
    }

    /// Runs one cycle before returning, then keeps collecting every `period` in the
    /// background. Returns `false` without doing anything when already running.
    pub async fn start(&self, period: Duration, cancel: CancellationToken) -> anyhow::Result<bool> {
        anyhow::ensure!(!period.is_zero(), "collection period must be > 0");
        let mut state = self.state.lock().await;
        if let SchedulerState::Running { handle, .. } = &*state
            && !handle.is_finished()
        {
            tracing::debug!("scheduler already running");
            return Ok(false);
        }

        run_cycle(&self.modules, &cancel).await;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let modules = self.modules.clone();
        let scheduler_span = tracing::span!(
            tracing::Level::DEBUG,
            "scheduler",
            period_ms = period.as_millis() as u64
        );
        let handle = tokio::spawn(
            async move {
                let mut tick = interval_at(Instant::now() + period, period);
                tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            run_cycle(&modules, &cancel).await;
                        }
                        _ = &mut stop_rx => {
                            tracing::debug!("Scheduler stopping");
                            break;
                        }
                        _ = cancel.cancelled() => {
                            tracing::debug!("Scheduler cancelled");
                            break;
                        }
                    }
                }
            }
            .instrument(scheduler_span),
        );
        *state = SchedulerState::Running { stop_tx, handle };
        tracing::info!(
            period_secs = period.as_secs_f64(),
            modules = self.modules.len(),
            "collection scheduler started"
        );
        Ok(true)
    }

    /// Signals the loop to exit. An in-flight cycle is not awaited. No-op when stopped.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, SchedulerState::Stopped) {
            SchedulerState::Running { stop_tx, .. } => {
                let _ = stop_tx.send(());
                tracing::info!("collection scheduler stopped");
            }
            SchedulerState::Stopped => {
                tracing::debug!("scheduler already stopped");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        match &*self.state.lock().await {
            SchedulerState::Running { handle, .. } => !handle.is_finished(),
            SchedulerState::Stopped => false,
        }
    }
}
