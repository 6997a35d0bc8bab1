//! Periodic evaluation host
//!
//! Runs refresh + alert evaluation on a fixed interval. Each run executes on
//! the blocking pool under a host timeout. On expiry the run's [`Deadline`]
//! is cancelled: a run that has not reached commit rolls back, and a running
//! SQLite statement is interrupted so it stops early.

use super::engine::{CancelOutcome, Deadline, EvaluationSummary, MetricsEngine};
use super::error::{EngineError, EngineResult};
use rusqlite::InterruptHandle;
use std::sync::{Arc, Mutex};
use tokio::task::JoinError;
use tokio::time::{interval, timeout, Duration};

fn joined<T>(result: Result<EngineResult<T>, JoinError>) -> EngineResult<T> {
    result.map_err(|join_err| EngineError::Task(join_err.to_string()))?
}

/// Run one evaluation at `current_t`, bounded by `timeout_ms`
///
/// `interrupt` must belong to the engine's connection. `EngineError::Timeout`
/// means nothing was committed. If the timeout lands after the run claimed
/// its commit, the run is awaited and its own result returned.
pub async fn run_evaluation(
    engine: Arc<Mutex<MetricsEngine>>,
    interrupt: &InterruptHandle,
    current_t: i64,
    timeout_ms: u64,
) -> EngineResult<EvaluationSummary> {
    let deadline = Deadline::new(timeout_ms);
    let run_deadline = deadline.clone();

    let mut task = tokio::task::spawn_blocking(move || {
        let mut engine_guard = engine.lock().map_err(|_| EngineError::LockPoisoned)?;
        engine_guard.run_evaluation_within(current_t, &run_deadline)
    });

    match timeout(Duration::from_millis(timeout_ms), &mut task).await {
        Ok(result) => joined(result),
        Err(_) => match deadline.cancel() {
            CancelOutcome::BeforeStart => Err(EngineError::Timeout(timeout_ms)),
            CancelOutcome::InFlight => {
                interrupt.interrupt();
                Err(EngineError::Timeout(timeout_ms))
            }
            CancelOutcome::CommitStarted => {
                log::warn!("⚠️  Evaluation at t={} passed its timeout while committing", current_t);
                joined(task.await)
            }
        },
    }
}

/// Evaluation scheduler task - refresh cumulative metrics and evaluate alerts
///
/// Arguments:
/// - `engine`: Shared MetricsEngine instance
/// - `interval_ms`: Evaluation interval in milliseconds
/// - `timeout_ms`: Per-run timeout in milliseconds
///
/// This function runs indefinitely until cancelled. A failed run is logged
/// and the next tick proceeds normally.
pub async fn evaluation_scheduler_task(
    engine: Arc<Mutex<MetricsEngine>>,
    interval_ms: u64,
    timeout_ms: u64,
) {
    log::info!(
        "⏰ Starting evaluation scheduler (interval: {}ms, timeout: {}ms)",
        interval_ms,
        timeout_ms
    );

    let interrupt = match engine.lock() {
        Ok(engine_guard) => engine_guard.interrupt_handle(),
        Err(_) => {
            log::error!("❌ Engine lock poisoned, scheduler not started");
            return;
        }
    };

    let mut timer = interval(Duration::from_millis(interval_ms));

    loop {
        timer.tick().await;

        let now = match engine.lock() {
            Ok(engine_guard) => engine_guard.now(),
            Err(_) => {
                log::error!("❌ Engine lock poisoned, stopping scheduler");
                return;
            }
        };

        match run_evaluation(engine.clone(), &interrupt, now, timeout_ms).await {
            Ok(summary) => {
                log::info!(
                    "✅ Evaluation at t={}: {} cumulative rows, {} alerts",
                    summary.current_t,
                    summary.refreshed,
                    summary.alerts.len()
                );
            }
            Err(EngineError::Timeout(ms)) => {
                log::error!("❌ Evaluation at t={} timed out after {}ms, rolled back", now, ms);
            }
            Err(e) => {
                log::error!("❌ Evaluation at t={} failed: {}", now, e);
            }
        }
    }
}
