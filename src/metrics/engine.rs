//! Metrics engine - orchestration over the SQLite store
//!
//! ```text
//! WalletObservation (ingestion)
//!     ↓
//! MetricsEngine::record_observation()   derive SSR, f → wallet
//!     ↓
//! MetricsEngine::refresh_cumulative()   S_cum, BXS_cum → metrics
//!     ↓
//! MetricsEngine::process_alerts()       rules → alerts (one transaction)
//! ```
//!
//! `run_evaluation` does the last two steps in a single transaction. A host
//! that enforces a timeout passes a [`Deadline`]; once cancelled the run
//! rolls back instead of committing.
//!
//! The engine is a single writer: every mutating operation takes `&mut self`
//! and runs inside one SQLite transaction, so a failure leaves no partial
//! writes. The host is expected to serialize access (see `scheduler`).

use super::alerts::{evaluate_rules, AlertHistory};
use super::calculator::{compute_expansion_rate, derive_indicators, DerivationContext};
use super::config::{AlertConfig, EngineConfig, MAX_WINDOW_DAYS, SECONDS_PER_DAY};
use super::db;
use super::error::{EngineError, EngineResult};
use super::integrator::{first_interval, integrate_bxs, integrate_s, RunningIntegral};
use super::types::{
    AlertRecord, BlockContext, CumulativeMetric, LatestSnapshot, Observation, RangeRow,
    WalletObservation,
};
use rusqlite::{Connection, InterruptHandle};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Result of a full cumulative recompute
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecomputeOutcome {
    /// No observations stored yet
    NoData,
    Success { processed: usize, latest_t: i64 },
}

/// Result of one evaluation run
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSummary {
    pub current_t: i64,
    /// Cumulative rows written by the incremental refresh
    pub refreshed: usize,
    pub alerts: Vec<AlertRecord>,
}

const DEADLINE_PENDING: u8 = 0;
const DEADLINE_RUNNING: u8 = 1;
const DEADLINE_COMMITTING: u8 = 2;
const DEADLINE_CANCELLED: u8 = 3;

/// What [`Deadline::cancel`] found the run doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Run had not started; it will return without touching the store
    BeforeStart,
    /// Run is inside its transaction and will roll back
    InFlight,
    /// Run already claimed the commit; its result stands
    CommitStarted,
}

/// Cancellation shared between a host timeout and one evaluation run
///
/// Exactly one side wins the race: either the run claims the commit, or the
/// host cancels and the run's transaction is dropped uncommitted.
#[derive(Debug, Clone)]
pub struct Deadline {
    state: Arc<AtomicU8>,
    timeout_ms: u64,
}

impl Deadline {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(DEADLINE_PENDING)),
            timeout_ms,
        }
    }

    pub fn cancel(&self) -> CancelOutcome {
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| match state {
                DEADLINE_PENDING | DEADLINE_RUNNING => Some(DEADLINE_CANCELLED),
                _ => None,
            });

        match previous {
            Ok(DEADLINE_RUNNING) => CancelOutcome::InFlight,
            Err(DEADLINE_COMMITTING) => CancelOutcome::CommitStarted,
            _ => CancelOutcome::BeforeStart,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == DEADLINE_CANCELLED
    }

    fn transition(&self, from: u8, to: u8) -> EngineResult<()> {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| EngineError::Timeout(self.timeout_ms))
    }

    fn start(&self) -> EngineResult<()> {
        self.transition(DEADLINE_PENDING, DEADLINE_RUNNING)
    }

    fn begin_commit(&self) -> EngineResult<()> {
        self.transition(DEADLINE_RUNNING, DEADLINE_COMMITTING)
    }
}

pub struct MetricsEngine {
    conn: Connection,
    config: EngineConfig,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl MetricsEngine {
    /// Wrap an open connection, creating the schema if needed
    pub fn new(conn: Connection, config: EngineConfig) -> EngineResult<Self> {
        db::apply_schema(&conn)?;
        Ok(Self {
            conn,
            config,
            now_fn: Box::new(|| chrono::Utc::now().timestamp()),
        })
    }

    /// Open the database at `config.db_path`
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let conn = db::open_database(Path::new(&config.db_path))?;
        log::info!("✅ Metrics store opened: {}", config.db_path);
        Self::new(conn, config)
    }

    /// Replace the clock used by [`MetricsEngine::now`]
    pub fn with_timestamp_fn(mut self, now_fn: Box<dyn Fn() -> i64 + Send + Sync>) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn now(&self) -> i64 {
        (self.now_fn)()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Handle that aborts the statement currently running on this engine's connection
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    /// Store block context, deriving I = sigma / S · lambda
    pub fn record_block(
        &mut self,
        h: i64,
        t: i64,
        sigma: f64,
        supply: f64,
        lambda: f64,
    ) -> EngineResult<BlockContext> {
        let block = BlockContext {
            h,
            t,
            sigma,
            supply,
            lambda,
            expansion_rate: compute_expansion_rate(sigma, supply, lambda)?,
        };
        db::upsert_block(&self.conn, &block)?;
        log::debug!("🧱 Block {} stored (I={:.4e})", h, block.expansion_rate);
        Ok(block)
    }

    /// Derive SSR and f for a new observation and append it
    ///
    /// Timestamps must be strictly increasing; an observation at or before
    /// the latest stored one is rejected.
    pub fn record_observation(&mut self, raw: WalletObservation) -> EngineResult<Observation> {
        let tx = self.conn.transaction()?;

        if let Some(latest) = db::latest_observation(&tx)? {
            if raw.t <= latest.t {
                return Err(EngineError::invalid(format!(
                    "observation t={} is not after latest t={}",
                    raw.t, latest.t
                )));
            }
        }

        let origin = match self.config.params.wallet_origin_t {
            Some(origin) => origin,
            None => db::first_timestamps(&tx, 1)?.first().copied().unwrap_or(raw.t),
        };

        let expansion_rate = match db::latest_block_at_or_before(&tx, raw.t)? {
            Some(block) => block.expansion_rate,
            None => {
                log::warn!("⚠️  No block at or before t={}, using I=0", raw.t);
                0.0
            }
        };

        let ctx = DerivationContext {
            elapsed_secs: (raw.t - origin) as f64,
            expansion_rate,
        };
        let (ssr, f) = derive_indicators(&raw, &ctx, &self.config.params, &self.config.floors)?;

        let observation = Observation::from_raw(&raw, ssr, f);
        db::insert_observation(&tx, &observation)?;
        tx.commit()?;

        log::debug!("📥 Observation t={} SSR={:.4} f={:.4}", raw.t, ssr, f);
        Ok(observation)
    }

    /// Recompute S_cum and BXS_cum from the full observation history
    ///
    /// Deterministic: re-running over unchanged history writes identical values.
    pub fn recompute_cumulative(&mut self) -> EngineResult<RecomputeOutcome> {
        let tx = self.conn.transaction()?;
        let outcome = recompute_all(&tx)?;
        tx.commit()?;

        if let RecomputeOutcome::Success { processed, latest_t } = outcome {
            log::info!("🔁 Recomputed cumulative metrics: {} rows (latest t={})", processed, latest_t);
        }
        Ok(outcome)
    }

    /// Extend the cumulative series over observations newer than the last metrics row
    ///
    /// Produces the same values a full recompute would. Falls back to a full
    /// recompute when there are no metrics rows yet. Returns rows written.
    pub fn refresh_cumulative(&mut self) -> EngineResult<usize> {
        let tx = self.conn.transaction()?;
        let refreshed = refresh_pending(&tx)?;
        tx.commit()?;
        Ok(refreshed)
    }

    /// Evaluate all alert rules at `current_t` and append triggered alerts
    ///
    /// Reads and writes happen in one transaction; on any error nothing is written.
    pub fn process_alerts(&mut self, current_t: i64) -> EngineResult<Vec<AlertRecord>> {
        let tx = self.conn.transaction()?;
        let alerts = append_alerts(&tx, current_t, &self.config.alerts)?;
        tx.commit()?;

        log_alerts(current_t, &alerts);
        Ok(alerts)
    }

    /// Refresh cumulative metrics and evaluate alerts in one transaction
    pub fn run_evaluation(&mut self, current_t: i64) -> EngineResult<EvaluationSummary> {
        self.evaluate(current_t, None)
    }

    /// Like [`MetricsEngine::run_evaluation`], but commits only while `deadline` stands
    ///
    /// Returns `EngineError::Timeout` with nothing written when the deadline
    /// was cancelled before the run started or before it reached commit.
    pub fn run_evaluation_within(
        &mut self,
        current_t: i64,
        deadline: &Deadline,
    ) -> EngineResult<EvaluationSummary> {
        self.evaluate(current_t, Some(deadline))
    }

    fn evaluate(&mut self, current_t: i64, deadline: Option<&Deadline>) -> EngineResult<EvaluationSummary> {
        if let Some(deadline) = deadline {
            deadline.start()?;
        }

        let tx = self.conn.transaction()?;
        let refreshed = refresh_pending(&tx)?;
        let alerts = append_alerts(&tx, current_t, &self.config.alerts)?;

        if let Some(deadline) = deadline {
            deadline.begin_commit()?;
        }
        tx.commit()?;

        log_alerts(current_t, &alerts);
        Ok(EvaluationSummary {
            current_t,
            refreshed,
            alerts,
        })
    }

    /// Latest observation with latest block and cumulative values
    ///
    /// `None` until the first observation is recorded.
    pub fn latest_snapshot(&self) -> EngineResult<Option<LatestSnapshot>> {
        let Some(observation) = db::latest_observation(&self.conn)? else {
            return Ok(None);
        };

        Ok(Some(LatestSnapshot {
            observation,
            block: db::latest_block(&self.conn)?,
            cumulative: db::latest_cumulative(&self.conn)?,
        }))
    }

    /// Observations in `[start, end]` with cumulative values and block height
    pub fn observations_in_range(&self, start: i64, end: i64) -> EngineResult<Vec<RangeRow>> {
        if end < start {
            return Err(EngineError::invalid(format!("range end {} before start {}", end, start)));
        }
        db::range_rows(&self.conn, start, end)
    }

    /// Alerts from the last `days` days relative to `now`, newest first
    pub fn alerts_since(&self, now: i64, days: i64) -> EngineResult<Vec<AlertRecord>> {
        if !(1..=MAX_WINDOW_DAYS).contains(&days) {
            return Err(EngineError::invalid(format!(
                "days must be in 1..={}, got {}",
                MAX_WINDOW_DAYS, days
            )));
        }
        db::alerts_since(&self.conn, now - days * SECONDS_PER_DAY, db::RECENT_ALERTS_LIMIT)
    }
}

/// Cumulative rows for observations past the last metrics row; no commit
fn refresh_pending(conn: &Connection) -> EngineResult<usize> {
    let latest = match db::latest_cumulative(conn)? {
        Some(latest) => latest,
        None => {
            return Ok(match recompute_all(conn)? {
                RecomputeOutcome::NoData => 0,
                RecomputeOutcome::Success { processed, .. } => processed,
            });
        }
    };

    let pending = db::observations_after(conn, latest.t)?;
    if pending.is_empty() {
        return Ok(0);
    }

    let anchor = db::latest_observation_at_or_before(conn, latest.t)?
        .filter(|obs| obs.t == latest.t)
        .ok_or_else(|| {
            EngineError::invalid(format!("metrics row t={} has no matching observation", latest.t))
        })?;

    let dt = first_interval(&db::first_timestamps(conn, 2)?);
    let mut s_integral = RunningIntegral::resume(dt, anchor.f, latest.s_cum);
    let mut bxs_integral = RunningIntegral::resume(dt, latest.s_cum, latest.bxs_cum);

    let rows: Vec<CumulativeMetric> = pending
        .iter()
        .map(|obs| {
            let s_cum = s_integral.push(obs.f);
            CumulativeMetric {
                t: obs.t,
                s_cum,
                bxs_cum: bxs_integral.push(s_cum),
            }
        })
        .collect();

    db::upsert_cumulative(conn, &rows)?;

    log::debug!("🔁 Refreshed {} cumulative rows (dt={}s)", rows.len(), dt);
    Ok(rows.len())
}

/// Evaluate rules at `current_t` and insert what fires; no commit
fn append_alerts(conn: &Connection, current_t: i64, config: &AlertConfig) -> EngineResult<Vec<AlertRecord>> {
    let history = load_alert_history(conn, current_t, config)?;
    let alerts = evaluate_rules(&history, current_t, config);
    db::insert_alerts(conn, &alerts)?;
    Ok(alerts)
}

fn log_alerts(current_t: i64, alerts: &[AlertRecord]) {
    if alerts.is_empty() {
        log::debug!("✅ No alerts at t={}", current_t);
        return;
    }
    for alert in alerts {
        log::info!(
            "🚨 Alert {} (severity {:.2}) for t={}",
            alert.alert_type,
            alert.severity,
            alert.t
        );
    }
}

fn recompute_all(conn: &Connection) -> EngineResult<RecomputeOutcome> {
    let observations = db::all_observations(conn)?;
    let Some(last) = observations.last() else {
        return Ok(RecomputeOutcome::NoData);
    };

    let timestamps: Vec<i64> = observations.iter().map(|obs| obs.t).collect();
    let f_series: Vec<f64> = observations.iter().map(|obs| obs.f).collect();

    let s_series = integrate_s(&f_series, &timestamps)?;
    let bxs_series = integrate_bxs(&s_series, &timestamps)?;

    let rows: Vec<CumulativeMetric> = timestamps
        .iter()
        .zip(s_series.iter().zip(bxs_series.iter()))
        .map(|(&t, (&s_cum, &bxs_cum))| CumulativeMetric { t, s_cum, bxs_cum })
        .collect();

    db::upsert_cumulative(conn, &rows)?;

    Ok(RecomputeOutcome::Success {
        processed: rows.len(),
        latest_t: last.t,
    })
}

/// Snapshot of everything the alert rules read at `current_t`
pub fn load_alert_history(
    conn: &Connection,
    current_t: i64,
    config: &AlertConfig,
) -> EngineResult<AlertHistory> {
    Ok(AlertHistory {
        observations: db::observations_in_range(
            conn,
            current_t.saturating_sub(config.window_seconds()),
            current_t,
        )?,
        latest: db::latest_observation_at_or_before(conn, current_t)?,
        expansion_rate: db::latest_block(conn)?.map(|block| block.expansion_rate),
    })
}
