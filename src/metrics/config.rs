//! Engine configuration from environment variables
//!
//! Thresholds, floors and baselines are passed into the calculator and the
//! alert evaluator explicitly, never read from globals.

use std::env;
use std::str::FromStr;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Denominator floors applied by the indicator calculator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorFloors {
    /// Minimum elapsed time [s]
    pub t_min: f64,
    /// Minimum spending rate [sats/s]
    pub mu_min: f64,
    /// Minimum coin-age baseline A0 [s]
    pub a0_min: f64,
    /// Minimum expansion-rate baseline I0 [s⁻¹]
    pub i0_min: f64,
}

impl Default for IndicatorFloors {
    fn default() -> Self {
        Self {
            t_min: 1000.0,
            mu_min: 1e-6,
            a0_min: 1e-9,
            i0_min: 1e-12,
        }
    }
}

/// Model parameters used when deriving SSR and f for a new observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorParams {
    /// Retirement horizon r [s]
    pub retirement_horizon_secs: f64,
    /// Coin-age baseline A0 [s]
    pub coin_age_baseline_secs: f64,
    /// Expansion-rate baseline I0 [s⁻¹]
    pub expansion_rate_baseline: f64,
    /// Start of the wallet's elapsed-time clock; first stored observation when unset
    pub wallet_origin_t: Option<i64>,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            retirement_horizon_secs: 20.0 * 365.0 * SECONDS_PER_DAY as f64,
            coin_age_baseline_secs: 365.0 * SECONDS_PER_DAY as f64,
            // 3.125 BTC subsidy / ~19.8M BTC supply / 600s block interval
            expansion_rate_baseline: 2.6e-10,
            wallet_origin_t: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertConfig {
    /// Trailing window for the f_decline rule
    pub window_days: i64,
    /// Percentage change at or below which f_decline triggers
    pub decline_threshold_pct: f64,
}

impl AlertConfig {
    pub fn window_seconds(&self) -> i64 {
        self.window_days.saturating_mul(SECONDS_PER_DAY)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            window_days: 14,
            decline_threshold_pct: -20.0,
        }
    }
}

/// Configuration for the engine and its runtime host
///
/// Loaded from environment variables with defaults matching the BXS model.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `*.sql` schema files
    pub schema_dir: String,

    pub floors: IndicatorFloors,
    pub params: IndicatorParams,
    pub alerts: AlertConfig,

    /// Interval between evaluation runs in milliseconds
    pub eval_interval_ms: u64,

    /// Host-level timeout for one evaluation run in milliseconds
    pub eval_timeout_ms: u64,

    /// Run a full cumulative recompute before the first evaluation
    pub recompute_on_start: bool,

    /// Output path for the quickstart snapshot
    pub quickstart_output: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "data/bxs.sqlite".to_string(),
            schema_dir: "sql".to_string(),
            floors: IndicatorFloors::default(),
            params: IndicatorParams::default(),
            alerts: AlertConfig::default(),
            eval_interval_ms: 600_000,
            eval_timeout_ms: 30_000,
            recompute_on_start: false,
            quickstart_output: "results/quickstart.json".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Longest accepted alert window
pub const MAX_WINDOW_DAYS: i64 = 365;

/// Keep `days` when it lies in `1..=MAX_WINDOW_DAYS`, else fall back to `default`
fn window_days_or(days: i64, default: i64) -> i64 {
    if (1..=MAX_WINDOW_DAYS).contains(&days) {
        days
    } else {
        log::warn!(
            "⚠️  BXS_ALERT_WINDOW_DAYS={} outside 1..={}, using {}",
            days,
            MAX_WINDOW_DAYS,
            default
        );
        default
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables (defaults in parentheses):
    /// - `BXS_DB_PATH` (data/bxs.sqlite)
    /// - `BXS_SCHEMA_DIR` (sql)
    /// - `BXS_T_MIN_SECS` (1000), `BXS_MU_MIN` (1e-6)
    /// - `BXS_A0_MIN` (1e-9), `BXS_I0_MIN` (1e-12)
    /// - `BXS_RETIREMENT_HORIZON_SECS` (20 years)
    /// - `BXS_COIN_AGE_BASELINE_SECS` (1 year)
    /// - `BXS_EXPANSION_RATE_BASELINE` (2.6e-10)
    /// - `BXS_WALLET_ORIGIN_T` (unset: first stored observation)
    /// - `BXS_ALERT_WINDOW_DAYS` (14), `BXS_DECLINE_THRESHOLD_PCT` (-20)
    /// - `BXS_EVAL_INTERVAL_MS` (600000), `BXS_EVAL_TIMEOUT_MS` (30000)
    /// - `BXS_RECOMPUTE_ON_START` (false)
    /// - `BXS_QUICKSTART_OUTPUT` (results/quickstart.json)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: env::var("BXS_DB_PATH").unwrap_or(defaults.db_path),
            schema_dir: env::var("BXS_SCHEMA_DIR").unwrap_or(defaults.schema_dir),

            floors: IndicatorFloors {
                t_min: env_or("BXS_T_MIN_SECS", defaults.floors.t_min),
                mu_min: env_or("BXS_MU_MIN", defaults.floors.mu_min),
                a0_min: env_or("BXS_A0_MIN", defaults.floors.a0_min),
                i0_min: env_or("BXS_I0_MIN", defaults.floors.i0_min),
            },

            params: IndicatorParams {
                retirement_horizon_secs: env_or(
                    "BXS_RETIREMENT_HORIZON_SECS",
                    defaults.params.retirement_horizon_secs,
                ),
                coin_age_baseline_secs: env_or(
                    "BXS_COIN_AGE_BASELINE_SECS",
                    defaults.params.coin_age_baseline_secs,
                ),
                expansion_rate_baseline: env_or(
                    "BXS_EXPANSION_RATE_BASELINE",
                    defaults.params.expansion_rate_baseline,
                ),
                wallet_origin_t: env::var("BXS_WALLET_ORIGIN_T")
                    .ok()
                    .and_then(|s| s.trim().parse().ok()),
            },

            alerts: AlertConfig {
                window_days: window_days_or(
                    env_or("BXS_ALERT_WINDOW_DAYS", defaults.alerts.window_days),
                    defaults.alerts.window_days,
                ),
                decline_threshold_pct: env_or(
                    "BXS_DECLINE_THRESHOLD_PCT",
                    defaults.alerts.decline_threshold_pct,
                ),
            },

            eval_interval_ms: env_or("BXS_EVAL_INTERVAL_MS", defaults.eval_interval_ms),
            eval_timeout_ms: env_or("BXS_EVAL_TIMEOUT_MS", defaults.eval_timeout_ms),
            recompute_on_start: env_or("BXS_RECOMPUTE_ON_START", defaults.recompute_on_start),
            quickstart_output: env::var("BXS_QUICKSTART_OUTPUT")
                .unwrap_or(defaults.quickstart_output),
        }
    }
}
