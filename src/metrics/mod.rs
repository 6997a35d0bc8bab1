//! # BXS Metrics Engine
//!
//! Derives wallet health indicators from periodic observations, integrates
//! them into cumulative persistence measures and evaluates alert rules.
//! All state lives in SQLite.
//!
//! ## Tables
//!
//! | Table     | Key | Written by                          |
//! |-----------|-----|-------------------------------------|
//! | `wallet`  | t   | `record_observation` (SSR, f)       |
//! | `blocks`  | h   | `record_block` (I)                  |
//! | `metrics` | t   | `recompute_cumulative` / `refresh`  |
//! | `alerts`  | id  | `process_alerts` (append-only)      |
//!
//! ## Indicators
//!
//! - `SSR = (W + r·i − CP) / (max(t, t_min) · max(μ, μ_min))`
//! - `f = i · (A / A0) · (I / I0) · SSR`
//! - `S(T) = ∫ f dt`, `BXS(T) = ∫ S dt` (trapezoidal, fixed step)
//!
//! ## Alert rules
//!
//! - `f_decline`: f fell by 20% or more over the trailing 14 days
//! - `ssr_negative`: the latest SSR is below zero

pub mod alerts;
pub mod calculator;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod integrator;
pub mod quickstart;
pub mod scheduler;
pub mod types;

pub use config::EngineConfig;
pub use engine::{CancelOutcome, Deadline, EvaluationSummary, MetricsEngine, RecomputeOutcome};
pub use error::{EngineError, EngineResult};
pub use types::{
    AlertRecord, AlertType, BlockContext, CumulativeMetric, LatestSnapshot, Observation, RangeRow,
    WalletObservation,
};
