//! Record shapes read from and written to the metrics store
//!
//! Field names serialize with the symbols used throughout the BXS model
//! (`W`, `A`, `SSR`, ...) so snapshots and alert contexts line up with the
//! stored column names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wallet state as acquired by ingestion, before indicators are derived
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalletObservation {
    /// Unix seconds
    pub t: i64,
    /// Holdings [sats]
    #[serde(rename = "W")]
    pub w: f64,
    /// Value-weighted coin age [s]
    #[serde(rename = "A")]
    pub a: f64,
    /// Income inflow rate [sats/s]
    pub i: f64,
    /// Spending outflow rate [sats/s]
    pub mu: f64,
    /// Cumulative CPI-weighted cost [sats]
    #[serde(rename = "CP", default)]
    pub cp: f64,
}

impl WalletObservation {
    pub fn new(t: i64, w: f64, a: f64, i: f64, mu: f64) -> Self {
        Self { t, w, a, i, mu, cp: 0.0 }
    }

    pub fn with_cost(mut self, cp: f64) -> Self {
        self.cp = cp;
        self
    }
}

/// Persisted wallet row: raw observation plus derived SSR and f
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub t: i64,
    #[serde(rename = "W")]
    pub w: f64,
    #[serde(rename = "A")]
    pub a: f64,
    pub i: f64,
    pub mu: f64,
    #[serde(rename = "CP")]
    pub cp: f64,
    #[serde(rename = "SSR")]
    pub ssr: f64,
    pub f: f64,
}

impl Observation {
    pub fn from_raw(raw: &WalletObservation, ssr: f64, f: f64) -> Self {
        Self {
            t: raw.t,
            w: raw.w,
            a: raw.a,
            i: raw.i,
            mu: raw.mu,
            cp: raw.cp,
            ssr,
            f,
        }
    }
}

/// Per-block protocol context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockContext {
    pub h: i64,
    pub t: i64,
    /// Block subsidy [BTC/block]
    pub sigma: f64,
    /// Circulating supply [BTC]
    #[serde(rename = "S")]
    pub supply: f64,
    /// Block arrival rate [blocks/s]
    pub lambda: f64,
    /// Protocol expansion rate I [s⁻¹]
    #[serde(rename = "I")]
    pub expansion_rate: f64,
}

/// Cumulative persistence measures at one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CumulativeMetric {
    pub t: i64,
    #[serde(rename = "S_cum")]
    pub s_cum: f64,
    #[serde(rename = "BXS_cum")]
    pub bxs_cum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// f(t) fell by at least the configured percentage over the trailing window
    FDecline,
    /// Latest SSR below zero
    SsrNegative,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::FDecline => "f_decline",
            AlertType::SsrNegative => "ssr_negative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "f_decline" => Some(AlertType::FDecline),
            "ssr_negative" => Some(AlertType::SsrNegative),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicator values that justified an alert, keyed by symbol
pub type AlertContext = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Timestamp of the observation that produced the trigger
    pub t: i64,
    /// Detection time (evaluation timestamp)
    pub created_at: i64,
    pub alert_type: AlertType,
    pub severity: f64,
    pub context: AlertContext,
}

impl AlertRecord {
    pub fn new(alert_type: AlertType, t: i64, created_at: i64, severity: f64) -> Self {
        Self {
            t,
            created_at,
            alert_type,
            severity,
            context: AlertContext::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: f64) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }
}

/// Observation row joined with its cumulative values and block height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeRow {
    #[serde(flatten)]
    pub observation: Observation,
    pub h: Option<i64>,
    #[serde(rename = "S_cum")]
    pub s_cum: Option<f64>,
    #[serde(rename = "BXS_cum")]
    pub bxs_cum: Option<f64>,
}

/// Latest observation with the context the serving layer reports alongside it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatestSnapshot {
    pub observation: Observation,
    pub block: Option<BlockContext>,
    pub cumulative: Option<CumulativeMetric>,
}

/// Display range for SSR; the stored value is never clamped
pub const SSR_DISPLAY_LIMIT: f64 = 10.0;

impl LatestSnapshot {
    /// Observation time as `YYYY-MM-DDTHH:MM:SSZ`
    pub fn timestamp_iso(&self) -> Option<String> {
        format_timestamp(self.observation.t)
    }

    /// SSR clamped to [-10, 10] for dashboards, sign retained
    pub fn ssr_display(&self) -> f64 {
        self.observation.ssr.clamp(-SSR_DISPLAY_LIMIT, SSR_DISPLAY_LIMIT)
    }
}

pub fn format_timestamp(t: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(t, 0).map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_strings() {
        for alert_type in [AlertType::FDecline, AlertType::SsrNegative] {
            assert_eq!(AlertType::parse(alert_type.as_str()), Some(alert_type));
        }
        assert_eq!(AlertType::parse("SURGE"), None);
        assert_eq!(
            serde_json::to_string(&AlertType::SsrNegative).unwrap(),
            "\"ssr_negative\""
        );
    }

    #[test]
    fn test_observation_serializes_model_symbols() {
        let raw = WalletObservation::new(1_700_000_000, 5e8, 86_400.0, 10.0, 2.0).with_cost(1e6);
        let obs = Observation::from_raw(&raw, -0.25, 3.5);
        let json = serde_json::to_value(obs).unwrap();

        assert_eq!(json["W"], 5e8);
        assert_eq!(json["CP"], 1e6);
        assert_eq!(json["SSR"], -0.25);
        assert_eq!(json["f"], 3.5);
    }

    #[test]
    fn test_snapshot_display_helpers() {
        let raw = WalletObservation::new(1_700_000_000, 1.0, 1.0, 1.0, 1.0);
        let snapshot = LatestSnapshot {
            observation: Observation::from_raw(&raw, -42.0, 0.0),
            block: None,
            cumulative: None,
        };

        assert_eq!(snapshot.timestamp_iso().as_deref(), Some("2023-11-14T22:13:20Z"));
        assert_eq!(snapshot.ssr_display(), -10.0);
        assert_eq!(snapshot.observation.ssr, -42.0);
    }

    #[test]
    fn test_cost_defaults_to_zero() {
        let raw: WalletObservation =
            serde_json::from_str(r#"{"t":1,"W":1.0,"A":2.0,"i":3.0,"mu":4.0}"#).unwrap();
        assert_eq!(raw.cp, 0.0);
    }
}
