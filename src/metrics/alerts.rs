//! Alert rules over a snapshot of indicator history
//!
//! Each rule is a plain function `(history, current_t, config) -> Option<AlertRecord>`.
//! Rules share no state; adding a rule means adding a function to [`RULES`]
//! and a variant to [`AlertType`]. Missing data is not an error: the rule
//! simply returns `None` for this invocation.

use super::config::AlertConfig;
use super::types::{AlertRecord, AlertType, Observation};

/// Consistent read of the store taken for one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertHistory {
    /// Time-ordered observations covering at least the trailing window
    pub observations: Vec<Observation>,
    /// Most recent observation at or before the evaluation time
    pub latest: Option<Observation>,
    /// Expansion rate I of the most recent block
    pub expansion_rate: Option<f64>,
}

impl AlertHistory {
    /// Observations with `start <= t <= end`, in time order
    pub fn between(&self, start: i64, end: i64) -> impl Iterator<Item = &Observation> {
        self.observations
            .iter()
            .filter(move |obs| obs.t >= start && obs.t <= end)
    }

    fn expansion_rate_or_zero(&self) -> f64 {
        self.expansion_rate.unwrap_or(0.0)
    }
}

pub type AlertRule = fn(&AlertHistory, i64, &AlertConfig) -> Option<AlertRecord>;

/// All rules evaluated on every invocation, in output order
pub const RULES: &[AlertRule] = &[check_f_decline, check_ssr_negative];

fn base_record(
    alert_type: AlertType,
    obs: &Observation,
    current_t: i64,
    severity: f64,
    expansion_rate: f64,
) -> AlertRecord {
    AlertRecord::new(alert_type, obs.t, current_t, severity)
        .with_context("W", obs.w)
        .with_context("A", obs.a)
        .with_context("I", expansion_rate)
        .with_context("SSR", obs.ssr)
        .with_context("f", obs.f)
}

/// f(t) declined by at least the threshold over the trailing window
///
/// Compares the earliest and latest f in `[current_t - window, current_t]`.
/// Needs two observations and a strictly positive starting value.
pub fn check_f_decline(
    history: &AlertHistory,
    current_t: i64,
    config: &AlertConfig,
) -> Option<AlertRecord> {
    let start_t = current_t.saturating_sub(config.window_seconds());
    let mut window = history.between(start_t, current_t);

    let first = window.next()?;
    let last = window.last()?;

    let f_start = first.f;
    let f_current = last.f;
    if f_start <= 0.0 {
        return None;
    }

    let pct_change = (f_current - f_start) / f_start * 100.0;
    if pct_change > config.decline_threshold_pct {
        return None;
    }

    let record = base_record(
        AlertType::FDecline,
        last,
        current_t,
        pct_change.abs(),
        history.expansion_rate_or_zero(),
    )
    .with_context("f_start", f_start)
    .with_context("f_current", f_current)
    .with_context("pct_change", pct_change);

    Some(record)
}

/// Most recent SSR is negative
pub fn check_ssr_negative(
    history: &AlertHistory,
    current_t: i64,
    _config: &AlertConfig,
) -> Option<AlertRecord> {
    let latest = history.latest.as_ref().filter(|obs| obs.t <= current_t)?;
    if latest.ssr >= 0.0 {
        return None;
    }

    Some(base_record(
        AlertType::SsrNegative,
        latest,
        current_t,
        latest.ssr.abs(),
        history.expansion_rate_or_zero(),
    ))
}

/// Run every rule against the same snapshot
pub fn evaluate_rules(history: &AlertHistory, current_t: i64, config: &AlertConfig) -> Vec<AlertRecord> {
    RULES
        .iter()
        .filter_map(|rule| rule(history, current_t, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400;
    const NOW: i64 = 1_700_000_000;

    fn obs(t: i64, f: f64, ssr: f64) -> Observation {
        Observation {
            t,
            w: 5.0e7,
            a: 3.0e6,
            i: 10.0,
            mu: 2.0,
            cp: 0.0,
            ssr,
            f,
        }
    }

    fn history(points: &[(i64, f64, f64)]) -> AlertHistory {
        let observations: Vec<Observation> =
            points.iter().map(|&(t, f, ssr)| obs(t, f, ssr)).collect();
        AlertHistory {
            latest: observations.last().copied(),
            observations,
            expansion_rate: Some(2.6e-10),
        }
    }

    #[test]
    fn test_f_decline_triggers_at_21_percent() {
        let h = history(&[(NOW - 13 * DAY, 100.0, 1.0), (NOW - 5 * DAY, 90.0, 1.0), (NOW, 79.0, 1.0)]);
        let alert = check_f_decline(&h, NOW, &AlertConfig::default()).expect("alert");

        assert_eq!(alert.alert_type, AlertType::FDecline);
        assert!((alert.severity - 21.0).abs() < 1e-9);
        assert_eq!(alert.t, NOW);
        assert_eq!(alert.created_at, NOW);
        assert_eq!(alert.context["f_start"], 100.0);
        assert_eq!(alert.context["f_current"], 79.0);
        assert!((alert.context["pct_change"] + 21.0).abs() < 1e-9);
        assert_eq!(alert.context["I"], 2.6e-10);
        assert_eq!(alert.context["W"], 5.0e7);
    }

    #[test]
    fn test_f_decline_19_percent_is_quiet() {
        let h = history(&[(NOW - 13 * DAY, 100.0, 1.0), (NOW, 81.0, 1.0)]);
        assert!(check_f_decline(&h, NOW, &AlertConfig::default()).is_none());
    }

    #[test]
    fn test_f_decline_exact_threshold_triggers() {
        let h = history(&[(NOW - DAY, 100.0, 1.0), (NOW, 80.0, 1.0)]);
        assert!(check_f_decline(&h, NOW, &AlertConfig::default()).is_some());
    }

    #[test]
    fn test_f_decline_ignores_points_outside_window() {
        // The 200 → 79 drop starts 20 days back; inside the window f only goes 80 → 79
        let h = history(&[(NOW - 20 * DAY, 200.0, 1.0), (NOW - 10 * DAY, 80.0, 1.0), (NOW, 79.0, 1.0)]);
        assert!(check_f_decline(&h, NOW, &AlertConfig::default()).is_none());

        // Observations after the evaluation time are not part of the window
        let h = history(&[(NOW - DAY, 100.0, 1.0), (NOW, 95.0, 1.0), (NOW + DAY, 10.0, 1.0)]);
        assert!(check_f_decline(&h, NOW, &AlertConfig::default()).is_none());
    }

    #[test]
    fn test_f_decline_insufficient_data() {
        let config = AlertConfig::default();
        assert!(check_f_decline(&history(&[]), NOW, &config).is_none());
        assert!(check_f_decline(&history(&[(NOW, 100.0, 1.0)]), NOW, &config).is_none());
        // Non-positive baseline
        assert!(check_f_decline(&history(&[(NOW - DAY, 0.0, 1.0), (NOW, -50.0, 1.0)]), NOW, &config).is_none());
        assert!(check_f_decline(&history(&[(NOW - DAY, -10.0, 1.0), (NOW, -50.0, 1.0)]), NOW, &config).is_none());
    }

    #[test]
    fn test_f_decline_custom_threshold() {
        let h = history(&[(NOW - DAY, 100.0, 1.0), (NOW, 95.0, 1.0)]);
        let config = AlertConfig {
            window_days: 3,
            decline_threshold_pct: -5.0,
        };
        assert!(check_f_decline(&h, NOW, &config).is_some());
        assert!(check_f_decline(&h, NOW, &AlertConfig::default()).is_none());
    }

    #[test]
    fn test_ssr_negative_single_observation() {
        let h = history(&[(NOW, 1.0, -0.5)]);
        let alerts = evaluate_rules(&h, NOW, &AlertConfig::default());

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::SsrNegative);
        assert_eq!(alerts[0].severity, 0.5);
        assert_eq!(alerts[0].context["SSR"], -0.5);
        assert_eq!(alerts[0].context.len(), 5);
    }

    #[test]
    fn test_ssr_zero_is_quiet() {
        let h = history(&[(NOW, 1.0, 0.0)]);
        assert!(check_ssr_negative(&h, NOW, &AlertConfig::default()).is_none());
    }

    #[test]
    fn test_ssr_negative_uses_event_timestamp() {
        let h = history(&[(NOW - 3600, 1.0, -2.0)]);
        let alert = check_ssr_negative(&h, NOW, &AlertConfig::default()).unwrap();
        assert_eq!(alert.t, NOW - 3600);
        assert_eq!(alert.created_at, NOW);
        assert!(alert.created_at >= alert.t);
    }

    #[test]
    fn test_missing_block_reports_zero_expansion_rate() {
        let mut h = history(&[(NOW, 1.0, -1.0)]);
        h.expansion_rate = None;
        let alert = check_ssr_negative(&h, NOW, &AlertConfig::default()).unwrap();
        assert_eq!(alert.context["I"], 0.0);
    }

    #[test]
    fn test_both_rules_fire_together() {
        let h = history(&[(NOW - DAY, 100.0, 0.4), (NOW, 50.0, -0.1)]);
        let alerts = evaluate_rules(&h, NOW, &AlertConfig::default());
        let types: Vec<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
        assert_eq!(types, vec![AlertType::FDecline, AlertType::SsrNegative]);
    }
}
