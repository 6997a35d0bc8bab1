//! Indicator calculator: SSR and productive flow f(t)
//!
//! Stateless formulas, no I/O. Denominators are floored (see
//! [`IndicatorFloors`]) so young wallets or near-zero spending never divide
//! by zero. The floors are domain logic; anything else that is non-finite or
//! negative where the model forbids it is rejected as `InvalidInput`.
//!
//! ```text
//! SSR = (W + r·i − CP) / (max(t, t_min) · max(mu, mu_min))
//! f   = i · (A / max(A0, A0_min)) · (I / max(I0, I0_min)) · SSR
//! ```

use super::config::{IndicatorFloors, IndicatorParams};
use super::error::{EngineError, EngineResult};
use super::types::WalletObservation;

/// Default lookback for rolling income/spend rates (7 days)
pub const DEFAULT_FLOW_WINDOW_SECS: i64 = 7 * 86_400;

fn ensure_finite(name: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::invalid(format!("{} is not finite: {}", name, value)))
    }
}

fn ensure_non_negative(name: &str, value: f64) -> EngineResult<()> {
    ensure_finite(name, value)?;
    if value < 0.0 {
        return Err(EngineError::invalid(format!("{} must be >= 0, got {}", name, value)));
    }
    Ok(())
}

/// Surplus-to-Spending Ratio
///
/// Arguments:
/// - `w`: holdings [sats]
/// - `r`: retirement horizon [s]
/// - `i`: income inflow rate [sats/s]
/// - `cp`: cumulative CPI-weighted cost [sats]
/// - `t`: elapsed time [s], floored at `floors.t_min`
/// - `mu`: spending outflow rate [sats/s], floored at `floors.mu_min`
///
/// The sign is preserved: a negative SSR is the drawdown signal the
/// `ssr_negative` alert rule consumes.
pub fn compute_ssr(
    w: f64,
    r: f64,
    i: f64,
    cp: f64,
    t: f64,
    mu: f64,
    floors: &IndicatorFloors,
) -> EngineResult<f64> {
    ensure_non_negative("W", w)?;
    ensure_non_negative("r", r)?;
    ensure_non_negative("i", i)?;
    ensure_non_negative("CP", cp)?;
    ensure_non_negative("t", t)?;
    ensure_non_negative("mu", mu)?;

    let numerator = w + r * i - cp;
    let denominator = t.max(floors.t_min) * mu.max(floors.mu_min);

    Ok(numerator / denominator)
}

/// Productive flow of durable claims f(t) [sats/s]
///
/// Multiplicative in every factor, so a zero or negative `ssr` decides the
/// sign of the result regardless of the (non-negative) ratios.
pub fn compute_f(
    i: f64,
    a: f64,
    a0: f64,
    expansion_rate: f64,
    i0: f64,
    ssr: f64,
    floors: &IndicatorFloors,
) -> EngineResult<f64> {
    ensure_non_negative("i", i)?;
    ensure_non_negative("A", a)?;
    ensure_finite("A0", a0)?;
    ensure_non_negative("I", expansion_rate)?;
    ensure_finite("I0", i0)?;
    ensure_finite("SSR", ssr)?;

    let age_ratio = a / a0.max(floors.a0_min);
    let expansion_ratio = expansion_rate / i0.max(floors.i0_min);

    Ok(i * age_ratio * expansion_ratio * ssr)
}

/// Protocol expansion rate I = sigma / S · lambda [s⁻¹]
pub fn compute_expansion_rate(sigma: f64, supply: f64, lambda: f64) -> EngineResult<f64> {
    ensure_non_negative("sigma", sigma)?;
    ensure_non_negative("lambda", lambda)?;
    ensure_finite("S", supply)?;
    if supply <= 0.0 {
        return Err(EngineError::invalid(format!("supply must be > 0, got {}", supply)));
    }

    Ok(sigma / supply * lambda)
}

/// Unspent output as seen by the wallet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utxo {
    /// [sats]
    pub value: f64,
    /// Seconds since the output was created
    pub age_secs: f64,
}

/// Value-weighted coin age A [s]
///
/// Returns 0 for an empty set or a set with no value.
pub fn compute_coin_age(utxos: &[Utxo]) -> f64 {
    let total_value: f64 = utxos.iter().map(|u| u.value).sum();
    if total_value <= 0.0 {
        return 0.0;
    }

    let weighted: f64 = utxos.iter().map(|u| u.value * u.age_secs).sum();
    weighted / total_value
}

/// Wallet transaction: positive amount is an inflow, negative an outflow [sats]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletTx {
    pub t: i64,
    pub amount: f64,
}

/// Rolling income and spending rates over `(now - window_seconds, now]`
///
/// Returns `(i, mu)` in sats/s. Both rates are non-negative.
pub fn compute_flows(txs: &[WalletTx], now: i64, window_seconds: i64) -> EngineResult<(f64, f64)> {
    if window_seconds <= 0 {
        return Err(EngineError::invalid(format!(
            "flow window must be > 0, got {}",
            window_seconds
        )));
    }

    let cutoff = now - window_seconds;
    let (inflow, outflow) = txs
        .iter()
        .filter(|tx| tx.t > cutoff && tx.t <= now)
        .fold((0.0, 0.0), |(inflow, outflow), tx| {
            if tx.amount >= 0.0 {
                (inflow + tx.amount, outflow)
            } else {
                (inflow, outflow - tx.amount)
            }
        });

    let window = window_seconds as f64;
    Ok((inflow / window, outflow / window))
}

/// Inputs to indicator derivation that come from outside the observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivationContext {
    /// Seconds since the wallet origin
    pub elapsed_secs: f64,
    /// Expansion rate of the latest block at or before the observation
    pub expansion_rate: f64,
}

/// Derive `(SSR, f)` for one observation
pub fn derive_indicators(
    raw: &WalletObservation,
    ctx: &DerivationContext,
    params: &IndicatorParams,
    floors: &IndicatorFloors,
) -> EngineResult<(f64, f64)> {
    let ssr = compute_ssr(
        raw.w,
        params.retirement_horizon_secs,
        raw.i,
        raw.cp,
        ctx.elapsed_secs,
        raw.mu,
        floors,
    )?;

    let f = compute_f(
        raw.i,
        raw.a,
        params.coin_age_baseline_secs,
        ctx.expansion_rate,
        params.expansion_rate_baseline,
        ssr,
        floors,
    )?;

    Ok((ssr, f))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floors() -> IndicatorFloors {
        IndicatorFloors::default()
    }

    #[test]
    fn test_ssr_basic() {
        // (1000 + 100·2 − 200) / (2000 · 0.5) = 1.0
        let ssr = compute_ssr(1000.0, 100.0, 2.0, 200.0, 2000.0, 0.5, &floors()).unwrap();
        assert_eq!(ssr, 1.0);
    }

    #[test]
    fn test_ssr_floors_are_exact() {
        let f = floors();
        let cases = [
            (5.0e8, 6.3e8, 12.5, 0.0, 0.0, 0.0),
            (1.0e6, 1.0e7, 0.3, 2.5e6, 999.999, 9.9e-7),
            (42.0, 0.0, 0.0, 7.0, 1.0, 0.0),
        ];

        for (w, r, i, cp, t, mu) in cases {
            let clamped = compute_ssr(w, r, i, cp, t, mu, &f).unwrap();
            let substituted = compute_ssr(w, r, i, cp, f.t_min, f.mu_min, &f).unwrap();
            assert_eq!(clamped, substituted);
            assert_eq!(clamped, (w + r * i - cp) / (f.t_min * f.mu_min));
        }
    }

    #[test]
    fn test_ssr_keeps_negative_sign() {
        let ssr = compute_ssr(100.0, 0.0, 0.0, 600.0, 5000.0, 0.1, &floors()).unwrap();
        assert!(ssr < 0.0);
        assert_eq!(ssr, -500.0 / 500.0);
    }

    #[test]
    fn test_ssr_zero_denominator_inputs_stay_finite() {
        let ssr = compute_ssr(1.0, 0.0, 0.0, 0.0, 0.0, 0.0, &floors()).unwrap();
        assert!(ssr.is_finite());
    }

    #[test]
    fn test_ssr_rejects_invalid_input() {
        let f = floors();
        assert!(matches!(
            compute_ssr(1.0, 1.0, 1.0, 0.0, -1.0, 1.0, &f),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(compute_ssr(f64::NAN, 1.0, 1.0, 0.0, 1.0, 1.0, &f).is_err());
        assert!(compute_ssr(1.0, 1.0, f64::INFINITY, 0.0, 1.0, 1.0, &f).is_err());
        assert!(compute_ssr(1.0, 1.0, 1.0, 0.0, 1.0, -0.5, &f).is_err());
    }

    #[test]
    fn test_f_formula() {
        // 2 · (10/5) · (4/2) · 1.5 = 12
        let f = compute_f(2.0, 10.0, 5.0, 4.0, 2.0, 1.5, &floors()).unwrap();
        assert_eq!(f, 12.0);
    }

    #[test]
    fn test_f_linear_in_ssr() {
        let base = compute_f(3.7, 1.2e6, 3.1e7, 2.7e-10, 2.6e-10, 0.83, &floors()).unwrap();
        let doubled = compute_f(3.7, 1.2e6, 3.1e7, 2.7e-10, 2.6e-10, 1.66, &floors()).unwrap();
        assert_eq!(doubled, 2.0 * base);
    }

    #[test]
    fn test_f_sign_follows_ssr() {
        let f = compute_f(1.0, 1.0, 1.0, 1.0, 1.0, -0.2, &floors()).unwrap();
        assert!(f < 0.0);
        let f = compute_f(1.0, 1.0, 1.0, 1.0, 1.0, 0.0, &floors()).unwrap();
        assert_eq!(f, 0.0);
    }

    #[test]
    fn test_f_unset_baselines_use_floors() {
        let fl = floors();
        let f = compute_f(1.0, 2.0, 0.0, 3.0, 0.0, 1.0, &fl).unwrap();
        assert_eq!(f, 1.0 * (2.0 / fl.a0_min) * (3.0 / fl.i0_min) * 1.0);
        assert!(f.is_finite());
    }

    #[test]
    fn test_expansion_rate() {
        let rate = compute_expansion_rate(3.125, 19_800_000.0, 1.0 / 600.0).unwrap();
        assert!((rate - 2.6304e-10).abs() < 1e-13);
        assert!(compute_expansion_rate(3.125, 0.0, 1.0 / 600.0).is_err());
    }

    #[test]
    fn test_coin_age_value_weighted() {
        let utxos = [
            Utxo { value: 100.0, age_secs: 10.0 },
            Utxo { value: 300.0, age_secs: 50.0 },
        ];
        assert_eq!(compute_coin_age(&utxos), 40.0);
        assert_eq!(compute_coin_age(&[]), 0.0);
    }

    #[test]
    fn test_flows_window() {
        let now = 1_000_000;
        let window = 1000;
        let txs = [
            WalletTx { t: now - 2000, amount: 9999.0 }, // outside window
            WalletTx { t: now - 1000, amount: 5000.0 }, // boundary, excluded
            WalletTx { t: now - 500, amount: 4000.0 },
            WalletTx { t: now - 100, amount: -1000.0 },
            WalletTx { t: now, amount: 2000.0 },
        ];

        let (i, mu) = compute_flows(&txs, now, window).unwrap();
        assert_eq!(i, 6.0);
        assert_eq!(mu, 1.0);
        assert!(compute_flows(&txs, now, 0).is_err());
    }

    #[test]
    fn test_flows_default_week() {
        let now = 1_700_000_000;
        let txs = [
            WalletTx { t: now - DEFAULT_FLOW_WINDOW_SECS, amount: 1.0e9 },
            WalletTx { t: now - DEFAULT_FLOW_WINDOW_SECS + 1, amount: 604_800.0 },
            WalletTx { t: now - 3600, amount: -1_209_600.0 },
        ];

        let (i, mu) = compute_flows(&txs, now, DEFAULT_FLOW_WINDOW_SECS).unwrap();
        assert_eq!(i, 1.0);
        assert_eq!(mu, 2.0);
    }

    #[test]
    fn test_derive_indicators_matches_formulas() {
        let fl = floors();
        let params = IndicatorParams::default();
        let raw = WalletObservation::new(1_700_000_000, 5.0e7, 2.0e6, 0.5, 0.2).with_cost(1.0e6);
        let ctx = DerivationContext {
            elapsed_secs: 86_400.0,
            expansion_rate: 2.7e-10,
        };

        let (ssr, f) = derive_indicators(&raw, &ctx, &params, &fl).unwrap();
        let expected_ssr = compute_ssr(
            raw.w,
            params.retirement_horizon_secs,
            raw.i,
            raw.cp,
            86_400.0,
            raw.mu,
            &fl,
        )
        .unwrap();
        assert_eq!(ssr, expected_ssr);
        assert_eq!(
            f,
            compute_f(
                raw.i,
                raw.a,
                params.coin_age_baseline_secs,
                2.7e-10,
                params.expansion_rate_baseline,
                expected_ssr,
                &fl
            )
            .unwrap()
        );
    }
}
