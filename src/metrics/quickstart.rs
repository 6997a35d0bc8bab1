//! Quickstart snapshot: the latest persisted state as a small JSON document

use super::error::EngineResult;
use super::types::LatestSnapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSection {
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

/// Latest block; every field is null when no block is stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockSection {
    pub h: Option<i64>,
    #[serde(rename = "I")]
    pub expansion_rate: Option<f64>,
    pub sigma: Option<f64>,
    #[serde(rename = "S")]
    pub supply: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSection {
    #[serde(rename = "S_cum")]
    pub s_cum: Option<f64>,
    #[serde(rename = "BXS_cum")]
    pub bxs_cum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickstartSnapshot {
    /// Timestamp of the latest observation
    pub timestamp: i64,
    pub wallet: WalletSection,
    pub block: BlockSection,
    pub metrics: MetricsSection,
}

impl From<&LatestSnapshot> for QuickstartSnapshot {
    fn from(latest: &LatestSnapshot) -> Self {
        let obs = &latest.observation;
        Self {
            timestamp: obs.t,
            wallet: WalletSection {
                w: obs.w,
                a: obs.a,
                i: obs.i,
                mu: obs.mu,
                cp: obs.cp,
                ssr: obs.ssr,
                f: obs.f,
            },
            block: latest
                .block
                .map(|b| BlockSection {
                    h: Some(b.h),
                    expansion_rate: Some(b.expansion_rate),
                    sigma: Some(b.sigma),
                    supply: Some(b.supply),
                })
                .unwrap_or_default(),
            metrics: latest
                .cumulative
                .map(|m| MetricsSection {
                    s_cum: Some(m.s_cum),
                    bxs_cum: Some(m.bxs_cum),
                })
                .unwrap_or_default(),
        }
    }
}

/// Write the snapshot as pretty JSON, creating parent directories
pub fn save_quickstart(snapshot: &QuickstartSnapshot, path: impl AsRef<Path>) -> EngineResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json)?;

    log::info!("💾 Quickstart snapshot written to {}", path.display());
    Ok(())
}

pub fn load_quickstart(path: impl AsRef<Path>) -> EngineResult<QuickstartSnapshot> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
