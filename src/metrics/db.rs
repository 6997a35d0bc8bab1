//! SQLite store for observations, blocks, cumulative metrics and alerts
//!
//! Tables (see `/sql/`):
//! - `wallet` - one row per observation, PRIMARY KEY t (ordered scans)
//! - `blocks` - one row per block height, PRIMARY KEY h
//! - `metrics` - UPSERT on t (recompute is idempotent)
//! - `alerts` - INSERT only (append-only log, indexed on t)
//!
//! Every function takes a `&Connection`, so callers can pass a
//! `rusqlite::Transaction` to group reads and writes atomically.

use super::error::{EngineError, EngineResult};
use super::types::{
    AlertContext, AlertRecord, AlertType, BlockContext, CumulativeMetric, Observation, RangeRow,
};
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;

/// Schema files compiled into the binary, in migration order
pub const EMBEDDED_SCHEMA: &[(&str, &str)] = &[
    ("00_wallet.sql", include_str!("../../sql/00_wallet.sql")),
    ("01_blocks.sql", include_str!("../../sql/01_blocks.sql")),
    ("02_metrics.sql", include_str!("../../sql/02_metrics.sql")),
    ("03_alerts.sql", include_str!("../../sql/03_alerts.sql")),
];

/// Maximum rows returned by [`alerts_since`]
pub const RECENT_ALERTS_LIMIT: usize = 100;

/// Open (creating parent directories) and tune a database file
pub fn open_database(db_path: impl AsRef<Path>) -> EngineResult<Connection> {
    if let Some(parent) = db_path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    apply_optimized_pragmas(&conn)?;
    Ok(conn)
}

/// Run schema migrations from SQL files
///
/// Reads all `.sql` files from `schema_dir` in file-name order (00_, 01_, ...)
/// and executes them. Files must use `IF NOT EXISTS` so re-running is safe.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> EngineResult<()> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(EngineError::invalid(format!(
            "Schema directory not found: {}",
            schema_dir
        )));
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    let tx = conn.transaction()?;
    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(&path)?;
        tx.execute_batch(&sql_content)?;
    }
    tx.commit()?;

    log::info!("✅ All schema migrations completed successfully");
    Ok(())
}

/// Create all tables from the embedded schema
pub fn apply_schema(conn: &Connection) -> EngineResult<()> {
    for (name, sql) in EMBEDDED_SCHEMA {
        log::debug!("   ├─ Applying embedded schema: {}", name);
        conn.execute_batch(sql)?;
    }
    Ok(())
}

const OBSERVATION_COLUMNS: &str = "t, W, A, i, mu, CP, SSR, f";

fn observation_from_row(row: &Row) -> rusqlite::Result<Observation> {
    Ok(Observation {
        t: row.get(0)?,
        w: row.get(1)?,
        a: row.get(2)?,
        i: row.get(3)?,
        mu: row.get(4)?,
        cp: row.get(5)?,
        ssr: row.get(6)?,
        f: row.get(7)?,
    })
}

fn block_from_row(row: &Row) -> rusqlite::Result<BlockContext> {
    Ok(BlockContext {
        h: row.get(0)?,
        t: row.get(1)?,
        sigma: row.get(2)?,
        supply: row.get(3)?,
        lambda: row.get(4)?,
        expansion_rate: row.get(5)?,
    })
}

fn alert_from_row(row: &Row) -> rusqlite::Result<AlertRecord> {
    let type_str: String = row.get(2)?;
    let alert_type = AlertType::parse(&type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown alert type: {}", type_str).into(),
        )
    })?;

    let context_json: String = row.get(4)?;
    let context: AlertContext = serde_json::from_str(&context_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(AlertRecord {
        t: row.get(0)?,
        created_at: row.get(1)?,
        alert_type,
        severity: row.get(3)?,
        context,
    })
}

/// Insert a new observation row
///
/// Fails on a duplicate timestamp (PRIMARY KEY), the row is never replaced.
pub fn insert_observation(conn: &Connection, obs: &Observation) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO wallet (t, W, A, i, mu, CP, SSR, f) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![obs.t, obs.w, obs.a, obs.i, obs.mu, obs.cp, obs.ssr, obs.f],
    )?;
    Ok(())
}

/// Insert or replace a block row keyed by height
pub fn upsert_block(conn: &Connection, block: &BlockContext) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO blocks (h, t, sigma, S, lambda, I) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(h) DO UPDATE SET
             t = excluded.t,
             sigma = excluded.sigma,
             S = excluded.S,
             lambda = excluded.lambda,
             I = excluded.I",
        params![
            block.h,
            block.t,
            block.sigma,
            block.supply,
            block.lambda,
            block.expansion_rate
        ],
    )?;
    Ok(())
}

/// Upsert cumulative rows keyed by t
pub fn upsert_cumulative(conn: &Connection, rows: &[CumulativeMetric]) -> EngineResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO metrics (t, S_cum, BXS_cum) VALUES (?1, ?2, ?3)
         ON CONFLICT(t) DO UPDATE SET
             S_cum = excluded.S_cum,
             BXS_cum = excluded.BXS_cum",
    )?;

    for row in rows {
        stmt.execute(params![row.t, row.s_cum, row.bxs_cum])?;
    }
    Ok(())
}

/// Append alert rows
pub fn insert_alerts(conn: &Connection, alerts: &[AlertRecord]) -> EngineResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO alerts (t, created_at, alert_type, severity, context)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    for alert in alerts {
        let context_json = serde_json::to_string(&alert.context)?;
        stmt.execute(params![
            alert.t,
            alert.created_at,
            alert.alert_type.as_str(),
            alert.severity,
            context_json,
        ])?;
    }
    Ok(())
}

pub fn latest_observation(conn: &Connection) -> EngineResult<Option<Observation>> {
    let sql = format!(
        "SELECT {} FROM wallet ORDER BY t DESC LIMIT 1",
        OBSERVATION_COLUMNS
    );
    Ok(conn.query_row(&sql, [], observation_from_row).optional()?)
}

pub fn latest_observation_at_or_before(conn: &Connection, t: i64) -> EngineResult<Option<Observation>> {
    let sql = format!(
        "SELECT {} FROM wallet WHERE t <= ?1 ORDER BY t DESC LIMIT 1",
        OBSERVATION_COLUMNS
    );
    Ok(conn.query_row(&sql, [t], observation_from_row).optional()?)
}

/// Observations with `start <= t <= end`, ascending
pub fn observations_in_range(conn: &Connection, start: i64, end: i64) -> EngineResult<Vec<Observation>> {
    let sql = format!(
        "SELECT {} FROM wallet WHERE t >= ?1 AND t <= ?2 ORDER BY t",
        OBSERVATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([start, end], observation_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Full observation history, ascending
pub fn all_observations(conn: &Connection) -> EngineResult<Vec<Observation>> {
    observations_in_range(conn, i64::MIN, i64::MAX)
}

/// Observations strictly after `t`, ascending
pub fn observations_after(conn: &Connection, t: i64) -> EngineResult<Vec<Observation>> {
    if t == i64::MAX {
        return Ok(Vec::new());
    }
    observations_in_range(conn, t + 1, i64::MAX)
}

/// The first `n` observation timestamps, ascending
pub fn first_timestamps(conn: &Connection, n: usize) -> EngineResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT t FROM wallet ORDER BY t LIMIT ?1")?;
    let rows = stmt
        .query_map([n as i64], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(rows)
}

pub fn observation_count(conn: &Connection) -> EngineResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM wallet", [], |row| row.get(0))?)
}

/// Block with the greatest height
pub fn latest_block(conn: &Connection) -> EngineResult<Option<BlockContext>> {
    Ok(conn
        .query_row(
            "SELECT h, t, sigma, S, lambda, I FROM blocks ORDER BY h DESC LIMIT 1",
            [],
            block_from_row,
        )
        .optional()?)
}

/// Highest block whose timestamp is at or before `t`
pub fn latest_block_at_or_before(conn: &Connection, t: i64) -> EngineResult<Option<BlockContext>> {
    Ok(conn
        .query_row(
            "SELECT h, t, sigma, S, lambda, I FROM blocks WHERE t <= ?1 ORDER BY h DESC LIMIT 1",
            [t],
            block_from_row,
        )
        .optional()?)
}

pub fn latest_cumulative(conn: &Connection) -> EngineResult<Option<CumulativeMetric>> {
    Ok(conn
        .query_row(
            "SELECT t, S_cum, BXS_cum FROM metrics ORDER BY t DESC LIMIT 1",
            [],
            |row| {
                Ok(CumulativeMetric {
                    t: row.get(0)?,
                    s_cum: row.get(1)?,
                    bxs_cum: row.get(2)?,
                })
            },
        )
        .optional()?)
}

/// Cumulative rows, ascending
pub fn all_cumulative(conn: &Connection) -> EngineResult<Vec<CumulativeMetric>> {
    let mut stmt = conn.prepare("SELECT t, S_cum, BXS_cum FROM metrics ORDER BY t")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CumulativeMetric {
                t: row.get(0)?,
                s_cum: row.get(1)?,
                bxs_cum: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Observations in `[start, end]` joined with cumulative values and block height
pub fn range_rows(conn: &Connection, start: i64, end: i64) -> EngineResult<Vec<RangeRow>> {
    let mut stmt = conn.prepare(
        "SELECT w.t, w.W, w.A, w.i, w.mu, w.CP, w.SSR, w.f,
                b.h, m.S_cum, m.BXS_cum
         FROM wallet w
         LEFT JOIN metrics m ON w.t = m.t
         LEFT JOIN blocks b ON w.t = b.t
         WHERE w.t >= ?1 AND w.t <= ?2
         ORDER BY w.t",
    )?;

    let rows = stmt
        .query_map([start, end], |row| {
            Ok(RangeRow {
                observation: observation_from_row(row)?,
                h: row.get(8)?,
                s_cum: row.get(9)?,
                bxs_cum: row.get(10)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Alerts with `t >= cutoff_t`, newest first, at most `limit`
pub fn alerts_since(conn: &Connection, cutoff_t: i64, limit: usize) -> EngineResult<Vec<AlertRecord>> {
    let mut stmt = conn.prepare(
        "SELECT t, created_at, alert_type, severity, context
         FROM alerts
         WHERE t >= ?1
         ORDER BY t DESC, id DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![cutoff_t, limit as i64], alert_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn alert_count(conn: &Connection) -> EngineResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?)
}
