use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use deadpool_diesel::sqlite::{Manager, Pool};
use deadpool_diesel::Runtime;
use diesel::prelude::*;
use tokio::sync::watch;

use crate::models::{
    AgentInfo, AgentReport, AgentRow, AlertEntry, AlertEntryRow, AlertLevel, DriveUsage,
    DriveUsageRow, NewAlertEntryRow, NewDriveUsageRow,
};
use crate::schema::{agents, alert_entries, drive_usages};

const SCHEMA_SQL: &str = "
PRAGMA journal_mode = WAL;
CREATE TABLE IF NOT EXISTS agents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT NOT NULL UNIQUE,
    created_utc TEXT NOT NULL,
    last_seen_utc TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS drive_usages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_key INTEGER NOT NULL REFERENCES agents(id),
    timestamp_utc TEXT NOT NULL,
    drive_letter TEXT NOT NULL,
    total_space_gb DOUBLE NOT NULL,
    free_space_gb DOUBLE NOT NULL,
    used_percent DOUBLE NOT NULL
);
CREATE TABLE IF NOT EXISTS alert_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_key INTEGER NOT NULL REFERENCES agents(id),
    timestamp_utc TEXT NOT NULL,
    drive_letter TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_drive_usages_report ON drive_usages (agent_key, timestamp_utc);
CREATE INDEX IF NOT EXISTS idx_alert_entries_report ON alert_entries (agent_key, timestamp_utc);
";

#[derive(Debug)]
pub enum StoreError {
    Pool(String),
    Interact(String),
    Query(diesel::result::Error),
    BadRow(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pool(e) => write!(f, "Could not check out a database connection: {e}"),
            Self::Interact(e) => write!(f, "Database worker failed: {e}"),
            Self::Query(e) => write!(f, "Database query failed: {e}"),
            Self::BadRow(detail) => write!(f, "Stored row could not be decoded: {detail}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<diesel::result::Error> for StoreError {
    fn from(value: diesel::result::Error) -> Self {
        Self::Query(value)
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so equality matches
/// are exact and lexicographic order equals chronological order.
fn to_db_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::BadRow(format!("bad timestamp {raw:?}: {e}")))
}

/// Server-side report persistence over a pooled SQLite database.
///
/// Every operation checks out its own connection and runs its own
/// transaction, so concurrent requests never share connection state.
#[derive(Clone)]
pub struct ReportStore {
    pool: Pool,
}

impl ReportStore {
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let manager = Manager::new(database_url, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Creates tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        self.interact(|conn| {
            diesel::connection::SimpleConnection::batch_execute(conn, SCHEMA_SQL)
        })
        .await??;
        Ok(())
    }

    /// Persists one report atomically: agent upsert, then the report's
    /// drive and alert rows, all under a single transaction.
    ///
    /// Resubmitting the same (agent_id, timestamp_utc) pair overwrites the
    /// previous row set instead of appending a duplicate one, so a client
    /// retry after a lost acknowledgement is harmless.
    pub async fn save_report(&self, report: AgentReport) -> Result<(), StoreError> {
        self.interact(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                let seen = to_db_time(Utc::now());
                diesel::insert_into(agents::table)
                    .values((
                        agents::agent_id.eq(&report.agent_id),
                        agents::created_utc.eq(&seen),
                        agents::last_seen_utc.eq(&seen),
                    ))
                    .on_conflict(agents::agent_id)
                    .do_update()
                    .set(agents::last_seen_utc.eq(&seen))
                    .execute(conn)?;

                let agent_key: i32 = agents::table
                    .filter(agents::agent_id.eq(&report.agent_id))
                    .select(agents::id)
                    .first(conn)?;

                let stamp = to_db_time(report.timestamp_utc);

                diesel::delete(
                    drive_usages::table
                        .filter(drive_usages::agent_key.eq(agent_key))
                        .filter(drive_usages::timestamp_utc.eq(&stamp)),
                )
                .execute(conn)?;
                diesel::delete(
                    alert_entries::table
                        .filter(alert_entries::agent_key.eq(agent_key))
                        .filter(alert_entries::timestamp_utc.eq(&stamp)),
                )
                .execute(conn)?;

                let drive_rows: Vec<NewDriveUsageRow> = report
                    .drives
                    .iter()
                    .map(|d| NewDriveUsageRow {
                        agent_key,
                        timestamp_utc: stamp.clone(),
                        drive_letter: d.drive_letter.clone(),
                        total_space_gb: d.total_space_gb,
                        free_space_gb: d.free_space_gb,
                        used_percent: d.used_percent,
                    })
                    .collect();
                if !drive_rows.is_empty() {
                    diesel::insert_into(drive_usages::table)
                        .values(&drive_rows)
                        .execute(conn)?;
                }

                let alert_rows: Vec<NewAlertEntryRow> = report
                    .alerts
                    .iter()
                    .map(|a| NewAlertEntryRow {
                        agent_key,
                        timestamp_utc: stamp.clone(),
                        drive_letter: a.drive_letter.clone(),
                        level: a.level.to_string(),
                        message: a.message.clone(),
                    })
                    .collect();
                if !alert_rows.is_empty() {
                    diesel::insert_into(alert_entries::table)
                        .values(&alert_rows)
                        .execute(conn)?;
                }

                Ok(())
            })
        })
        .await??;
        Ok(())
    }

    /// Reconstructs the `count` most recent reports, newest first. Recency
    /// is per distinct (agent, timestamp) pair across both row tables, so
    /// alert-only reports (all drives unready) are not lost.
    pub async fn recent_reports(&self, count: usize) -> Result<Vec<AgentReport>, StoreError> {
        let reports = self
            .interact(move |conn| -> Result<Vec<AgentReport>, StoreError> {
                let mut pairs: Vec<(i32, String)> = drive_usages::table
                    .select((drive_usages::agent_key, drive_usages::timestamp_utc))
                    .distinct()
                    .load(conn)
                    .map_err(StoreError::Query)?;
                let alert_pairs: Vec<(i32, String)> = alert_entries::table
                    .select((alert_entries::agent_key, alert_entries::timestamp_utc))
                    .distinct()
                    .load(conn)
                    .map_err(StoreError::Query)?;
                pairs.extend(alert_pairs);
                pairs.sort();
                pairs.dedup();

                // Newest first; fixed-width timestamps sort chronologically.
                pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                pairs.truncate(count);

                let mut reports = Vec::with_capacity(pairs.len());
                for (agent_key, stamp) in pairs {
                    let agent_id: String = agents::table
                        .filter(agents::id.eq(agent_key))
                        .select(agents::agent_id)
                        .first(conn)
                        .map_err(StoreError::Query)?;

                    let drives: Vec<DriveUsageRow> = drive_usages::table
                        .filter(drive_usages::agent_key.eq(agent_key))
                        .filter(drive_usages::timestamp_utc.eq(&stamp))
                        .select(DriveUsageRow::as_select())
                        .load(conn)
                        .map_err(StoreError::Query)?;

                    let alerts: Vec<AlertEntryRow> = alert_entries::table
                        .filter(alert_entries::agent_key.eq(agent_key))
                        .filter(alert_entries::timestamp_utc.eq(&stamp))
                        .select(AlertEntryRow::as_select())
                        .load(conn)
                        .map_err(StoreError::Query)?;

                    reports.push(AgentReport {
                        agent_id,
                        timestamp_utc: from_db_time(&stamp)?,
                        drives: drives
                            .into_iter()
                            .map(|row| DriveUsage {
                                drive_letter: row.drive_letter,
                                total_space_gb: row.total_space_gb,
                                free_space_gb: row.free_space_gb,
                                used_percent: row.used_percent,
                            })
                            .collect(),
                        alerts: alerts
                            .into_iter()
                            .map(|row| {
                                let level =
                                    AlertLevel::parse(&row.level).ok_or_else(|| {
                                        StoreError::BadRow(format!(
                                            "unknown alert level {:?}",
                                            row.level
                                        ))
                                    })?;
                                Ok(AlertEntry {
                                    drive_letter: row.drive_letter,
                                    level,
                                    message: row.message,
                                })
                            })
                            .collect::<Result<Vec<_>, StoreError>>()?,
                    });
                }
                Ok(reports)
            })
            .await??;
        Ok(reports)
    }

    /// Known agents keyed by identity, for the dashboard host list.
    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>, StoreError> {
        let rows = self
            .interact(|conn| {
                agents::table
                    .select(AgentRow::as_select())
                    .order(agents::agent_id.asc())
                    .load(conn)
            })
            .await??;

        let mut infos = Vec::with_capacity(rows.len());
        for row in rows {
            infos.push(AgentInfo {
                agent_id: row.agent_id,
                created_utc: from_db_time(&row.created_utc)?,
                last_seen_utc: from_db_time(&row.last_seen_utc)?,
            });
        }
        Ok(infos)
    }

    /// Retention sweep: drops drive and alert rows older than the cutoff.
    /// Returns how many rows were removed.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let stamp = to_db_time(cutoff);
        let removed = self
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let drives = diesel::delete(
                        drive_usages::table.filter(drive_usages::timestamp_utc.lt(&stamp)),
                    )
                    .execute(conn)?;
                    let alerts = diesel::delete(
                        alert_entries::table.filter(alert_entries::timestamp_utc.lt(&stamp)),
                    )
                    .execute(conn)?;
                    Ok(drives + alerts)
                })
            })
            .await??;
        Ok(removed)
    }

    async fn interact<R, F>(&self, work: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&mut diesel::SqliteConnection) -> R + Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(move |conn| {
            // Pragmas are per-connection; concurrent writers back off
            // instead of failing with a locked database.
            let _ = diesel::connection::SimpleConnection::batch_execute(
                conn,
                "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;",
            );
            work(conn)
        })
        .await
        .map_err(|e| StoreError::Interact(e.to_string()))
    }
}

/// Periodic retention sweep for the server process. Runs until the
/// shutdown flag flips; a failed sweep is logged and retried next round.
pub async fn retention_task(
    store: ReportStore,
    max_age: Duration,
    sweep_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(sweep_interval) => {}
            _ = shutdown.wait_for(|stop| *stop) => {
                tracing::info!("Retention task stopping");
                return;
            }
        }

        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        {
            Some(t) => t,
            None => {
                tracing::warn!("Retention max age out of range; skipping sweep");
                continue;
            }
        };
        match store.purge_before(cutoff).await {
            Ok(0) => tracing::debug!("Retention sweep removed nothing"),
            Ok(removed) => tracing::info!("Retention sweep removed {removed} rows"),
            Err(e) => tracing::error!("Retention sweep failed: {e}"),
        }
    }
}
