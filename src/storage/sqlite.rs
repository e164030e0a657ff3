//! SQLite event store
//!
//! - Events are partitioned by UTC day (`partition_day`); the registry table
//!   `event_partitions` lists every known partition.
//! - Timestamps are fixed-width RFC 3339 strings so lexical order is time order.
//! - Retention drops whole partitions, oldest first.

use super::{EventStore, ResultSink, StoreError, SweepStats};
use crate::event::Event;
use crate::export::RowEncoder;
use crate::query::{QueryKind, SearchQuery};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS audit_log_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_time TEXT NOT NULL,
        partition_day TEXT NOT NULL,
        log TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS request_info (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        time TEXT NOT NULL,
        partition_day TEXT NOT NULL,
        api_name TEXT NOT NULL,
        bucket TEXT,
        object TEXT,
        time_to_response_ns INTEGER,
        remote_host TEXT,
        request_id TEXT,
        user_agent TEXT,
        response_status TEXT,
        response_status_code INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS event_partitions (
        day TEXT PRIMARY KEY,
        created_at TEXT NOT NULL
    )",
];

const INDICES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS audit_log_events_event_time ON audit_log_events (event_time)",
    "CREATE INDEX IF NOT EXISTS audit_log_events_partition_day ON audit_log_events (partition_day)",
    "CREATE INDEX IF NOT EXISTS request_info_time ON request_info (time)",
    "CREATE INDEX IF NOT EXISTS request_info_partition_day ON request_info (partition_day)",
    "CREATE INDEX IF NOT EXISTS request_info_request_id ON request_info (request_id)",
    "CREATE INDEX IF NOT EXISTS request_info_api_name ON request_info (api_name)",
];

pub const RAW_COLUMNS: &[&str] = &["event_time", "log"];

pub const REQUEST_INFO_COLUMNS: &[&str] = &[
    "time",
    "api_name",
    "bucket",
    "object",
    "time_to_response_ns",
    "remote_host",
    "request_id",
    "user_agent",
    "response_status",
    "response_status_code",
    "request_content_length",
    "response_content_length",
];

/// Partitions registered ahead of the current day
const PARTITIONS_AHEAD: i64 = 2;

const BYTES_PER_GB: u64 = 1 << 30;

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Connect to the database at `conn_str` (e.g. `sqlite:///var/lib/logsearch/events.db`),
    /// creating the file if needed.
    pub async fn connect(conn_str: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(conn_str)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .auto_vacuum(SqliteAutoVacuum::Incremental)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Bytes held by live pages (free pages excluded)
    pub async fn used_bytes(&self) -> Result<u64, StoreError> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let freelist_count: i64 = sqlx::query_scalar("PRAGMA freelist_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        Ok(((page_count - freelist_count).max(0) * page_size) as u64)
    }

    /// Drop partitions, oldest first, until used bytes fit in `capacity_bytes`.
    /// The current day's partition is never dropped.
    pub async fn sweep_to_capacity_bytes(&self, capacity_bytes: u64) -> Result<SweepStats, StoreError> {
        let today = partition_day(&Utc::now());
        let mut stats = SweepStats {
            used_bytes_before: self.used_bytes().await?,
            ..Default::default()
        };
        let mut used = stats.used_bytes_before;

        while used > capacity_bytes {
            let oldest: Option<String> = sqlx::query_scalar(
                "SELECT day FROM event_partitions WHERE day < ? ORDER BY day ASC LIMIT 1",
            )
            .bind(&today)
            .fetch_optional(&self.pool)
            .await?;

            let Some(day) = oldest else {
                tracing::warn!(
                    used_bytes = used,
                    capacity_bytes,
                    "Storage above capacity but only the current partition remains"
                );
                break;
            };

            stats.rows_deleted += self.drop_partition(&day).await?;
            tracing::info!(partition = %day, "Dropped partition to free space");
            stats.partitions_dropped.push(day);
            used = self.used_bytes().await?;
        }

        if !stats.partitions_dropped.is_empty() {
            sqlx::query("PRAGMA incremental_vacuum").execute(&self.pool).await?;
        }
        stats.used_bytes_after = used;

        Ok(stats)
    }

    async fn drop_partition(&self, day: &str) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let events = sqlx::query("DELETE FROM audit_log_events WHERE partition_day = ?")
            .bind(day)
            .execute(&mut *tx)
            .await?;
        let infos = sqlx::query("DELETE FROM request_info WHERE partition_day = ?")
            .bind(day)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM event_partitions WHERE day = ?")
            .bind(day)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(events.rows_affected() + infos.rows_affected())
    }

    /// Register partitions for `now`'s day and the days ahead of it.
    pub async fn register_partitions_from(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let created_at = format_time(&Utc::now());
        let mut created = 0;
        for offset in 0..=PARTITIONS_AHEAD {
            let day = partition_day(&(now + ChronoDuration::days(offset)));
            let result = sqlx::query("INSERT OR IGNORE INTO event_partitions (day, created_at) VALUES (?, ?)")
                .bind(&day)
                .bind(&created_at)
                .execute(&self.pool)
                .await?;
            created += result.rows_affected();
        }
        Ok(created)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn initialize_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    async fn create_indices(&self) -> Result<(), StoreError> {
        let mut last_error = None;
        for statement in INDICES {
            if let Err(e) = sqlx::query(statement).execute(&self.pool).await {
                tracing::warn!(error = %e, statement, "Failed to create index");
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let event_time = format_time(&event.time);
        let day = partition_day(&event.time);

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO audit_log_events (event_time, partition_day, log) VALUES (?, ?, ?)")
            .bind(&event_time)
            .bind(&day)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO request_info (
                time, partition_day, api_name, bucket, object, time_to_response_ns,
                remote_host, request_id, user_agent, response_status, response_status_code,
                request_content_length, response_content_length
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event_time)
        .bind(&day)
        .bind(&event.api.name)
        .bind(&event.api.bucket)
        .bind(&event.api.object)
        .bind(event.time_to_response_ns())
        .bind(&event.remote_host)
        .bind(&event.request_id)
        .bind(&event.user_agent)
        .bind(&event.api.status)
        .bind(event.api.status_code)
        .bind(event.api.rx)
        .bind(event.api.tx)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO event_partitions (day, created_at) VALUES (?, ?)")
            .bind(&day)
            .bind(format_time(&Utc::now()))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &SearchQuery, sink: &mut ResultSink) -> Result<(), StoreError> {
        let (sql, columns) = search_sql(query);
        let time_start = query.time_start.as_ref().map(format_time);
        let time_end = query.time_end.as_ref().map(format_time);
        let mut encoder = RowEncoder::new(query.export_format, columns);

        let mut rows = sqlx::query(&sql)
            .bind(&time_start)
            .bind(&time_start)
            .bind(&time_end)
            .bind(&time_end)
            .bind(i64::from(query.page_size))
            .bind(query.offset() as i64)
            .fetch(&self.pool);

        while let Some(row) = rows.try_next().await? {
            let values = match query.kind {
                QueryKind::Raw => raw_row_values(&row)?,
                QueryKind::RequestInfo => request_info_values(&row)?,
            };
            sink.write(encoder.encode_row(values)?).await?;
        }

        sink.write(encoder.finish()).await?;
        tracing::debug!(rows = encoder.rows_written(), query = %query, "Search completed");
        Ok(())
    }

    async fn sweep_retention(&self, capacity_gb: u64) -> Result<SweepStats, StoreError> {
        self.sweep_to_capacity_bytes(capacity_gb.saturating_mul(BYTES_PER_GB))
            .await
    }

    async fn maintain_partitions(&self) -> Result<u64, StoreError> {
        self.register_partitions_from(Utc::now()).await
    }
}

fn search_sql(query: &SearchQuery) -> (String, &'static [&'static str]) {
    let (table, time_column, columns) = match query.kind {
        QueryKind::Raw => ("audit_log_events", "event_time", RAW_COLUMNS),
        QueryKind::RequestInfo => ("request_info", "time", REQUEST_INFO_COLUMNS),
    };
    let order = query.sort.sql_keyword();

    let sql = format!(
        "SELECT {cols} FROM {table} \
         WHERE (? IS NULL OR {time_column} >= ?) AND (? IS NULL OR {time_column} < ?) \
         ORDER BY {time_column} {order}, id {order} \
         LIMIT ? OFFSET ?",
        cols = columns.join(", "),
    );
    (sql, columns)
}

fn raw_row_values(row: &SqliteRow) -> Result<Vec<Value>, StoreError> {
    let event_time: String = row.try_get("event_time")?;
    let log: String = row.try_get("log")?;
    let log = serde_json::from_str(&log).unwrap_or(Value::String(log));
    Ok(vec![Value::String(event_time), log])
}

fn request_info_values(row: &SqliteRow) -> Result<Vec<Value>, StoreError> {
    REQUEST_INFO_COLUMNS
        .iter()
        .map(|&column| {
            let value = if is_integer_column(column) {
                row.try_get::<Option<i64>, _>(column)?.map(Value::from)
            } else {
                row.try_get::<Option<String>, _>(column)?.map(Value::from)
            };
            Ok(value.unwrap_or(Value::Null))
        })
        .collect()
}

fn is_integer_column(column: &str) -> bool {
    matches!(
        column,
        "time_to_response_ns"
            | "response_status_code"
            | "request_content_length"
            | "response_content_length"
    )
}

/// Fixed-width UTC timestamp with nanosecond precision
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

pub fn partition_day(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d").to_string()
}
