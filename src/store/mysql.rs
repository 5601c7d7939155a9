//! MySQL-backed failure source for the Postal message database

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};

use super::{FailureQuery, FailureRecord, FailureSource, StoreError};
use crate::config::DatabaseConfig;

/// Failed outgoing deliveries after a bound delivery id.
///
/// Columns are cast so their wire types do not depend on the Postal schema
/// revision: ids to unsigned integers, the SMTP code to text and the decimal
/// timestamp to whole seconds.
pub const FAILURE_QUERY_SQL: &str = r#"
    SELECT
        CAST(d.id AS UNSIGNED) AS id,
        CAST(d.message_id AS UNSIGNED) AS message_id,
        d.status AS status,
        CAST(d.code AS CHAR) AS code,
        d.output AS output,
        d.details AS details,
        CAST(FLOOR(COALESCE(d.timestamp, 0)) AS SIGNED) AS timestamp,
        m.rcpt_to AS rcpt_to,
        m.mail_from AS mail_from,
        m.subject AS subject,
        m.scope AS scope
    FROM deliveries d
    JOIN messages m ON d.message_id = m.id
    WHERE d.id > ?
    AND d.status NOT IN ('Sent', 'SoftFail')
    AND m.scope = 'outgoing'
    ORDER BY d.id ASC
"#;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, sqlx::FromRow)]
struct DeliveryRow {
    id: u64,
    message_id: u64,
    status: String,
    code: Option<String>,
    output: Option<String>,
    details: Option<String>,
    timestamp: i64,
    rcpt_to: Option<String>,
    mail_from: Option<String>,
    subject: Option<String>,
    scope: String,
}

impl TryFrom<DeliveryRow> for FailureRecord {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let timestamp =
            DateTime::<Utc>::from_timestamp(row.timestamp, 0).ok_or_else(|| {
                StoreError::InvalidRow {
                    id: row.id,
                    reason: format!("timestamp {} out of range", row.timestamp),
                }
            })?;

        Ok(FailureRecord {
            id: row.id,
            message_id: row.message_id,
            status: row.status.into(),
            code: row.code,
            output: row.output,
            details: row.details,
            timestamp,
            mail_from: row.mail_from.unwrap_or_default(),
            rcpt_to: row.rcpt_to.unwrap_or_default(),
            subject: row.subject,
            scope: row.scope,
        })
    }
}

/// Failure source reading a Postal server's message database
#[derive(Debug, Clone)]
pub struct MySqlFailureSource {
    pool: MySqlPool,
}

impl MySqlFailureSource {
    /// Connect to the database. The connection is opened eagerly so that
    /// connectivity problems surface at startup.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password)
            .charset("utf8mb4");

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(StoreError::Connect)?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "Connected to database successfully"
        );

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl FailureSource for MySqlFailureSource {
    async fn fetch(&self, query: FailureQuery) -> Result<Vec<FailureRecord>, StoreError> {
        let rows = sqlx::query_as::<_, DeliveryRow>(FAILURE_QUERY_SQL)
            .bind(query.after)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Query)?;

        rows.into_iter().map(FailureRecord::try_from).collect()
    }
}
