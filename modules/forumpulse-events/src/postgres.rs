//! Postgres `EventLog`. One BIGSERIAL message table; per-group cursor and
//! pending-delivery tables carry the consumer-group state.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::{Envelope, EventLog};

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS event_message (
        id           BIGSERIAL PRIMARY KEY,
        channel      TEXT NOT NULL,
        payload      JSONB NOT NULL,
        published_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_event_channel ON event_message (channel, id)"#,
    r#"
    CREATE TABLE IF NOT EXISTS event_group (
        channel    TEXT NOT NULL,
        group_name TEXT NOT NULL,
        cursor_id  BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (channel, group_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_pending (
        channel      TEXT NOT NULL,
        group_name   TEXT NOT NULL,
        message_id   BIGINT NOT NULL,
        consumer     TEXT NOT NULL,
        delivered_at BIGINT NOT NULL,
        PRIMARY KEY (channel, group_name, message_id)
    )
    "#,
];

#[derive(Clone)]
pub struct PgEventLog {
    pool: PgPool,
}

fn envelope_from_row(row: &PgRow) -> Result<Envelope> {
    Ok(Envelope {
        id: row.try_get("id")?,
        channel: row.try_get("channel")?,
        payload: row.try_get("payload")?,
        published_at: row.try_get("published_at")?,
    })
}

impl PgEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the log tables if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("event log schema ready");
        Ok(())
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO event_message (channel, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(channel)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn ensure_group(&self, channel: &str, group: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO event_group (channel, group_name) VALUES ($1, $2)
               ON CONFLICT (channel, group_name) DO NOTHING"#,
        )
        .bind(channel)
        .bind(group)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_group(
        &self,
        channel: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<Envelope>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp();

        // Lock the group row so concurrent consumers in the same group never
        // receive the same fresh message twice.
        let cursor: i64 = sqlx::query_as::<_, (i64,)>(
            r#"SELECT cursor_id FROM event_group
               WHERE channel = $1 AND group_name = $2 FOR UPDATE"#,
        )
        .bind(channel)
        .bind(group)
        .fetch_one(&mut *tx)
        .await?
        .0;

        let fresh_rows = sqlx::query(
            r#"SELECT id, channel, payload, published_at FROM event_message
               WHERE channel = $1 AND id > $2 ORDER BY id LIMIT $3"#,
        )
        .bind(channel)
        .bind(cursor)
        .bind(count as i64)
        .fetch_all(&mut *tx)
        .await?;
        let fresh: Vec<Envelope> = fresh_rows
            .iter()
            .map(envelope_from_row)
            .collect::<Result<_>>()?;

        let remaining = count.saturating_sub(fresh.len());
        let redelivered: Vec<Envelope> = if remaining > 0 {
            let rows = sqlx::query(
                r#"SELECT m.id, m.channel, m.payload, m.published_at
                   FROM event_pending p
                   JOIN event_message m ON p.message_id = m.id
                   WHERE p.channel = $1 AND p.group_name = $2 AND p.message_id <= $3
                   ORDER BY p.message_id LIMIT $4"#,
            )
            .bind(channel)
            .bind(group)
            .bind(cursor)
            .bind(remaining as i64)
            .fetch_all(&mut *tx)
            .await?;
            rows.iter().map(envelope_from_row).collect::<Result<_>>()?
        } else {
            Vec::new()
        };

        for m in fresh.iter().chain(redelivered.iter()) {
            sqlx::query(
                r#"INSERT INTO event_pending (channel, group_name, message_id, consumer,
                                              delivered_at)
                   VALUES ($1, $2, $3, $4, $5)
                   ON CONFLICT (channel, group_name, message_id) DO UPDATE SET
                       consumer     = excluded.consumer,
                       delivered_at = excluded.delivered_at"#,
            )
            .bind(channel)
            .bind(group)
            .bind(m.id)
            .bind(consumer)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(last) = fresh.last() {
            sqlx::query(
                r#"UPDATE event_group SET cursor_id = $1
                   WHERE channel = $2 AND group_name = $3"#,
            )
            .bind(last.id)
            .bind(channel)
            .bind(group)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let mut out = fresh;
        out.extend(redelivered);
        Ok(out)
    }

    async fn ack(&self, channel: &str, group: &str, id: i64) -> Result<()> {
        sqlx::query(
            r#"DELETE FROM event_pending
               WHERE channel = $1 AND group_name = $2 AND message_id = $3"#,
        )
        .bind(channel)
        .bind(group)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
