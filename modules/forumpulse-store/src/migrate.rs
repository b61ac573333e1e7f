//! Schema bootstrap for the Postgres backend. Idempotent — every statement
//! is `IF NOT EXISTS`.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS item (
        id            BIGINT PRIMARY KEY,
        kind          TEXT,
        author_hash   TEXT,
        "time"        BIGINT,
        title         TEXT,
        url           TEXT,
        "text"        TEXT,
        text_clean    TEXT,
        parent        BIGINT,
        kids          JSONB,
        score         BIGINT,
        descendants   BIGINT,
        deleted       BOOLEAN,
        dead          BOOLEAN
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_item_time ON item ("time" DESC)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_item_author ON item (author_hash) WHERE author_hash IS NOT NULL"#,
    r#"
    CREATE TABLE IF NOT EXISTS watchlist (
        story_id       BIGINT PRIMARY KEY,
        priority_score DOUBLE PRECISION NOT NULL,
        ttl_expires    BIGINT NOT NULL,
        last_fetched   BIGINT
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_watchlist_active ON watchlist (ttl_expires, priority_score DESC)"#,
    r#"
    CREATE TABLE IF NOT EXISTS author_profile (
        author_hash    TEXT PRIMARY KEY,
        first_seen     BIGINT NOT NULL,
        last_seen      BIGINT NOT NULL,
        comment_count  BIGINT NOT NULL,
        story_count    BIGINT NOT NULL,
        bot_likelihood DOUBLE PRECISION NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS moderation_flag (
        item_id    BIGINT PRIMARY KEY,
        status     TEXT NOT NULL,
        reason     TEXT,
        flagged_at BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS opinion_signal (
        item_id       BIGINT PRIMARY KEY,
        valence       DOUBLE PRECISION NOT NULL,
        intensity     DOUBLE PRECISION NOT NULL,
        confidence    DOUBLE PRECISION NOT NULL,
        label         TEXT NOT NULL,
        model_version TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS item_embedding (
        item_id       BIGINT PRIMARY KEY,
        vector        JSONB NOT NULL,
        model_version TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metric_node (
        node_id    TEXT PRIMARY KEY,
        label      TEXT NOT NULL,
        definition TEXT NOT NULL,
        centroid   JSONB NOT NULL,
        parent_id  TEXT,
        status     TEXT NOT NULL,
        version    INT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS item_metric_edge (
        item_id    BIGINT NOT NULL,
        node_id    TEXT NOT NULL,
        weight     DOUBLE PRECISION NOT NULL,
        created_at BIGINT NOT NULL,
        seq        BIGSERIAL,
        PRIMARY KEY (item_id, node_id)
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_edge_node ON item_metric_edge (node_id, seq)"#,
    r#"
    CREATE TABLE IF NOT EXISTS metric_rollup (
        node_id            TEXT NOT NULL,
        "window"           TEXT NOT NULL,
        bucket_start       BIGINT NOT NULL,
        presence           DOUBLE PRECISION NOT NULL,
        sentiment_positive DOUBLE PRECISION NOT NULL,
        sentiment_negative DOUBLE PRECISION NOT NULL,
        sentiment_neutral  DOUBLE PRECISION NOT NULL,
        valence_score      DOUBLE PRECISION NOT NULL,
        split_score        DOUBLE PRECISION NOT NULL,
        consensus_pos      DOUBLE PRECISION NOT NULL,
        consensus_neg      DOUBLE PRECISION NOT NULL,
        heat_score         DOUBLE PRECISION NOT NULL,
        momentum           DOUBLE PRECISION NOT NULL,
        unique_authors     BIGINT NOT NULL,
        thread_count       BIGINT NOT NULL,
        PRIMARY KEY (node_id, "window", bucket_start)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS backfill_state (
        "key"      TEXT PRIMARY KEY,
        value      TEXT NOT NULL,
        updated_at BIGINT NOT NULL
    )
    "#,
];

/// Create all analytic tables if they do not exist.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("analytic store schema ready");
    Ok(())
}
