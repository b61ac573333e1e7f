//! Postgres `AnalyticStore`. Row-level merge semantics are expressed as
//! `ON CONFLICT ... COALESCE(excluded.col, table.col)` upserts, so the
//! non-null-incoming-wins rule holds under concurrent jobs without any
//! global locking.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use forumpulse_common::types::{
    AuthorProfile, Item, ItemEmbedding, ItemKind, ItemMetricEdge, MetricNode, MetricRollup,
    ModerationFlag, ModerationStatus, NodeStatus, OpinionSignal, SentimentLabel, WatchlistEntry,
    Window,
};

use crate::{AnalyticStore, AuthorAggregate, RankLens, RollupRow};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Create the schema if needed.
    pub async fn migrate(&self) -> Result<()> {
        crate::migrate::migrate(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const ITEM_COLUMNS: &str = r#"id, kind, author_hash, "time", title, url, "text", text_clean,
    parent, kids, score, descendants, deleted, dead"#;

fn item_from_row(row: &PgRow) -> Result<Item> {
    let kids: Option<serde_json::Value> = row.try_get("kids")?;
    Ok(Item {
        id: row.try_get("id")?,
        kind: row
            .try_get::<Option<String>, _>("kind")?
            .map(|s| ItemKind::parse(&s)),
        author_hash: row.try_get("author_hash")?,
        time: row.try_get("time")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        text: row.try_get("text")?,
        text_clean: row.try_get("text_clean")?,
        parent: row.try_get("parent")?,
        kids: kids.and_then(|v| serde_json::from_value(v).ok()),
        score: row.try_get("score")?,
        descendants: row.try_get("descendants")?,
        deleted: row.try_get("deleted")?,
        dead: row.try_get("dead")?,
    })
}

const ROLLUP_COLUMNS: &str = r#"node_id, "window", bucket_start, presence,
    sentiment_positive, sentiment_negative, sentiment_neutral, valence_score,
    split_score, consensus_pos, consensus_neg, heat_score, momentum,
    unique_authors, thread_count"#;

fn rollup_from_row(row: &PgRow) -> Result<MetricRollup> {
    Ok(MetricRollup {
        node_id: row.try_get("node_id")?,
        window: Window::parse(row.try_get::<String, _>("window")?.as_str()),
        bucket_start: row.try_get("bucket_start")?,
        presence: row.try_get("presence")?,
        sentiment_positive: row.try_get("sentiment_positive")?,
        sentiment_negative: row.try_get("sentiment_negative")?,
        sentiment_neutral: row.try_get("sentiment_neutral")?,
        valence_score: row.try_get("valence_score")?,
        split_score: row.try_get("split_score")?,
        consensus_pos: row.try_get("consensus_pos")?,
        consensus_neg: row.try_get("consensus_neg")?,
        heat_score: row.try_get("heat_score")?,
        momentum: row.try_get("momentum")?,
        unique_authors: row.try_get("unique_authors")?,
        thread_count: row.try_get("thread_count")?,
    })
}

fn node_from_row(row: &PgRow) -> Result<MetricNode> {
    let centroid: serde_json::Value = row.try_get("centroid")?;
    Ok(MetricNode {
        node_id: row.try_get("node_id")?,
        label: row.try_get("label")?,
        definition: row.try_get("definition")?,
        centroid: serde_json::from_value(centroid).unwrap_or_default(),
        parent_id: row.try_get("parent_id")?,
        status: NodeStatus::parse(row.try_get::<String, _>("status")?.as_str()),
        version: row.try_get("version")?,
    })
}

fn id_text_rows(rows: Vec<PgRow>) -> Result<Vec<(i64, String)>> {
    rows.into_iter()
        .map(|row| Ok((row.try_get(0)?, row.try_get(1)?)))
        .collect()
}

#[async_trait]
impl AnalyticStore for PgStore {
    async fn upsert_item(&self, item: &Item) -> Result<()> {
        let kids = item
            .kids
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO item (id, kind, author_hash, "time", title, url, "text", text_clean,
                              parent, kids, score, descendants, deleted, dead)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                kind        = COALESCE(excluded.kind, item.kind),
                author_hash = COALESCE(excluded.author_hash, item.author_hash),
                "time"      = COALESCE(excluded."time", item."time"),
                title       = COALESCE(excluded.title, item.title),
                url         = COALESCE(excluded.url, item.url),
                "text"      = COALESCE(excluded."text", item."text"),
                text_clean  = COALESCE(excluded.text_clean, item.text_clean),
                parent      = COALESCE(excluded.parent, item.parent),
                kids        = COALESCE(excluded.kids, item.kids),
                score       = COALESCE(excluded.score, item.score),
                descendants = COALESCE(excluded.descendants, item.descendants),
                deleted     = COALESCE(excluded.deleted, item.deleted),
                dead        = COALESCE(excluded.dead, item.dead)
            "#,
        )
        .bind(item.id)
        .bind(item.kind.map(|k| k.as_str()))
        .bind(&item.author_hash)
        .bind(item.time)
        .bind(&item.title)
        .bind(&item.url)
        .bind(&item.text)
        .bind(&item.text_clean)
        .bind(item.parent)
        .bind(kids)
        .bind(item.score)
        .bind(item.descendants)
        .bind(item.deleted)
        .bind(item.dead)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn item(&self, id: i64) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM item WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| item_from_row(&r)).transpose()
    }

    async fn recent_items(&self, limit: usize) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {ITEM_COLUMNS} FROM item ORDER BY "time" DESC NULLS LAST, id DESC LIMIT $1"#
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn items_needing_clean(&self, limit: usize) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query(
            r#"SELECT id, "text" FROM item
               WHERE "text" IS NOT NULL AND text_clean IS NULL
               ORDER BY id LIMIT $1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        id_text_rows(rows)
    }

    async fn set_clean_text(&self, id: i64, text: &str) -> Result<()> {
        sqlx::query("UPDATE item SET text_clean = $1 WHERE id = $2")
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent_sample_texts(&self, limit: usize) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"SELECT TRIM(COALESCE(title, '') || ' ' || COALESCE(text_clean, '')) FROM item
               WHERE text_clean IS NOT NULL OR title IS NOT NULL
               ORDER BY "time" DESC NULLS LAST, id DESC LIMIT $1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| Ok(row.try_get::<String, _>(0)?))
            .collect()
    }

    async fn items_without_flag(&self, limit: usize) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query(
            r#"SELECT h.id, h.text_clean FROM item h
               LEFT JOIN moderation_flag m ON h.id = m.item_id
               WHERE h.text_clean IS NOT NULL AND m.item_id IS NULL
               ORDER BY h.id LIMIT $1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        id_text_rows(rows)
    }

    async fn items_without_signal(&self, limit: usize) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query(
            r#"SELECT h.id, h.text_clean FROM item h
               LEFT JOIN opinion_signal o ON h.id = o.item_id
               WHERE h.text_clean IS NOT NULL AND o.item_id IS NULL
               ORDER BY h.id LIMIT $1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        id_text_rows(rows)
    }

    async fn items_without_embedding(&self, limit: usize) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query(
            r#"SELECT h.id, h.text_clean FROM item h
               LEFT JOIN item_embedding e ON h.id = e.item_id
               WHERE h.text_clean IS NOT NULL AND e.item_id IS NULL
               ORDER BY h.id LIMIT $1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        id_text_rows(rows)
    }

    async fn author_aggregates(&self, limit: usize) -> Result<Vec<AuthorAggregate>> {
        let rows = sqlx::query(
            r#"SELECT author_hash,
                      COALESCE(MIN("time"), 0) AS first_seen,
                      COALESCE(MAX("time"), 0) AS last_seen,
                      SUM(CASE WHEN kind = 'comment' THEN 1 ELSE 0 END) AS comments,
                      SUM(CASE WHEN kind = 'story' THEN 1 ELSE 0 END) AS stories
               FROM item WHERE author_hash IS NOT NULL
               GROUP BY author_hash ORDER BY author_hash LIMIT $1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(AuthorAggregate {
                    author_hash: row.try_get("author_hash")?,
                    first_seen: row.try_get("first_seen")?,
                    last_seen: row.try_get("last_seen")?,
                    comment_count: row.try_get("comments")?,
                    story_count: row.try_get("stories")?,
                })
            })
            .collect()
    }

    async fn upsert_watchlist(&self, entry: &WatchlistEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO watchlist (story_id, priority_score, ttl_expires, last_fetched)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (story_id) DO UPDATE SET
                priority_score = excluded.priority_score,
                ttl_expires    = excluded.ttl_expires,
                last_fetched   = COALESCE(excluded.last_fetched, watchlist.last_fetched)
            "#,
        )
        .bind(entry.story_id)
        .bind(entry.priority_score)
        .bind(entry.ttl_expires)
        .bind(entry.last_fetched)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn active_watchlist(&self, now: i64, limit: usize) -> Result<Vec<WatchlistEntry>> {
        let rows = sqlx::query(
            r#"SELECT story_id, priority_score, ttl_expires, last_fetched FROM watchlist
               WHERE ttl_expires > $1
               ORDER BY priority_score DESC, story_id LIMIT $2"#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(WatchlistEntry {
                    story_id: row.try_get("story_id")?,
                    priority_score: row.try_get("priority_score")?,
                    ttl_expires: row.try_get("ttl_expires")?,
                    last_fetched: row.try_get("last_fetched")?,
                })
            })
            .collect()
    }

    async fn mark_fetched(&self, story_id: i64, now: i64) -> Result<()> {
        sqlx::query("UPDATE watchlist SET last_fetched = $1 WHERE story_id = $2")
            .bind(now)
            .bind(story_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_expired(&self, now: i64) -> Result<usize> {
        let result = sqlx::query("DELETE FROM watchlist WHERE ttl_expires <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn upsert_author_profile(&self, profile: &AuthorProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO author_profile (author_hash, first_seen, last_seen,
                                        comment_count, story_count, bot_likelihood)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (author_hash) DO UPDATE SET
                first_seen     = excluded.first_seen,
                last_seen      = excluded.last_seen,
                comment_count  = excluded.comment_count,
                story_count    = excluded.story_count,
                bot_likelihood = excluded.bot_likelihood
            "#,
        )
        .bind(&profile.author_hash)
        .bind(profile.first_seen)
        .bind(profile.last_seen)
        .bind(profile.comment_count)
        .bind(profile.story_count)
        .bind(profile.bot_likelihood)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn author_profile(&self, author_hash: &str) -> Result<Option<AuthorProfile>> {
        let row = sqlx::query(
            r#"SELECT author_hash, first_seen, last_seen, comment_count, story_count,
                      bot_likelihood
               FROM author_profile WHERE author_hash = $1"#,
        )
        .bind(author_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(AuthorProfile {
                author_hash: row.try_get("author_hash")?,
                first_seen: row.try_get("first_seen")?,
                last_seen: row.try_get("last_seen")?,
                comment_count: row.try_get("comment_count")?,
                story_count: row.try_get("story_count")?,
                bot_likelihood: row.try_get("bot_likelihood")?,
            })
        })
        .transpose()
    }

    async fn upsert_flag(&self, flag: &ModerationFlag) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO moderation_flag (item_id, status, reason, flagged_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (item_id) DO UPDATE SET
                status     = excluded.status,
                reason     = excluded.reason,
                flagged_at = excluded.flagged_at
            "#,
        )
        .bind(flag.item_id)
        .bind(flag.status.as_str())
        .bind(&flag.reason)
        .bind(flag.flagged_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn flag(&self, item_id: i64) -> Result<Option<ModerationFlag>> {
        let row = sqlx::query(
            "SELECT item_id, status, reason, flagged_at FROM moderation_flag WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(ModerationFlag {
                item_id: row.try_get("item_id")?,
                status: ModerationStatus::parse(row.try_get::<String, _>("status")?.as_str()),
                reason: row.try_get("reason")?,
                flagged_at: row.try_get("flagged_at")?,
            })
        })
        .transpose()
    }

    async fn upsert_signal(&self, signal: &OpinionSignal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO opinion_signal (item_id, valence, intensity, confidence, label,
                                        model_version)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (item_id) DO UPDATE SET
                valence       = excluded.valence,
                intensity     = excluded.intensity,
                confidence    = excluded.confidence,
                label         = excluded.label,
                model_version = excluded.model_version
            "#,
        )
        .bind(signal.item_id)
        .bind(signal.valence)
        .bind(signal.intensity)
        .bind(signal.confidence)
        .bind(signal.label.as_str())
        .bind(&signal.model_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn signal(&self, item_id: i64) -> Result<Option<OpinionSignal>> {
        let row = sqlx::query(
            r#"SELECT item_id, valence, intensity, confidence, label, model_version
               FROM opinion_signal WHERE item_id = $1"#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(OpinionSignal {
                item_id: row.try_get("item_id")?,
                valence: row.try_get("valence")?,
                intensity: row.try_get("intensity")?,
                confidence: row.try_get("confidence")?,
                label: SentimentLabel::parse(row.try_get::<String, _>("label")?.as_str()),
                model_version: row.try_get("model_version")?,
            })
        })
        .transpose()
    }

    async fn upsert_embedding(&self, embedding: &ItemEmbedding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO item_embedding (item_id, vector, model_version)
            VALUES ($1, $2, $3)
            ON CONFLICT (item_id) DO UPDATE SET
                vector        = excluded.vector,
                model_version = excluded.model_version
            "#,
        )
        .bind(embedding.item_id)
        .bind(serde_json::to_value(&embedding.vector)?)
        .bind(&embedding.model_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn embedding(&self, item_id: i64) -> Result<Option<ItemEmbedding>> {
        let row = sqlx::query(
            "SELECT item_id, vector, model_version FROM item_embedding WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            let vector: serde_json::Value = row.try_get("vector")?;
            Ok(ItemEmbedding {
                item_id: row.try_get("item_id")?,
                vector: serde_json::from_value(vector)?,
                model_version: row.try_get("model_version")?,
            })
        })
        .transpose()
    }

    async fn upsert_node(&self, node: &MetricNode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_node (node_id, label, definition, centroid, parent_id, status,
                                     version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (node_id) DO UPDATE SET
                label      = excluded.label,
                definition = excluded.definition,
                centroid   = excluded.centroid,
                parent_id  = COALESCE(excluded.parent_id, metric_node.parent_id),
                status     = excluded.status,
                version    = excluded.version
            "#,
        )
        .bind(&node.node_id)
        .bind(&node.label)
        .bind(&node.definition)
        .bind(serde_json::to_value(&node.centroid)?)
        .bind(&node.parent_id)
        .bind(node.status.as_str())
        .bind(node.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn node(&self, node_id: &str) -> Result<Option<MetricNode>> {
        let row = sqlx::query(
            r#"SELECT node_id, label, definition, centroid, parent_id, status, version
               FROM metric_node WHERE node_id = $1"#,
        )
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| node_from_row(&r)).transpose()
    }

    async fn active_nodes(&self) -> Result<Vec<MetricNode>> {
        let rows = sqlx::query(
            r#"SELECT node_id, label, definition, centroid, parent_id, status, version
               FROM metric_node WHERE status = 'active' ORDER BY node_id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(node_from_row).collect()
    }

    async fn upsert_edge(&self, edge: &ItemMetricEdge) -> Result<()> {
        // seq is assigned on first insert only, preserving arrival order
        // across weight replacements.
        sqlx::query(
            r#"
            INSERT INTO item_metric_edge (item_id, node_id, weight, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (item_id, node_id) DO UPDATE SET
                weight     = excluded.weight,
                created_at = excluded.created_at
            "#,
        )
        .bind(edge.item_id)
        .bind(&edge.node_id)
        .bind(edge.weight)
        .bind(edge.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn edges_for_item(&self, item_id: i64) -> Result<Vec<ItemMetricEdge>> {
        let rows = sqlx::query(
            r#"SELECT item_id, node_id, weight, created_at FROM item_metric_edge
               WHERE item_id = $1 ORDER BY seq"#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(ItemMetricEdge {
                    item_id: row.try_get("item_id")?,
                    node_id: row.try_get("node_id")?,
                    weight: row.try_get("weight")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn rollup_rows(&self, node_id: &str, since: i64) -> Result<Vec<RollupRow>> {
        let rows = sqlx::query(
            r#"SELECT h.id, h.author_hash, h.kind,
                      o.valence, o.intensity, o.confidence, o.label,
                      e.weight
               FROM item_metric_edge e
               JOIN item h ON e.item_id = h.id
               LEFT JOIN opinion_signal o ON h.id = o.item_id
               WHERE e.node_id = $1 AND h."time" >= $2
               ORDER BY e.seq"#,
        )
        .bind(node_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(RollupRow {
                    item_id: row.try_get("id")?,
                    author_hash: row.try_get("author_hash")?,
                    is_story: row.try_get::<Option<String>, _>("kind")?.as_deref()
                        == Some("story"),
                    valence: row.try_get("valence")?,
                    intensity: row.try_get("intensity")?,
                    confidence: row.try_get("confidence")?,
                    label: row
                        .try_get::<Option<String>, _>("label")?
                        .map(|s| SentimentLabel::parse(&s)),
                    edge_weight: row.try_get("weight")?,
                })
            })
            .collect()
    }

    async fn upsert_rollup(&self, rollup: &MetricRollup) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_rollup (node_id, "window", bucket_start, presence,
                sentiment_positive, sentiment_negative, sentiment_neutral, valence_score,
                split_score, consensus_pos, consensus_neg, heat_score, momentum,
                unique_authors, thread_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (node_id, "window", bucket_start) DO UPDATE SET
                presence           = excluded.presence,
                sentiment_positive = excluded.sentiment_positive,
                sentiment_negative = excluded.sentiment_negative,
                sentiment_neutral  = excluded.sentiment_neutral,
                valence_score      = excluded.valence_score,
                split_score        = excluded.split_score,
                consensus_pos      = excluded.consensus_pos,
                consensus_neg      = excluded.consensus_neg,
                heat_score         = excluded.heat_score,
                momentum           = excluded.momentum,
                unique_authors     = excluded.unique_authors,
                thread_count       = excluded.thread_count
            "#,
        )
        .bind(&rollup.node_id)
        .bind(rollup.window.as_str())
        .bind(rollup.bucket_start)
        .bind(rollup.presence)
        .bind(rollup.sentiment_positive)
        .bind(rollup.sentiment_negative)
        .bind(rollup.sentiment_neutral)
        .bind(rollup.valence_score)
        .bind(rollup.split_score)
        .bind(rollup.consensus_pos)
        .bind(rollup.consensus_neg)
        .bind(rollup.heat_score)
        .bind(rollup.momentum)
        .bind(rollup.unique_authors)
        .bind(rollup.thread_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_rollup(&self, node_id: &str, window: Window) -> Result<Option<MetricRollup>> {
        let row = sqlx::query(&format!(
            r#"SELECT {ROLLUP_COLUMNS} FROM metric_rollup
               WHERE node_id = $1 AND "window" = $2
               ORDER BY bucket_start DESC LIMIT 1"#
        ))
        .bind(node_id)
        .bind(window.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| rollup_from_row(&r)).transpose()
    }

    async fn rollup_series(
        &self,
        node_id: &str,
        window: Window,
        start: i64,
        end: i64,
    ) -> Result<Vec<MetricRollup>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {ROLLUP_COLUMNS} FROM metric_rollup
               WHERE node_id = $1 AND "window" = $2
                 AND bucket_start >= $3 AND bucket_start <= $4
               ORDER BY bucket_start"#
        ))
        .bind(node_id)
        .bind(window.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rollup_from_row).collect()
    }

    async fn top_rollups_by(
        &self,
        window: Window,
        lens: RankLens,
        limit: usize,
    ) -> Result<Vec<MetricRollup>> {
        // lens.column() is a fixed enum mapping, never user input.
        let rows = sqlx::query(&format!(
            r#"SELECT {ROLLUP_COLUMNS} FROM metric_rollup r1
               WHERE "window" = $1 AND bucket_start = (
                   SELECT MAX(r2.bucket_start) FROM metric_rollup r2
                   WHERE r2.node_id = r1.node_id AND r2."window" = r1."window"
               )
               ORDER BY {} DESC LIMIT $2"#,
            lens.column()
        ))
        .bind(window.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rollup_from_row).collect()
    }

    async fn backfill_value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query(r#"SELECT value FROM backfill_state WHERE "key" = $1"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get(0)).transpose()?)
    }

    async fn set_backfill_value(&self, key: &str, value: &str, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO backfill_state ("key", value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT ("key") DO UPDATE SET
                value      = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
