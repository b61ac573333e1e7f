//! Append-only per-channel event log with consumer groups.
//!
//! Stores opaque JSON payloads. Zero knowledge of stories, topics, or any
//! other domain concept — producers and consumers agree on payload shape
//! out of band.
//!
//! Delivery is at-least-once: a message read by a group stays pending until
//! it is acked, and an unacked message is handed out again on a later read.

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventLog;
pub use postgres::PgEventLog;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stories discovered or refreshed by the scout / backfill jobs.
pub const CHANNEL_DISCOVERY: &str = "discovery";
/// Threads harvested by the harvester.
pub const CHANNEL_CONTENT: &str = "content";

/// A message as stored in the log. Ids are unique and strictly increasing
/// across all channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: i64,
    pub channel: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

/// The log contract. A group created with `ensure_group` starts at the
/// beginning of the channel and sees every message exactly until acked;
/// groups on the same channel consume independently.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a message. Returns its id.
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<i64>;

    /// Create a consumer group on a channel. Idempotent — calling it again
    /// never resets the group's position.
    async fn ensure_group(&self, channel: &str, group: &str) -> Result<()>;

    /// Hand up to `count` messages to `consumer`: messages the group has not
    /// seen yet first, then previously delivered but unacked ones. Every
    /// returned message becomes (or stays) pending for the group.
    async fn read_group(
        &self,
        channel: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<Envelope>>;

    /// Acknowledge a delivered message. Acking an id that is not pending is
    /// a no-op.
    async fn ack(&self, channel: &str, group: &str, id: i64) -> Result<()>;
}
