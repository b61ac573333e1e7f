//! In-memory `EventLog` with the same delivery semantics as the Postgres
//! backend. Backs the worker tests — no network, no database, no Docker.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::{Envelope, EventLog};

#[derive(Debug, Clone)]
struct Pending {
    consumer: String,
    delivered_at: i64,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Highest message id this group has had delivered at least once.
    cursor: i64,
    /// Delivered but unacked, keyed by message id.
    pending: BTreeMap<i64, Pending>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    messages: Vec<Envelope>,
    groups: HashMap<(String, String), GroupState>,
}

#[derive(Default)]
pub struct MemoryEventLog {
    inner: Mutex<Inner>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages a group has read but not acked, oldest first. Test helper.
    pub fn pending_ids(&self, channel: &str, group: &str) -> Vec<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .groups
            .get(&(channel.to_string(), group.to_string()))
            .map(|g| g.pending.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Who a pending message was last handed to, and when. Test helper.
    pub fn delivery(&self, channel: &str, group: &str, id: i64) -> Option<(String, i64)> {
        let inner = self.inner.lock().unwrap();
        inner
            .groups
            .get(&(channel.to_string(), group.to_string()))
            .and_then(|g| g.pending.get(&id))
            .map(|p| (p.consumer.clone(), p.delivered_at))
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.messages.push(Envelope {
            id,
            channel: channel.to_string(),
            payload,
            published_at: Utc::now(),
        });
        Ok(id)
    }

    async fn ensure_group(&self, channel: &str, group: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .groups
            .entry((channel.to_string(), group.to_string()))
            .or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        channel: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<Envelope>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now().timestamp();

        // Undelivered first.
        let key = (channel.to_string(), group.to_string());
        let cursor = inner.groups.entry(key.clone()).or_default().cursor;
        let fresh: Vec<Envelope> = inner
            .messages
            .iter()
            .filter(|m| m.channel == channel && m.id > cursor)
            .take(count)
            .cloned()
            .collect();

        // Then prior pending, oldest first, up to the remaining capacity.
        let state = inner.groups.get_mut(&key).unwrap();
        let redeliver: Vec<i64> = state
            .pending
            .keys()
            .copied()
            .take(count.saturating_sub(fresh.len()))
            .collect();

        for m in &fresh {
            state.cursor = m.id;
            state.pending.insert(
                m.id,
                Pending {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                },
            );
        }
        for id in &redeliver {
            state.pending.insert(
                *id,
                Pending {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                },
            );
        }

        let mut out = fresh;
        for id in redeliver {
            if let Some(m) = inner.messages.iter().find(|m| m.id == id) {
                out.push(m.clone());
            }
        }
        Ok(out)
    }

    async fn ack(&self, channel: &str, group: &str, id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner
            .groups
            .get_mut(&(channel.to_string(), group.to_string()))
        {
            state.pending.remove(&id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn ids_are_monotone_across_channels() {
        let log = MemoryEventLog::new();
        let a = log.publish("discovery", json!({"story_id": 1})).await.unwrap();
        let b = log.publish("content", json!({"story_id": 2})).await.unwrap();
        let c = log.publish("discovery", json!({"story_id": 3})).await.unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn group_sees_messages_published_before_creation() {
        let log = MemoryEventLog::new();
        log.publish("discovery", json!({"story_id": 1})).await.unwrap();
        log.ensure_group("discovery", "mappers").await.unwrap();
        let got = log.read_group("discovery", "mappers", "w1", 10).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload["story_id"], 1);
    }

    #[tokio::test]
    async fn ensure_group_is_idempotent() {
        let log = MemoryEventLog::new();
        log.ensure_group("content", "g").await.unwrap();
        log.publish("content", json!({"n": 1})).await.unwrap();
        let first = log.read_group("content", "g", "w1", 10).await.unwrap();
        assert_eq!(first.len(), 1);
        log.ack("content", "g", first[0].id).await.unwrap();

        // Re-creating the group must not rewind its cursor.
        log.ensure_group("content", "g").await.unwrap();
        let again = log.read_group("content", "g", "w1", 10).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn unacked_message_is_redelivered() {
        let log = MemoryEventLog::new();
        log.ensure_group("content", "g").await.unwrap();
        log.publish("content", json!({"n": 1})).await.unwrap();

        let first = log.read_group("content", "g", "w1", 10).await.unwrap();
        assert_eq!(first.len(), 1);

        // Not acked, so a second read hands it out again, to the new consumer.
        let second = log.read_group("content", "g", "w2", 10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
        let (consumer, _) = log.delivery("content", "g", second[0].id).unwrap();
        assert_eq!(consumer, "w2");

        log.ack("content", "g", first[0].id).await.unwrap();
        let third = log.read_group("content", "g", "w1", 10).await.unwrap();
        assert!(third.is_empty());
        assert!(log.pending_ids("content", "g").is_empty());
    }

    #[tokio::test]
    async fn fresh_messages_come_before_redeliveries() {
        let log = MemoryEventLog::new();
        log.ensure_group("content", "g").await.unwrap();
        let old = log.publish("content", json!({"n": 1})).await.unwrap();
        log.read_group("content", "g", "w1", 10).await.unwrap(); // old now pending
        let fresh = log.publish("content", json!({"n": 2})).await.unwrap();

        let got = log.read_group("content", "g", "w1", 10).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].id, fresh);
        assert_eq!(got[1].id, old);
    }

    #[tokio::test]
    async fn groups_consume_independently() {
        let log = MemoryEventLog::new();
        log.ensure_group("discovery", "a").await.unwrap();
        log.ensure_group("discovery", "b").await.unwrap();
        log.publish("discovery", json!({"story_id": 9})).await.unwrap();

        let for_a = log.read_group("discovery", "a", "w", 10).await.unwrap();
        assert_eq!(for_a.len(), 1);
        log.ack("discovery", "a", for_a[0].id).await.unwrap();

        let for_b = log.read_group("discovery", "b", "w", 10).await.unwrap();
        assert_eq!(for_b.len(), 1);
    }

    #[tokio::test]
    async fn count_caps_a_read() {
        let log = MemoryEventLog::new();
        log.ensure_group("content", "g").await.unwrap();
        for n in 0..5 {
            log.publish("content", json!({"n": n})).await.unwrap();
        }
        let got = log.read_group("content", "g", "w", 2).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].payload["n"], 0);
        assert_eq!(got[1].payload["n"], 1);
    }
}
