//! Moderation: one verdict per cleaned item — blocked, sensitive (PII
//! redacted), or clean.

use anyhow::Result;
use tracing::{debug, info};

use forumpulse_common::safety::{check_offensive, redact_pii};
use forumpulse_common::types::{ModerationFlag, ModerationStatus};

use crate::deps::Deps;

pub const BATCH_SIZE: usize = 100;

/// Scan one batch of cleaned items with no flag yet. Offensive content is
/// blocked outright; email/phone patterns are redacted in place and flagged
/// sensitive. Returns the number of items flagged.
pub async fn run(deps: &Deps, now: i64) -> Result<usize> {
    let batch = deps.store.items_without_flag(BATCH_SIZE).await?;
    if batch.is_empty() {
        debug!("no items awaiting moderation");
        return Ok(0);
    }

    let mut flagged = 0usize;
    for (id, text) in &batch {
        let flag = if let Some(reason) = check_offensive(text) {
            ModerationFlag {
                item_id: *id,
                status: ModerationStatus::Blocked,
                reason: Some(reason),
                flagged_at: now,
            }
        } else {
            let redacted = redact_pii(text);
            if redacted != *text {
                deps.store.set_clean_text(*id, &redacted).await?;
                ModerationFlag {
                    item_id: *id,
                    status: ModerationStatus::Sensitive,
                    reason: Some("contact details redacted".to_string()),
                    flagged_at: now,
                }
            } else {
                ModerationFlag {
                    item_id: *id,
                    status: ModerationStatus::Clean,
                    reason: None,
                    flagged_at: now,
                }
            }
        };
        deps.store.upsert_flag(&flag).await?;
        flagged += 1;
    }

    info!(flagged, "moderation complete");
    Ok(flagged)
}
