//! Stable identity and merge policy for stored items.
//!
//! | Field | Policy |
//! |-------|--------|
//! | `id`, `url` | immutable |
//! | `topics`, `topic_labels` | union, never shrinks |
//! | `title`, `source`, `source_country`, `published`, `region`, `country` | fill-forward |
//! | each of `signals` | fill-forward |
//!
//! Fill-forward: an empty or missing value is replaced by a non-empty
//! incoming one; a populated value is never overwritten.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::models::{Item, Signals};

/// `sha256(url)` as hex, truncated to 16 characters.
///
/// The URL is hashed as-is: no case folding, no trailing-slash or query
/// normalization.
pub fn stable_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(16);
    hex
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn fill(current: Option<String>, incoming: Option<String>) -> Option<String> {
    match current {
        Some(value) if !is_blank(&value) => Some(value),
        _ => incoming.filter(|v| !is_blank(v)),
    }
}

fn fill_signals(current: Signals, incoming: Signals) -> Signals {
    Signals {
        investment_usd: current.investment_usd.or(incoming.investment_usd),
        sqft: current.sqft.or(incoming.sqft),
        jobs: current.jobs.or(incoming.jobs),
    }
}

/// Combine a stored item with a newer observation of the same id.
pub fn merge(current: Item, incoming: Item) -> Item {
    debug_assert_eq!(current.id, incoming.id);

    let mut topics = current.topics;
    topics.extend(incoming.topics);
    let mut topic_labels = current.topic_labels;
    topic_labels.extend(incoming.topic_labels);

    let title = if is_blank(&current.title) {
        incoming.title
    } else {
        current.title
    };

    Item {
        id: current.id,
        url: current.url,
        title,
        source: fill(current.source, incoming.source),
        source_country: fill(current.source_country, incoming.source_country),
        published: fill(current.published, incoming.published),
        topics,
        topic_labels,
        region: fill(current.region, incoming.region),
        country: fill(current.country, incoming.country),
        signals: fill_signals(current.signals, incoming.signals),
    }
}

/// What [`merge_into`] did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Fold `item` into an id-keyed collection.
///
/// # Arguments
///
/// * `items` - Collection keyed by [`Item::id`]
/// * `item` - Incoming item; an existing entry with the same id is the
///   older side of [`merge`]
///
/// # Returns
///
/// Whether the item was new, changed an existing entry, or changed nothing.
pub fn merge_into(items: &mut BTreeMap<String, Item>, item: Item) -> MergeOutcome {
    match items.remove(&item.id) {
        None => {
            items.insert(item.id.clone(), item);
            MergeOutcome::Inserted
        }
        Some(current) => {
            let before = current.clone();
            let merged = merge(current, item);
            let outcome = if merged == before {
                MergeOutcome::Unchanged
            } else {
                MergeOutcome::Updated
            };
            items.insert(merged.id.clone(), merged);
            outcome
        }
    }
}
