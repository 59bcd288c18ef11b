//! Data models for fetched articles and the persisted store.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`RawArticle`]: An upstream search hit, normalized across sources
//! - [`Item`]: The deduplicated unit kept in the store
//! - [`Signals`]: Coarse numeric values extracted from free text
//! - [`StoreDocument`]: The full document written to disk
//!
//! Stored fields use snake_case keys, which is the shape the dashboard page
//! reads.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A search hit as returned by an upstream, before filtering.
///
/// Both the GDELT and the feed source normalize their records into this
/// shape. Nothing here is trusted: `source_country` in particular is
/// upstream metadata and is only used as a hint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArticle {
    /// Headline text.
    pub title: String,
    /// Canonical article URL as reported upstream.
    pub url: String,
    /// Short description, when the upstream provides one.
    pub snippet: Option<String>,
    /// Publishing domain (e.g. `example.com`).
    pub domain: Option<String>,
    /// Feed-provided publisher name.
    pub source_name: Option<String>,
    /// Upstream country hint, free-form.
    pub source_country: Option<String>,
    /// Free-form publish timestamp string, kept verbatim.
    pub published: Option<String>,
}

impl RawArticle {
    /// Title and snippet joined for pattern matching.
    pub fn text(&self) -> String {
        match self.snippet.as_deref() {
            Some(snippet) if !snippet.trim().is_empty() => format!("{} {}", self.title, snippet),
            _ => self.title.clone(),
        }
    }
}

/// Numeric signals pulled out of article text. Each is independently absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Signals {
    /// Investment amount in plain USD.
    #[serde(default)]
    pub investment_usd: Option<f64>,
    /// Facility area in square feet.
    #[serde(default)]
    pub sqft: Option<f64>,
    /// Job count.
    #[serde(default)]
    pub jobs: Option<f64>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.investment_usd.is_none() && self.sqft.is_none() && self.jobs.is_none()
    }
}

/// A stored, deduplicated article.
///
/// `id` is derived from `url` (see [`crate::store::merge::stable_id`]) and
/// both are fixed once the item exists. See [`crate::store::merge::merge`]
/// for the per-field merge policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_country: Option<String>,
    /// Upstream timestamp string, never reformatted.
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
    #[serde(default)]
    pub topic_labels: BTreeSet<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub signals: Signals,
}

/// Key/label pair written into the store so the page can render filters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TopicRef {
    pub key: String,
    pub label: String,
}

/// Per-run counters recorded in the store metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunCounters {
    /// Raw hits returned by the upstream that produced data.
    pub fetched: usize,
    /// Hits that passed the US/Canada filter.
    pub relevant: usize,
    /// Relevant hits that ended up with at least one topic.
    pub tagged: usize,
    /// Items new to the store.
    pub inserted: usize,
    /// Existing items that gained topics or fields.
    pub updated: usize,
    /// Items dropped by retention.
    pub pruned: usize,
    /// Items in the written store.
    pub stored: usize,
}

/// Metadata describing the run that produced the store.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreMeta {
    /// RFC 3339 generation time.
    pub generated_at: String,
    pub window_start: String,
    pub window_end: String,
    /// Name of the upstream that actually produced data.
    pub source: String,
    pub strategy: String,
    #[serde(default)]
    pub counters: RunCounters,
    #[serde(default)]
    pub per_topic: BTreeMap<String, usize>,
    #[serde(default)]
    pub failed_queries: usize,
}

/// The document persisted between runs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreDocument {
    pub meta: StoreMeta,
    pub topics: Vec<TopicRef>,
    pub items: Vec<Item>,
}
