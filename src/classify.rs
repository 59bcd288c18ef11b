//! Topic classification and query planning strategies.
//!
//! Tags are re-derived from article text regardless of which query found the
//! article, so one hit can carry several topics. How queries are issued and
//! what happens to hits with no pattern match is decided by a
//! [`ClassificationStrategy`]:
//!
//! | Strategy | Queries | Unmatched hit |
//! |----------|---------|---------------|
//! | [`PerTopicQuery`] | one per topic | tagged with the originating topic |
//! | [`BroadQueryWithPatternClassification`] | one for the catalog | dropped |

use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::topics::{self, Topic, TOPICS};

/// A topic compiled into one regex per clause.
#[derive(Debug)]
struct TopicMatcher {
    key: &'static str,
    clauses: Vec<Regex>,
}

impl TopicMatcher {
    fn compile(topic: &Topic) -> Self {
        let clauses = topic
            .clauses
            .iter()
            .map(|clause| {
                let alternatives = clause
                    .iter()
                    .map(|term| regex::escape(term).replace(' ', r"\s+"))
                    .collect::<Vec<_>>()
                    .join("|");
                Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives)).expect("valid topic regex")
            })
            .collect();
        Self {
            key: topic.key,
            clauses,
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.clauses.iter().all(|re| re.is_match(text))
    }
}

static MATCHERS: Lazy<Vec<TopicMatcher>> = Lazy::new(|| TOPICS.iter().map(TopicMatcher::compile).collect());

/// Every topic key whose pattern pack matches `text`.
pub fn classify(text: &str) -> BTreeSet<&'static str> {
    MATCHERS
        .iter()
        .filter(|m| m.matches(text))
        .map(|m| m.key)
        .collect()
}

/// One upstream query and the topic it was built for, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    /// Topic the query was built for; `None` for the broad query.
    pub origin: Option<&'static str>,
    /// Expression for the primary upstream.
    pub primary: String,
    /// Expression for the feed fallback.
    pub fallback: String,
}

/// How the catalog turns into queries and how hits turn into tags.
pub trait ClassificationStrategy {
    /// Short name recorded in the store metadata.
    fn name(&self) -> &'static str;

    /// Queries to issue for this run.
    fn plan(&self, catalog: &[Topic]) -> Vec<PlannedQuery>;

    /// Topic keys for a hit, or `None` when the hit should be dropped.
    fn tag(&self, origin: Option<&'static str>, text: &str) -> Option<BTreeSet<&'static str>>;
}

/// One query per topic; the originating topic is always kept as a tag.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerTopicQuery;

impl ClassificationStrategy for PerTopicQuery {
    fn name(&self) -> &'static str {
        "per_topic"
    }

    fn plan(&self, catalog: &[Topic]) -> Vec<PlannedQuery> {
        catalog
            .iter()
            .map(|topic| PlannedQuery {
                origin: Some(topic.key),
                primary: topics::per_topic_query(topic),
                fallback: topics::fallback_query(&topics::topic_expression(topic)),
            })
            .collect()
    }

    fn tag(&self, origin: Option<&'static str>, text: &str) -> Option<BTreeSet<&'static str>> {
        let mut tags = classify(text);
        tags.extend(origin);
        (!tags.is_empty()).then_some(tags)
    }
}

/// A single catalog-wide query; tags come from patterns alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct BroadQueryWithPatternClassification;

impl ClassificationStrategy for BroadQueryWithPatternClassification {
    fn name(&self) -> &'static str {
        "broad"
    }

    fn plan(&self, catalog: &[Topic]) -> Vec<PlannedQuery> {
        let expression = catalog
            .iter()
            .map(|t| format!("({})", topics::topic_expression(t)))
            .collect::<Vec<_>>()
            .join(" OR ");
        vec![PlannedQuery {
            origin: None,
            primary: topics::broad_query(catalog),
            fallback: topics::fallback_query(&format!("({})", expression)),
        }]
    }

    fn tag(&self, _origin: Option<&'static str>, text: &str) -> Option<BTreeSet<&'static str>> {
        let tags = classify(text);
        (!tags.is_empty()).then_some(tags)
    }
}

/// Strategy selector used by configuration and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    PerTopic,
    Broad,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn ClassificationStrategy> {
        match self {
            StrategyKind::PerTopic => Box::new(PerTopicQuery),
            StrategyKind::Broad => Box::new(BroadQueryWithPatternClassification),
        }
    }
}
