//! Topic catalog and search expression construction.
//!
//! Each [`Topic`] carries its keyword pack as a list of clauses. A clause is
//! a set of alternatives; a topic matches when every clause has at least one
//! hit. The same clauses render into the upstream boolean query here and
//! compile into the classifier's regexes in [`crate::classify`].

use crate::geo::{CA_PROVINCES, US_STATES};
use crate::models::TopicRef;

/// A static catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topic {
    /// Stable short identifier stored on items.
    pub key: &'static str,
    /// Human-readable label stored alongside the key.
    pub label: &'static str,
    /// Conjunction of keyword alternatives.
    pub clauses: &'static [&'static [&'static str]],
}

impl Topic {
    pub fn to_ref(&self) -> TopicRef {
        TopicRef {
            key: self.key.to_string(),
            label: self.label.to_string(),
        }
    }
}

const SUPPLY_CHAIN_CONTEXT: &[&str] = &["supply chain", "operations", "logistics", "automation", "engineering"];

/// The fixed catalog of nine topics.
pub const TOPICS: &[Topic] = &[
    Topic {
        key: "facility_new",
        label: "New facility / warehouse / DC",
        clauses: &[&[
            "new warehouse",
            "new distribution center",
            "new distribution centre",
            "new DC",
            "new fulfillment center",
            "new fulfilment centre",
            "opens new",
            "opening a new",
        ]],
    },
    Topic {
        key: "facility_expansion",
        label: "Expansion / modernization",
        clauses: &[&[
            "expansion",
            "expanded",
            "expanding",
            "modernization",
            "modernisation",
            "upgrade",
            "capacity increase",
            "adds capacity",
            "adding capacity",
        ]],
    },
    Topic {
        key: "manufacturing_investment",
        label: "Manufacturing investment",
        clauses: &[&[
            "manufacturing investment",
            "plant investment",
            "production expansion",
            "new plant",
            "new factory",
            "manufacturing facility",
        ]],
    },
    Topic {
        key: "warehouse_investment",
        label: "Warehouse / logistics investment",
        clauses: &[&[
            "warehouse investment",
            "distribution investment",
            "logistics investment",
            "capital investment",
            "capex",
            "investing",
            "invests",
        ]],
    },
    Topic {
        key: "real_estate_signal",
        label: "Industrial real estate / build-to-suit",
        clauses: &[&[
            "build-to-suit",
            "industrial lease",
            "leased",
            "site selection",
            "selects site",
            "planning commission",
            "rezoning",
            "permit",
            "permitting",
            "zoning",
        ]],
    },
    Topic {
        key: "automation_signal",
        label: "Automation project signal",
        clauses: &[&[
            "AS/RS",
            "ASRS",
            "automated storage",
            "shuttle",
            "goods-to-person",
            "GTP",
            "AMR",
            "autonomous mobile",
            "robotics",
            "robotic",
            "palletizing",
            "sortation",
            "conveyor",
            "WMS",
            "WES",
            "WCS",
            "warehouse automation",
            "distribution automation",
        ]],
    },
    Topic {
        key: "leadership_change",
        label: "Leadership change (CEO/VP/Automation)",
        clauses: &[
            &["appointed", "names", "named", "joins", "hired", "promoted", "resigns", "steps down"],
            &["CEO", "COO", "CFO", "Chief Executive", "VP", "Vice President", "Head of", "Director"],
            SUPPLY_CHAIN_CONTEXT,
        ],
    },
    Topic {
        key: "revenue_update",
        label: "Revenue / earnings update",
        clauses: &[
            &["revenue", "net sales", "earnings", "guidance", "quarter", "Q1", "Q2", "Q3", "Q4"],
            &["supply chain", "distribution", "capacity", "capex", "investment"],
        ],
    },
    Topic {
        key: "risk_urgency",
        label: "Risk / urgency (closure, labor, disruption)",
        clauses: &[&[
            "layoffs",
            "closure",
            "shutting down",
            "consolidation",
            "strike",
            "union",
            "labor shortage",
            "labour shortage",
            "fire",
            "recall",
        ]],
    },
];

/// Restricts GDELT hits to US/Canadian outlets.
pub const SOURCE_COUNTRY_QUERY: &str = "(sourcecountry:US OR sourcecountry:CA)";

/// Suffix for the feed fallback, which has no source-country operator.
pub const FALLBACK_GEO_QUERY: &str = "(USA OR Canada)";

/// Look up a catalog entry by key.
pub fn find(key: &str) -> Option<&'static Topic> {
    TOPICS.iter().find(|t| t.key == key)
}

/// Snapshot of the catalog as written into the store.
pub fn catalog_refs() -> Vec<TopicRef> {
    TOPICS.iter().map(Topic::to_ref).collect()
}

/// Render one keyword the way the upstream expects it.
///
/// Bare alphanumeric words pass through; anything with spaces or
/// punctuation is quoted as a phrase.
fn render_term(term: &str) -> String {
    if term.chars().all(|c| c.is_ascii_alphanumeric()) {
        term.to_string()
    } else {
        format!("\"{}\"", term)
    }
}

fn render_clause(clause: &[&str]) -> String {
    format!(
        "({})",
        clause.iter().map(|t| render_term(t)).collect::<Vec<_>>().join(" OR ")
    )
}

/// The boolean expression for a single topic, without any geographic scope.
pub fn topic_expression(topic: &Topic) -> String {
    topic
        .clauses
        .iter()
        .map(|c| render_clause(c))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Geography term pack: country names plus every state and province.
pub fn geo_expression() -> String {
    let mut terms: Vec<String> = ["United States", "U.S.", "USA", "United States of America", "Canada", "Canadian"]
        .iter()
        .map(|t| render_term(t))
        .collect();
    terms.extend(US_STATES.iter().map(|s| format!("\"{}\"", s)));
    terms.extend(CA_PROVINCES.iter().map(|p| format!("\"{}\"", p)));
    format!("({})", terms.join(" OR "))
}

/// Primary-upstream query for one topic.
pub fn per_topic_query(topic: &Topic) -> String {
    format!(
        "({}) AND {} AND {}",
        topic_expression(topic),
        geo_expression(),
        SOURCE_COUNTRY_QUERY
    )
}

/// One primary-upstream query covering every topic.
///
/// The state/province pack is left off here to keep the expression within
/// upstream length limits; the relevance filter catches the rest.
pub fn broad_query(topics: &[Topic]) -> String {
    let packs = topics
        .iter()
        .map(|t| format!("({})", topic_expression(t)))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("({}) AND {}", packs, SOURCE_COUNTRY_QUERY)
}

/// Feed-fallback query for an expression.
pub fn fallback_query(expression: &str) -> String {
    format!("{} {}", expression, FALLBACK_GEO_QUERY)
}
