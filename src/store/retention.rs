//! Best-effort timestamp parsing, retention pruning, and ordering.
//!
//! Upstreams report publish times in several shapes. Parsers are tried in
//! order and the first success wins; no success is a normal outcome, and an
//! item whose time cannot be read is always kept.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use itertools::Itertools;
use tracing::debug;

use crate::models::Item;

/// Default retention horizon in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

type TimestampParser = fn(&str) -> Option<DateTime<Utc>>;

fn naive_utc(s: &str, format: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, format).ok().map(|n| n.and_utc())
}

/// `20260107130200`
fn parse_compact(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    naive_utc(s, "%Y%m%d%H%M%S")
}

/// `20260107T130200Z`, GDELT's `seendate`
fn parse_basic_iso(s: &str) -> Option<DateTime<Utc>> {
    naive_utc(s, "%Y%m%dT%H%M%SZ")
}

/// `2026-01-07 13:02:00`
fn parse_spaced(s: &str) -> Option<DateTime<Utc>> {
    naive_utc(s, "%Y-%m-%d %H:%M:%S")
}

/// RFC 3339, or ISO 8601 without an offset (read as UTC).
fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| naive_utc(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

/// `Wed, 07 Jan 2026 13:02:00 GMT`, feed `pubDate`
fn parse_rfc2822(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s).ok().map(|dt| dt.with_timezone(&Utc))
}

const PARSERS: &[TimestampParser] = &[
    parse_compact,
    parse_basic_iso,
    parse_spaced,
    parse_iso8601,
    parse_rfc2822,
];

/// Parse an upstream publish string, or `None` when no format fits.
pub fn parse_published(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    PARSERS.iter().find_map(|parse| parse(s))
}

/// Drop items published before `now - retention_days`.
///
/// Items without a readable timestamp are kept. Returns the survivors and
/// the number dropped.
pub fn prune(items: Vec<Item>, now: DateTime<Utc>, retention_days: i64) -> (Vec<Item>, usize) {
    let cutoff = now - Duration::days(retention_days);
    let before = items.len();
    let kept: Vec<Item> = items
        .into_iter()
        .filter(|item| match parse_published(item.published.as_deref()) {
            Some(published) => published >= cutoff,
            None => true,
        })
        .collect();
    let dropped = before - kept.len();
    debug!(%cutoff, kept = kept.len(), dropped, "Applied retention");
    (kept, dropped)
}

/// Newest first; unreadable timestamps sort as the epoch. Ties break on id.
pub fn sort_newest_first(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|item| {
            let key = parse_published(item.published.as_deref()).unwrap_or(DateTime::UNIX_EPOCH);
            (key, item)
        })
        .sorted_by(|(ka, a), (kb, b)| kb.cmp(ka).then_with(|| a.id.cmp(&b.id)))
        .map(|(_, item)| item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signals;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn item(id: &str, published: Option<&str>) -> Item {
        Item {
            id: id.to_string(),
            title: "T".to_string(),
            url: format!("https://example.com/{id}"),
            source: None,
            source_country: None,
            published: published.map(str::to_string),
            topics: BTreeSet::new(),
            topic_labels: BTreeSet::new(),
            region: None,
            country: None,
            signals: Signals::default(),
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parses_supported_formats() {
        let expected = at(2026, 1, 7, 13, 2, 0);
        for raw in [
            "20260107130200",
            "20260107T130200Z",
            "2026-01-07 13:02:00",
            "2026-01-07T13:02:00Z",
            "2026-01-07T13:02:00",
            "2026-01-07T08:02:00-05:00",
            "2026-01-07T13:02:00.000Z",
            "Wed, 07 Jan 2026 13:02:00 GMT",
            "  2026-01-07 13:02:00  ",
        ] {
            assert_eq!(parse_published(Some(raw)), Some(expected), "{raw}");
        }
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse_published(None), None);
        assert_eq!(parse_published(Some("")), None);
        assert_eq!(parse_published(Some("yesterday")), None);
        assert_eq!(parse_published(Some("2026130700000000")), None);
    }

    #[test]
    fn test_prune_is_fail_open() {
        let now = at(2026, 3, 1, 0, 0, 0);
        let items = vec![item("a", None), item("b", Some("not a date"))];
        let (kept, dropped) = prune(items.clone(), now, DEFAULT_RETENTION_DAYS);
        assert_eq!(kept, items);
        assert_eq!(dropped, 0);

        // regardless of how far in the future `now` is
        let (kept, _) = prune(items, at(2100, 1, 1, 0, 0, 0), 1);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_prune_drops_expired_only() {
        let now = at(2026, 3, 1, 0, 0, 0);
        let items = vec![
            item("old", Some("20260115000000")),
            item("edge", Some("2026-01-30 00:00:00")),
            item("new", Some("2026-02-27T10:00:00Z")),
        ];
        let (kept, dropped) = prune(items, now, 30);
        assert_eq!(dropped, 1);
        assert_eq!(kept.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), vec!["edge", "new"]);
    }

    #[test]
    fn test_sort_newest_first_with_unparseable_last() {
        let items = vec![
            item("unknown", Some("??")),
            item("older", Some("2026-01-01 00:00:00")),
            item("none", None),
            item("newer", Some("20260201000000")),
        ];
        let sorted = sort_newest_first(items);
        assert_eq!(
            sorted.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["newer", "older", "none", "unknown"]
        );
    }
}
