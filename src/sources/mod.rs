//! Upstream search sources.
//!
//! Each source turns a search expression and time window into
//! [`RawArticle`]s, going through its own [`crate::api::Fetcher`] so that
//! throttling and retries apply to every request.
//!
//! # Supported Sources
//!
//! | Source | Module | Role | Format |
//! |--------|--------|------|--------|
//! | GDELT 2.1 Doc API | [`gdelt`] | primary | JSON `ArtList` |
//! | Google News search | [`google_news`] | fallback | RSS / Atom |

pub mod gdelt;
pub mod google_news;

use chrono::{DateTime, Utc};

use crate::api::FetchError;
use crate::models::RawArticle;

/// Query time window, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SearchWindow {
    /// Window length in whole days, rounded up, at least one.
    pub fn days(&self) -> i64 {
        let hours = (self.end - self.start).num_hours().max(1);
        ((hours + 23) / 24).max(1)
    }
}

/// A search upstream.
pub trait Upstream {
    /// Human-readable name recorded in the store metadata.
    fn name(&self) -> &'static str;

    /// Run one search, returning at most `max_records` normalized hits.
    ///
    /// # Arguments
    ///
    /// * `query` - Search expression in the upstream's own syntax
    /// * `window` - Publish-time window to search
    /// * `max_records` - Cap on returned hits
    ///
    /// # Returns
    ///
    /// Hits in upstream order. Zero hits is `Ok`; only a request that never
    /// produced a usable body is an error.
    async fn search(
        &self,
        query: &str,
        window: &SearchWindow,
        max_records: usize,
    ) -> Result<Vec<RawArticle>, FetchError>;
}

/// Trim and drop empty strings.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_window_days_rounds_up() {
        let end = Utc::now();
        let w = |h: i64| SearchWindow {
            start: end - Duration::hours(h),
            end,
        };
        assert_eq!(w(48).days(), 2);
        assert_eq!(w(49).days(), 3);
        assert_eq!(w(1).days(), 1);
        assert_eq!(w(0).days(), 1);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  x ".to_string())), Some("x".to_string()));
        assert_eq!(non_empty(Some("   ".to_string())), None);
        assert_eq!(non_empty(None), None);
    }
}
