//! GDELT 2.1 Doc API search.
//!
//! Uses `mode=ArtList&format=json`. An empty body means no hits. A body that
//! is not JSON (the API answers some errors with plain text or HTML) is
//! reported as malformed so the fetcher retries it.

use serde::Deserialize;
use tracing::{info, instrument};

use super::{non_empty, SearchWindow, Upstream};
use crate::api::{FetchError, Fetcher, Transport};
use crate::models::RawArticle;
use crate::utils::compact_timestamp;

pub const GDELT_DOC_ENDPOINT: &str = "https://api.gdeltproject.org/api/v2/doc/doc";

/// The API refuses larger `maxrecords` values.
pub const MAX_RECORDS_CAP: usize = 250;

#[derive(Debug, Deserialize)]
struct GdeltResponse {
    #[serde(default)]
    articles: Option<Vec<GdeltArticle>>,
}

#[derive(Debug, Deserialize)]
struct GdeltArticle {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "seenDate")]
    seendate: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default, alias = "sourceCountry")]
    sourcecountry: Option<String>,
    #[serde(default, alias = "sourceCollection")]
    sourcecollection: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

impl From<GdeltArticle> for RawArticle {
    fn from(a: GdeltArticle) -> Self {
        RawArticle {
            title: non_empty(a.title).unwrap_or_default(),
            url: non_empty(a.url).unwrap_or_default(),
            snippet: non_empty(a.snippet),
            domain: non_empty(a.domain),
            source_name: non_empty(a.sourcecollection),
            source_country: non_empty(a.sourcecountry),
            published: non_empty(a.seendate),
        }
    }
}

/// Parse an `ArtList` JSON body.
pub fn parse_response(body: &str) -> Result<Vec<RawArticle>, serde_json::Error> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let response: GdeltResponse = serde_json::from_str(body)?;
    Ok(response
        .articles
        .unwrap_or_default()
        .into_iter()
        .map(RawArticle::from)
        .collect())
}

/// Primary upstream.
#[derive(Debug)]
pub struct GdeltSource<T> {
    fetcher: Fetcher<T>,
    endpoint: String,
}

impl<T: Transport> GdeltSource<T> {
    pub fn new(fetcher: Fetcher<T>, endpoint: impl Into<String>) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
        }
    }

    pub fn request_url(&self, query: &str, window: &SearchWindow, max_records: usize) -> String {
        format!(
            "{}?query={}&mode=ArtList&format=json&sort=HybridRel&maxrecords={}&startdatetime={}&enddatetime={}",
            self.endpoint,
            urlencoding::encode(query),
            max_records.clamp(1, MAX_RECORDS_CAP),
            compact_timestamp(window.start),
            compact_timestamp(window.end),
        )
    }
}

impl<T: Transport> Upstream for GdeltSource<T> {
    fn name(&self) -> &'static str {
        "GDELT 2.1 Doc API"
    }

    #[instrument(level = "info", skip_all, fields(upstream = "gdelt"))]
    async fn search(
        &self,
        query: &str,
        window: &SearchWindow,
        max_records: usize,
    ) -> Result<Vec<RawArticle>, FetchError> {
        let url = self.request_url(query, window, max_records);
        let mut articles = self.fetcher.get_parsed(&url, parse_response).await?;
        articles.truncate(max_records);
        info!(count = articles.len(), "GDELT search returned articles");
        Ok(articles)
    }
}
