//! Google News search feed, used when the primary upstream yields nothing.
//!
//! The feed is RSS 2.0 in practice, but the parser also accepts Atom and
//! namespaced roots (`<rss:rss>`, `<atom:feed>`, `<rdf:RDF>`): elements are
//! matched on their local name only.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::Html;
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

use super::{non_empty, SearchWindow, Upstream};
use crate::api::{FetchError, Fetcher, Transport};
use crate::models::RawArticle;

pub const GOOGLE_NEWS_ENDPOINT: &str = "https://news.google.com/rss/search";

const FEED_ROOTS: &[&[u8]] = &[b"rss", b"feed", b"RDF"];

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("document is not a feed (root element {0:?})")]
    NotAFeed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Published,
    Source,
    Description,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"pubDate" | b"published" | b"updated" | b"date" => Some(Field::Published),
            b"source" => Some(Field::Source),
            b"description" | b"summary" | b"content" => Some(Field::Description),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct EntryDraft {
    title: Option<String>,
    link: Option<String>,
    published: Option<String>,
    source_name: Option<String>,
    source_url: Option<String>,
    description: Option<String>,
}

impl EntryDraft {
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Published => &mut self.published,
            Field::Source => &mut self.source_name,
            Field::Description => &mut self.description,
        };
        if slot.is_none() {
            *slot = non_empty(Some(value));
        }
    }

    /// Attribute-carried values: Atom `<link href>` and RSS `<source url>`.
    fn absorb_attributes(&mut self, field: Field, element: &BytesStart<'_>) {
        match field {
            Field::Link => {
                let rel = attribute(element, b"rel");
                if rel.is_none() || rel.as_deref() == Some("alternate") {
                    if let Some(href) = attribute(element, b"href") {
                        self.set(Field::Link, href);
                    }
                }
            }
            Field::Source => {
                if self.source_url.is_none() {
                    self.source_url = non_empty(attribute(element, b"url"));
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> RawArticle {
        let source_name = self.source_name;
        let mut title = self.title.unwrap_or_default();
        if let Some(name) = source_name.as_deref() {
            let suffix = format!(" - {}", name);
            if title.ends_with(&suffix) && title.len() > suffix.len() {
                title.truncate(title.len() - suffix.len());
            }
        }

        RawArticle {
            title: title.trim().to_string(),
            url: self.link.unwrap_or_default(),
            snippet: self.description.map(|d| html_to_text(&d)).and_then(|d| non_empty(Some(d))),
            domain: self.source_url.as_deref().and_then(host_of),
            source_name,
            source_country: None,
            published: self.published,
        }
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| decode_text(&a.value))
}

fn decode_text(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match quick_xml::escape::unescape(&text) {
        Ok(unescaped) => unescaped.into_owned(),
        Err(_) => text.into_owned(),
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Strip markup from a feed description and collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse an RSS or Atom document into articles.
pub fn parse_feed(xml: &str) -> Result<Vec<RawArticle>, FeedError> {
    let mut reader = Reader::from_str(xml);
    let mut articles = Vec::new();
    let mut saw_root = false;
    let mut entry: Option<EntryDraft> = None;
    // Field being captured, its buffer, and nesting depth inside it.
    let mut capture: Option<(Field, String, usize)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if !saw_root {
                    if !FEED_ROOTS.contains(&name) {
                        return Err(FeedError::NotAFeed(String::from_utf8_lossy(name).into_owned()));
                    }
                    saw_root = true;
                    continue;
                }
                if let Some((_, _, depth)) = capture.as_mut() {
                    *depth += 1;
                } else if name == b"item" || name == b"entry" {
                    entry = Some(EntryDraft::default());
                } else if let (Some(draft), Some(field)) = (entry.as_mut(), Field::from_local_name(name)) {
                    draft.absorb_attributes(field, &e);
                    capture = Some((field, String::new(), 0));
                }
            }
            Event::Empty(e) => {
                if !saw_root {
                    return Err(FeedError::NotAFeed(String::from_utf8_lossy(e.local_name().as_ref()).into_owned()));
                }
                if capture.is_none() {
                    if let (Some(draft), Some(field)) = (entry.as_mut(), Field::from_local_name(e.local_name().as_ref())) {
                        draft.absorb_attributes(field, &e);
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, buf, _)) = capture.as_mut() {
                    buf.push_str(&decode_text(&t));
                }
            }
            Event::CData(c) => {
                if let Some((_, buf, _)) = capture.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::GeneralRef(r) => {
                if let Some((_, buf, _)) = capture.as_mut() {
                    let reference = format!("&{};", String::from_utf8_lossy(&r));
                    buf.push_str(&decode_text(reference.as_bytes()));
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                match capture.take() {
                    Some((field, buf, 0)) => {
                        if let Some(draft) = entry.as_mut() {
                            draft.set(field, buf);
                        }
                    }
                    Some((field, buf, depth)) => capture = Some((field, buf, depth - 1)),
                    None if name == b"item" || name == b"entry" => {
                        if let Some(draft) = entry.take() {
                            articles.push(draft.finish());
                        }
                    }
                    None => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(FeedError::NotAFeed(String::new()));
    }
    Ok(articles)
}

/// Fallback upstream.
#[derive(Debug)]
pub struct GoogleNewsSource<T> {
    fetcher: Fetcher<T>,
    endpoint: String,
}

impl<T: Transport> GoogleNewsSource<T> {
    pub fn new(fetcher: Fetcher<T>, endpoint: impl Into<String>) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
        }
    }

    pub fn request_url(&self, query: &str, window: &SearchWindow) -> String {
        let q = format!("{} when:{}d", query, window.days());
        format!(
            "{}?q={}&hl=en-US&gl=US&ceid=US:en",
            self.endpoint,
            urlencoding::encode(&q)
        )
    }
}

impl<T: Transport> Upstream for GoogleNewsSource<T> {
    fn name(&self) -> &'static str {
        "Google News RSS"
    }

    #[instrument(level = "info", skip_all, fields(upstream = "google_news"))]
    async fn search(
        &self,
        query: &str,
        window: &SearchWindow,
        max_records: usize,
    ) -> Result<Vec<RawArticle>, FetchError> {
        let url = self.request_url(query, window);
        let mut articles = self.fetcher.get_parsed(&url, parse_feed).await?;
        articles.truncate(max_records);
        info!(count = articles.len(), "Google News search returned articles");
        Ok(articles)
    }
}
