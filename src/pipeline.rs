//! One ingestion run, end to end.
//!
//! 1. **Plan**: the configured [`ClassificationStrategy`] turns the topic
//!    catalog into queries
//! 2. **Collect**: queries run one after another against the primary
//!    upstream; if the whole run yields no hits, the same plan is re-issued
//!    against the fallback
//! 3. **Filter and tag**: hits lacking a url or title are dropped, then the
//!    US/Canada filter and the strategy's tagging decide what survives
//! 4. **Merge**: surviving hits fold into an id-keyed batch, then into the
//!    stored collection
//! 5. **Prune and write**: retention, newest-first ordering, atomic write
//!
//! A failed query is logged and counted; it never aborts the run. A run that
//! ends with an empty batch leaves the store untouched.

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::api::FetchError;
use crate::classify::ClassificationStrategy;
use crate::geo::{self, normalize_country};
use crate::models::{Item, RawArticle, RunCounters, StoreDocument, StoreMeta};
use crate::signals::extract_signals;
use crate::sources::{SearchWindow, Upstream};
use crate::store::merge::{merge_into, stable_id, MergeOutcome};
use crate::store::persist::{load_items, write_atomic};
use crate::store::retention::{prune, sort_newest_first};
use crate::topics::{self, catalog_refs, TOPICS};

/// Recorded when a hit names neither a domain nor a publisher.
pub const UNKNOWN_SOURCE: &str = "(unknown)";

/// Per-run knobs, already resolved from defaults, file and CLI.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub lookback: Duration,
    pub retention_days: i64,
    pub max_records: usize,
    pub dry_run: bool,
}

/// What happened to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The merged document replaced the store.
    Written,
    /// Nothing usable came back; the store was left as it was.
    Preserved,
    /// A document was built but not written.
    DryRun,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub meta: StoreMeta,
}

/// A hit and the topic whose query found it.
#[derive(Debug)]
struct Hit {
    origin: Option<&'static str>,
    article: RawArticle,
}

#[derive(Debug, Default)]
struct Collected {
    hits: Vec<Hit>,
    failed: usize,
}

pub struct Pipeline<P, F> {
    primary: P,
    fallback: F,
    strategy: Box<dyn ClassificationStrategy>,
    settings: RunSettings,
}

impl<P: Upstream, F: Upstream> Pipeline<P, F> {
    pub fn new(primary: P, fallback: F, strategy: Box<dyn ClassificationStrategy>, settings: RunSettings) -> Self {
        Self {
            primary,
            fallback,
            strategy,
            settings,
        }
    }

    /// Run every query against `upstream`, sequentially.
    async fn collect<U: Upstream>(
        &self,
        upstream: &U,
        queries: Vec<(Option<&'static str>, &str)>,
        window: &SearchWindow,
    ) -> Collected {
        let max_records = self.settings.max_records;
        let results: Vec<(Option<&'static str>, Result<Vec<RawArticle>, FetchError>)> = stream::iter(queries)
            .then(move |(origin, query)| async move { (origin, upstream.search(query, window, max_records).await) })
            .collect()
            .await;

        let mut collected = Collected::default();
        for (origin, result) in results {
            match result {
                Ok(articles) => {
                    info!(
                        upstream = upstream.name(),
                        topic = origin.unwrap_or("*"),
                        count = articles.len(),
                        "Query returned hits"
                    );
                    collected
                        .hits
                        .extend(articles.into_iter().map(|article| Hit { origin, article }));
                }
                Err(e) => {
                    warn!(
                        upstream = upstream.name(),
                        topic = origin.unwrap_or("*"),
                        error = %e,
                        "Query failed; continuing with the next one"
                    );
                    collected.failed += 1;
                }
            }
        }
        collected
    }

    /// Execute one run against the store at `store_path`, as of `now`.
    #[instrument(level = "info", skip_all, fields(store = %store_path.display(), strategy = self.strategy.name()))]
    pub async fn run(&self, store_path: &Path, now: DateTime<Utc>) -> Result<RunReport, Box<dyn Error>> {
        let window = SearchWindow {
            start: now - self.settings.lookback,
            end: now,
        };
        let existing = load_items(store_path).await;
        let plan = self.strategy.plan(TOPICS);
        info!(queries = plan.len(), %window.start, %window.end, "Planned queries");

        let mut source = self.primary.name();
        let primary_queries = plan.iter().map(|q| (q.origin, q.primary.as_str())).collect();
        let mut collected = self.collect(&self.primary, primary_queries, &window).await;

        if collected.hits.is_empty() {
            warn!(failed = collected.failed, "Primary upstream returned nothing; trying fallback");
            let fallback_queries = plan.iter().map(|q| (q.origin, q.fallback.as_str())).collect();
            let fallback = self.collect(&self.fallback, fallback_queries, &window).await;
            collected.failed += fallback.failed;
            if !fallback.hits.is_empty() {
                source = self.fallback.name();
                collected.hits = fallback.hits;
            }
        }

        let mut counters = RunCounters {
            fetched: collected.hits.len(),
            ..Default::default()
        };
        let mut batch: BTreeMap<String, Item> = BTreeMap::new();

        for Hit { origin, article } in collected.hits {
            if article.url.trim().is_empty() || article.title.trim().is_empty() {
                continue;
            }
            if !geo::is_relevant(&article) {
                continue;
            }
            counters.relevant += 1;

            let Some(tags) = self.strategy.tag(origin, &article.text()) else {
                continue;
            };
            counters.tagged += 1;
            let item = build_item(article, &tags);
            if !item.signals.is_empty() {
                debug!(id = %item.id, signals = ?item.signals, "Extracted signals");
            }
            merge_into(&mut batch, item);
        }

        // Counted per merged item, so a URL found by several queries counts once.
        let per_topic = batch
            .values()
            .flat_map(|item| item.topics.iter().cloned())
            .counts()
            .into_iter()
            .collect::<BTreeMap<String, usize>>();

        let mut meta = StoreMeta {
            generated_at: now.to_rfc3339(),
            window_start: window.start.to_rfc3339(),
            window_end: window.end.to_rfc3339(),
            source: source.to_string(),
            strategy: self.strategy.name().to_string(),
            counters,
            per_topic,
            failed_queries: collected.failed,
        };

        if batch.is_empty() {
            warn!(
                fetched = meta.counters.fetched,
                relevant = meta.counters.relevant,
                failed_queries = meta.failed_queries,
                "No usable items this run; leaving store untouched"
            );
            return Ok(RunReport {
                outcome: RunOutcome::Preserved,
                meta,
            });
        }

        let mut store: BTreeMap<String, Item> = BTreeMap::new();
        for item in existing {
            merge_into(&mut store, item);
        }
        for item in batch.into_values() {
            match merge_into(&mut store, item) {
                MergeOutcome::Inserted => meta.counters.inserted += 1,
                MergeOutcome::Updated => meta.counters.updated += 1,
                MergeOutcome::Unchanged => {}
            }
        }

        let (kept, pruned) = prune(store.into_values().collect(), now, self.settings.retention_days);
        let items = sort_newest_first(kept);
        meta.counters.pruned = pruned;
        meta.counters.stored = items.len();

        info!(
            source = %meta.source,
            fetched = meta.counters.fetched,
            relevant = meta.counters.relevant,
            tagged = meta.counters.tagged,
            inserted = meta.counters.inserted,
            updated = meta.counters.updated,
            pruned = meta.counters.pruned,
            stored = meta.counters.stored,
            "Merged run into store"
        );

        if self.settings.dry_run {
            info!("Dry run; store not written");
            return Ok(RunReport {
                outcome: RunOutcome::DryRun,
                meta,
            });
        }

        let document = StoreDocument {
            meta,
            topics: catalog_refs(),
            items,
        };
        write_atomic(store_path, &document).await?;
        Ok(RunReport {
            outcome: RunOutcome::Written,
            meta: document.meta,
        })
    }
}

/// Turn a relevant, tagged hit into a store item.
fn build_item(article: RawArticle, tags: &BTreeSet<&'static str>) -> Item {
    let text = article.text();
    let placement = geo::detect_region_and_country(&article);
    let signals = extract_signals(&text);
    let topic_labels = tags
        .iter()
        .filter_map(|key| topics::find(key))
        .map(|topic| topic.label.to_string())
        .collect();
    let source_country = article
        .source_country
        .as_deref()
        .map(|raw| normalize_country(Some(raw)).unwrap_or(raw).to_string());
    let source = article
        .domain
        .or(article.source_name)
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

    Item {
        id: stable_id(&article.url),
        title: article.title.trim().to_string(),
        url: article.url,
        source: Some(source),
        source_country,
        published: article.published,
        topics: tags.iter().map(|key| key.to_string()).collect(),
        topic_labels,
        region: placement.region,
        country: placement.country,
        signals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{ok, rate_limited, ScriptedTransport};
    use crate::api::{BackoffPolicy, Fetcher, HttpReply, RateLimiter};
    use crate::classify::StrategyKind;
    use crate::models::Signals;
    use crate::sources::gdelt::{GdeltSource, GDELT_DOC_ENDPOINT};
    use crate::sources::google_news::{GoogleNewsSource, GOOGLE_NEWS_ENDPOINT};
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tokio::fs;

    type Replies = Vec<Result<HttpReply, FetchError>>;
    type TestPipeline = Pipeline<GdeltSource<Arc<ScriptedTransport>>, GoogleNewsSource<Arc<ScriptedTransport>>>;

    const GDELT_BODY: &str = r#"{"articles": [
        {"url": "https://example.ca/acme-expanding", "title": "Acme expanding warehouse in Ontario",
         "seendate": "20260107T120000Z", "domain": "example.ca", "sourcecountry": "Canada"},
        {"url": "https://example.com/bakery", "title": "Local bakery wins award",
         "seendate": "20260107T110000Z", "domain": "example.com", "sourcecountry": "France"},
        {"url": "https://example.com/untitled", "title": "", "seendate": "20260107T100000Z"},
        {"url": "https://example.com/ohio",
         "title": "Retailer opens new distribution center in Ohio with $2.5 million investment creating 120 jobs",
         "seendate": "20260106T090000Z", "domain": "example.com", "sourcecountry": "United States"}
    ]}"#;

    const FEED_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>search</title>
  <item>
    <title>Maple Foods opening a new distribution centre in Manitoba - Winnipeg Free Press</title>
    <link>https://news.google.com/rss/articles/xyz</link>
    <pubDate>Tue, 06 Jan 2026 15:00:00 GMT</pubDate>
    <source url="https://www.winnipegfreepress.com">Winnipeg Free Press</source>
  </item>
</channel></rss>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 7, 14, 0, 0).unwrap()
    }

    fn fetcher(transport: Arc<ScriptedTransport>) -> Fetcher<Arc<ScriptedTransport>> {
        Fetcher::new(
            transport,
            RateLimiter::new(StdDuration::from_millis(1)),
            BackoffPolicy {
                max_attempts: 2,
                base_delay: StdDuration::from_secs(1),
                max_delay: StdDuration::from_secs(2),
            },
        )
    }

    fn pipeline(
        primary: Replies,
        fallback: Replies,
        strategy: StrategyKind,
        dry_run: bool,
    ) -> (TestPipeline, Arc<ScriptedTransport>, Arc<ScriptedTransport>) {
        let primary_transport = Arc::new(ScriptedTransport::new(primary));
        let fallback_transport = Arc::new(ScriptedTransport::new(fallback));
        let pipeline = Pipeline::new(
            GdeltSource::new(fetcher(primary_transport.clone()), GDELT_DOC_ENDPOINT),
            GoogleNewsSource::new(fetcher(fallback_transport.clone()), GOOGLE_NEWS_ENDPOINT),
            strategy.build(),
            RunSettings {
                lookback: Duration::hours(48),
                retention_days: 30,
                max_records: 250,
                dry_run,
            },
        );
        (pipeline, primary_transport, fallback_transport)
    }

    fn stored(url: &str, title: &str, published: Option<&str>, keys: &[&str]) -> Item {
        Item {
            id: stable_id(url),
            title: title.to_string(),
            url: url.to_string(),
            source: Some("example.ca".to_string()),
            source_country: Some("CA".to_string()),
            published: published.map(str::to_string),
            topics: keys.iter().map(|k| k.to_string()).collect(),
            topic_labels: keys
                .iter()
                .filter_map(|t| topics::find(t))
                .map(|t| t.label.to_string())
                .collect(),
            region: None,
            country: Some("CA".to_string()),
            signals: Signals::default(),
        }
    }

    async fn read_document(path: &Path) -> StoreDocument {
        serde_json::from_str(&fs::read_to_string(path).await.unwrap()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_merges_into_existing_store() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");
        let existing = serde_json::json!({
            "items": [
                stored("https://example.ca/acme-expanding", "Acme lease", Some("20260105T080000Z"), &["real_estate_signal"]),
                stored("https://example.ca/old", "Old news", Some("20251101T000000Z"), &["facility_new"]),
                stored("https://example.ca/undated", "Undated", None, &["risk_urgency"]),
            ]
        });
        fs::write(&path, existing.to_string()).await.unwrap();

        let (pipeline, primary, fallback) =
            pipeline(vec![Ok(ok(GDELT_BODY))], Vec::new(), StrategyKind::PerTopic, false);
        let report = pipeline.run(&path, now()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Written);
        assert_eq!(primary.call_count(), TOPICS.len());
        assert_eq!(fallback.call_count(), 0);

        let counters = &report.meta.counters;
        assert_eq!(counters.fetched, 4);
        assert_eq!(counters.relevant, 2);
        assert_eq!(counters.tagged, 2);
        assert_eq!(counters.inserted, 1);
        assert_eq!(counters.updated, 1);
        assert_eq!(counters.pruned, 1);
        assert_eq!(counters.stored, 3);
        assert_eq!(report.meta.per_topic.get("facility_new"), Some(&2));
        assert_eq!(report.meta.per_topic.get("facility_expansion"), Some(&1));
        assert_eq!(report.meta.failed_queries, 0);

        let doc = read_document(&path).await;
        assert_eq!(doc.meta.source, "GDELT 2.1 Doc API");
        assert_eq!(doc.meta.strategy, "per_topic");
        assert_eq!(doc.topics.len(), 9);

        let urls: Vec<&str> = doc.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://example.com/ohio", "https://example.ca/acme-expanding", "https://example.ca/undated"]
        );

        let acme = &doc.items[1];
        assert_eq!(acme.title, "Acme lease");
        assert_eq!(acme.published.as_deref(), Some("20260105T080000Z"));
        assert_eq!(acme.region.as_deref(), Some("Ontario"));
        let keys: Vec<&str> = acme.topics.iter().map(String::as_str).collect();
        assert_eq!(keys, ["facility_expansion", "facility_new", "real_estate_signal"]);
        assert_eq!(acme.topic_labels.len(), 3);

        let ohio = &doc.items[0];
        assert_eq!(ohio.id, stable_id("https://example.com/ohio"));
        assert_eq!(ohio.source.as_deref(), Some("example.com"));
        assert_eq!(ohio.source_country.as_deref(), Some("US"));
        assert_eq!(ohio.region.as_deref(), Some("Ohio"));
        assert_eq!(ohio.country.as_deref(), Some("US"));
        assert_eq!(ohio.signals.investment_usd, Some(2_500_000.0));
        assert_eq!(ohio.signals.jobs, Some(120.0));
        assert_eq!(ohio.published.as_deref(), Some("20260106T090000Z"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_topic_counts_follow_merged_items() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");
        let body = r#"{"articles": [{"url": "https://example.ca/acme-expanding",
            "title": "Acme expanding warehouse in Ontario", "sourcecountry": "Canada"}]}"#;

        // The first two topic queries both return the same story.
        let (pipeline, _, _) = pipeline(
            vec![Ok(ok(body)), Ok(ok(body))],
            Vec::new(),
            StrategyKind::PerTopic,
            false,
        );
        let report = pipeline.run(&path, now()).await.unwrap();

        assert_eq!(report.meta.counters.tagged, 2);
        assert_eq!(report.meta.counters.stored, 1);
        assert_eq!(report.meta.per_topic.get("facility_new"), Some(&1));
        assert_eq!(report.meta.per_topic.get("facility_expansion"), Some(&1));
        assert_eq!(report.meta.per_topic.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_primary_recovers_without_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");

        let (pipeline, primary, fallback) = pipeline(
            vec![Ok(rate_limited("5")), Ok(ok(GDELT_BODY))],
            Vec::new(),
            StrategyKind::Broad,
            false,
        );
        let report = pipeline.run(&path, now()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Written);
        assert_eq!(primary.call_count(), 2);
        assert_eq!(fallback.call_count(), 0);
        assert_eq!(report.meta.failed_queries, 0);
        assert_eq!(read_document(&path).await.meta.source, "GDELT 2.1 Doc API");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_identical_run_changes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");

        let (first, _, _) = pipeline(vec![Ok(ok(GDELT_BODY))], Vec::new(), StrategyKind::PerTopic, false);
        first.run(&path, now()).await.unwrap();
        let before = read_document(&path).await.items;

        let (second, _, _) = pipeline(vec![Ok(ok(GDELT_BODY))], Vec::new(), StrategyKind::PerTopic, false);
        let report = second.run(&path, now()).await.unwrap();

        assert_eq!(report.meta.counters.inserted, 0);
        assert_eq!(report.meta.counters.updated, 0);
        assert_eq!(read_document(&path).await.items, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_run_preserves_store() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");
        let original = r#"{"meta": {"source": "old"}, "items": [{"id": "k", "url": "https://example.com/k", "title": "K"}]}"#;
        fs::write(&path, original).await.unwrap();

        // Primary answers empty bodies; the fallback answers bodies that are not feeds.
        let (pipeline, _, fallback) = pipeline(Vec::new(), Vec::new(), StrategyKind::PerTopic, false);
        let report = pipeline.run(&path, now()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Preserved);
        assert_eq!(report.meta.failed_queries, TOPICS.len());
        assert_eq!(fallback.call_count(), TOPICS.len() * 2);
        assert_eq!(fs::read_to_string(&path).await.unwrap(), original);
    }

    #[tokio::test(start_paused = true)]
    async fn test_irrelevant_hits_do_not_create_store() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");
        let body = r#"{"articles": [{"url": "https://example.fr/a", "title": "Local bakery wins award", "sourcecountry": "France"}]}"#;

        let (pipeline, _, fallback) = pipeline(vec![Ok(ok(body))], Vec::new(), StrategyKind::Broad, false);
        let report = pipeline.run(&path, now()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Preserved);
        assert_eq!(report.meta.counters.fetched, 1);
        assert_eq!(report.meta.counters.relevant, 0);
        assert_eq!(fallback.call_count(), 0);
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_used_when_primary_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");

        let (pipeline, primary, fallback) =
            pipeline(vec![Ok(ok(""))], vec![Ok(ok(FEED_BODY))], StrategyKind::Broad, false);
        let report = pipeline.run(&path, now()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Written);
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
        assert!(fallback.urls()[0].contains("when%3A2d"));

        let doc = read_document(&path).await;
        assert_eq!(doc.meta.source, "Google News RSS");
        assert_eq!(doc.meta.strategy, "broad");
        assert_eq!(doc.items.len(), 1);
        let item = &doc.items[0];
        assert_eq!(item.title, "Maple Foods opening a new distribution centre in Manitoba");
        assert_eq!(item.source.as_deref(), Some("winnipegfreepress.com"));
        assert_eq!(item.region.as_deref(), Some("Manitoba"));
        assert_eq!(item.country.as_deref(), Some("CA"));
        assert_eq!(item.source_country, None);
        assert!(item.topics.contains("facility_new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_skips_write() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");

        let (pipeline, _, _) = pipeline(vec![Ok(ok(GDELT_BODY))], Vec::new(), StrategyKind::Broad, true);
        let report = pipeline.run(&path, now()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::DryRun);
        assert_eq!(report.meta.counters.stored, 2);
        assert!(!path.exists());
    }

    #[test]
    fn test_build_item_source_fallbacks() {
        let tags = BTreeSet::from(["facility_new"]);
        let article = RawArticle {
            title: "  New plant  ".to_string(),
            url: "https://example.com/p".to_string(),
            source_name: Some("Trade Weekly".to_string()),
            source_country: Some("Mexico".to_string()),
            ..Default::default()
        };
        let item = build_item(article, &tags);
        assert_eq!(item.title, "New plant");
        assert_eq!(item.source.as_deref(), Some("Trade Weekly"));
        assert_eq!(item.source_country.as_deref(), Some("Mexico"));
        assert_eq!(item.topic_labels.len(), 1);

        let bare = RawArticle {
            title: "x".to_string(),
            url: "https://example.com/q".to_string(),
            ..Default::default()
        };
        assert_eq!(build_item(bare, &tags).source.as_deref(), Some(UNKNOWN_SOURCE));
    }
}
