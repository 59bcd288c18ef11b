//! US/Canada relevance filtering and region detection.
//!
//! Relevance is decided from, in order: the upstream source-country hint, a
//! Canadian host TLD, then keyword matches in title and snippet. Region
//! detection uses the same signals but prefers a named province or state
//! when the text has one.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::models::RawArticle;

pub const US_STATES: &[&str] = &[
    "Alabama", "Alaska", "Arizona", "Arkansas", "California", "Colorado", "Connecticut",
    "Delaware", "Florida", "Georgia", "Hawaii", "Idaho", "Illinois", "Indiana", "Iowa",
    "Kansas", "Kentucky", "Louisiana", "Maine", "Maryland", "Massachusetts", "Michigan",
    "Minnesota", "Mississippi", "Missouri", "Montana", "Nebraska", "Nevada",
    "New Hampshire", "New Jersey", "New Mexico", "New York", "North Carolina",
    "North Dakota", "Ohio", "Oklahoma", "Oregon", "Pennsylvania", "Rhode Island",
    "South Carolina", "South Dakota", "Tennessee", "Texas", "Utah", "Vermont",
    "Virginia", "Washington", "West Virginia", "Wisconsin", "Wyoming",
    "District of Columbia",
];

pub const CA_PROVINCES: &[&str] = &[
    "Alberta", "British Columbia", "Manitoba", "New Brunswick", "Newfoundland",
    "Newfoundland and Labrador", "Nova Scotia", "Northwest Territories", "Nunavut",
    "Ontario", "Prince Edward Island", "Quebec", "Saskatchewan", "Yukon",
];

pub const US: &str = "US";
pub const CA: &str = "CA";

static CANADA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:canada|canadian|québec)\b").expect("valid Canada regex"));

static USA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:united\s+states|usa)\b|\bU\.S\.").expect("valid USA regex")
});

/// Word-bounded, case-insensitive matchers, longest name first so that
/// "West Virginia" is reported instead of "Virginia".
fn compile_names(names: &[&'static str]) -> Vec<(&'static str, Regex)> {
    let mut sorted: Vec<&'static str> = names.to_vec();
    sorted.sort_by_key(|n| std::cmp::Reverse(n.len()));
    sorted
        .into_iter()
        .map(|name| {
            let pattern = regex::escape(name).replace(' ', r"\s+");
            let re = Regex::new(&format!(r"(?i)\b{}\b", pattern)).expect("valid region regex");
            (name, re)
        })
        .collect()
}

static PROVINCE_RES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| compile_names(CA_PROVINCES));
static STATE_RES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| compile_names(US_STATES));

/// Map a free-form upstream country hint to `US`/`CA`.
///
/// GDELT reports full names ("United States"), other sources use codes.
pub fn normalize_country(raw: Option<&str>) -> Option<&'static str> {
    let value = raw?.trim().to_ascii_uppercase();
    match value.as_str() {
        "US" | "USA" | "UNITED STATES" | "UNITED STATES OF AMERICA" => Some(US),
        "CA" | "CAN" | "CANADA" => Some(CA),
        _ => None,
    }
}

/// True when the URL host is under the `.ca` TLD.
pub fn has_canadian_host(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_end_matches('.').to_ascii_lowercase()))
        .is_some_and(|host| host.ends_with(".ca"))
}

fn find_province(text: &str) -> Option<&'static str> {
    PROVINCE_RES.iter().find(|(_, re)| re.is_match(text)).map(|(name, _)| *name)
}

fn find_state(text: &str) -> Option<&'static str> {
    STATE_RES.iter().find(|(_, re)| re.is_match(text)).map(|(name, _)| *name)
}

fn mentions_canada(text: &str) -> bool {
    CANADA_RE.is_match(text) || find_province(text).is_some()
}

fn mentions_usa(text: &str) -> bool {
    USA_RE.is_match(text) || find_state(text).is_some()
}

/// Decide whether an article concerns the US or Canada.
pub fn is_relevant(article: &RawArticle) -> bool {
    if normalize_country(article.source_country.as_deref()).is_some() {
        return true;
    }
    if has_canadian_host(&article.url) {
        return true;
    }
    let text = article.text();
    mentions_canada(&text) || mentions_usa(&text)
}

/// Region and country resolved for an article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    /// Named state or province, when the text has one.
    pub region: Option<String>,
    /// `US` or `CA`.
    pub country: Option<String>,
}

impl Placement {
    fn new(region: Option<&str>, country: Option<&str>) -> Self {
        Self {
            region: region.map(str::to_string),
            country: country.map(str::to_string),
        }
    }
}

/// Resolve a specific region and country for an article.
///
/// Provinces are checked before states. Without a named region, falls back
/// to the source-country hint, the host TLD, and finally country keywords.
pub fn detect_region_and_country(article: &RawArticle) -> Placement {
    let text = article.text();

    if let Some(province) = find_province(&text) {
        return Placement::new(Some(province), Some(CA));
    }
    if let Some(state) = find_state(&text) {
        return Placement::new(Some(state), Some(US));
    }
    if let Some(country) = normalize_country(article.source_country.as_deref()) {
        return Placement::new(None, Some(country));
    }
    if has_canadian_host(&article.url) || CANADA_RE.is_match(&text) {
        return Placement::new(None, Some(CA));
    }
    if USA_RE.is_match(&text) {
        return Placement::new(None, Some(US));
    }
    Placement::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str, title: &str) -> RawArticle {
        RawArticle {
            url: url.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ontario_scenario() {
        let a = article("https://x.ca/a", "Ontario warehouse expansion");
        assert!(has_canadian_host(&a.url));
        assert!(is_relevant(&a));
        assert_eq!(
            detect_region_and_country(&a),
            Placement::new(Some("Ontario"), Some("CA"))
        );
    }

    #[test]
    fn test_source_country_alone_is_relevant() {
        let mut a = article("https://example.com/story", "Plant opens downtown");
        a.source_country = Some("United States".to_string());
        assert!(is_relevant(&a));
        assert_eq!(detect_region_and_country(&a), Placement::new(None, Some("US")));
    }

    #[test]
    fn test_named_region_beats_source_country() {
        let mut a = article("https://example.com/story", "New DC coming to Quebec");
        a.source_country = Some("US".to_string());
        assert_eq!(
            detect_region_and_country(&a),
            Placement::new(Some("Quebec"), Some("CA"))
        );
    }

    #[test]
    fn test_longest_state_name_wins() {
        let a = article("https://example.com/s", "West Virginia plant adds 200 jobs");
        assert_eq!(
            detect_region_and_country(&a).region.as_deref(),
            Some("West Virginia")
        );

        let b = article("https://example.com/s", "Newfoundland and Labrador port upgrade");
        assert_eq!(
            detect_region_and_country(&b).region.as_deref(),
            Some("Newfoundland and Labrador")
        );
    }

    #[test]
    fn test_word_boundaries_prevent_partial_matches() {
        // "Arkansas" must not report "Kansas".
        let a = article("https://example.com/s", "Arkansas distribution center");
        assert_eq!(detect_region_and_country(&a).region.as_deref(), Some("Arkansas"));

        let b = article("https://example.com/s", "Ohioan startup raises funds in Berlin");
        assert!(!is_relevant(&b));
    }

    #[test]
    fn test_country_keywords_without_region() {
        let a = article("https://example.com/s", "Canadian grocer opens new warehouse");
        assert!(is_relevant(&a));
        assert_eq!(detect_region_and_country(&a), Placement::new(None, Some("CA")));

        let b = article("https://example.com/s", "U.S. automaker invests in robotics");
        assert!(is_relevant(&b));
        assert_eq!(detect_region_and_country(&b), Placement::new(None, Some("US")));
    }

    #[test]
    fn test_snippet_is_searched() {
        let mut a = article("https://example.com/s", "Retailer announces new DC");
        a.snippet = Some("The site near Calgary, Alberta will open in 2027".to_string());
        assert!(is_relevant(&a));
        assert_eq!(detect_region_and_country(&a).region.as_deref(), Some("Alberta"));
    }

    #[test]
    fn test_irrelevant_article() {
        let mut a = article("https://example.co.uk/s", "Factory closure in Manchester");
        a.source_country = Some("United Kingdom".to_string());
        assert!(!is_relevant(&a));
        assert_eq!(detect_region_and_country(&a), Placement::default());
    }

    #[test]
    fn test_normalize_country() {
        assert_eq!(normalize_country(Some(" us ")), Some("US"));
        assert_eq!(normalize_country(Some("Canada")), Some("CA"));
        assert_eq!(normalize_country(Some("Mexico")), None);
        assert_eq!(normalize_country(None), None);
    }

    #[test]
    fn test_canadian_host_requires_tld() {
        assert!(has_canadian_host("https://news.example.ca/story"));
        assert!(!has_canadian_host("https://canada.example.com/story"));
        assert!(!has_canadian_host("not a url"));
    }
}
