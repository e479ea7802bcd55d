use url::Url;

/// Acquisition channel derived from the referrer at persistence time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferrerCategory {
    Direct,
    Search,
    Social,
    External,
}

impl ReferrerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferrerCategory::Direct => "direct",
            ReferrerCategory::Search => "search",
            ReferrerCategory::Social => "social",
            ReferrerCategory::External => "external",
        }
    }
}

const SEARCH_ENGINES: &[&str] = &[
    "google.",
    "bing.com",
    "duckduckgo.com",
    "search.yahoo.",
    "baidu.com",
    "yandex.",
    "ecosia.org",
    "startpage.com",
    "qwant.com",
    "search.brave.com",
];

const SOCIAL_NETWORKS: &[&str] = &[
    "facebook.com",
    "fb.com",
    "twitter.com",
    "x.com",
    "t.co",
    "instagram.com",
    "linkedin.com",
    "reddit.com",
    "pinterest.",
    "tiktok.com",
    "youtube.com",
    "youtu.be",
    "news.ycombinator.com",
    "mastodon.",
    "threads.net",
];

/// Extract the referrer's domain: URL host, lowercased, with a leading
/// `www.` label stripped. Returns `None` for empty or malformed referrers.
pub fn extract_referrer_domain(referrer: &str) -> Option<String> {
    if referrer.is_empty() {
        return None;
    }
    let parsed = Url::parse(referrer).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let domain = host.strip_prefix("www.").unwrap_or(&host);
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_string())
    }
}

/// Classify a referrer into Direct / Search / Social / External and return
/// the derived domain alongside.
///
/// Absent, empty, and malformed referrers all classify as Direct — a broken
/// referrer string is ordinary traffic, not an error.
pub fn classify_referrer(referrer: Option<&str>) -> (ReferrerCategory, Option<String>) {
    let Some(domain) = referrer.and_then(extract_referrer_domain) else {
        return (ReferrerCategory::Direct, None);
    };

    let category = if SEARCH_ENGINES.iter().any(|s| domain.contains(s)) {
        ReferrerCategory::Search
    } else if SOCIAL_NETWORKS.iter().any(|s| domain.contains(s)) {
        ReferrerCategory::Social
    } else {
        ReferrerCategory::External
    };

    (category, Some(domain))
}
