//! Bounded link enrichment for model cards.
//!
//! The orchestrator scans a source document for outbound links, scores each
//! (label, url) pair with the keyword classifier, and fetches the winners up
//! to a hard budget. The result is an annotated enrichment buffer plus the
//! ordered list of fetched URLs, so enriched output stays attributable.
//!
//! This is deliberately not a general crawler: enrichment is depth-1 only
//! and never issues more than `fetch_budget` outbound fetches per call.

mod classifier;
mod fetcher;

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument};

use cardcomply_shared::{EnrichConfig, EnrichmentResult, LinkCandidate, Result};

pub use classifier::should_fetch;
pub use fetcher::Fetcher;

/// Markdown links `[label](url)`. The optional leading `!` capture lets the
/// extractor drop image embeds, which the regex crate cannot express as a
/// look-behind.
static MD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[([^\]]+)\]\((https?://[^)\s]+)\)").expect("valid markdown link regex")
});

/// Anchor tags `<a href="url">label</a>`, case-insensitive, label may span
/// lines. Capture order is (url, label) and is normalized by the extractor.
static HTML_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s+(?:[^>]*?\s+)?href="([^"]*)"[^>]*>(.*?)</a>"#)
        .expect("valid anchor tag regex")
});

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Scans a card for relevant links and fetches their content.
pub struct Enricher {
    fetcher: Fetcher,
    fetch_budget: usize,
}

impl Enricher {
    /// Create an enricher with the given limits.
    pub fn new(config: EnrichConfig) -> Result<Self> {
        let fetch_budget = config.fetch_budget;
        Ok(Self {
            fetcher: Fetcher::new(config)?,
            fetch_budget,
        })
    }

    /// Enrich a source document by following its most relevant links.
    ///
    /// Candidates are visited in extraction order; only URLs already
    /// fetched in this call are skipped, so a URL rejected under one label
    /// can still be fetched when a later candidate carries it under a
    /// qualifying label. Iteration stops once the fetch budget is spent,
    /// regardless of how many qualifying candidates remain.
    #[instrument(skip_all, fields(budget = self.fetch_budget))]
    pub async fn enrich(&self, text: &str) -> EnrichmentResult {
        let candidates = extract_links(text);
        debug!(candidates = candidates.len(), "extracted link candidates");

        let mut appended_text = String::new();
        let mut fetched_urls: Vec<String> = Vec::new();

        for candidate in candidates {
            if fetched_urls.len() >= self.fetch_budget {
                break;
            }
            if fetched_urls.contains(&candidate.url) {
                continue;
            }
            if !should_fetch(&candidate) {
                continue;
            }

            appended_text.push_str(&self.fetcher.fetch_extra_info(&candidate.url).await);
            fetched_urls.push(candidate.url);
        }

        info!(
            fetched = fetched_urls.len(),
            appended_chars = appended_text.len(),
            "enrichment pass complete"
        );

        EnrichmentResult {
            appended_text,
            fetched_urls,
        }
    }
}

// ---------------------------------------------------------------------------
// Link extraction
// ---------------------------------------------------------------------------

/// Extract link candidates from card text, in document order per syntax.
///
/// Markdown links come first, then anchor tags; anchor captures are
/// normalized from (url, label) to the (label, url) shape used everywhere
/// else. Duplicate URLs across the two syntaxes are kept here and
/// deduplicated at fetch time.
pub fn extract_links(text: &str) -> Vec<LinkCandidate> {
    let mut candidates = Vec::new();

    for caps in MD_LINK_RE.captures_iter(text) {
        if &caps[1] == "!" {
            continue; // image embed, not a link
        }
        candidates.push(LinkCandidate::new(&caps[2], &caps[3]));
    }

    for caps in HTML_LINK_RE.captures_iter(text) {
        candidates.push(LinkCandidate::new(caps[2].trim(), &caps[1]));
    }

    candidates
}
