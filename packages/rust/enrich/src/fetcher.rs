//! Content fetching and text extraction for enrichment sources.
//!
//! The fetcher retrieves one URL and extracts plain text from it: PDF pages
//! via lopdf, or a single secondary card fetch for links into the model-card
//! registry. All failures are converted to inline diagnostic strings so one
//! bad link never aborts an enrichment pass.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use cardcomply_shared::{
    CardComplyError, EnrichConfig, ExtractedContent, Result, SourceKind,
};

/// User-Agent string for enrichment requests.
const USER_AGENT: &str = concat!("CardComply/", env!("CARGO_PKG_VERSION"));

/// Maximum redirects to follow per fetch.
const MAX_REDIRECTS: usize = 5;

/// Truncation marker appended when extracted text exceeds the char budget.
const TRUNCATION_MARKER: &str = "\n[... Content Truncated ...]";

/// Model-card registry host.
const REGISTRY_HOST: &str = "huggingface.co";

static MODEL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"huggingface\.co/([^/?#]+/[^/?#]+)").expect("valid model id regex")
});

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Fetches one enrichment source and extracts plain text from it.
pub struct Fetcher {
    client: Client,
    config: EnrichConfig,
}

impl Fetcher {
    /// Create a fetcher with the given enrichment limits.
    pub fn new(config: EnrichConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| {
                CardComplyError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Fetch a URL and return formatted extra context, a diagnostic string,
    /// or an empty string when nothing could be extracted.
    ///
    /// This never returns an error: remote failures become inline
    /// diagnostics embedded in the enrichment output. The one exception is
    /// a failed secondary card fetch, which yields empty text with no
    /// message.
    pub async fn fetch_extra_info(&self, url: &str) -> String {
        let url = normalize_arxiv_url(url);
        debug!(%url, "fetching extra info");

        match self.fetch_inner(&url).await {
            Ok(Fetched::Skipped(diagnostic)) => diagnostic,
            Ok(Fetched::Content(content)) => {
                if content.text.trim().is_empty() {
                    String::new()
                } else {
                    self.format_block(&content)
                }
            }
            Err(e) => {
                debug!(%url, error = %e, "fetch failed");
                format!("\n[Error fetching info from {url}: {e}]")
            }
        }
    }

    async fn fetch_inner(&self, url: &str) -> Result<Fetched> {
        let response = self.get(url).await?;

        let content_length = response.content_length().unwrap_or(0);

        // Declared-size ceiling: protects memory against adversarial cards.
        if content_length > self.config.max_content_bytes {
            return Ok(Fetched::Skipped(format!(
                "\n[Skipped link {url}: File too large ({content_length} bytes)]"
            )));
        }

        // GitHub blob views wrap the PDF in HTML; re-issue against the raw
        // host exactly once.
        if is_github_blob_pdf(url) {
            let raw_url = url
                .replace("github.com", "raw.githubusercontent.com")
                .replace("/blob/", "/");
            debug!(%raw_url, "rewrote GitHub blob link to raw");

            return match self.get(&raw_url).await {
                Ok(raw_response) => self.extract(&raw_url, raw_response).await,
                Err(e) => Ok(Fetched::Skipped(format!(
                    "\n[Error fetching raw PDF from {raw_url}: {e}]"
                ))),
            };
        }

        self.extract(url, response).await
    }

    /// Classify a response by content type / URL shape and extract text.
    async fn extract(&self, url: &str, response: reqwest::Response) -> Result<Fetched> {
        let content_type = header_lowercase(&response, reqwest::header::CONTENT_TYPE);

        if content_type.contains("application/pdf") || url.to_lowercase().ends_with(".pdf") {
            return self.extract_pdf(url, response).await;
        }

        if let Some(model_id) = registry_model_id(url) {
            // Depth-1 only: the linked card's own links are never followed.
            let text = self.fetch_linked_card(&model_id).await;
            return Ok(Fetched::Content(ExtractedContent {
                kind: SourceKind::LinkedModelCard(model_id),
                text,
                origin_url: url.to_string(),
            }));
        }

        // No extractor matched; empty result is valid, not an error.
        Ok(Fetched::Content(ExtractedContent {
            kind: SourceKind::Unknown,
            text: String::new(),
            origin_url: url.to_string(),
        }))
    }

    /// Buffer a PDF response and extract text page by page, up to the page cap.
    async fn extract_pdf(&self, url: &str, response: reqwest::Response) -> Result<Fetched> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CardComplyError::Network(format!("{url}: body read failed: {e}")))?;

        let text = extract_pdf_text(&bytes, self.config.max_pdf_pages)?;

        Ok(Fetched::Content(ExtractedContent {
            kind: SourceKind::PdfPaper,
            text,
            origin_url: url.to_string(),
        }))
    }

    /// Fetch the raw card text for a registry model id.
    ///
    /// Any failure here is swallowed to empty text: this is the documented
    /// asymmetry with other fetch failures, which do surface diagnostics.
    async fn fetch_linked_card(&self, model_id: &str) -> String {
        let card_url = format!("https://{REGISTRY_HOST}/{model_id}/raw/main/README.md");

        match self.get(&card_url).await {
            Ok(response) => response.text().await.unwrap_or_default(),
            Err(e) => {
                warn!(model_id, error = %e, "linked card fetch failed, dropping silently");
                String::new()
            }
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CardComplyError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CardComplyError::Network(format!("{url}: HTTP {status}")));
        }

        Ok(response)
    }

    /// Truncate to the char budget and wrap in an attributable header block.
    fn format_block(&self, content: &ExtractedContent) -> String {
        let mut text: String = content
            .text
            .chars()
            .take(self.config.truncate_chars)
            .collect();
        if content.text.chars().count() > self.config.truncate_chars {
            text.push_str(TRUNCATION_MARKER);
        }

        let rule = "=".repeat(20);
        format!(
            "\n\n{rule}\nEXTRA CONTEXT FETCHED FROM: {kind}\nURL: {url}\n{rule}\n{text}\n",
            kind = content.kind,
            url = content.origin_url,
        )
    }
}

/// Outcome of one fetch attempt.
enum Fetched {
    /// Extracted content (text may be empty).
    Content(ExtractedContent),
    /// Fetch deliberately not performed or abandoned; carries the diagnostic.
    Skipped(String),
}

// ---------------------------------------------------------------------------
// URL normalization
// ---------------------------------------------------------------------------

/// Rewrite an arXiv abstract link to its canonical PDF path.
fn normalize_arxiv_url(url: &str) -> String {
    if !url.contains("arxiv.org/abs/") {
        return url.to_string();
    }

    let mut rewritten = url.replace("arxiv.org/abs/", "arxiv.org/pdf/");
    if !rewritten.ends_with(".pdf") {
        rewritten.push_str(".pdf");
    }
    debug!(%rewritten, "rewrote arXiv abstract link to PDF");
    rewritten
}

/// Is this a GitHub "blob" view of a PDF?
fn is_github_blob_pdf(url: &str) -> bool {
    url.contains("github.com") && url.contains("/blob/") && url.to_lowercase().ends_with(".pdf")
}

/// Extract a `namespace/name` model id from a registry URL.
///
/// Raw-resource URLs (`/resolve/`) are not cards and are skipped.
fn registry_model_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host != REGISTRY_HOST && !host.ends_with(&format!(".{REGISTRY_HOST}")) {
        return None;
    }
    if parsed.path().contains("/resolve/") {
        return None;
    }

    MODEL_ID_RE
        .captures(url)
        .map(|c| c[1].to_string())
}

/// Extract text from an in-memory PDF, page by page, up to `max_pages`.
fn extract_pdf_text(bytes: &[u8], max_pages: usize) -> Result<String> {
    let mut document = lopdf::Document::load_mem(bytes)
        .map_err(|e| CardComplyError::parse(format!("failed to load PDF: {e}")))?;

    if document.is_encrypted() && document.decrypt("").is_err() {
        return Err(CardComplyError::parse(
            "cannot decrypt password-protected PDF",
        ));
    }

    document.decompress();

    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();
    page_numbers.truncate(max_pages);

    let mut pages_text = Vec::new();
    for number in page_numbers {
        match document.extract_text(&[number]) {
            Ok(text) if !text.trim().is_empty() => pages_text.push(text.trim().to_string()),
            Ok(_) => {}
            Err(e) => debug!(page = number, error = %e, "page extraction failed, skipping"),
        }
    }

    Ok(pages_text.join("\n"))
}

fn header_lowercase(response: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase()
}
