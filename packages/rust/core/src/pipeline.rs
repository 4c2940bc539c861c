//! Pipelines tying the crates together.
//!
//! `CardClient::fetch_card`: registry card text → link enrichment →
//! attributable assembled output. `render_report`: answer JSON →
//! template merge → retention store → download handle.

use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{info, instrument};

use cardcomply_enrich::Enricher;
use cardcomply_retention::RetentionStore;
use cardcomply_shared::{AnswerMap, CardComplyError, Result};

/// User-Agent string for card fetch requests.
const USER_AGENT: &str = concat!("CardComply/", env!("CARGO_PKG_VERSION"));

/// Answer key whose value names the report (and thus the artifact file).
const LABEL_ANSWER_KEY: &str = "model_name";

/// Fallback artifact label when no model name answer is present.
const DEFAULT_LABEL: &str = "compliance_doc";

// ---------------------------------------------------------------------------
// Card fetch
// ---------------------------------------------------------------------------

/// Configuration for the card-fetch pipeline.
#[derive(Debug, Clone)]
pub struct CardConfig {
    /// Base URL of the model-card registry.
    pub registry_base: String,
    /// Timeout for the primary card fetch, in seconds.
    pub timeout_secs: u64,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            registry_base: "https://huggingface.co".into(),
            timeout_secs: 10,
        }
    }
}

/// Assembled output of a card fetch: sources summary + card + enrichment.
#[derive(Debug, Clone)]
pub struct CardFetchResult {
    /// The requested `namespace/name` id.
    pub model_id: String,
    /// Full assembled text (sources summary, card content, extra context).
    pub text: String,
    /// URLs followed during enrichment, in fetch order.
    pub sources: Vec<String>,
}

/// Registry card fetcher. Built once; the HTTP client is reused across
/// requests.
#[derive(Debug, Clone)]
pub struct CardClient {
    client: reqwest::Client,
    config: CardConfig,
}

impl CardClient {
    /// Build the client with the configured timeout.
    pub fn new(config: CardConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CardComplyError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Fetch a model card by id, enrich it by following its most relevant
    /// links, and assemble the result with an explicit source listing.
    #[instrument(skip(self, enricher))]
    pub async fn fetch_card(&self, enricher: &Enricher, model_id: &str) -> Result<CardFetchResult> {
        if !model_id.contains('/') || model_id.contains("..") {
            return Err(CardComplyError::validation(format!(
                "model id must have the form namespace/name, got '{model_id}'"
            )));
        }

        let original_text = self.fetch_card_text(model_id).await?;
        let enrichment = enricher.enrich(&original_text).await;

        let source_summary = build_source_summary(model_id, &enrichment.fetched_urls);
        let rule = "=".repeat(40);
        let text = format!(
            "{source_summary}\n\n{rule}\nMODEL CARD CONTENT:\n{rule}\n\n{original_text}\n{extra}",
            extra = enrichment.appended_text,
        );

        info!(
            model_id,
            sources = enrichment.fetched_urls.len(),
            chars = text.len(),
            "card fetched and enriched"
        );

        Ok(CardFetchResult {
            model_id: model_id.to_string(),
            text,
            sources: enrichment.fetched_urls,
        })
    }

    /// Fetch the raw card markdown from the registry.
    async fn fetch_card_text(&self, model_id: &str) -> Result<String> {
        let url = format!("{}/{model_id}/raw/main/README.md", self.config.registry_base);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CardComplyError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CardComplyError::NotFound(format!(
                "model or model card not found for id '{model_id}'"
            )));
        }
        if !status.is_success() {
            return Err(CardComplyError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| CardComplyError::Network(format!("{url}: body read failed: {e}")))
    }
}

/// List the primary card and every followed link, numbered in order.
fn build_source_summary(model_id: &str, sources: &[String]) -> String {
    if sources.is_empty() {
        return format!(
            "SOURCES USED:\n1. Model card for '{model_id}' (Primary)\n   \
             - No additional relevant links found or followed."
        );
    }

    let mut lines = vec![format!("1. Model card for '{model_id}' (Primary)")];
    for (i, source) in sources.iter().enumerate() {
        lines.push(format!("{}. External Link: {source}", i + 2));
    }
    format!("SOURCES USED:\n{}", lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Report rendering
// ---------------------------------------------------------------------------

/// Configuration for the render pipeline.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Path to the DOCX report template.
    pub template_path: PathBuf,
    /// Public base URL for absolute download links (None = relative).
    pub public_url: Option<String>,
}

/// A rendered, stored compliance report.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    /// Artifact filename inside the retention store.
    pub filename: String,
    /// Relative download path (`/download/<filename>`).
    pub download_path: String,
    /// Absolute link when a public base URL is configured, else relative.
    pub link: String,
    /// Rendered document bytes.
    pub bytes: Vec<u8>,
    /// Base64 copy of the document for embedded transport.
    pub document_b64: String,
}

/// Render the compliance template with an answer map and store the result.
///
/// The answer JSON must be an object; anything else is rejected up front.
/// A missing template is fatal to this operation only.
#[instrument(skip_all)]
pub fn render_report(
    config: &RenderConfig,
    store: &RetentionStore,
    answers_json: &str,
) -> Result<RenderedReport> {
    let answers: AnswerMap = serde_json::from_str(answers_json)
        .map_err(|e| CardComplyError::validation(format!("invalid JSON answer map: {e}")))?;

    let template = std::fs::read(&config.template_path).map_err(|_| {
        CardComplyError::NotFound(format!(
            "template not found at {}",
            config.template_path.display()
        ))
    })?;

    let mut rendered = Cursor::new(Vec::new());
    cardcomply_template::fill_template(Cursor::new(template), &mut rendered, &answers)?;
    let bytes = rendered.into_inner();

    let label = answers
        .get(LABEL_ANSWER_KEY)
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| DEFAULT_LABEL.to_string());

    let filename = store.store(&bytes, &label)?;
    let download_path = format!("/download/{filename}");
    let link = match &config.public_url {
        Some(base) => format!("{base}{download_path}"),
        None => download_path.clone(),
    };

    info!(%filename, len = bytes.len(), "report rendered and stored");

    Ok(RenderedReport {
        filename,
        download_path,
        link,
        document_b64: BASE64.encode(&bytes),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    /// Build a one-paragraph docx template on disk.
    fn write_template(dir: &std::path::Path) -> PathBuf {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Report for {{model_name}}, GPAI: {{is_gpai}}</w:t></w:r></w:p></w:body></w:document>"#;

        let path = dir.join("template.docx");
        let file = std::fs::File::create(&path).expect("create template");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("word/document.xml", options)
            .expect("entry");
        writer.write_all(xml.as_bytes()).expect("write");
        writer.finish().expect("finish");
        path
    }

    fn test_store(dir: &std::path::Path) -> RetentionStore {
        RetentionStore::open(dir.join("store"), Duration::from_secs(24 * 3600)).expect("store")
    }

    #[test]
    fn render_report_stores_and_links() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RenderConfig {
            template_path: write_template(dir.path()),
            public_url: Some("https://reports.example.com".into()),
        };
        let store = test_store(dir.path());

        let report = render_report(
            &config,
            &store,
            r#"{"model_name": "Mistral-7B", "is_gpai": "yes"}"#,
        )
        .expect("render");

        assert!(report.filename.starts_with("Mistral-7B_"));
        assert!(report.filename.ends_with(".docx"));
        assert_eq!(report.download_path, format!("/download/{}", report.filename));
        assert_eq!(
            report.link,
            format!("https://reports.example.com/download/{}", report.filename)
        );
        assert!(!report.document_b64.is_empty());

        // Stored copy matches the returned bytes.
        match store.retrieve(&report.filename) {
            cardcomply_retention::RetrieveOutcome::Found(stored) => {
                assert_eq!(stored, report.bytes);
            }
            other => panic!("expected Found, got {other:?}"),
        }

        // The rendered body carries the substituted values.
        let doc = cardcomply_template::read_docx(Cursor::new(report.bytes)).expect("read");
        assert_eq!(
            doc.nodes[0],
            cardcomply_template::DocNode::Paragraph(format!(
                "Report for Mistral-7B, GPAI: {}",
                cardcomply_template::CHECKED_BOX
            ))
        );
    }

    #[test]
    fn render_without_public_url_links_relatively() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RenderConfig {
            template_path: write_template(dir.path()),
            public_url: None,
        };
        let store = test_store(dir.path());

        let report = render_report(&config, &store, r#"{}"#).expect("render");
        assert!(report.filename.starts_with("compliance_doc_"));
        assert_eq!(report.link, report.download_path);
    }

    #[test]
    fn invalid_answer_json_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RenderConfig {
            template_path: write_template(dir.path()),
            public_url: None,
        };
        let store = test_store(dir.path());

        let err = render_report(&config, &store, "not json").unwrap_err();
        assert!(matches!(err, CardComplyError::Validation { .. }));
    }

    #[test]
    fn missing_template_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RenderConfig {
            template_path: dir.path().join("missing.docx"),
            public_url: None,
        };
        let store = test_store(dir.path());

        let err = render_report(&config, &store, r#"{}"#).unwrap_err();
        assert!(matches!(err, CardComplyError::NotFound(_)));
    }

    #[tokio::test]
    async fn fetch_card_assembles_sources_summary() {
        let server = wiremock::MockServer::start().await;

        let card = format!(
            "# Model\nSee the [Paper]({}/paper.pdf) for details.",
            server.uri()
        );
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/org/model/raw/main/README.md"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(&card))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/paper.pdf"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.4".to_vec()),
            )
            .mount(&server)
            .await;

        let config = CardConfig {
            registry_base: server.uri(),
            timeout_secs: 10,
        };
        let enricher = Enricher::new(cardcomply_shared::EnrichConfig::default()).expect("enricher");

        let result = CardClient::new(config)
            .expect("client")
            .fetch_card(&enricher, "org/model")
            .await
            .expect("fetch");

        assert_eq!(result.sources, vec![format!("{}/paper.pdf", server.uri())]);
        assert!(result.text.contains("SOURCES USED:"));
        assert!(result.text.contains("1. Model card for 'org/model' (Primary)"));
        assert!(result.text.contains("2. External Link:"));
        assert!(result.text.contains("MODEL CARD CONTENT:"));
        assert!(result.text.contains("# Model"));
    }

    #[tokio::test]
    async fn fetch_card_missing_id_is_not_found() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = CardConfig {
            registry_base: server.uri(),
            timeout_secs: 10,
        };
        let enricher = Enricher::new(cardcomply_shared::EnrichConfig::default()).expect("enricher");

        let err = CardClient::new(config)
            .expect("client")
            .fetch_card(&enricher, "org/ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, CardComplyError::NotFound(_)));
    }

    #[tokio::test]
    async fn fetch_card_rejects_malformed_id() {
        let enricher = Enricher::new(cardcomply_shared::EnrichConfig::default()).expect("enricher");
        let err = CardClient::new(CardConfig::default())
            .expect("client")
            .fetch_card(&enricher, "no-slash")
            .await
            .unwrap_err();
        assert!(matches!(err, CardComplyError::Validation { .. }));
    }

    #[tokio::test]
    async fn card_client_serves_multiple_fetches() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/org/model/raw/main/README.md"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("# Model"))
            .mount(&server)
            .await;

        let client = CardClient::new(CardConfig {
            registry_base: server.uri(),
            timeout_secs: 10,
        })
        .expect("client");
        let enricher = Enricher::new(cardcomply_shared::EnrichConfig::default()).expect("enricher");

        for _ in 0..2 {
            let result = client.fetch_card(&enricher, "org/model").await.expect("fetch");
            assert!(result.text.contains("# Model"));
        }
    }
}
