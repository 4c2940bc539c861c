//! HTTP routes, shared state, and error mapping.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use cardcomply_core::{CardClient, RenderConfig, render_report};
use cardcomply_enrich::Enricher;
use cardcomply_retention::{RetentionStore, RetrieveOutcome};
use cardcomply_shared::CardComplyError;

/// DOCX content type for download responses.
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Per-request timeout for the whole router.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub card: CardClient,
    pub render: RenderConfig,
    pub enricher: Arc<Enricher>,
    pub store: RetentionStore,
    pub questions_path: PathBuf,
}

/// Build the full application router with middleware applied.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/download/:filename", get(download_handler))
        .route("/api/v1/enrich", post(enrich_handler))
        .route("/api/v1/card", post(card_handler))
        .route("/api/v1/render", post(render_handler))
        .route("/api/v1/questions", get(questions_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// API-facing error wrapper over the domain error type.
pub struct ApiError(CardComplyError);

impl From<CardComplyError> for ApiError {
    fn from(err: CardComplyError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CardComplyError::Validation { .. } => StatusCode::BAD_REQUEST,
            CardComplyError::NotFound(_) => StatusCode::NOT_FOUND,
            CardComplyError::Network(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response models
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct EnrichRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct EnrichResponse {
    pub appended_text: String,
    pub fetched_urls: Vec<String>,
}

#[derive(Deserialize)]
pub struct CardRequest {
    pub model_id: String,
}

#[derive(Serialize)]
pub struct CardResponse {
    pub model_id: String,
    pub text: String,
    pub sources: Vec<String>,
}

#[derive(Deserialize)]
pub struct RenderRequest {
    pub answers: serde_json::Value,
}

#[derive(Serialize)]
pub struct RenderResponse {
    pub filename: String,
    pub download_path: String,
    pub link: String,
    pub document_b64: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /download/:filename — serve a stored report.
async fn download_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    match state.store.retrieve(&filename) {
        RetrieveOutcome::Found(bytes) => {
            let disposition = format!("attachment; filename=\"{filename}\"");
            let headers = [
                (header::CONTENT_TYPE, HeaderValue::from_static(DOCX_MIME)),
                (
                    header::CONTENT_DISPOSITION,
                    HeaderValue::from_str(&disposition)
                        .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
                ),
            ];
            (headers, bytes).into_response()
        }
        RetrieveOutcome::InvalidName => error_response(StatusCode::BAD_REQUEST, "invalid filename"),
        RetrieveOutcome::Denied => error_response(StatusCode::FORBIDDEN, "access denied"),
        RetrieveOutcome::NotFound => {
            error_response(StatusCode::NOT_FOUND, "file not found or expired")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// POST /api/v1/enrich — follow relevant links in arbitrary card text.
async fn enrich_handler(
    State(state): State<AppState>,
    Json(req): Json<EnrichRequest>,
) -> Json<EnrichResponse> {
    let result = state.enricher.enrich(&req.text).await;
    Json(EnrichResponse {
        appended_text: result.appended_text,
        fetched_urls: result.fetched_urls,
    })
}

/// POST /api/v1/card — fetch and enrich a registry model card.
async fn card_handler(
    State(state): State<AppState>,
    Json(req): Json<CardRequest>,
) -> Result<Json<CardResponse>, ApiError> {
    let result = state.card.fetch_card(&state.enricher, &req.model_id).await?;
    Ok(Json(CardResponse {
        model_id: result.model_id,
        text: result.text,
        sources: result.sources,
    }))
}

/// POST /api/v1/render — merge an answer map into the template and store it.
async fn render_handler(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> Result<Json<RenderResponse>, ApiError> {
    let answers_json = req.answers.to_string();
    let report = render_report(&state.render, &state.store, &answers_json)?;
    Ok(Json(RenderResponse {
        filename: report.filename,
        download_path: report.download_path,
        link: report.link,
        document_b64: report.document_b64,
    }))
}

/// GET /api/v1/questions — serve the compliance questionnaire definition.
///
/// The file is passed through byte-for-byte; the server does not parse
/// or reformat it.
async fn questions_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let content = std::fs::read(&state.questions_path).map_err(|_| {
        CardComplyError::NotFound(format!(
            "questions file not found at {}",
            state.questions_path.display()
        ))
    })?;

    let headers = [(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    )];
    Ok((headers, content).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use cardcomply_core::CardConfig;
    use std::io::Write as _;
    use tower::ServiceExt;

    fn write_template(dir: &std::path::Path) -> PathBuf {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Name: {{model_name}}</w:t></w:r></w:p></w:body></w:document>"#;

        let path = dir.join("template.docx");
        let file = std::fs::File::create(&path).expect("create template");
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .expect("entry");
        writer.write_all(xml.as_bytes()).expect("write");
        writer.finish().expect("finish");
        path
    }

    fn test_app(dir: &std::path::Path) -> (Router, RetentionStore) {
        let store = RetentionStore::open(dir.join("store"), Duration::from_secs(24 * 3600))
            .expect("store");
        let state = AppState {
            card: CardClient::new(CardConfig::default()).expect("card client"),
            render: RenderConfig {
                template_path: write_template(dir),
                public_url: None,
            },
            enricher: Arc::new(
                Enricher::new(cardcomply_shared::EnrichConfig::default()).expect("enricher"),
            ),
            store: store.clone(),
            questions_path: dir.join("questions.json"),
        };
        (create_router(state), store)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _store) = test_app(dir.path());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn render_then_download_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _store) = test_app(dir.path());

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/render")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"answers": {"model_name": "TestModel"}}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let filename = body["filename"].as_str().expect("filename");
        assert!(filename.starts_with("TestModel_"));
        assert_eq!(body["download_path"], format!("/download/{filename}"));

        let download = app
            .oneshot(
                Request::get(format!("/download/{filename}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static(DOCX_MIME)
        );
    }

    #[tokio::test]
    async fn download_rejects_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _store) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::get("/download/..%2F..%2Fetc%2Fpasswd")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _store) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::get("/download/ghost_abc123.docx")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn render_rejects_non_object_answers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _store) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::post("/api/v1/render")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"answers": [1, 2, 3]}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn questions_served_byte_for_byte() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Formatting that a parse/re-serialize cycle would normalize away.
        let content = "[\n  {\"question\": \"Model name?\", \"id\": \"model_name\"}\n]\n";
        std::fs::write(dir.path().join("questions.json"), content).expect("write questions");
        let (app, _store) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::get("/api/v1/questions")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static("application/json")
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(bytes.as_ref(), content.as_bytes());
    }

    #[tokio::test]
    async fn questions_missing_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _store) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::get("/api/v1/questions")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn card_endpoint_maps_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        // Point the card pipeline at the mock registry.
        let store = RetentionStore::open(dir.path().join("store"), Duration::from_secs(3600))
            .expect("store");
        let app = create_router(AppState {
            card: CardClient::new(CardConfig {
                registry_base: server.uri(),
                timeout_secs: 10,
            })
            .expect("card client"),
            render: RenderConfig {
                template_path: dir.path().join("template.docx"),
                public_url: None,
            },
            enricher: Arc::new(
                Enricher::new(cardcomply_shared::EnrichConfig::default()).expect("enricher"),
            ),
            store,
            questions_path: dir.path().join("questions.json"),
        });

        let response = app
            .oneshot(
                Request::post("/api/v1/card")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"model_id": "org/ghost"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
