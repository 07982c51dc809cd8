use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};
use session_flow::{FlowError, InMemorySessionStorage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    bridge::{GeminiClient, RequestBridge},
    config::ServiceConfig,
    models::{ChatMessageRequest, ChatSessionResponse},
    presenter::{
        APP_TITLE, AnalysisOutcome, Chat, ChatReply, Mode, ModeView, Presenter, PresenterError,
    },
    upload::{UploadError, UploadedFile},
};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const CORRELATION_ID_HEADER: &str = "x-correlation-id";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn not_found_error(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
}

fn multipart_error(e: MultipartError) -> ApiError {
    warn!(error = %e, "Failed to read multipart upload");
    (e.status(), Json(json!({ "error": e.body_text() })))
}

/// Map a presenter failure to exactly one rendered error message.
fn presenter_error(err: PresenterError) -> ApiError {
    let status = match &err {
        PresenterError::MissingUpload | PresenterError::EmptyMessage => StatusCode::BAD_REQUEST,
        PresenterError::Upload(UploadError::UnsupportedFormat(_)) => {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        }
        PresenterError::Upload(UploadError::Decode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        PresenterError::Bridge(_) => StatusCode::BAD_GATEWAY,
        PresenterError::Session(FlowError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
        PresenterError::Session(FlowError::SessionBusy(_)) => StatusCode::CONFLICT,
        PresenterError::Session(FlowError::HandlerFailed(_)) => StatusCode::BAD_GATEWAY,
        PresenterError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = %err, status = %status, "Request failed");
        (
            status,
            Json(json!({
                "error": err.user_message(),
                "details": err.to_string()
            })),
        )
    } else {
        info!(error = %err, status = %status, "Request rejected");
        (status, Json(json!({ "error": err.user_message() })))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub presenter: Presenter,
    pub max_upload_bytes: usize,
}

/// Build the application and start the idle-session sweeper. Must be called inside a Tokio runtime.
pub fn create_app(config: &ServiceConfig) -> Router {
    if config.google_api_key.is_none() {
        warn!("GOOGLE_API_KEY is not set; every generation request will fail");
    }

    let model = Arc::new(GeminiClient::new(config.gemini_config()));
    let session_storage = Arc::new(InMemorySessionStorage::new());
    let presenter = Presenter::new(RequestBridge::new(model), session_storage)
        .with_session_idle_timeout(config.session_idle_timeout());

    tokio::spawn(sweep_idle_sessions(
        presenter.chat.clone(),
        SESSION_SWEEP_INTERVAL,
    ));

    build_router(AppState {
        presenter,
        max_upload_bytes: config.max_upload_bytes,
    })
}

/// Periodically discard chat sessions that were abandoned without being ended.
pub async fn sweep_idle_sessions(chat: Chat, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if let Err(e) = chat.sweep_idle().await {
            warn!(error = %e, "Idle session sweep failed");
        }
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/modes", get(list_modes))
        .route("/modes/{mode}", get(get_mode))
        .route("/report/analyze", post(analyze_report))
        .route("/chat/sessions", post(start_chat))
        .route("/chat/{session_id}", get(get_chat).delete(end_chat))
        .route("/chat/{session_id}/messages", post(send_chat_message))
        .layer(DefaultBodyLimit::max(app_state.max_upload_bytes))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tag every request with a correlation id, run it inside a span carrying it,
/// and echo the id back on the response.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header_value = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header_value {
        request.headers_mut().insert(CORRELATION_ID_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

async fn root() -> Json<Value> {
    let modes: Vec<ModeView> = Mode::ALL.into_iter().map(Mode::view).collect();
    Json(json!({
        "service": APP_TITLE,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Medical report analysis and mental health chat backed by a generative model",
        "modes": modes,
        "endpoints": {
            "GET /modes": "List interaction modes",
            "GET /modes/{mode}": "Describe one mode",
            "POST /report/analyze": "Analyze an uploaded report (multipart: query, file)",
            "POST /chat/sessions": "Start a chat session",
            "GET /chat/{session_id}": "Show chat history",
            "POST /chat/{session_id}/messages": "Send a chat message",
            "DELETE /chat/{session_id}": "End a chat session",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_modes() -> Json<Vec<ModeView>> {
    Json(Mode::ALL.into_iter().map(Mode::view).collect())
}

async fn get_mode(Path(mode): Path<String>) -> ApiResult<ModeView> {
    let mode = mode.parse::<Mode>().map_err(|e| not_found_error(&e))?;
    Ok(Json(mode.view()))
}

async fn analyze_report(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<AnalysisOutcome> {
    let mut query = String::new();
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("query") => {
                query = field.text().await.map_err(multipart_error)?;
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // Forms submit an empty part when no file was chosen.
                if !bytes.is_empty() {
                    upload = Some(UploadedFile::new(file_name, content_type, bytes.to_vec()));
                }
            }
            _ => {}
        }
    }

    info!(
        query_length = query.len(),
        has_upload = upload.is_some(),
        "Analyze report requested"
    );

    state
        .presenter
        .report
        .analyze(&query, upload)
        .await
        .map(Json)
        .map_err(presenter_error)
}

async fn start_chat(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ChatSessionResponse>), ApiError> {
    let session_id = state.presenter.chat.start().await.map_err(presenter_error)?;
    Ok((
        StatusCode::CREATED,
        Json(ChatSessionResponse {
            session_id,
            history: Vec::new(),
        }),
    ))
}

async fn get_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<ChatSessionResponse> {
    let history = state
        .presenter
        .chat
        .history(&session_id)
        .await
        .map_err(presenter_error)?;
    Ok(Json(ChatSessionResponse {
        session_id,
        history,
    }))
}

async fn send_chat_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatMessageRequest>,
) -> ApiResult<ChatReply> {
    info!(
        session_id = %session_id,
        content_length = request.content.len(),
        "Chat message received"
    );

    state
        .presenter
        .chat
        .send(&session_id, &request.content)
        .await
        .map(Json)
        .map_err(presenter_error)
}

async fn end_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .presenter
        .chat
        .end(&session_id)
        .await
        .map_err(presenter_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockModel, encoded_image};
    use axum::body::{Body, to_bytes};
    use image::ImageFormat;
    use session_flow::SessionStorage;
    use tower::ServiceExt;

    const BOUNDARY: &str = "healthsphere-test-boundary";

    fn test_presenter(model: &Arc<MockModel>) -> Presenter {
        Presenter::new(
            RequestBridge::new(model.clone()),
            Arc::new(InMemorySessionStorage::new()),
        )
    }

    fn test_app(model: &Arc<MockModel>) -> Router {
        build_router(AppState {
            presenter: test_presenter(model),
            max_upload_bytes: 1024 * 1024,
        })
    }

    async fn start_session(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(empty_request("POST", "/chat/sessions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn multipart_body(query: Option<&str>, file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(query) = query {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"query\"\r\n\r\n{query}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn analyze_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/report/analyze")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_modes() {
        let app = test_app(&Arc::new(MockModel::replying("unused")));

        let response = app.clone().oneshot(empty_request("GET", "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "healthy");

        let response = app.clone().oneshot(empty_request("GET", "/modes/chat")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["label"], "💬 Mental Health Chatbot");

        let response = app.oneshot(empty_request("GET", "/modes/unknown")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analyze_renders_model_text() {
        let model = Arc::new(MockModel::replying("Elevated ALT may indicate liver stress."));
        let app = test_app(&model);
        let image = encoded_image(ImageFormat::Jpeg);

        let response = app
            .oneshot(analyze_request(multipart_body(
                Some("What does high ALT mean?"),
                Some(("report.jpg", "image/jpeg", &image)),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["subheader"], "Analysis Result");
        assert_eq!(body["response"], "Elevated ALT may indicate liver stress.");
        assert_eq!(body["image"]["caption"], "Uploaded Medical Report");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_analyze_without_file_is_missing_upload() {
        let model = Arc::new(MockModel::replying("unused"));
        let app = test_app(&model);

        let response = app
            .clone()
            .oneshot(analyze_request(multipart_body(Some("What does high ALT mean?"), None)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await,
            json!({ "error": "Error: No file uploaded" })
        );

        // An empty file part counts as no upload.
        let response = app
            .oneshot(analyze_request(multipart_body(
                Some("q"),
                Some(("", "application/octet-stream", b"")),
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analyze_rejects_unsupported_type() {
        let model = Arc::new(MockModel::replying("unused"));
        let response = test_app(&model)
            .oneshot(analyze_request(multipart_body(
                Some("q"),
                Some(("report.pdf", "application/pdf", b"%PDF-1.4")),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analyze_service_failure_is_generic_error() {
        let model = Arc::new(MockModel::failing());
        let image = encoded_image(ImageFormat::Png);
        let response = test_app(&model)
            .oneshot(analyze_request(multipart_body(
                Some("q"),
                Some(("report.png", "image/png", &image)),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = read_json(response).await;
        assert_eq!(body["error"], "An unexpected error occurred");
        assert!(body["details"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_chat_session_flow() {
        let model = Arc::new(MockModel::replying("Take a slow breath with me."));
        let app = test_app(&model);

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/chat/sessions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json(response).await;
        let session_id = body["session_id"].as_str().unwrap().to_string();
        assert_eq!(body["history"], json!([]));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/chat/{session_id}/messages"),
                json!({ "content": "I feel anxious today" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["reply"], "Take a slow breath with me.");

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/chat/{session_id}")))
            .await
            .unwrap();
        let history = read_json(response).await["history"].clone();
        assert_eq!(history.as_array().unwrap().len(), 2);
        assert_eq!(history[0]["role"], "user");
        assert_eq!(history[0]["content"], "I feel anxious today");
        assert_eq!(history[1]["role"], "assistant");
        assert_eq!(history[1]["content"], "Take a slow breath with me.");

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/chat/{session_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(empty_request("GET", &format!("/chat/{session_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_failure_keeps_history() {
        let model = Arc::new(MockModel::failing());
        let app = test_app(&model);

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/chat/sessions"))
            .await
            .unwrap();
        let session_id = read_json(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/chat/{session_id}/messages"),
                json!({ "content": "hello?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(read_json(response).await["error"], "An unexpected error occurred");

        let response = app
            .oneshot(empty_request("GET", &format!("/chat/{session_id}")))
            .await
            .unwrap();
        assert_eq!(read_json(response).await["history"], json!([]));
    }

    #[tokio::test]
    async fn test_blank_chat_message_is_bad_request() {
        let model = Arc::new(MockModel::replying("unused"));
        let app = test_app(&model);

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/chat/sessions"))
            .await
            .unwrap();
        let session_id = read_json(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/chat/{session_id}/messages"),
                json!({ "content": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_responses_carry_correlation_id() {
        let app = test_app(&Arc::new(MockModel::replying("unused")));

        let first = app.clone().oneshot(empty_request("GET", "/health")).await.unwrap();
        let second = app.oneshot(empty_request("GET", "/modes/nope")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::NOT_FOUND);

        let ids: Vec<Uuid> = [&first, &second]
            .iter()
            .map(|response| {
                let header = response.headers()[CORRELATION_ID_HEADER].to_str().unwrap();
                Uuid::parse_str(header).unwrap()
            })
            .collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_idle_chat_session_is_not_found() {
        let model = Arc::new(MockModel::replying("ok"));
        let app = build_router(AppState {
            presenter: test_presenter(&model)
                .with_session_idle_timeout(chrono::Duration::milliseconds(20)),
            max_upload_bytes: 1024 * 1024,
        });
        let session_id = start_session(&app).await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/chat/{session_id}/messages"),
                json!({ "content": "still there?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(empty_request("GET", &format!("/chat/{session_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_discards_abandoned_sessions() {
        let model = Arc::new(MockModel::replying("ok"));
        let storage = Arc::new(InMemorySessionStorage::new());
        let presenter = Presenter::new(RequestBridge::new(model.clone()), storage.clone())
            .with_session_idle_timeout(chrono::Duration::milliseconds(20));
        let session_id = presenter.chat.start().await.unwrap();

        let sweeper = tokio::spawn(sweep_idle_sessions(
            presenter.chat.clone(),
            Duration::from_millis(10),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.abort();

        assert!(storage.get(&session_id).await.unwrap().is_none());
    }
}
