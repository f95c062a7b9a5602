//! HTTP interface.
//!
//! Routes map one-to-one onto [`PredictionService`] operations. The service is
//! synchronous, so every call runs on the blocking pool.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{Config, ServerConfig};
use crate::error::{Error, Result};
use crate::prediction::{PredictionRecord, RiskCounts};
use crate::service::{HealthStatus, ManualSubmission, PredictionService};

/// Multipart field carrying the uploaded image.
pub const IMAGE_FIELD: &str = "image";

const NO_IMAGE_UPLOADED: &str = "No image uploaded";
const INTERNAL_SERVER_ERROR: &str = "Internal server error";

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    service: Arc<PredictionService>,
}

impl AppState {
    /// Wrap a service for use by the router.
    #[must_use]
    pub fn new(service: PredictionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

/// An error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: INTERNAL_SERVER_ERROR.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_validation() {
            Self {
                status: StatusCode::BAD_REQUEST,
                message: err.to_string(),
            }
        } else if err.is_upstream_detector() {
            warn!("Image analysis failed: {}", err);
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
            }
        } else {
            error!("Request failed: {}", err);
            Self::internal()
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        if status.is_client_error() {
            Self {
                status,
                message: err.body_text(),
            }
        } else {
            error!("Failed to read upload: {}", err.body_text());
            Self::internal()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Build the application router.
///
/// Unmatched paths are served from `server.static_dir` when set, and answer
/// 404 otherwise.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/predict", post(predict))
        .route(
            "/predict-image",
            post(predict_image).layer(DefaultBodyLimit::max(server.max_upload_bytes)),
        )
        .route("/dashboard-stats", get(dashboard_stats))
        .route("/predictions", get(predictions))
        .route("/clear", delete(clear))
        .route("/health", get(health));

    let api = match &server.static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api.fallback(not_found),
    };

    api.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until interrupted.
///
/// # Errors
///
/// Returns an error if storage cannot be initialized, the address cannot be
/// bound, or the server fails while running.
pub async fn serve(config: &Config) -> Result<()> {
    let service = PredictionService::from_config(config)?;
    let app = router(AppState::new(service), &config.server);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()?).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    if let Some(dir) = &config.server.static_dir {
        info!("Serving frontend from {}", dir.display());
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn run_blocking<T, F>(task: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!("Request worker failed: {}", e);
            Err(ApiError::internal())
        }
    }
}

async fn predict(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ManualSubmission>, JsonRejection>,
) -> std::result::Result<Json<PredictionRecord>, ApiError> {
    let Json(submission) = payload
        .map_err(|rejection| Error::validation(format!("Invalid JSON body: {}", rejection.body_text())))?;

    let service = Arc::clone(&state.service);
    run_blocking(move || service.submit_manual(submission))
        .await
        .map(Json)
}

async fn predict_image(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<PredictionRecord>, ApiError> {
    let mut multipart = multipart.map_err(|_| Error::validation(NO_IMAGE_UPLOADED))?;
    let image = read_image_field(&mut multipart).await?;

    let service = Arc::clone(&state.service);
    run_blocking(move || service.submit_image(&image))
        .await
        .map(Json)
}

async fn read_image_field(multipart: &mut Multipart) -> std::result::Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            return Ok(field.bytes().await?);
        }
    }
    Err(Error::validation(NO_IMAGE_UPLOADED).into())
}

async fn dashboard_stats(
    State(state): State<AppState>,
) -> std::result::Result<Json<RiskCounts>, ApiError> {
    let service = Arc::clone(&state.service);
    run_blocking(move || service.stats()).await.map(Json)
}

async fn predictions(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<PredictionRecord>>, ApiError> {
    let service = Arc::clone(&state.service);
    run_blocking(move || service.history()).await.map(Json)
}

async fn clear(State(state): State<AppState>) -> std::result::Result<Json<MessageBody>, ApiError> {
    let service = Arc::clone(&state.service);
    let message = run_blocking(move || service.clear_history()).await?;
    Ok(Json(MessageBody { message }))
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.service.health())
}

async fn not_found() -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        message: "Not found".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::detector::SignatureDetector;
    use crate::service::tests::{test_service, FailingStore, FixedDetector};
    use crate::store::FileStore;

    const BOUNDARY: &str = "crowdsafe-test-boundary";
    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn test_router(service: PredictionService) -> Router {
        router(AppState::new(service), &ServerConfig::default())
    }

    fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn multipart_request(field: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"crowd.png\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/predict-image")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn valid_payload(count: Value) -> Value {
        json!({
            "eventName": "Harbour Fireworks",
            "location": "Pier 4",
            "crowdCount": count,
            "eventType": "Festival",
            "timeSlot": "Night",
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_predict_returns_full_record() {
        let app = test_router(test_service(SignatureDetector));
        let (status, body) = send(
            &app,
            json_request(Method::POST, "/predict", &valid_payload(json!(700))),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["eventName"], "Harbour Fireworks");
        assert_eq!(body["crowdCount"], 700);
        assert_eq!(body["density"], "High");
        assert_eq!(body["risk"], "Dangerous");
        assert_eq!(
            body["recommendation"],
            "URGENT: Deploy additional security staff immediately."
        );
        assert_eq!(body["chartData"]["data"].as_array().unwrap().len(), 5);
        assert_eq!(body["chartData"]["data"][0], 700);
        assert_eq!(
            body["chartData"]["labels"],
            json!(["Current", "+30min", "+1hr", "+1.5hr", "+2hr"])
        );
        assert!(body["id"].as_i64().unwrap() > 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_predict_accepts_string_count() {
        let app = test_router(test_service(SignatureDetector));
        let (status, body) = send(
            &app,
            json_request(Method::POST, "/predict", &valid_payload(json!("250"))),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["crowdCount"], 250);
        assert_eq!(body["risk"], "Warning");
    }

    #[tokio::test]
    async fn test_predict_accepts_zero_count() {
        let app = test_router(test_service(SignatureDetector));
        let (status, body) = send(
            &app,
            json_request(Method::POST, "/predict", &valid_payload(json!(0))),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["crowdCount"], 0);
        assert_eq!(body["density"], "Low");
        assert_eq!(body["chartData"]["data"], json!([0, 0, 0, 0, 0]));
    }

    #[tokio::test]
    async fn test_predict_missing_field_is_bad_request() {
        let app = test_router(test_service(SignatureDetector));
        let mut payload = valid_payload(json!(10));
        payload.as_object_mut().unwrap().remove("crowdCount");

        let (status, body) = send(&app, json_request(Method::POST, "/predict", &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "All fields are required"}));

        let (_, stats) = send(&app, empty_request(Method::GET, "/dashboard-stats")).await;
        assert_eq!(stats["total_predictions"], 0);
    }

    #[tokio::test]
    async fn test_predict_bad_count_is_bad_request() {
        let app = test_router(test_service(SignatureDetector));
        for count in [json!("abc"), json!(-5)] {
            let (status, body) = send(
                &app,
                json_request(Method::POST, "/predict", &valid_payload(count)),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "crowdCount must be a non-negative integer");
        }
    }

    #[tokio::test]
    async fn test_predict_malformed_json_is_bad_request() {
        let app = test_router(test_service(SignatureDetector));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn test_predict_storage_failure_is_generic_error() {
        let service = PredictionService::new(Arc::new(FailingStore), Arc::new(SignatureDetector))
            .with_rng(StdRng::seed_from_u64(1));
        let app = test_router(service);

        let (status, body) = send(
            &app,
            json_request(Method::POST, "/predict", &valid_payload(json!(10))),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Internal server error"}));
    }

    #[tokio::test]
    async fn test_predict_image_uses_fallback_estimate() {
        let app = test_router(test_service(SignatureDetector));
        let (status, body) = send(&app, multipart_request("image", PNG_HEADER)).await;

        assert_eq!(status, StatusCode::OK);
        let count = body["crowdCount"].as_u64().unwrap();
        assert!((20..=200).contains(&count));
        assert_eq!(body["eventName"], "Image Based Event");
        assert_eq!(body["location"], "Uploaded Image");
        assert_eq!(body["eventType"], "Image");
        assert_eq!(body["timeSlot"], "Image");
        assert_eq!(body["chartData"]["data"][0], count);
    }

    #[tokio::test]
    async fn test_predict_image_with_detected_bodies() {
        let app = test_router(test_service(FixedDetector(800)));
        let (status, body) = send(&app, multipart_request("image", PNG_HEADER)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["crowdCount"], 800);
        assert_eq!(body["risk"], "Dangerous");
    }

    #[tokio::test]
    async fn test_predict_image_missing_field() {
        let app = test_router(test_service(SignatureDetector));
        let (status, body) = send(&app, multipart_request("photo", PNG_HEADER)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "No image uploaded"}));
    }

    #[tokio::test]
    async fn test_predict_image_not_multipart() {
        let app = test_router(test_service(SignatureDetector));
        let request = json_request(Method::POST, "/predict-image", &json!({}));

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No image uploaded");
    }

    #[tokio::test]
    async fn test_predict_image_undecodable_is_detector_error() {
        let app = test_router(test_service(SignatureDetector));
        let (status, body) = send(&app, multipart_request("image", b"definitely not a picture")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("cannot identify image file"));
    }

    #[tokio::test]
    async fn test_predict_image_too_large() {
        let server = ServerConfig {
            max_upload_bytes: 64,
            ..ServerConfig::default()
        };
        let app = router(AppState::new(test_service(SignatureDetector)), &server);

        let mut image = PNG_HEADER.to_vec();
        image.resize(4096, 0);
        let (status, _) = send(&app, multipart_request("image", &image)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_ids_increase_across_requests() {
        let app = test_router(test_service(SignatureDetector));
        let mut ids = Vec::new();
        for _ in 0..5 {
            let (_, body) = send(
                &app,
                json_request(Method::POST, "/predict", &valid_payload(json!(10))),
            )
            .await;
            ids.push(body["id"].as_i64().unwrap());
        }

        assert!(ids.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn test_predictions_and_stats() {
        let app = test_router(test_service(SignatureDetector));
        for count in [json!(10), json!(300), json!(900)] {
            send(
                &app,
                json_request(Method::POST, "/predict", &valid_payload(count)),
            )
            .await;
        }

        let (status, stats) = send(&app, empty_request(Method::GET, "/dashboard-stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            stats,
            json!({"total_predictions": 3, "safe": 1, "warning": 1, "dangerous": 1})
        );

        let (status, list) = send(&app, empty_request(Method::GET, "/predictions")).await;
        assert_eq!(status, StatusCode::OK);
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0]["crowdCount"], 900);
        assert!(list.iter().all(|r| r.get("chartData").is_none()));
    }

    #[tokio::test]
    async fn test_clear_keeps_export_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(
            dir.path().join("predictions.db"),
            dir.path().join("predictions.csv"),
        );
        let service = PredictionService::new(Arc::new(store.clone()), Arc::new(SignatureDetector))
            .with_rng(StdRng::seed_from_u64(9));
        let app = test_router(service);

        for _ in 0..2 {
            send(
                &app,
                json_request(Method::POST, "/predict", &valid_payload(json!(42))),
            )
            .await;
        }

        let (status, body) = send(&app, empty_request(Method::DELETE, "/clear")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "History cleared"}));

        let (_, list) = send(&app, empty_request(Method::GET, "/predictions")).await;
        assert_eq!(list, json!([]));
        let (_, stats) = send(&app, empty_request(Method::GET, "/dashboard-stats")).await;
        assert_eq!(stats["total_predictions"], 0);

        let csv = std::fs::read_to_string(store.export_path()).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_router(test_service(SignatureDetector));
        let (status, body) = send(&app, empty_request(Method::GET, "/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_unknown_path_without_frontend() {
        let app = test_router(test_service(SignatureDetector));
        let (status, body) = send(&app, empty_request(Method::GET, "/nowhere")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Not found"}));
    }

    #[tokio::test]
    async fn test_serves_frontend_from_static_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>crowdsafe</h1>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log('ok');").unwrap();

        let server = ServerConfig {
            static_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        };
        let app = router(AppState::new(test_service(SignatureDetector)), &server);

        let response = app
            .clone()
            .oneshot(empty_request(Method::GET, "/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"<h1>crowdsafe</h1>");

        let response = app
            .clone()
            .oneshot(empty_request(Method::GET, "/app.js"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(empty_request(Method::GET, "/missing.css"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_headers_present() {
        let app = test_router(test_service(SignatureDetector));
        let request = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
