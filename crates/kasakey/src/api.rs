use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;

/// Build identifier in the form `<semver>_<commit>`
pub const APP_VERSION: &str = match option_env!("KASAKEY_BUILD_VERSION") {
    Some(version) => version,
    None => "0.0.dev_000000",
};

/// Split a `<semver>_<commit>` string.
///
/// Returns empty strings when there is no `_` separator.
pub fn parse_version(version: &str) -> (&str, &str) {
    version.split_once('_').unwrap_or(("", ""))
}

/// Response for the /api/system/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    /// The commit of the current build
    commit: String,
    /// The semver version of the current build
    semver: String,
}

/// Response for the /api/system/summary endpoint
#[derive(Serialize)]
struct SummaryResponse {}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
}

/// Handler for GET /api/system/info
#[tracing::instrument(skip(state))]
async fn system_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /api/system/info request");

    let (semver, commit) = parse_version(state.version);
    (
        StatusCode::OK,
        Json(InfoResponse {
            commit: commit.to_string(),
            semver: semver.to_string(),
        }),
    )
}

/// Handler for GET /api/system/summary
#[tracing::instrument]
async fn system_summary() -> impl IntoResponse {
    tracing::debug!("Handling /api/system/summary request");
    (StatusCode::OK, Json(SummaryResponse {}))
}

/// Create the API router with all endpoints
///
/// Paths outside `/api` are served from `static_dir` when one is configured.
fn create_router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let router = Router::new()
        .route("/api/system/info", get(system_info))
        .route("/api/system/summary", get(system_summary));

    let router = match &config.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the configured address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `config` - Listen address, port and optional frontend directory
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
///
/// # Returns
/// Returns Ok(()) if the server shuts down gracefully, or an error if startup fails
pub async fn serve(
    config: ApiConfig,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        version: APP_VERSION,
    });
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn router_with_version(version: &'static str, config: &ApiConfig) -> Router {
        create_router(Arc::new(AppState { version }), config)
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("1.2.3_e83adcd"), ("1.2.3", "e83adcd"));
        assert_eq!(parse_version("0.0.dev_000000"), ("0.0.dev", "000000"));
        assert_eq!(parse_version("1.2.3"), ("", ""));
    }

    #[tokio::test]
    async fn test_system_info() {
        let router = router_with_version("1.0.0_e83adcd", &ApiConfig::default());
        let (status, body) = get_json(router, "/api/system/info").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["semver"], "1.0.0");
        assert_eq!(body["commit"], "e83adcd");
    }

    #[tokio::test]
    async fn test_system_summary_is_empty() {
        let router = router_with_version(APP_VERSION, &ApiConfig::default());
        let (status, body) = get_json(router, "/api/system/summary").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_static_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>kasakey</h1>").unwrap();

        let config = ApiConfig {
            static_dir: Some(dir.path().to_path_buf()),
            ..ApiConfig::default()
        };
        let router = router_with_version(APP_VERSION, &config);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/index.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"<h1>kasakey</h1>");
    }

    #[tokio::test]
    async fn test_unknown_path_without_frontend() {
        let router = router_with_version(APP_VERSION, &ApiConfig::default());
        let response = router
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_shuts_down() {
        let config = ApiConfig {
            enabled: true,
            port: 0,
            ..ApiConfig::default()
        };
        let (tx, rx) = tokio::sync::oneshot::channel();
        let server = tokio::spawn(serve(config, rx));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
