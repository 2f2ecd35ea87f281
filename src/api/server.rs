use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use super::handlers::{check, health_check, reset, status, AppState};
use crate::config::ApiConfig;
use crate::monitor::Monitor;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/check", post(check))
        .route("/reset", post(reset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the status API until `shutdown` becomes true
pub async fn run_server(
    config: ApiConfig,
    monitor: Arc<Monitor>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(Arc::new(AppState { monitor }));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting status API on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    tracing::info!("Status API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{RecordingNotifier, ScriptedProber};
    use crate::monitor::Endpoint;
    use crate::state::StateStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    const URL: &str = "https://example.com/health";

    fn create_test_app(script: &[bool]) -> Router {
        let prober = Arc::new(ScriptedProber::new());
        prober.script(URL, script.iter().copied());
        let monitor = Arc::new(Monitor::new(
            vec![Endpoint::new(URL)],
            prober,
            Arc::new(RecordingNotifier::new()),
            Arc::new(StateStore::in_memory()),
        ));
        build_router(Arc::new(AppState { monitor }))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app(&[]);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_check_then_status() {
        let app = create_test_app(&[false]);

        let response = app
            .clone()
            .oneshot(post_json("/check", serde_json::json!({ "url": URL })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["state"]["status"], "DOWN");
        assert_eq!(body["state"]["alert_sent"], true);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["summary"]["total"], 1);
        assert_eq!(body["summary"]["down"], 1);
        assert_eq!(body["endpoints"][0]["url"], URL);
    }

    #[tokio::test]
    async fn test_check_unknown_endpoint() {
        let app = create_test_app(&[]);

        let response = app
            .oneshot(post_json(
                "/check",
                serde_json::json!({ "url": "https://other.example" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset() {
        let app = create_test_app(&[false]);

        app.clone()
            .oneshot(post_json("/check", serde_json::json!({ "url": URL })))
            .await
            .unwrap();

        let response = app
            .oneshot(post_json("/reset", serde_json::json!({ "url": URL })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["existed"], true);
    }
}
