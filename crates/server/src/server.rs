//! Router construction and server lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::routes::{self, health, history, push, stats};
use crate::state::AppState;

/// Builds the router: the resource-scoped push stream plus the operational
/// endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let push_path = format!("/{}/notifications-push", state.resource);

    Router::new()
        .route(&push_path, get(push::handle_subscription))
        .route("/__history", get(history::handle_history))
        .route("/__stats", get(stats::handle_stats))
        .route("/__health", get(health::handle_health))
        .route("/__gtg", get(health::handle_gtg))
        .route("/__ping", get(health::handle_ping))
        .route("/__build-info", get(health::handle_build_info))
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the listener and serves until the shutdown future resolves. New
/// connections stop being accepted first; in-flight push streams are
/// terminated by the shutdown registry, which the caller fires as part of
/// the shutdown future.
pub async fn start_server(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let resource = state.resource.clone();
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, resource = %resource, "starting notifications push server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::health::HealthCheck;
    use crate::shutdown::ShutdownRegistry;
    use access::{KeyProcessor, PolicyProcessor, RuleTableEvaluator};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use dispatch::{Dispatcher, History};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let history = Arc::new(History::new(10));
        let dispatcher = Arc::new(Dispatcher::new(
            Duration::ZERO,
            Arc::clone(&history),
            Arc::new(RuleTableEvaluator::default()),
        ));
        let client = reqwest::Client::new();
        Arc::new(AppState {
            resource: "content".to_string(),
            dispatcher,
            history,
            key_processor: KeyProcessor::new(
                "http://gateway.invalid/validate".into(),
                client.clone(),
            ),
            policy_processor: PolicyProcessor::new(
                "http://gateway.invalid/policies".into(),
                client.clone(),
            ),
            health: HealthCheck::for_tests(client),
            heartbeat_period: Duration::from_secs(30),
            default_subscription_type: "Article".to_string(),
            supported_subscription_types: vec!["Article".to_string()],
            all_subscription_types: vec!["Article".to_string()],
            shutdown: ShutdownRegistry::new(),
        })
    }

    #[tokio::test]
    async fn ping_answers_pong() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/__ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"pong");
    }

    #[tokio::test]
    async fn build_info_reports_name_and_version() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/__build-info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["name"], "notifications-push");
        assert!(info["version"].as_str().is_some());
    }

    #[tokio::test]
    async fn stats_reports_registered_subscribers() {
        let state = test_state();
        let (_sub, _rx) = state.dispatcher.subscribe(
            "10.0.0.1".to_string(),
            vec!["Article".to_string()],
            true,
            Default::default(),
        );

        let app = build_router(Arc::clone(&state));
        let response = app
            .oneshot(Request::get("/__stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["nrOfSubscribers"], 1);
        assert_eq!(stats["subscribers"][0]["type"], "MonitorSubscriber");
    }

    #[tokio::test]
    async fn unknown_routes_fall_back_to_404() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn push_stream_without_a_key_is_unauthorized() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::get("/content/notifications-push")
                    .extension(axum::extract::ConnectInfo::<SocketAddr>(
                        "127.0.0.1:9000".parse().unwrap(),
                    ))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Empty api key");
    }
}
