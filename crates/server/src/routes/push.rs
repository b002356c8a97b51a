//! The long-lived SSE subscription stream.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use dispatch::Dispatcher;

use crate::error::ServerError;
use crate::routes::{api_key, CLIENT_ADDR_HEADER};
use crate::state::AppState;

/// The literal heartbeat payload; the full frame on the wire is
/// `data: []\n\n`.
pub const HEARTBEAT_MSG: &str = "[]";

const ALL_SUBSCRIPTION_TYPE: &str = "All";

/// `GET /{resource}/notifications-push`
///
/// Preconditions run in order: API key validation, policy lookup,
/// subscription type resolution, monitor flag. On success the response is an
/// unbounded `text/event-stream` body fed by the subscriber's queue, with an
/// immediate heartbeat and one heartbeat per idle period thereafter.
pub async fn handle_subscription(
    State(state): State<Arc<AppState>>,
    params: Query<Vec<(String, String)>>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let key = api_key(&headers, &params);
    if let Err(err) = state.key_processor.validate(&key).await {
        return ServerError::from(err).into_response();
    }

    let options = match state.policy_processor.subscription_options(&key).await {
        Ok(options) => options,
        Err(err) => return ServerError::from(err).into_response(),
    };

    let sub_types = match resolve_sub_types(&state, &params) {
        Ok(types) => types,
        Err(err) => {
            tracing::error!(error = %err, "invalid subscription type");
            return err.into_response();
        }
    };

    let monitor = params
        .iter()
        .rev()
        .find(|(name, _)| name == "monitor")
        .map(|(_, value)| value == "true" || value == "1")
        .unwrap_or(false);

    let address = client_address(&headers, peer);
    let (subscriber, receiver) = state
        .dispatcher
        .subscribe(address, sub_types, monitor, options);

    let stream = notification_stream(
        receiver,
        state.heartbeat_period,
        state.shutdown.subscribe(),
        StreamGuard {
            dispatcher: Arc::clone(&state.dispatcher),
            subscriber_id: subscriber.id(),
        },
    );

    sse_response(Body::from_stream(stream))
}

fn sse_response(body: Body) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream; charset=UTF-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(
        header::CONNECTION,
        header::HeaderValue::from_static("keep-alive"),
    );
    headers.insert(header::PRAGMA, header::HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, header::HeaderValue::from_static("0"));
    response
}

/// Unregisters the subscriber when the stream is dropped, whether the client
/// disconnected or the server cancelled the stream.
struct StreamGuard {
    dispatcher: Arc<Dispatcher>,
    subscriber_id: Uuid,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.dispatcher.unsubscribe(self.subscriber_id);
    }
}

struct StreamState {
    receiver: mpsc::Receiver<String>,
    heartbeat: Duration,
    shutdown: watch::Receiver<bool>,
    greeted: bool,
    _guard: StreamGuard,
}

/// Three-way wait per frame: a queued notification resets the heartbeat
/// timer, an idle period emits a heartbeat, shutdown ends the stream.
fn notification_stream(
    receiver: mpsc::Receiver<String>,
    heartbeat: Duration,
    shutdown: watch::Receiver<bool>,
    guard: StreamGuard,
) -> impl Stream<Item = Result<String, Infallible>> {
    let initial = StreamState {
        receiver,
        heartbeat,
        shutdown,
        greeted: false,
        _guard: guard,
    };

    futures_util::stream::unfold(initial, |mut state| async move {
        if !state.greeted {
            state.greeted = true;
            return Some((sse_frame(HEARTBEAT_MSG), state));
        }
        if *state.shutdown.borrow() {
            return None;
        }
        tokio::select! {
            maybe = state.receiver.recv() => maybe.map(|frame| (sse_frame(&frame), state)),
            _ = tokio::time::sleep(state.heartbeat) => Some((sse_frame(HEARTBEAT_MSG), state)),
            _ = state.shutdown.changed() => None,
        }
    })
    .map(Ok::<String, Infallible>)
}

fn sse_frame(data: &str) -> String {
    format!("data: {data}\n\n")
}

/// Resolves the repeatable `type` query parameter. Absent means the
/// configured default; `All` expands to the configured set; anything
/// outside the supported set is a 400.
fn resolve_sub_types(
    state: &AppState,
    params: &Query<Vec<(String, String)>>,
) -> Result<Vec<String>, ServerError> {
    let requested: Vec<&String> = params
        .iter()
        .filter(|(name, _)| name == "type")
        .map(|(_, value)| value)
        .collect();

    if requested.is_empty() {
        return Ok(vec![state.default_subscription_type.clone()]);
    }

    let mut resolved = Vec::new();
    for value in requested {
        if value.eq_ignore_ascii_case(ALL_SUBSCRIPTION_TYPE) {
            for expanded in &state.all_subscription_types {
                if !resolved.contains(expanded) {
                    resolved.push(expanded.clone());
                }
            }
            continue;
        }
        let supported = state
            .supported_subscription_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(value));
        if !supported {
            return Err(ServerError::BadRequest(format!(
                "The specified type ({value}) is unsupported"
            )));
        }
        if !resolved.contains(value) {
            resolved.push(value.clone());
        }
    }
    Ok(resolved)
}

/// First `X-Forwarded-For` entry, falling back to the socket peer.
fn client_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get(CLIENT_ADDR_HEADER).and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::health::HealthCheck;
    use crate::shutdown::ShutdownRegistry;
    use access::{KeyProcessor, PolicyProcessor, RuleTableEvaluator};
    use dispatch::History;

    fn test_state() -> AppState {
        let history = Arc::new(History::new(10));
        let dispatcher = Arc::new(Dispatcher::new(
            Duration::ZERO,
            Arc::clone(&history),
            Arc::new(RuleTableEvaluator::default()),
        ));
        let client = reqwest::Client::new();
        AppState {
            resource: "content".to_string(),
            dispatcher,
            history,
            key_processor: KeyProcessor::new("http://gateway.invalid/validate".into(), client.clone()),
            policy_processor: PolicyProcessor::new("http://gateway.invalid/policies".into(), client.clone()),
            health: HealthCheck::for_tests(client),
            heartbeat_period: Duration::from_millis(50),
            default_subscription_type: "Article".to_string(),
            supported_subscription_types: vec![
                "Article".to_string(),
                "ContentPackage".to_string(),
                "Audio".to_string(),
                "All".to_string(),
            ],
            all_subscription_types: vec![
                "Article".to_string(),
                "ContentPackage".to_string(),
                "Audio".to_string(),
            ],
            shutdown: ShutdownRegistry::new(),
        }
    }

    fn query(pairs: &[(&str, &str)]) -> Query<Vec<(String, String)>> {
        Query(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn missing_type_resolves_to_the_default() {
        let state = test_state();
        let types = resolve_sub_types(&state, &query(&[])).unwrap();
        assert_eq!(types, vec!["Article"]);
    }

    #[test]
    fn all_expands_to_the_configured_set() {
        let state = test_state();
        let types = resolve_sub_types(&state, &query(&[("type", "all")])).unwrap();
        assert_eq!(types, vec!["Article", "ContentPackage", "Audio"]);
    }

    #[test]
    fn repeated_types_are_collected_once() {
        let state = test_state();
        let types =
            resolve_sub_types(&state, &query(&[("type", "Article"), ("type", "Article")])).unwrap();
        assert_eq!(types, vec!["Article"]);
    }

    #[test]
    fn unknown_types_are_rejected() {
        let state = test_state();
        let err = resolve_sub_types(&state, &query(&[("type", "Junk")])).unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[test]
    fn forwarded_for_wins_over_the_socket_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ADDR_HEADER, "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(client_address(&headers, peer), "203.0.113.7");
        assert_eq!(client_address(&HeaderMap::new(), peer), "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn stream_opens_with_a_heartbeat_and_relays_frames() {
        let state = test_state();
        let (subscriber, receiver) = state.dispatcher.subscribe(
            "10.0.0.1".to_string(),
            vec!["Article".to_string()],
            false,
            Default::default(),
        );

        let mut stream = Box::pin(notification_stream(
            receiver,
            Duration::from_secs(30),
            state.shutdown.subscribe(),
            StreamGuard {
                dispatcher: Arc::clone(&state.dispatcher),
                subscriber_id: subscriber.id(),
            },
        ));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "data: []\n\n");

        let mut n = dispatch::Notification::default();
        n.event_type = dispatch::CONTENT_UPDATE_TYPE.to_string();
        n.subscription_type = "Article".to_string();
        subscriber.send(&n).unwrap();

        let frame = stream.next().await.unwrap().unwrap();
        assert!(frame.starts_with("data: ["));
        assert!(frame.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn idle_stream_emits_heartbeats_on_the_configured_cadence() {
        let state = test_state();
        let (subscriber, receiver) = state.dispatcher.subscribe(
            "10.0.0.1".to_string(),
            vec!["Article".to_string()],
            false,
            Default::default(),
        );

        let heartbeat = Duration::from_millis(40);
        let mut stream = Box::pin(notification_stream(
            receiver,
            heartbeat,
            state.shutdown.subscribe(),
            StreamGuard {
                dispatcher: Arc::clone(&state.dispatcher),
                subscriber_id: subscriber.id(),
            },
        ));

        // Initial greeting is immediate.
        stream.next().await.unwrap().unwrap();

        let started = std::time::Instant::now();
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame, "data: []\n\n");
        assert!(started.elapsed() >= heartbeat);
    }

    #[tokio::test]
    async fn shutdown_ends_the_stream_and_unsubscribes() {
        let state = test_state();
        let (subscriber, receiver) = state.dispatcher.subscribe(
            "10.0.0.1".to_string(),
            vec!["Article".to_string()],
            false,
            Default::default(),
        );
        assert_eq!(state.dispatcher.subscribers().len(), 1);

        let mut stream = Box::pin(notification_stream(
            receiver,
            Duration::from_secs(30),
            state.shutdown.subscribe(),
            StreamGuard {
                dispatcher: Arc::clone(&state.dispatcher),
                subscriber_id: subscriber.id(),
            },
        ));
        stream.next().await.unwrap().unwrap();

        state.shutdown.shutdown();
        assert!(stream.next().await.is_none());
        drop(stream);
        assert!(state.dispatcher.subscribers().is_empty());
    }
}
