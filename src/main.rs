//! Notifications push service binary.
//!
//! Wires the Kafka consumer, the dispatcher and the HTTP server together
//! and coordinates graceful shutdown: stop accepting connections, cancel
//! in-flight push streams, close the bus consumer, stop the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use notifications_push::config::AppConfig;
use notifications_push::{
    AppState, BusMonitor, ContentQueueHandler, Dispatcher, HealthCheck, History, KeyProcessor,
    MessageConsumer, MessageQueueRouter, MetadataQueueHandler, NotificationMapper,
    NotificationSender, PolicyProcessor, RuleTableEvaluator, ShutdownRegistry,
};

const GATEWAY_CLIENT_TIMEOUT: Duration = Duration::from_secs(15);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .json()
        .init();

    tracing::info!(
        kafka_address = %config.kafka_address,
        topic = %config.topic,
        group_id = %config.consumer_group,
        resource = %config.resource,
        "starting notifications-push"
    );

    let evaluator = Arc::new(RuleTableEvaluator::new(
        config.blocked_editorial_desks.clone(),
        config.allowed_publications.clone(),
    ));
    let history = Arc::new(History::new(config.history_size));
    let dispatcher = Arc::new(Dispatcher::new(
        config.delay(),
        Arc::clone(&history),
        evaluator,
    ));

    let mapper = NotificationMapper {
        api_base_url: config.api_base_url.clone(),
        resource: config.resource.clone(),
        update_event_type: config.update_event_type.clone(),
        include_scoop: config.include_scoop,
    };
    let content_handler = ContentQueueHandler::new(
        config.uri_allowlist()?,
        config.content_type_allowlist(),
        config.e2e_test_ids.clone(),
        mapper.clone(),
        Arc::clone(&dispatcher) as Arc<dyn NotificationSender>,
    );
    let metadata_handler = config.annotations_enabled.then(|| {
        MetadataQueueHandler::new(
            config.origin_allowlist.clone(),
            mapper.clone(),
            Arc::clone(&dispatcher) as Arc<dyn NotificationSender>,
        )
    });
    let router = MessageQueueRouter::new(content_handler, metadata_handler);

    let message_consumer = Arc::new(MessageConsumer::new(
        &config.kafka_address,
        &config.consumer_group,
        &config.topic,
        config.kafka_lag_tolerance,
    )?);

    let gateway_client = reqwest::Client::builder()
        .timeout(GATEWAY_CLIENT_TIMEOUT)
        .build()?;
    let shutdown_registry = ShutdownRegistry::new();

    let state = Arc::new(AppState {
        resource: config.resource.clone(),
        dispatcher: Arc::clone(&dispatcher),
        history,
        key_processor: KeyProcessor::new(
            config.api_key_validation_endpoint.clone(),
            gateway_client.clone(),
        ),
        policy_processor: PolicyProcessor::new(
            config.api_policies_endpoint.clone(),
            gateway_client.clone(),
        ),
        health: HealthCheck::new(
            Arc::clone(&message_consumer) as Arc<dyn BusMonitor>,
            config.api_gateway_gtg_endpoint.clone(),
            gateway_client,
        ),
        heartbeat_period: config.heartbeat_period(),
        default_subscription_type: config.default_subscription_type.clone(),
        supported_subscription_types: config.supported_subscription_types.clone(),
        all_subscription_types: config.all_subscription_types.clone(),
        shutdown: shutdown_registry.clone(),
    });

    let dispatcher_task = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.start().await })
    };

    let (consumer_stop, consumer_stop_rx) = watch::channel(false);
    let consumer_task = {
        let message_consumer = Arc::clone(&message_consumer);
        tokio::spawn(async move { message_consumer.start(&router, consumer_stop_rx).await })
    };

    let shutdown = {
        let registry = shutdown_registry.clone();
        async move {
            shutdown_signal().await;
            // Terminates every in-flight push stream so the server can
            // drain its connections.
            registry.shutdown();
        }
    };
    notifications_push::start_server(state, config.socket_addr()?, shutdown).await?;

    let _ = consumer_stop.send(true);
    if tokio::time::timeout(SHUTDOWN_GRACE, consumer_task)
        .await
        .is_err()
    {
        tracing::warn!("bus consumer did not stop within the grace period");
    }

    dispatcher.stop();
    if tokio::time::timeout(SHUTDOWN_GRACE, dispatcher_task)
        .await
        .is_err()
    {
        tracing::warn!("dispatcher did not stop within the grace period");
    }

    tracing::info!("notifications-push shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
