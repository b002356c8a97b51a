//! Umbrella crate for the notifications push service.
//!
//! The service sits between the publication pipeline and downstream
//! subscribers: raw content-change events arrive from the message bus, pass
//! an ingest filter and a notification mapper, and fan out as server-sent
//! events to every eligible connected client.
//!
//! The workspace crates map onto the pipeline stages:
//!
//! - [`consumer`](::consumer) - bus records, transaction-id classification,
//!   allow-list filtering, notification mapping and the Kafka driver.
//! - [`dispatch`](::dispatch) - the canonical notification model, the
//!   subscriber registry with bounded per-client queues, the in-memory
//!   history ring and the fan-out dispatcher.
//! - [`access`](::access) - API key validation, subscription policy lookup
//!   and the notification access evaluator.
//! - [`server`](::server) - the HTTP surface: the SSE subscription stream,
//!   history and stats snapshots, health and readiness.
//!
//! This crate re-exports the pieces the binary wires together and owns the
//! service configuration in [`config`].

pub mod config;

pub use access::{
    AccessEvaluator, AccessQuery, KeyErr, KeyProcessor, PolicyDecision, PolicyErr,
    PolicyProcessor, RuleTableEvaluator, SubscriptionOptions,
};
pub use consumer::{
    BusRecord, ContentQueueHandler, MessageConsumer, MessageQueueRouter, MetadataQueueHandler,
    NotificationMapper, NotificationSender,
};
pub use dispatch::{
    Dispatcher, History, Notification, NotificationResponse, Publications, Standout, Subscriber,
    SubscriberVariant,
};
pub use server::{build_router, start_server, AppState, BusMonitor, HealthCheck, ShutdownRegistry};

pub use config::AppConfig;
