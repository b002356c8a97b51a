//! HTTP surface of the notifications push service.
//!
//! The main endpoint is the long-lived SSE stream at
//! `GET /{resource}/notifications-push`: the handler validates the API key,
//! looks up the key's subscription options, registers a subscriber with the
//! dispatcher and streams frames (plus heartbeats) until the client
//! disconnects or the service shuts down.
//!
//! Operational endpoints:
//!
//! - `GET /__history` - recent notifications, policy-gated projection
//! - `GET /__stats` - currently connected subscribers
//! - `GET /__health` - composite dependency checks
//! - `GET /__gtg` - readiness (bus and gateway both reachable)
//! - `GET /__ping`, `GET /__build-info` - standard service plumbing
//!
//! In-flight streams register with the [`ShutdownRegistry`]; graceful
//! shutdown fires the registry so every stream terminates before the
//! process exits.

pub mod error;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

pub use error::{ServerError, ServerResult};
pub use routes::health::{BusMonitor, HealthCheck};
pub use server::{build_router, start_server};
pub use shutdown::ShutdownRegistry;
pub use state::AppState;
