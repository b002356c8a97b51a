use std::sync::Arc;
use std::time::Duration;

use access::{KeyProcessor, PolicyProcessor};
use dispatch::{Dispatcher, History};

use crate::routes::health::HealthCheck;
use crate::shutdown::ShutdownRegistry;

/// Shared application state
pub struct AppState {
    /// Resource segment of the push path, e.g. `content` for
    /// `/content/notifications-push`.
    pub resource: String,

    pub dispatcher: Arc<Dispatcher>,
    pub history: Arc<History>,

    pub key_processor: KeyProcessor,
    pub policy_processor: PolicyProcessor,
    pub health: HealthCheck,

    pub heartbeat_period: Duration,

    /// Subscription type used when the client supplies none.
    pub default_subscription_type: String,
    /// Types accepted in the `type` query parameter.
    pub supported_subscription_types: Vec<String>,
    /// Expansion of the `All` pseudo-type.
    pub all_subscription_types: Vec<String>,

    pub shutdown: ShutdownRegistry,
}
