//! Per-client subscriber state and its bounded outbound queue.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use access::SubscriptionOptions;

use crate::model::{marshal_frame, Notification, NotificationResponse};

/// Capacity of each subscriber's outbound queue. A full queue never blocks
/// the dispatcher; the write is dropped and reported as a send failure.
pub const NOTIFICATION_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("subscriber lagging behind")]
    Lagging,
    #[error("subscriber queue closed")]
    Closed,
    #[error("serialising notification failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Wire projection variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberVariant {
    /// Public projection: no provenance fields.
    Standard,
    /// Monitoring projection: provenance plus the subscriber id.
    Monitor,
}

impl SubscriberVariant {
    fn name(self) -> &'static str {
        match self {
            SubscriberVariant::Standard => "StandardSubscriber",
            SubscriberVariant::Monitor => "MonitorSubscriber",
        }
    }
}

/// A registered push-stream client.
///
/// The subscriber owns the sending half of its outbound queue; the receiving
/// half is handed to the HTTP handler that streams frames to the client.
#[derive(Debug)]
pub struct Subscriber {
    id: Uuid,
    address: String,
    since: DateTime<Utc>,
    accepted_types: Vec<String>,
    options: SubscriptionOptions,
    variant: SubscriberVariant,
    sender: mpsc::Sender<String>,
}

impl Subscriber {
    pub fn new(
        address: String,
        accepted_types: Vec<String>,
        variant: SubscriberVariant,
        options: SubscriptionOptions,
    ) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(NOTIFICATION_BUFFER);
        let subscriber = Self {
            id: Uuid::new_v4(),
            address,
            since: Utc::now(),
            accepted_types,
            options,
            variant,
            sender,
        };
        (subscriber, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    pub fn accepted_types(&self) -> &[String] {
        &self.accepted_types
    }

    pub fn options(&self) -> &SubscriptionOptions {
        &self.options
    }

    pub fn is_monitor(&self) -> bool {
        self.variant == SubscriberVariant::Monitor
    }

    /// Projects, serialises and enqueues a notification without blocking.
    /// A full queue fails with [`SendError::Lagging`]; the caller treats
    /// this as a per-subscriber failure.
    pub fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let mut response = NotificationResponse::from_notification(notification, &self.options);
        match self.variant {
            SubscriberVariant::Standard => {
                response = response.strip_provenance();
            }
            SubscriberVariant::Monitor => {
                response.subscriber_id = Some(self.id.to_string());
            }
        }

        let frame = marshal_frame(&[response])?;
        self.sender.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => SendError::Lagging,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    pub fn payload(&self) -> SubscriberPayload {
        let connected_for = Utc::now().signed_duration_since(self.since);
        SubscriberPayload {
            id: self.id.to_string(),
            address: self.address.clone(),
            since: self.since.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            connection_duration: format!("{}s", connected_for.num_seconds()),
            subscriber_type: self.variant.name().to_string(),
        }
    }
}

/// Operational JSON view of a subscriber, served by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberPayload {
    pub id: String,
    pub address: String,
    pub since: String,
    pub connection_duration: String,
    #[serde(rename = "type")]
    pub subscriber_type: String,
}
