//! Queue handlers: filter chains in front of the dispatcher.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;

use dispatch::{Dispatcher, Notification};

use crate::error::ConsumerError;
use crate::mapper::NotificationMapper;
use crate::message::{BusRecord, QueueMessage};

/// Seam between the queue handlers and the dispatcher.
pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: Notification);
}

impl NotificationSender for Dispatcher {
    fn send(&self, notification: Notification) {
        Dispatcher::send(self, notification)
    }
}

/// Filters and maps content publication events.
///
/// Decision order, short-circuiting on the first match: parse failure,
/// carousel republish, end-to-end test bypass, synthetic transaction,
/// allow-list gating.
pub struct ContentQueueHandler {
    uri_allowlist: Regex,
    content_type_allowlist: HashSet<String>,
    e2e_test_uuids: Vec<String>,
    mapper: NotificationMapper,
    dispatcher: Arc<dyn NotificationSender>,
}

impl ContentQueueHandler {
    pub fn new(
        uri_allowlist: Regex,
        content_type_allowlist: HashSet<String>,
        e2e_test_uuids: Vec<String>,
        mapper: NotificationMapper,
        dispatcher: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            uri_allowlist,
            content_type_allowlist,
            e2e_test_uuids,
            mapper,
            dispatcher,
        }
    }

    pub fn handle_message(&self, record: BusRecord) -> Result<(), ConsumerError> {
        let msg = QueueMessage(record);
        let tid = msg.transaction_id().to_string();

        let event = match msg.parse() {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(transaction_id = %tid, error = %err, "skipping event");
                return Err(err);
            }
        };

        if msg.has_carousel_transaction_id() {
            tracing::info!(
                transaction_id = %tid,
                content_uri = %event.content_uri,
                "skipping event: carousel publication event"
            );
            return Ok(());
        }

        let is_e2e_test = msg.has_e2e_test_transaction_id(&self.e2e_test_uuids);
        if !is_e2e_test {
            if msg.has_synthetic_transaction_id() {
                tracing::info!(
                    transaction_id = %tid,
                    content_uri = %event.content_uri,
                    "skipping event: synthetic transaction id"
                );
                return Ok(());
            }

            let content_type = strip_directives(msg.content_type());
            if content_type.is_empty() || content_type == "application/json" {
                if !event.matches(&self.uri_allowlist) {
                    tracing::info!(
                        transaction_id = %tid,
                        content_uri = %event.content_uri,
                        "skipping event: contentUri is not in the allowlist"
                    );
                    return Ok(());
                }
            } else if !self.content_type_allowlist.contains(content_type) {
                tracing::info!(
                    transaction_id = %tid,
                    content_type = %content_type,
                    "skipping event: contentType is not in the allowlist"
                );
                return Ok(());
            }
        }

        let mut notification =
            match self
                .mapper
                .map_notification(&event, &tid, msg.content_type())
            {
                Ok(notification) => notification,
                Err(err) => {
                    tracing::warn!(
                        transaction_id = %tid,
                        error = %err,
                        "skipping event: cannot build notification"
                    );
                    return Err(err);
                }
            };
        notification.is_e2e_test = is_e2e_test;

        tracing::info!(
            transaction_id = %tid,
            resource = %notification.api_url,
            "valid notification received"
        );
        self.dispatcher.send(notification);
        Ok(())
    }
}

/// Filters and maps annotation events.
pub struct MetadataQueueHandler {
    origin_allowlist: Vec<String>,
    mapper: NotificationMapper,
    dispatcher: Arc<dyn NotificationSender>,
}

impl MetadataQueueHandler {
    pub fn new(
        origin_allowlist: Vec<String>,
        mapper: NotificationMapper,
        dispatcher: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            origin_allowlist,
            mapper,
            dispatcher,
        }
    }

    pub fn handle_message(&self, record: BusRecord) -> Result<(), ConsumerError> {
        let msg = QueueMessage(record);
        let tid = msg.transaction_id().to_string();

        let event = match msg.parse() {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(transaction_id = %tid, error = %err, "skipping annotation event");
                return Err(err);
            }
        };

        if msg.has_synthetic_transaction_id() {
            tracing::info!(
                transaction_id = %tid,
                content_uri = %event.content_uri,
                "skipping annotation event: synthetic transaction id"
            );
            return Ok(());
        }

        if !self.is_allowed_origin(msg.origin_system_id()) {
            tracing::info!(
                transaction_id = %tid,
                origin_system_id = %msg.origin_system_id(),
                "skipping annotation event: origin system is not in the allowlist"
            );
            return Ok(());
        }

        let notification = match self.mapper.map_metadata_notification(&event, &tid) {
            Ok(notification) => notification,
            Err(err) => {
                tracing::warn!(
                    transaction_id = %tid,
                    error = %err,
                    "could not map event to annotations notification"
                );
                return Err(err);
            }
        };

        tracing::info!(
            transaction_id = %tid,
            resource = %notification.api_url,
            "valid annotation notification received"
        );
        self.dispatcher.send(notification);
        Ok(())
    }

    fn is_allowed_origin(&self, origin: &str) -> bool {
        self.origin_allowlist.iter().any(|allowed| allowed == origin)
    }
}

/// Routes bus records to the content or annotation handler based on the
/// `Message-Type` header.
pub struct MessageQueueRouter {
    content_handler: ContentQueueHandler,
    metadata_handler: Option<MetadataQueueHandler>,
}

impl MessageQueueRouter {
    pub fn new(
        content_handler: ContentQueueHandler,
        metadata_handler: Option<MetadataQueueHandler>,
    ) -> Self {
        Self {
            content_handler,
            metadata_handler,
        }
    }

    pub fn handle_message(&self, record: BusRecord) -> Result<(), ConsumerError> {
        if let Some(metadata_handler) = &self.metadata_handler {
            if QueueMessage(record.clone()).is_annotation_message() {
                return metadata_handler.handle_message(record);
            }
        }
        self.content_handler.handle_message(record)
    }
}

fn strip_directives(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}
