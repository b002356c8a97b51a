//! Raw bus records and their parsed publication events.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use dispatch::Publications;

use crate::error::ConsumerError;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const MESSAGE_TYPE_HEADER: &str = "Message-Type";
pub const ORIGIN_SYSTEM_ID_HEADER: &str = "Origin-System-Id";
pub const MESSAGE_TIMESTAMP_HEADER: &str = "Message-Timestamp";

/// Message type marking annotation events.
pub const ANNOTATION_MESSAGE_TYPE: &str = "concept-annotation";

const SYNTHETIC_TID_PREFIX: &str = "SYNTH";

static CAROUSEL_TID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+_carousel_[\d]{10}.*$").expect("carousel tid pattern"));

/// A record as delivered by the message bus: single-valued headers plus a
/// raw body expected to hold a JSON document.
#[derive(Debug, Clone, Default)]
pub struct BusRecord {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl BusRecord {
    pub fn new(headers: HashMap<String, String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }
}

/// Classification wrapper around a [`BusRecord`].
#[derive(Debug, Clone)]
pub struct QueueMessage(pub BusRecord);

impl QueueMessage {
    pub fn transaction_id(&self) -> &str {
        self.header(REQUEST_ID_HEADER)
    }

    pub fn content_type(&self) -> &str {
        self.header(CONTENT_TYPE_HEADER)
    }

    pub fn message_type(&self) -> &str {
        self.header(MESSAGE_TYPE_HEADER)
    }

    pub fn origin_system_id(&self) -> &str {
        self.header(ORIGIN_SYSTEM_ID_HEADER)
    }

    fn header(&self, name: &str) -> &str {
        self.0.headers.get(name).map(String::as_str).unwrap_or("")
    }

    /// True for diagnostic events whose transaction id starts with `SYNTH`.
    pub fn has_synthetic_transaction_id(&self) -> bool {
        self.transaction_id().starts_with(SYNTHETIC_TID_PREFIX)
    }

    /// True for republishes generated by the publish carousel.
    pub fn has_carousel_transaction_id(&self) -> bool {
        CAROUSEL_TID_PATTERN.is_match(self.transaction_id())
    }

    /// True when the transaction id contains any of the configured
    /// end-to-end test UUIDs.
    pub fn has_e2e_test_transaction_id(&self, e2e_test_uuids: &[String]) -> bool {
        let tid = self.transaction_id();
        e2e_test_uuids.iter().any(|uuid| tid.contains(uuid))
    }

    pub fn is_annotation_message(&self) -> bool {
        self.message_type() == ANNOTATION_MESSAGE_TYPE
    }

    /// Parses the body as a publication event.
    pub fn parse(&self) -> Result<NotificationMessage, ConsumerError> {
        Ok(serde_json::from_slice(&self.0.body)?)
    }
}

/// Parsed publication event body. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationMessage {
    #[serde(default, rename = "contentUri", alias = "ContentURI")]
    pub content_uri: String,
    #[serde(default, rename = "lastModified", alias = "LastModified")]
    pub last_modified: String,
    #[serde(default, rename = "payload", alias = "Payload")]
    pub payload: Option<Payload>,
}

impl NotificationMessage {
    /// True when the content URI matches the configured allow-list.
    pub fn matches(&self, allowlist: &Regex) -> bool {
        allowlist.is_match(&self.content_uri)
    }
}

/// Structured event payload with optional fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Payload {
    #[serde(default, rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub publication: Option<Publications>,
    #[serde(default, rename = "editorialDesk")]
    pub editorial_desk: String,
    #[serde(default, rename = "publishCount")]
    pub publish_count: u64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, rename = "is_related_content_notification")]
    pub is_related_content_notification: bool,
    #[serde(default)]
    pub standout: Option<PayloadStandout>,
}

/// The `standout` block as published upstream.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PayloadStandout {
    #[serde(default, rename = "editorsChoice")]
    pub editors_choice: bool,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub scoop: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_tid(tid: &str) -> QueueMessage {
        let mut headers = HashMap::new();
        headers.insert(REQUEST_ID_HEADER.to_string(), tid.to_string());
        QueueMessage(BusRecord::new(headers, Vec::new()))
    }

    #[test]
    fn synthetic_transaction_ids_are_detected() {
        assert!(message_with_tid("SYNTH-xyz").has_synthetic_transaction_id());
        assert!(message_with_tid("SYNTHETIC-REQ-MON_abc").has_synthetic_transaction_id());
        assert!(!message_with_tid("tid_normal").has_synthetic_transaction_id());
    }

    #[test]
    fn carousel_transaction_ids_are_detected() {
        assert!(message_with_tid("tid_foo_carousel_1485954245").has_carousel_transaction_id());
        assert!(
            message_with_tid("tid_foo_carousel_1485954245_gentx").has_carousel_transaction_id()
        );
        assert!(!message_with_tid("tid_foo_carousel_148595").has_carousel_transaction_id());
        assert!(!message_with_tid("_carousel_1485954245").has_carousel_transaction_id());
    }

    #[test]
    fn e2e_transaction_ids_match_configured_uuids() {
        let uuids = vec!["e4d2885f-1140-400b-9407-921e1c7378cd".to_string()];
        assert!(
            message_with_tid("SYNTHETIC-REQ-MONe4d2885f-1140-400b-9407-921e1c7378cd")
                .has_e2e_test_transaction_id(&uuids)
        );
        assert!(!message_with_tid("tid_normal").has_e2e_test_transaction_id(&uuids));
        assert!(!message_with_tid("tid_normal").has_e2e_test_transaction_id(&[]));
    }

    #[test]
    fn body_parses_with_unknown_fields_ignored() {
        let body = r#"{
            "contentUri": "http://methode-article-mapper.svc.ft.com/content/3cc23068-e501-11e9-9743-db5a370481bc",
            "lastModified": "2019-10-02T15:13:19.52Z",
            "somethingNew": {"nested": true},
            "payload": {"title": "T", "type": "Article", "publishCount": 3, "standout": {"scoop": true}}
        }"#;
        let msg = QueueMessage(BusRecord::new(HashMap::new(), body.as_bytes().to_vec()));
        let event = msg.parse().unwrap();
        assert!(event.content_uri.contains("3cc23068"));
        let payload = event.payload.unwrap();
        assert_eq!(payload.title, "T");
        assert_eq!(payload.publish_count, 3);
        assert!(payload.standout.unwrap().scoop);
    }

    #[test]
    fn unparseable_body_is_an_error() {
        let msg = QueueMessage(BusRecord::new(HashMap::new(), b"not json".to_vec()));
        assert!(msg.parse().is_err());
    }

    #[test]
    fn annotation_messages_are_recognised_by_header() {
        let mut headers = HashMap::new();
        headers.insert(
            MESSAGE_TYPE_HEADER.to_string(),
            ANNOTATION_MESSAGE_TYPE.to_string(),
        );
        assert!(QueueMessage(BusRecord::new(headers, Vec::new())).is_annotation_message());
        assert!(!message_with_tid("tid").is_annotation_message());
    }
}
