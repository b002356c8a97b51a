//! Canonical notification record and its wire projection.

use serde::{Deserialize, Serialize};

use access::SubscriptionOptions;

use crate::publication::Publications;

// subscription types
pub const ANNOTATIONS_TYPE: &str = "Annotations";
pub const ARTICLE_CONTENT_TYPE: &str = "Article";
pub const CONTENT_PACKAGE_TYPE: &str = "ContentPackage";
pub const AUDIO_CONTENT_TYPE: &str = "Audio";
pub const LIVE_BLOG_PACKAGE_TYPE: &str = "LiveBlogPackage";
pub const LIVE_BLOG_POST_TYPE: &str = "LiveBlogPost";
pub const PAGE_TYPE: &str = "Page";
pub const LIST_TYPE: &str = "List";

// notification types
pub const CONTENT_UPDATE_TYPE: &str = "http://www.ft.com/thing/ThingChangeType/UPDATE";
pub const CONTENT_CREATE_TYPE: &str = "http://www.ft.com/thing/ThingChangeType/CREATE";
pub const CONTENT_DELETE_TYPE: &str = "http://www.ft.com/thing/ThingChangeType/DELETE";
pub const ANNOTATION_UPDATE_TYPE: &str = "http://www.ft.com/thing/ThingChangeType/ANNOTATIONS_UPDATE";
pub const RELATED_CONTENT_TYPE: &str = "http://www.ft.com/thing/ThingChangeType/RELATEDCONTENT";

/// A `standout` block on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standout {
    pub scoop: bool,
}

/// Canonical internal notification, immutable once dispatched.
///
/// `notification_date` is stamped when the record enters the fan-out stage,
/// never at ingest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    pub api_url: String,
    pub id: String,
    pub event_type: String,
    pub publish_reference: String,
    pub last_modified: String,
    pub notification_date: String,
    pub title: String,
    pub standout: Option<Standout>,
    pub editorial_desk: String,
    pub publication: Option<Publications>,
    pub subscription_type: String,
    pub is_e2e_test: bool,
}

/// Public wire projection of a [`Notification`].
///
/// Field order matters: frames are emitted in this declaration order.
/// Provenance fields (`publishReference`, `lastModified`,
/// `notificationDate`) and `subscriberId` are populated only for monitor
/// subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub api_url: String,
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub publish_reference: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_modified: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notification_date: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standout: Option<Standout>,
}

impl NotificationResponse {
    /// Builds the wire projection, applying the CREATE→UPDATE downgrade for
    /// subscribers without the advanced-notifications option.
    pub fn from_notification(n: &Notification, options: &SubscriptionOptions) -> Self {
        let event_type = if n.event_type == CONTENT_CREATE_TYPE
            && !options.receive_advanced_notifications
        {
            CONTENT_UPDATE_TYPE.to_string()
        } else {
            n.event_type.clone()
        };

        Self {
            api_url: n.api_url.clone(),
            id: n.id.clone(),
            event_type,
            subscriber_id: None,
            publish_reference: n.publish_reference.clone(),
            last_modified: n.last_modified.clone(),
            notification_date: n.notification_date.clone(),
            title: n.title.clone(),
            standout: n.standout,
        }
    }

    /// Drops the provenance fields, leaving the standard projection.
    pub fn strip_provenance(mut self) -> Self {
        self.publish_reference.clear();
        self.last_modified.clear();
        self.notification_date.clear();
        self
    }
}

/// Serialises a batch of responses as a single-line JSON array.
///
/// serde_json writes `<`, `>` and `&` verbatim, which the SSE frame contract
/// requires.
pub fn marshal_frame(responses: &[NotificationResponse]) -> Result<String, serde_json::Error> {
    serde_json::to_string(responses)
}
