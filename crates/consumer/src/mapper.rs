//! Maps accepted publication events to canonical notifications.

use once_cell::sync::Lazy;
use regex::Regex;

use dispatch::{
    Notification, Standout, ANNOTATIONS_TYPE, ANNOTATION_UPDATE_TYPE, ARTICLE_CONTENT_TYPE,
    AUDIO_CONTENT_TYPE, CONTENT_CREATE_TYPE, CONTENT_DELETE_TYPE, CONTENT_PACKAGE_TYPE, LIST_TYPE,
    LIVE_BLOG_PACKAGE_TYPE, LIVE_BLOG_POST_TYPE, PAGE_TYPE, RELATED_CONTENT_TYPE,
};

use crate::error::ConsumerError;
use crate::message::NotificationMessage;

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new("[a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12}")
        .expect("uuid pattern")
});

/// Builds canonical notifications out of parsed publication events.
#[derive(Debug, Clone)]
pub struct NotificationMapper {
    pub api_base_url: String,
    pub resource: String,
    /// Notification type URI used for plain updates.
    pub update_event_type: String,
    /// When false, `standout` is never attached.
    pub include_scoop: bool,
}

impl NotificationMapper {
    /// Maps a content event. The event kind comes from the payload:
    /// deletions first, then related-content markers, then first-publish
    /// detection, otherwise the configured update type.
    pub fn map_notification(
        &self,
        event: &NotificationMessage,
        transaction_id: &str,
        content_type_header: &str,
    ) -> Result<Notification, ConsumerError> {
        let uuid = extract_uuid(&event.content_uri)?;

        let payload = event.payload.clone().unwrap_or_default();

        let event_type;
        let mut title = String::new();
        let mut scoop = false;
        let subscription_type;
        if payload.deleted {
            event_type = CONTENT_DELETE_TYPE.to_string();
            subscription_type = resolve_type_from_header(content_type_header).to_string();
        } else {
            event_type = if payload.is_related_content_notification {
                RELATED_CONTENT_TYPE.to_string()
            } else if payload.publish_count == 1 {
                CONTENT_CREATE_TYPE.to_string()
            } else {
                self.update_event_type.clone()
            };
            title = payload.title.clone();
            subscription_type = payload.content_type.clone();
            scoop = payload.standout.map(|s| s.scoop).unwrap_or(false);
        }

        let standout = if self.include_scoop
            && subscription_type != LIST_TYPE
            && subscription_type != PAGE_TYPE
        {
            Some(Standout { scoop })
        } else {
            None
        };

        Ok(Notification {
            event_type,
            id: format!("http://www.ft.com/thing/{uuid}"),
            api_url: format!("{}/{}/{}", self.api_base_url, self.resource, uuid),
            publish_reference: transaction_id.to_string(),
            last_modified: event.last_modified.clone(),
            title,
            standout,
            editorial_desk: payload.editorial_desk,
            publication: payload.publication,
            subscription_type,
            ..Default::default()
        })
    }

    /// Maps an annotation event. The subscription type defaults to
    /// `Annotations` when the payload does not name one.
    pub fn map_metadata_notification(
        &self,
        event: &NotificationMessage,
        transaction_id: &str,
    ) -> Result<Notification, ConsumerError> {
        let uuid = extract_uuid(&event.content_uri)?;
        let payload = event.payload.as_ref().ok_or(ConsumerError::MissingPayload)?;

        let subscription_type = if payload.content_type.is_empty() {
            ANNOTATIONS_TYPE.to_string()
        } else {
            payload.content_type.clone()
        };

        Ok(Notification {
            event_type: ANNOTATION_UPDATE_TYPE.to_string(),
            id: format!("http://www.ft.com/thing/{uuid}"),
            api_url: format!("{}/{}/{}", self.api_base_url, self.resource, uuid),
            publish_reference: transaction_id.to_string(),
            last_modified: event.last_modified.clone(),
            subscription_type,
            ..Default::default()
        })
    }
}

fn extract_uuid(content_uri: &str) -> Result<&str, ConsumerError> {
    UUID_PATTERN
        .find(content_uri)
        .map(|m| m.as_str())
        .ok_or(ConsumerError::MissingUuid)
}

fn resolve_type_from_header(content_type_header: &str) -> &'static str {
    match content_type_header {
        "application/vnd.ft-upp-article-internal+json" => ARTICLE_CONTENT_TYPE,
        "application/vnd.ft-upp-content-package+json" => CONTENT_PACKAGE_TYPE,
        "application/vnd.ft-upp-audio+json" => AUDIO_CONTENT_TYPE,
        "application/vnd.ft-upp-live-blog-post-internal+json" => LIVE_BLOG_POST_TYPE,
        "application/vnd.ft-upp-live-blog-package-internal+json" => LIVE_BLOG_PACKAGE_TYPE,
        "application/vnd.ft-upp-page+json" => PAGE_TYPE,
        "application/vnd.ft-upp-list+json" => LIST_TYPE,
        _ => "",
    }
}
