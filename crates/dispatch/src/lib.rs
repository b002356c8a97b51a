//! Notification dispatch layer.
//!
//! The [`Dispatcher`] owns the single fan-out loop: notifications arrive on
//! an inbound channel (after a configured per-notification delay), pass the
//! access and subscription filters, and land on each eligible subscriber's
//! bounded outbound queue. A bounded in-memory [`History`] keeps the most
//! recent notifications for the read-only snapshot endpoint.
//!
//! Subscribers come in two variants that differ only in their wire
//! projection: standard subscribers see the public fields, monitor
//! subscribers additionally see provenance (`publishReference`,
//! `lastModified`, `notificationDate`) and their own subscriber id.

mod dispatcher;
mod history;
mod model;
mod publication;
mod subscriber;

pub use dispatcher::{matches_sub_type, Dispatcher};
pub use history::History;
pub use model::{
    marshal_frame, Notification, NotificationResponse, Standout, ANNOTATIONS_TYPE,
    ANNOTATION_UPDATE_TYPE, ARTICLE_CONTENT_TYPE, AUDIO_CONTENT_TYPE, CONTENT_CREATE_TYPE,
    CONTENT_DELETE_TYPE, CONTENT_PACKAGE_TYPE, CONTENT_UPDATE_TYPE, LIST_TYPE,
    LIVE_BLOG_PACKAGE_TYPE, LIVE_BLOG_POST_TYPE, PAGE_TYPE, RELATED_CONTENT_TYPE,
};
pub use publication::{Publications, PublicationError, FT_PINK_UUID};
pub use subscriber::{
    SendError, Subscriber, SubscriberPayload, SubscriberVariant, NOTIFICATION_BUFFER,
};
