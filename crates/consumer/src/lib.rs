//! Ingest side of the push pipeline.
//!
//! Raw bus records come in as `{headers, body}` pairs. [`QueueMessage`]
//! classifies the transaction id (synthetic, carousel, end-to-end test) and
//! parses the body; [`ContentQueueHandler`] applies the allow-list gating
//! and hands accepted events to [`NotificationMapper`], which builds the
//! canonical notification for the dispatcher. Annotation events are routed
//! to a dedicated [`MetadataQueueHandler`] by [`MessageQueueRouter`].
//!
//! [`MessageConsumer`] is the Kafka driver: it feeds the router one record
//! per message and exposes the connectivity and lag probes used by the
//! health endpoint.

mod bus;
mod error;
mod handler;
mod mapper;
mod message;

pub use bus::MessageConsumer;
pub use error::ConsumerError;
pub use handler::{
    ContentQueueHandler, MessageQueueRouter, MetadataQueueHandler, NotificationSender,
};
pub use mapper::NotificationMapper;
pub use message::{
    BusRecord, NotificationMessage, Payload, PayloadStandout, QueueMessage, CONTENT_TYPE_HEADER,
    MESSAGE_TIMESTAMP_HEADER, MESSAGE_TYPE_HEADER, ORIGIN_SYSTEM_ID_HEADER, REQUEST_ID_HEADER,
};
