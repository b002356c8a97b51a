//! Kafka driver feeding the queue handlers.

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tokio::sync::watch;

use crate::error::ConsumerError;
use crate::handler::MessageQueueRouter;
use crate::message::BusRecord;

const BROKER_TIMEOUT: Duration = Duration::from_secs(10);

/// Consumes the notifications topic and hands one [`BusRecord`] per message
/// to the router. Also exposes the connectivity and lag probes used by the
/// health endpoint.
pub struct MessageConsumer {
    consumer: StreamConsumer,
    topic: String,
    lag_tolerance: i64,
}

impl MessageConsumer {
    pub fn new(
        brokers: &str,
        group_id: &str,
        topic: &str,
        lag_tolerance: i64,
    ) -> Result<Self, ConsumerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()?;
        consumer.subscribe(&[topic])?;

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            lag_tolerance,
        })
    }

    /// Drains the topic until shutdown is signalled. Handler failures are
    /// logged and never interrupt consumption; retry is the bus's concern.
    pub async fn start(&self, router: &MessageQueueRouter, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(topic = %self.topic, "started consuming");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                result = self.consumer.recv() => match result {
                    Ok(message) => {
                        if let Err(err) = router.handle_message(to_bus_record(&message)) {
                            tracing::warn!(
                                topic = %self.topic,
                                offset = message.offset(),
                                error = %err,
                                "message handling failed"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::warn!(topic = %self.topic, error = %err, "kafka receive failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "finished consuming");
    }

    /// Succeeds when the brokers answer a metadata request for the topic.
    pub fn connectivity_check(&self) -> Result<(), ConsumerError> {
        self.consumer
            .fetch_metadata(Some(&self.topic), BROKER_TIMEOUT)?;
        Ok(())
    }

    /// Compares committed offsets against the high watermarks across all
    /// partitions of the topic.
    pub fn lag_check(&self) -> Result<(), ConsumerError> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(&self.topic), BROKER_TIMEOUT)?;

        let mut total_lag = 0i64;
        for topic in metadata.topics() {
            for partition in topic.partitions() {
                let (_, high) =
                    self.consumer
                        .fetch_watermarks(&self.topic, partition.id(), BROKER_TIMEOUT)?;

                let mut assignment = TopicPartitionList::new();
                assignment.add_partition(&self.topic, partition.id());
                let committed = self.consumer.committed_offsets(assignment, BROKER_TIMEOUT)?;
                if let Some(element) = committed.elements().first() {
                    if let Offset::Offset(offset) = element.offset() {
                        total_lag += (high - offset).max(0);
                    }
                }
            }
        }

        if total_lag > self.lag_tolerance {
            return Err(ConsumerError::Lagging {
                lag: total_lag,
                tolerance: self.lag_tolerance,
            });
        }
        Ok(())
    }
}

fn to_bus_record<M: Message>(message: &M) -> BusRecord {
    let mut headers = HashMap::new();
    if let Some(message_headers) = message.headers() {
        for header in message_headers.iter() {
            if let Some(value) = header.value {
                if let Ok(value) = std::str::from_utf8(value) {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }
    }
    BusRecord::new(headers, message.payload().unwrap_or_default().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::REQUEST_ID_HEADER;
    use rdkafka::message::{Header, OwnedHeaders, OwnedMessage};
    use rdkafka::Timestamp;

    #[test]
    fn bus_records_carry_headers_and_body() {
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: REQUEST_ID_HEADER,
                value: Some("tid_test"),
            })
            .insert(Header {
                key: "Content-Type",
                value: Some("application/json"),
            });
        let message = OwnedMessage::new(
            Some(br#"{"contentUri":"x"}"#.to_vec()),
            None,
            "PostPublicationEvents".to_string(),
            Timestamp::NotAvailable,
            0,
            0,
            Some(headers),
        );

        let record = to_bus_record(&message);
        assert_eq!(record.headers.get(REQUEST_ID_HEADER).unwrap(), "tid_test");
        assert_eq!(record.headers.get("Content-Type").unwrap(), "application/json");
        assert_eq!(record.body, br#"{"contentUri":"x"}"#);
    }

    #[test]
    fn missing_headers_and_payload_yield_an_empty_record() {
        let message = OwnedMessage::new(
            None,
            None,
            "PostPublicationEvents".to_string(),
            Timestamp::NotAvailable,
            0,
            0,
            None,
        );

        let record = to_bus_record(&message);
        assert!(record.headers.is_empty());
        assert!(record.body.is_empty());
    }
}
