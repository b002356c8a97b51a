//! Central fan-out: delay buffer, access evaluation, per-subscriber match.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use access::{AccessEvaluator, AccessQuery, SubscriptionOptions};

use crate::history::History;
use crate::model::{Notification, CONTENT_DELETE_TYPE, RELATED_CONTENT_TYPE};
use crate::subscriber::{Subscriber, SubscriberPayload, SubscriberVariant};

const RFC3339_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Fans incoming notifications out to the current subscriber set.
///
/// `send` is callable from many tasks concurrently; each call sleeps the
/// configured delay in its own task before enqueueing, so two back-to-back
/// sends may arrive reordered. A single consumer loop (`start`) drains the
/// inbound channel, forwards to subscribers and records history.
pub struct Dispatcher {
    delay: Duration,
    inbound: mpsc::Sender<Notification>,
    receiver: Mutex<Option<mpsc::Receiver<Notification>>>,
    subscribers: RwLock<HashMap<Uuid, Arc<Subscriber>>>,
    history: Arc<History>,
    evaluator: Arc<dyn AccessEvaluator>,
    stop: watch::Sender<bool>,
}

impl Dispatcher {
    pub fn new(delay: Duration, history: Arc<History>, evaluator: Arc<dyn AccessEvaluator>) -> Self {
        let (inbound, receiver) = mpsc::channel(1);
        let (stop, _) = watch::channel(false);
        Self {
            delay,
            inbound,
            receiver: Mutex::new(Some(receiver)),
            subscribers: RwLock::new(HashMap::new()),
            history,
            evaluator,
            stop,
        }
    }

    /// Stamps `notificationDate` after the configured delay, then enqueues.
    /// Delay tasks still sleeping when the dispatcher stops are abandoned.
    pub fn send(&self, mut notification: Notification) {
        tracing::info!(
            transaction_id = %notification.publish_reference,
            delay_secs = self.delay.as_secs_f64(),
            "received notification, waiting configured delay"
        );
        let inbound = self.inbound.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            notification.notification_date = Utc::now().format(RFC3339_MILLIS).to_string();
            let _ = inbound.send(notification).await;
        });
    }

    /// Runs the single-consumer loop until [`stop`](Self::stop) is called.
    /// The current notification's fan-out always completes before the loop
    /// exits.
    pub async fn start(&self) {
        let mut receiver = match self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            Some(receiver) => receiver,
            None => {
                tracing::warn!("dispatcher loop already started");
                return;
            }
        };

        let mut stop = self.stop.subscribe();
        if *stop.borrow() {
            return;
        }
        loop {
            tokio::select! {
                maybe = receiver.recv() => match maybe {
                    Some(notification) => {
                        self.forward_to_subscribers(&notification);
                        self.history.push(notification);
                    }
                    None => return,
                },
                _ = stop.changed() => return,
            }
        }
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Creates and registers a subscriber, returning it with the receiving
    /// half of its outbound queue.
    pub fn subscribe(
        &self,
        address: String,
        sub_types: Vec<String>,
        monitor: bool,
        options: SubscriptionOptions,
    ) -> (Arc<Subscriber>, mpsc::Receiver<String>) {
        let variant = if monitor {
            SubscriberVariant::Monitor
        } else {
            SubscriberVariant::Standard
        };
        let (subscriber, receiver) = Subscriber::new(address, sub_types, variant, options);
        let subscriber = Arc::new(subscriber);

        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(subscriber.id(), Arc::clone(&subscriber));
        tracing::info!(
            subscriber_id = %subscriber.id(),
            subscriber_address = subscriber.address(),
            accepted_content_type = ?subscriber.accepted_types(),
            "registered new subscriber"
        );

        (subscriber, receiver)
    }

    /// Removes a subscriber. Removing an unknown id is a no-op.
    pub fn unsubscribe(&self, id: Uuid) {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
        if removed.is_some() {
            tracing::info!(subscriber_id = %id, "unregistered subscriber");
        }
    }

    /// Snapshot of the registered subscribers, for the stats endpoint.
    pub fn subscribers(&self) -> Vec<SubscriberPayload> {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(|s| s.payload())
            .collect()
    }

    fn forward_to_subscribers(&self, notification: &Notification) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let has_access = match self
            .evaluator
            .evaluate(&AccessQuery::EditorialDesk(notification.editorial_desk.clone()))
        {
            Ok(decision) => decision.allow,
            Err(err) => {
                tracing::warn!(
                    transaction_id = %notification.publish_reference,
                    resource = %notification.api_url,
                    error = %err,
                    "failed to evaluate notification"
                );
                return;
            }
        };

        let publication_allowed = match &notification.publication {
            None => true,
            Some(publications) => match publications.only_one_or_pink() {
                Ok(None) => true,
                Ok(Some(representative)) => {
                    match self
                        .evaluator
                        .evaluate(&AccessQuery::Publication(representative.clone()))
                    {
                        Ok(decision) => {
                            tracing::info!(
                                transaction_id = %notification.publish_reference,
                                publication = %representative,
                                is_publication_allowed = decision.allow,
                                "publication verification done"
                            );
                            decision.allow
                        }
                        Err(err) => {
                            tracing::warn!(
                                transaction_id = %notification.publish_reference,
                                resource = %notification.api_url,
                                error = %err,
                                "failed to evaluate notification"
                            );
                            return;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        transaction_id = %notification.publish_reference,
                        resource = %notification.api_url,
                        error = %err,
                        "failed to evaluate notification"
                    );
                    return;
                }
            },
        };

        let is_related_content = notification.event_type == RELATED_CONTENT_TYPE;
        let (mut sent, mut failed, mut skipped) = (0usize, 0usize, 0usize);

        for subscriber in subscribers.values() {
            if notification.is_e2e_test {
                if !subscriber.is_monitor() {
                    skipped += 1;
                    tracing::info!(
                        subscriber_id = %subscriber.id(),
                        transaction_id = %notification.publish_reference,
                        "test notification, skipping standard subscriber"
                    );
                    continue;
                }
            } else {
                if !matches_sub_type(notification, subscriber) {
                    skipped += 1;
                    continue;
                }
                if !has_access {
                    skipped += 1;
                    continue;
                }
                if !publication_allowed {
                    skipped += 1;
                    continue;
                }
                if is_related_content && !subscriber.options().receive_internal_unstable {
                    skipped += 1;
                    continue;
                }
            }

            match subscriber.send(notification) {
                Ok(()) => sent += 1,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(
                        subscriber_id = %subscriber.id(),
                        subscriber_address = subscriber.address(),
                        transaction_id = %notification.publish_reference,
                        error = %err,
                        "failed forwarding to subscriber"
                    );
                }
            }
        }

        let total = subscribers.len();
        if total == 0 || sent > 0 || total == skipped {
            tracing::info!(
                transaction_id = %notification.publish_reference,
                resource = %notification.api_url,
                subscription_type = %notification.subscription_type,
                sent,
                failed,
                skipped,
                "processed subscribers"
            );
        } else {
            tracing::error!(
                transaction_id = %notification.publish_reference,
                resource = %notification.api_url,
                sent,
                failed,
                skipped,
                "processed subscribers, failed to send notifications"
            );
        }
    }
}

/// Matches a subscriber's accepted types against the notification's
/// subscription type, case-insensitively. A DELETE without a subscription
/// type is delivered regardless of the accepted types.
pub fn matches_sub_type(notification: &Notification, subscriber: &Subscriber) -> bool {
    if notification.event_type == CONTENT_DELETE_TYPE && notification.subscription_type.is_empty() {
        return true;
    }

    subscriber
        .accepted_types()
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(&notification.subscription_type))
}
