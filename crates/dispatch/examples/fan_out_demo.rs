//! Runs a dispatcher with two subscribers and prints the frames each one
//! receives for the same notification.

use std::sync::Arc;
use std::time::Duration;

use access::{RuleTableEvaluator, SubscriptionOptions};
use dispatch::{Dispatcher, History, Notification, Standout, CONTENT_CREATE_TYPE};

#[tokio::main]
async fn main() {
    let history = Arc::new(History::new(10));
    let dispatcher = Arc::new(Dispatcher::new(
        Duration::from_millis(100),
        history,
        Arc::new(RuleTableEvaluator::default()),
    ));

    let (_standard, mut standard_rx) = dispatcher.subscribe(
        "demo-standard".to_string(),
        vec!["Article".to_string()],
        false,
        SubscriptionOptions::default(),
    );
    let (_monitor, mut monitor_rx) = dispatcher.subscribe(
        "demo-monitor".to_string(),
        vec!["Article".to_string()],
        true,
        SubscriptionOptions {
            receive_advanced_notifications: true,
            ..Default::default()
        },
    );

    let loop_task = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.start().await })
    };

    dispatcher.send(Notification {
        api_url: "http://api.ft.com/content/3cc23068-e501-11e9-9743-db5a370481bc".to_string(),
        id: "http://www.ft.com/thing/3cc23068-e501-11e9-9743-db5a370481bc".to_string(),
        event_type: CONTENT_CREATE_TYPE.to_string(),
        publish_reference: "tid_demo".to_string(),
        last_modified: "2024-03-01T10:00:00.000Z".to_string(),
        title: "Demo article".to_string(),
        standout: Some(Standout { scoop: true }),
        subscription_type: "Article".to_string(),
        ..Default::default()
    });

    // The standard subscriber sees the CREATE downgraded to UPDATE and no
    // provenance fields; the monitor sees everything.
    println!("standard: {}", standard_rx.recv().await.expect("frame"));
    println!("monitor:  {}", monitor_rx.recv().await.expect("frame"));

    dispatcher.stop();
    let _ = loop_task.await;
}
