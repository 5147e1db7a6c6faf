// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue contract exercised against the in-process backing.

use std::sync::Arc;
use std::time::Duration;

use dbot_core::Queue;
use dbot_core::domain::{Configuration, Context, WorkReply, WorkRequest};
use dbot_queue::MemoryQueue;

fn request(id: &str, reply_queue: &str) -> WorkRequest {
    WorkRequest {
        message_id: id.into(),
        reply_queue: reply_queue.into(),
        context: Context {
            team: "T1".into(),
            user: "U1".into(),
            original_user: "U1".into(),
            channel: "C1".into(),
            event_type: "message".into(),
        },
        text: "ping 8.8.8.8".into(),
        ..WorkRequest::default()
    }
}

#[tokio::test]
async fn work_is_load_balanced_across_workers() {
    let queue = Arc::new(MemoryQueue::new());
    for i in 0..10 {
        queue.push_work(&request(&i.to_string(), "bot")).await.unwrap();
    }
    let mut handles = Vec::new();
    for _ in 0..3 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(r) = queue.pop_work(Some(Duration::from_millis(100))).await {
                seen.push(r.message_id);
            }
            seen
        }));
    }
    let mut all: Vec<String> = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    all.sort_by_key(|id| id.parse::<u32>().unwrap());
    let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    assert_eq!(all, expected);
}

#[tokio::test]
async fn replies_are_routed_by_name() {
    let queue = MemoryQueue::new();
    let a = WorkReply::for_request(&request("a", "bot-a"));
    let b = WorkReply::for_request(&request("b", "bot-b"));
    queue.push_work_reply("bot-a", &a).await.unwrap();
    queue.push_work_reply("bot-b", &b).await.unwrap();

    let got_b = queue.pop_work_reply("bot-b", None).await.unwrap();
    assert_eq!(got_b.message_id, "b");
    let got_a = queue.pop_work_reply("bot-a", None).await.unwrap();
    assert_eq!(got_a.message_id, "a");
    assert_eq!(got_a.context, request("a", "bot-a").context);
}

#[tokio::test]
async fn replies_keep_fifo_order() {
    let queue = MemoryQueue::new();
    for id in ["1", "2", "3"] {
        queue
            .push_work_reply("bot", &WorkReply::for_request(&request(id, "bot")))
            .await
            .unwrap();
    }
    for id in ["1", "2", "3"] {
        assert_eq!(queue.pop_work_reply("bot", None).await.unwrap().message_id, id);
    }
}

#[tokio::test]
async fn waiting_reply_pop_receives_later_push() {
    let queue = Arc::new(MemoryQueue::new());
    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.pop_work_reply("web-42", Some(Duration::from_secs(5))).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    queue
        .push_work_reply("web-42", &WorkReply::for_request(&request("m", "web-42")))
        .await
        .unwrap();
    assert_eq!(waiter.await.unwrap().unwrap().message_id, "m");
}

#[tokio::test]
async fn conf_and_message_topics_are_independent() {
    let queue = MemoryQueue::new();
    let conf = Configuration {
        team: "T1".into(),
        all: true,
        ..Configuration::default()
    };
    queue.push_conf(&conf).await.unwrap();
    queue.push_message(&request("m1", "bot")).await.unwrap();
    assert!(queue
        .pop_work(Some(Duration::from_millis(20)))
        .await
        .unwrap_err()
        .is_timeout());
    assert_eq!(queue.pop_conf(None).await.unwrap(), conf);
    assert_eq!(queue.pop_message(None).await.unwrap().message_id, "m1");
}

#[tokio::test]
async fn close_ends_every_consumer() {
    let queue = Arc::new(MemoryQueue::new());
    let mut handles = Vec::new();
    for _ in 0..3 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move { queue.pop_work(None).await }));
    }
    let reply_waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.pop_work_reply("bot", None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.close().await.unwrap();
    for h in handles {
        assert!(h.await.unwrap().unwrap_err().is_closed());
    }
    assert!(reply_waiter.await.unwrap().unwrap_err().is_closed());
    assert!(queue.push_conf(&Configuration::default()).await.unwrap_err().is_closed());
}

#[tokio::test]
async fn configuration_reaches_every_subscriber() {
    let web = MemoryQueue::new();
    let bot_a = web.subscriber();
    let bot_b = web.subscriber();
    let conf = Configuration {
        team: "T1".into(),
        channels: vec!["C1".into()],
        ..Configuration::default()
    };
    web.push_conf(&conf).await.unwrap();

    assert_eq!(bot_a.pop_conf(Some(Duration::from_secs(1))).await.unwrap(), conf);
    assert_eq!(bot_b.pop_conf(Some(Duration::from_secs(1))).await.unwrap(), conf);

    web.push_work(&request("w1", "bot")).await.unwrap();
    assert_eq!(bot_a.pop_work(None).await.unwrap().message_id, "w1");
    assert!(bot_b
        .pop_work(Some(Duration::from_millis(20)))
        .await
        .unwrap_err()
        .is_timeout());
}
