mod support;

use std::collections::BTreeSet;
use std::sync::Arc;

use parley_client::{ChatListFeed, SyncClient};
use parley_shared::{
    ChatEvent, ChatKind, ChatStub, DeletedMessage, EventDomain, LoadState, MessageEvent,
    MessageId, SubscriptionMode,
};

use support::{batch, chat, client, message, wait_until, ChannelConnector, FakeApi};

/// c1: personal with Bob, last message read.
/// g1: group "Team", two unread.
/// c3: personal with Carol, no messages.
fn seeded() -> (SyncClient, Arc<FakeApi>, Arc<ChannelConnector>) {
    let (client, api, push) = client(30);
    api.add_user("u2", "Bob");
    api.add_user("u3", "Carol");

    api.add_chat(chat("c1", ChatKind::Personal, None, &["u1", "u2"]));
    api.add_chat(chat("g1", ChatKind::Group, Some("Team"), &["u1", "u2", "u3"]));
    api.add_chat(chat("c3", ChatKind::Personal, None, &["u1", "u3"]));

    api.set_messages(
        "c1",
        vec![message("m2", "c1", "u2", 150), message("m1", "c1", "u2", 100)],
    );
    api.set_messages("g1", vec![message("g-1", "g1", "u3", 200)]);
    api.set_marker("c1", "m2");
    api.set_unread("g1", 2);

    (client, api, push)
}

async fn loaded() -> (ChatListFeed, Arc<FakeApi>, Arc<ChannelConnector>) {
    let (client, api, push) = seeded();
    let feed = client.chat_list();
    feed.load().await.unwrap();
    (feed, api, push)
}

fn order(feed: &ChatListFeed) -> Vec<String> {
    feed.sorted()
        .into_iter()
        .map(|s| s.chat_id.to_string())
        .collect()
}

#[tokio::test]
async fn test_initial_build() {
    let (feed, api, push) = loaded().await;

    assert_eq!(order(&feed), vec!["g1", "c1", "c3"]);
    assert_eq!(feed.snapshot().load, LoadState::Success(3));

    let c1 = feed.get(&"c1".into()).unwrap();
    assert_eq!(c1.name, "Bob");
    assert!(c1.last_message_read);
    assert_eq!(c1.last_message.unwrap().id, MessageId::from("m2"));

    let g1 = feed.get(&"g1".into()).unwrap();
    assert_eq!(g1.name, "Team");
    assert_eq!(g1.unread_count, 2);
    assert!(!g1.last_message_read);

    let c3 = feed.get(&"c3".into()).unwrap();
    assert_eq!(c3.name, "Carol");
    assert!(c3.last_message.is_none());

    // Only the latest message of each chat was requested.
    assert_eq!(api.page_requests("c1"), 1);

    let sub = push.wait_for_open(EventDomain::Messages, 1).await;
    assert_eq!(sub.mode, SubscriptionMode::LatestOnly);
    assert_eq!(
        sub.scope,
        BTreeSet::from(["c1".to_string(), "c3".to_string(), "g1".to_string()])
    );
    let chats = push.wait_for_open(EventDomain::Chats, 1).await;
    assert_eq!(chats.scope, BTreeSet::from(["u1".to_string()]));
}

#[tokio::test]
async fn test_new_message_updates_only_its_chat() {
    let (feed, _api, push) = loaded().await;
    let before_g1 = feed.get(&"g1".into()).unwrap();
    let before_c3 = feed.get(&"c3".into()).unwrap();
    let mut snapshots = feed.subscribe_snapshots();

    push.push(
        EventDomain::Messages,
        &batch(vec![(
            "m3",
            MessageEvent::Created(message("m3", "c1", "u2", 300)),
        )]),
    );

    let snap = wait_until(&mut snapshots, |s| {
        s.chats.first().map(|c| c.chat_id.as_str()) == Some("c1")
    })
    .await;

    let c1 = &snap.chats[0];
    assert_eq!(c1.unread_count, 1);
    assert!(!c1.last_message_read);
    assert_eq!(c1.name, "Bob");
    assert_eq!(feed.get(&"g1".into()).unwrap(), before_g1);
    assert_eq!(feed.get(&"c3".into()).unwrap(), before_c3);
    assert_eq!(order(&feed), vec!["c1", "g1", "c3"]);
}

#[tokio::test]
async fn test_deleted_last_message_is_refetched() {
    let (feed, api, push) = loaded().await;
    let mut snapshots = feed.subscribe_snapshots();

    api.remove_message("c1", "m2");
    push.push(
        EventDomain::Messages,
        &batch(vec![(
            "m2",
            MessageEvent::Deleted(DeletedMessage {
                id: "m2".into(),
                chat_id: "c1".into(),
            }),
        )]),
    );

    let snap = wait_until(&mut snapshots, |s| {
        s.chats.iter().any(|c| {
            c.chat_id.as_str() == "c1"
                && c.last_message.as_ref().map(|m| m.id.as_str()) == Some("m1")
        })
    })
    .await;

    assert_eq!(api.page_requests("c1"), 2);
    let c1 = snap.chats.iter().find(|c| c.chat_id.as_str() == "c1").unwrap();
    assert_eq!(c1.unread_count, 0);
    // m1 is not the marked message.
    assert!(!c1.last_message_read);
}

#[tokio::test]
async fn test_created_chat_is_added_and_followed() {
    let (feed, api, push) = loaded().await;
    push.wait_for_open(EventDomain::Chats, 1).await;
    let mut snapshots = feed.subscribe_snapshots();

    let new_chat = chat("g2", ChatKind::Group, Some("New"), &["u1", "u3"]);
    api.add_chat(new_chat.clone());
    api.set_messages("g2", vec![message("g2-1", "g2", "u3", 400)]);
    push.push(
        EventDomain::Chats,
        &batch(vec![("g2", ChatEvent::Created(new_chat))]),
    );

    let snap = wait_until(&mut snapshots, |s| s.chats.len() == 4).await;
    assert_eq!(snap.chats[0].chat_id.as_str(), "g2");
    assert_eq!(snap.chats[0].name, "New");

    let sub = push.wait_for_open(EventDomain::Messages, 2).await;
    assert!(sub.scope.contains("g2"));
}

#[tokio::test]
async fn test_deleted_chat_is_removed_and_unfollowed() {
    let (feed, _api, push) = loaded().await;
    push.wait_for_open(EventDomain::Chats, 1).await;
    let mut snapshots = feed.subscribe_snapshots();

    push.push(
        EventDomain::Chats,
        &batch(vec![("c3", ChatEvent::Deleted(ChatStub { id: "c3".into() }))]),
    );

    wait_until(&mut snapshots, |s| s.chats.len() == 2).await;
    let sub = push.wait_for_open(EventDomain::Messages, 2).await;
    assert!(!sub.scope.contains("c3"));
    assert_eq!(sub.scope.len(), 2);
}

#[tokio::test]
async fn test_group_rename() {
    let (feed, _api, push) = loaded().await;
    push.wait_for_open(EventDomain::Chats, 1).await;
    let mut snapshots = feed.subscribe_snapshots();

    let renamed = chat("g1", ChatKind::Group, Some("Renamed"), &["u1", "u2", "u3"]);
    push.push(
        EventDomain::Chats,
        &batch(vec![("g1", ChatEvent::Updated(renamed))]),
    );

    let snap = wait_until(&mut snapshots, |s| s.chats.iter().any(|c| c.name == "Renamed")).await;
    let g1 = snap.chats.iter().find(|c| c.chat_id.as_str() == "g1").unwrap();
    assert_eq!(g1.unread_count, 2);
}

#[tokio::test]
async fn test_listing_failure_is_reported() {
    let (client, api, _push) = seeded();
    api.set_failing(true);
    let feed = client.chat_list();

    assert!(feed.load().await.is_err());
    assert!(feed.snapshot().load.error().is_some());
    assert!(feed.sorted().is_empty());
}

#[tokio::test]
async fn test_unresolvable_chat_is_skipped() {
    let (client, api, _push) = seeded();
    api.add_chat(chat("c9", ChatKind::Personal, None, &["u1", "u9"]));
    let feed = client.chat_list();

    feed.load().await.unwrap();

    assert_eq!(feed.snapshot().load, LoadState::Success(3));
    assert!(feed.get(&"c9".into()).is_none());
}

#[tokio::test]
async fn test_read_state_refresh() {
    let (feed, api, _push) = loaded().await;
    api.set_marker("g1", "g-1");
    api.set_unread("g1", 0);

    feed.refresh_read_state(&"g1".into()).await.unwrap();

    let g1 = feed.get(&"g1".into()).unwrap();
    assert!(g1.last_message_read);
    assert_eq!(g1.unread_count, 0);
}
