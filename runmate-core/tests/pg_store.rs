//! Postgres repository tests. They need a live database:
//! `TEST_DATABASE_URL=postgres://... cargo test -p runmate-core --features pg-tests`
#![cfg(feature = "pg-tests")]

use chrono::{Duration, Utc};
use runmate_core::chat::{Chat, Message, MessageType};
use runmate_core::config::DatabaseConfig;
use runmate_core::db::{create_pool, run_migrations};
use runmate_core::rating::{NewRating, Rating};
use runmate_core::run_event::{Location, NewRunEvent, RunEvent};
use runmate_core::store::{ChatRepository, PgStore, RatingRepository, RunEventCommit, RunEventRepository};
use runmate_core::{Config, StoreError};
use uuid::Uuid;

async fn store() -> PgStore {
    let mut config: DatabaseConfig = Config::for_tests().database;
    if let Ok(url) = std::env::var("TEST_DATABASE_URL") {
        config.url = url;
    }
    config.max_connections = 4;
    run_migrations(&config).await.unwrap();
    PgStore::new(create_pool(&config).await.unwrap())
}

fn new_run(host: Uuid) -> RunEvent {
    let input = NewRunEvent {
        title: Some("Kvällsrunda Hagaparken".into()),
        description: Some("Lugnt, 8 km".into()),
        location: Some(Location {
            name: "Haga slott".into(),
            latitude: None,
            longitude: None,
        }),
        distance: Some(8.0),
        pace: Some(360),
        date: Some(Utc::now() + Duration::days(3)),
        max_participants: Some(4),
    };
    RunEvent::create(host, input, Utc::now()).unwrap()
}

#[tokio::test]
async fn racing_direct_chats_resolve_to_one_row() {
    let store = store().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let first = Chat::new_direct(a, b, Utc::now()).unwrap();
    let second = Chat::new_direct(b, a, Utc::now()).unwrap();
    let (first, second) = tokio::join!(store.insert_chat(&first), store.insert_chat(&second));

    assert_eq!(first.unwrap().id, second.unwrap().id);
    assert!(store.find_direct_chat(a, b).await.unwrap().is_some());
}

#[tokio::test]
async fn read_receipts_and_soft_delete() {
    let store = store().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let chat = store.insert_chat(&Chat::new_direct(a, b, Utc::now()).unwrap()).await.unwrap();

    let start = Utc::now();
    let mut ids = Vec::new();
    for (i, text) in ["ett", "två", "tre"].into_iter().enumerate() {
        let at = start + Duration::seconds(i as i64);
        let message = Message::new(chat.id, a, text.into(), MessageType::Text, None, at);
        store.append_message(&message).await.unwrap();
        ids.push(message.id);
    }

    assert_eq!(store.unread_count(chat.id, a).await.unwrap(), 0);
    assert_eq!(store.unread_count(chat.id, b).await.unwrap(), 3);
    assert_eq!(store.mark_read(chat.id, b, Some(&ids[..1]), Utc::now()).await.unwrap(), 1);
    assert_eq!(store.unread_count(chat.id, b).await.unwrap(), 2);
    assert_eq!(store.mark_read(chat.id, b, None, Utc::now()).await.unwrap(), 2);
    assert_eq!(store.mark_read(chat.id, b, None, Utc::now()).await.unwrap(), 0);

    assert!(store.soft_delete_message(chat.id, ids[1], Utc::now()).await.unwrap());
    assert!(!store.soft_delete_message(chat.id, Uuid::new_v4(), Utc::now()).await.unwrap());
    assert_eq!(store.count_visible_messages(chat.id).await.unwrap(), 2);

    let visible: Vec<_> = store
        .visible_messages(chat.id, 0, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(visible, vec!["ett".to_string(), "tre".to_string()]);
}

#[tokio::test]
async fn outdated_commit_is_stale() {
    let store = store().await;
    let event = new_run(Uuid::new_v4());
    store.insert_event(&event).await.unwrap();

    // Compare against the stored precision, not the in-memory value.
    let mut current = store.get_event(event.id).await.unwrap().unwrap();
    let loaded_at = current.updated_at;

    current.title = "Ändrad rubrik".into();
    current.updated_at = loaded_at + Duration::seconds(1);
    store
        .commit(RunEventCommit::new(current.clone()).expecting(loaded_at))
        .await
        .unwrap();

    let mut stale = current.clone();
    stale.title = "Förlorad ändring".into();
    stale.updated_at = loaded_at + Duration::seconds(2);
    let err = store
        .commit(RunEventCommit::new(stale).expecting(loaded_at))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::StaleWrite(_)));

    let stored = store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Ändrad rubrik");
}

#[tokio::test]
async fn second_rating_for_same_run_is_unique_violation() {
    let store = store().await;
    let host = Uuid::new_v4();
    let runner = Uuid::new_v4();
    let event = new_run(host);
    store.insert_event(&event).await.unwrap();

    let input = || NewRating {
        ratee: runner,
        related_event: event.id,
        categories: Default::default(),
        comment: None,
        overall_rating: 4,
    };
    let rating = Rating::create(host, input(), Utc::now()).unwrap();
    store.insert_rating(&rating, &[]).await.unwrap();
    assert!(store.find_rating(host, runner, event.id).await.unwrap().is_some());

    let again = Rating::create(host, input(), Utc::now()).unwrap();
    let err = store.insert_rating(&again, &[]).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));
    assert_eq!(store.approved_for(runner, None).await.unwrap().len(), 1);
}
