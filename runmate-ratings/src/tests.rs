use std::sync::Arc;

use chrono::{Duration, Utc};
use runmate_core::outbox::RATING_CREATED;
use runmate_core::pagination::Page;
use runmate_core::rating::{NewRating, NewSupportReport, RatingCategories, ReportReason, NEW_RUNNER};
use runmate_core::run_event::{Location, NewRunEvent, RunEvent, RunEventStatus};
use runmate_core::store::{MemoryStore, RunEventRepository, UserRepository};
use runmate_core::user::User;
use runmate_core::RunmateError;
use uuid::Uuid;

use crate::RatingService;

struct Fixture {
    store: Arc<MemoryStore>,
    service: RatingService,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let service = RatingService::new(store.clone(), store.clone(), store.clone());
    Fixture { store, service }
}

async fn user(store: &MemoryStore, name: &str) -> Uuid {
    let user = User::new(name, format!("{}@runmate.test", name.to_lowercase()));
    store.upsert_user(&user).await.unwrap();
    user.id
}

/// Stores a run dated `days_from_now` days away with the given runners.
async fn run(store: &MemoryStore, runners: &[Uuid], days_from_now: i64) -> RunEvent {
    let input = NewRunEvent {
        title: Some("Söndagslångpass".into()),
        description: Some("21 km lugnt".into()),
        location: Some(Location {
            name: "Hagaparken".into(),
            latitude: None,
            longitude: None,
        }),
        distance: Some(21.1),
        pace: Some(360),
        date: Some(Utc::now() + Duration::days(days_from_now)),
        max_participants: Some(6),
    };
    let mut event = RunEvent::create(runners[0], input, Utc::now() - Duration::days(10)).unwrap();
    event.participants = runners.to_vec();
    store.insert_event(&event).await.unwrap();
    event
}

fn rating(ratee: Uuid, event: Uuid, score: u8) -> NewRating {
    NewRating {
        ratee,
        related_event: event,
        categories: RatingCategories::default(),
        comment: None,
        overall_rating: score,
    }
}

#[tokio::test]
async fn first_rating_produces_stats_and_caches_them() {
    let f = fixture();
    let rater = user(&f.store, "Anna").await;
    let ratee = user(&f.store, "Erik").await;
    let event = run(&f.store, &[rater, ratee], -1).await;

    let input = NewRating {
        categories: RatingCategories {
            punctual: true,
            ..Default::default()
        },
        ..rating(ratee, event.id, 5)
    };
    f.service.create(rater, input).await.unwrap();

    let stats = f.service.user_stats(ratee).await.unwrap();
    assert_eq!(stats.summary.average_rating, 5.0);
    assert_eq!(stats.summary.total_ratings, 1);
    assert_eq!(stats.summary.category_stats.punctual, 1);
    assert_eq!(stats.recent_ratings.len(), 1);

    let cached = f.store.get_user(ratee).await.unwrap().unwrap().rating_stats.unwrap();
    assert_eq!(cached, stats.summary);

    let outbox = f.store.outbox().await;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].event_type, RATING_CREATED);
    assert_eq!(outbox[0].event_data["rateeId"], serde_json::json!(ratee));
}

#[tokio::test]
async fn stats_without_ratings_are_new_runner() {
    let f = fixture();
    let stats = f.service.user_stats(Uuid::new_v4()).await.unwrap();
    assert_eq!(stats.summary.average_rating, 0.0);
    assert_eq!(stats.summary.total_ratings, 0);
    assert_eq!(stats.summary.level, NEW_RUNNER);
    assert_eq!(stats.summary.badge, None);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["badge"], serde_json::Value::Null);
    assert_eq!(json["level"], "Ny löpare");
}

#[tokio::test]
async fn rejects_self_rating() {
    let f = fixture();
    let rater = user(&f.store, "Anna").await;
    let event = run(&f.store, &[rater, Uuid::new_v4()], -1).await;

    let err = f.service.create(rater, rating(rater, event.id, 4)).await.unwrap_err();
    assert!(matches!(err, RunmateError::Validation(_)));
}

#[tokio::test]
async fn rejects_non_participants() {
    let f = fixture();
    let host = user(&f.store, "Anna").await;
    let runner = user(&f.store, "Erik").await;
    let outsider = user(&f.store, "Lisa").await;
    let event = run(&f.store, &[host, runner], -1).await;

    let err = f.service.create(outsider, rating(runner, event.id, 4)).await.unwrap_err();
    assert!(matches!(err, RunmateError::Unauthorized(_)));

    let err = f.service.create(host, rating(outsider, event.id, 4)).await.unwrap_err();
    assert!(matches!(err, RunmateError::Validation(_)));
}

#[tokio::test]
async fn rejects_future_runs() {
    let f = fixture();
    let host = user(&f.store, "Anna").await;
    let runner = user(&f.store, "Erik").await;
    let event = run(&f.store, &[host, runner], 2).await;

    let err = f.service.create(host, rating(runner, event.id, 4)).await.unwrap_err();
    assert!(matches!(err, RunmateError::Validation(_)));
}

#[tokio::test]
async fn rejects_duplicate_triple() {
    let f = fixture();
    let host = user(&f.store, "Anna").await;
    let runner = user(&f.store, "Erik").await;
    let event = run(&f.store, &[host, runner], -1).await;

    f.service.create(host, rating(runner, event.id, 4)).await.unwrap();
    let err = f.service.create(host, rating(runner, event.id, 5)).await.unwrap_err();
    assert!(matches!(err, RunmateError::Conflict(_)));

    // Same pair on a different run is fine.
    let other = run(&f.store, &[host, runner], -3).await;
    f.service.create(host, rating(runner, other.id, 5)).await.unwrap();
    assert_eq!(f.service.user_stats(runner).await.unwrap().summary.average_rating, 4.5);
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let f = fixture();
    let host = user(&f.store, "Anna").await;
    let err = f.service.create(host, rating(Uuid::new_v4(), Uuid::new_v4(), 4)).await.unwrap_err();
    assert!(matches!(err, RunmateError::NotFound(_)));
}

#[tokio::test]
async fn reports_stay_out_of_listings_and_stats() {
    let f = fixture();
    let host = user(&f.store, "Anna").await;
    let runner = user(&f.store, "Erik").await;
    let event = run(&f.store, &[host, runner], -1).await;

    let report = f
        .service
        .report(
            host,
            NewSupportReport {
                ratee: runner,
                related_event: event.id,
                reason: ReportReason::Safety,
                details: Some("sprang mot rött".into()),
                overall_rating: None,
            },
        )
        .await
        .unwrap();
    assert!(!report.is_approved);
    assert_eq!(report.overall_rating, 1);

    assert!(f.service.user_ratings(runner, Page::default()).await.unwrap().is_empty());
    assert_eq!(f.service.user_stats(runner).await.unwrap().summary.total_ratings, 0);
    assert!(f.store.outbox().await.is_empty());

    // The report occupies the triple.
    let err = f.service.create(host, rating(runner, event.id, 4)).await.unwrap_err();
    assert!(matches!(err, RunmateError::Conflict(_)));
}

#[tokio::test]
async fn pending_lists_unrated_co_runners_of_past_runs() {
    let f = fixture();
    let me = user(&f.store, "Anna").await;
    let erik = user(&f.store, "Erik").await;
    let lisa = user(&f.store, "Lisa").await;

    let past = run(&f.store, &[me, erik, lisa], -2).await;
    run(&f.store, &[me, erik], 3).await;
    let mut cancelled = run(&f.store, &[me, lisa], -4).await;
    cancelled.status = RunEventStatus::Cancelled;
    f.store
        .commit(runmate_core::store::RunEventCommit::new(cancelled))
        .await
        .unwrap();

    let pending = f.service.pending(me).await.unwrap();
    let names: Vec<&str> = pending.iter().map(|p| p.user.name.as_str()).collect();
    assert_eq!(names, vec!["Erik", "Lisa"]);
    assert!(pending.iter().all(|p| p.run_event.id == past.id));

    f.service.create(me, rating(erik, past.id, 5)).await.unwrap();
    let pending = f.service.pending(me).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].user.id, lisa);
}

#[tokio::test]
async fn user_ratings_are_newest_first() {
    let f = fixture();
    let runner = user(&f.store, "Erik").await;
    let a = user(&f.store, "Anna").await;
    let b = user(&f.store, "Lisa").await;
    let event = run(&f.store, &[runner, a, b], -1).await;

    f.service.create(a, rating(runner, event.id, 3)).await.unwrap();
    let newest = f.service.create(b, rating(runner, event.id, 5)).await.unwrap();

    let listed = f.service.user_ratings(runner, Page::new(1, 1)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, newest.id);
}

#[tokio::test]
async fn cancelled_runs_cannot_be_rated_or_reported() {
    let f = fixture();
    let host = user(&f.store, "Anna").await;
    let runner = user(&f.store, "Erik").await;
    let mut event = run(&f.store, &[host, runner], -2).await;
    event.status = RunEventStatus::Cancelled;
    f.store
        .commit(runmate_core::store::RunEventCommit::new(event.clone()))
        .await
        .unwrap();

    assert!(f.service.pending(host).await.unwrap().is_empty());

    let err = f.service.create(host, rating(runner, event.id, 4)).await.unwrap_err();
    assert!(matches!(err, RunmateError::Validation(_)));

    let report = NewSupportReport {
        ratee: runner,
        related_event: event.id,
        reason: ReportReason::Safety,
        details: None,
        overall_rating: None,
    };
    let err = f.service.report(host, report).await.unwrap_err();
    assert!(matches!(err, RunmateError::Validation(_)));
    assert!(f.store.outbox().await.is_empty());
}
