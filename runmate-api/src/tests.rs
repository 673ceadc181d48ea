use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use runmate_core::push::NoopPush;
use runmate_core::run_event::{Location, NewRunEvent, RunEvent};
use runmate_core::store::{MemoryStore, RunEventRepository, UserRepository};
use runmate_core::user::User;
use runmate_core::Config;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth::generate_token;
use crate::{router, ApiState};

struct TestApp {
    store: Arc<MemoryStore>,
    app: Router,
    secret: String,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = Config::for_tests();
        let state = ApiState::new(store.clone(), Arc::new(NoopPush), &config, None);
        TestApp {
            store,
            app: router(state),
            secret: config.server.jwt_secret,
        }
    }

    async fn user(&self, name: &str) -> Uuid {
        let user = User::new(name, format!("{}@runmate.test", name.to_lowercase()));
        self.store.upsert_user(&user).await.unwrap();
        user.id
    }

    async fn call(&self, method: Method, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            let token = generate_token(user, &self.secret, 1).unwrap();
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

fn run_body(max: u32) -> Value {
    json!({
        "title": "Morgonrunda Djurgården",
        "description": "Lugnt tempo, 10 km",
        "location": { "name": "Djurgårdsbron" },
        "distance": 10.0,
        "pace": 330,
        "date": Utc::now() + Duration::days(2),
        "maxParticipants": max,
    })
}

#[tokio::test]
async fn health_needs_no_token() {
    let t = TestApp::new();
    let (status, body) = t.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_bad_token_is_401() {
    let t = TestApp::new();
    let (status, body) = t.call(Method::GET, "/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let req = Request::builder()
        .uri("/chats")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let res = t.app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn approval_opens_the_run_chat() {
    let t = TestApp::new();
    let host = t.user("Anna").await;
    let runner = t.user("Erik").await;

    let (status, body) = t.call(Method::POST, "/runevents", Some(host), Some(run_body(4))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = t.call(Method::POST, &format!("/runevents/{}/join", id), Some(runner), None).await;
    assert_eq!(status, StatusCode::OK);

    let decision = json!({ "userId": runner, "action": "approve" });
    let (status, body) = t
        .call(Method::PUT, &format!("/runevents/{}/requests", id), Some(host), Some(decision))
        .await;
    assert_eq!(status, StatusCode::OK);
    let chat_id = body["data"]["chatId"].as_str().unwrap().to_string();

    let (status, body) = t.call(Method::GET, &format!("/chats/{}", chat_id), Some(runner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["participants"].as_array().unwrap().len(), 2);

    let (status, _) = t
        .call(
            Method::POST,
            &format!("/chats/{}/messages", chat_id),
            Some(runner),
            Some(json!({ "content": "Ses vid bron!" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = t.call(Method::GET, "/chats/unread", Some(host), None).await;
    assert_eq!(body["data"]["unreadCount"], 1);

    let (_, body) = t.call(Method::PUT, &format!("/chats/{}/read", chat_id), Some(host), None).await;
    assert_eq!(body["data"]["markedCount"], 1);
    let (_, body) = t.call(Method::GET, &format!("/chats/{}/unread", chat_id), Some(host), None).await;
    assert_eq!(body["data"]["unreadCount"], 0);
}

#[tokio::test]
async fn domain_errors_map_to_status_codes() {
    let t = TestApp::new();
    let host = t.user("Anna").await;
    let runner = t.user("Erik").await;

    let (_, body) = t.call(Method::POST, "/runevents", Some(host), Some(run_body(4))).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    t.call(Method::POST, &format!("/runevents/{}/join", id), Some(runner), None).await;

    // Only the host decides.
    let decision = json!({ "userId": runner, "action": "approve" });
    let (status, body) = t
        .call(Method::PUT, &format!("/runevents/{}/requests", id), Some(runner), Some(decision))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, _) = t
        .call(Method::GET, &format!("/runevents/{}", Uuid::new_v4()), Some(host), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = t.call(Method::GET, "/runevents/not-a-uuid", Some(host), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = t
        .call(Method::POST, "/runevents", Some(host), Some(json!({ "title": "Utan resten" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .call(Method::POST, "/chats/direct", Some(host), Some(json!({ "participantId": host })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_run_rejects_approval_with_400() {
    let t = TestApp::new();
    let host = t.user("Anna").await;
    let first = t.user("Erik").await;
    let second = t.user("Lisa").await;

    let (_, body) = t.call(Method::POST, "/runevents", Some(host), Some(run_body(2))).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    for user in [first, second] {
        t.call(Method::POST, &format!("/runevents/{}/join", id), Some(user), None).await;
    }

    let uri = format!("/runevents/{}/requests", id);
    let (status, _) = t
        .call(Method::PUT, &uri, Some(host), Some(json!({ "userId": first, "action": "approve" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t
        .call(Method::PUT, &uri, Some(host), Some(json!({ "userId": second, "action": "approve" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "run event is full");

    let (_, body) = t.call(Method::GET, &format!("/runevents/{}", id), Some(host), None).await;
    assert_eq!(body["data"]["pendingRequests"], json!([]));
    assert_eq!(body["data"]["status"], "full");
}

#[tokio::test]
async fn duplicate_rating_is_409() {
    let t = TestApp::new();
    let host = t.user("Anna").await;
    let runner = t.user("Erik").await;

    let input = NewRunEvent {
        title: Some("Tisdagsintervaller".into()),
        description: Some("5x1000m".into()),
        location: Some(Location {
            name: "Stadion".into(),
            latitude: None,
            longitude: None,
        }),
        distance: Some(7.0),
        pace: Some(270),
        date: Some(Utc::now() - Duration::days(1)),
        max_participants: Some(6),
    };
    let mut event = RunEvent::create(host, input, Utc::now() - Duration::days(7)).unwrap();
    event.participants.push(runner);
    t.store.insert_event(&event).await.unwrap();

    let rating = json!({ "ratee": runner, "relatedEvent": event.id, "overallRating": 5 });
    let (status, _) = t.call(Method::POST, "/ratings", Some(host), Some(rating.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = t.call(Method::POST, "/ratings", Some(host), Some(rating)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = t
        .call(Method::GET, &format!("/ratings/user/{}/stats", runner), Some(runner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalRatings"], 1);

    let (_, body) = t.call(Method::GET, "/ratings/pending", Some(runner), None).await;
    let pending = body["data"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["user"]["id"], json!(host));
}

#[tokio::test]
async fn malformed_read_request_marks_nothing() {
    let t = TestApp::new();
    let anna = t.user("Anna").await;
    let erik = t.user("Erik").await;

    let (_, body) = t
        .call(Method::POST, "/chats/direct", Some(anna), Some(json!({ "participantId": erik })))
        .await;
    let chat_id = body["data"]["id"].as_str().unwrap().to_string();
    for text in ["Hej!", "Springer du i kväll?", "Kl 18 vid bron"] {
        t.call(
            Method::POST,
            &format!("/chats/{}/messages", chat_id),
            Some(anna),
            Some(json!({ "content": text })),
        )
        .await;
    }

    let uri = format!("/chats/{}/read", chat_id);
    let (status, body) = t
        .call(Method::PUT, &uri, Some(erik), Some(json!({ "messageIds": "not-a-list" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (_, body) = t.call(Method::GET, &format!("/chats/{}/unread", chat_id), Some(erik), None).await;
    assert_eq!(body["data"]["unreadCount"], 3);

    let (status, body) = t.call(Method::PUT, &uri, Some(erik), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["markedCount"], 3);
}
