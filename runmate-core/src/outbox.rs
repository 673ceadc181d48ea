use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RUN_EVENT_TOPIC: &str = "events.runevent";
pub const RATING_TOPIC: &str = "events.rating";
pub const UNKNOWN_TOPIC: &str = "events.unknown";

pub const JOIN_REQUESTED: &str = "runevent.join_requested";
pub const REQUEST_APPROVED: &str = "runevent.request_approved";
pub const REQUEST_REJECTED: &str = "runevent.request_rejected";
pub const PARTICIPANT_LEFT: &str = "runevent.participant_left";
pub const RUN_CANCELLED: &str = "runevent.cancelled";
pub const RATING_CREATED: &str = "rating.created";

/// Domain event written in the same transaction as the change it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub aggregate_id: Option<String>,
}

impl NewOutboxEvent {
    pub fn new(event_type: &str, aggregate_id: Uuid, event_data: serde_json::Value) -> Self {
        NewOutboxEvent {
            event_type: event_type.to_string(),
            event_data,
            aggregate_id: Some(aggregate_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: i64,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub aggregate_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Topic a given event type is published to.
pub fn topic_for(event_type: &str) -> &'static str {
    match event_type {
        t if t.starts_with("runevent.") => RUN_EVENT_TOPIC,
        t if t.starts_with("rating.") => RATING_TOPIC,
        _ => UNKNOWN_TOPIC,
    }
}
