use anyhow::Result;
use chrono::Utc;
use runmate_core::outbox::{
    JOIN_REQUESTED, PARTICIPANT_LEFT, RATING_CREATED, REQUEST_APPROVED, REQUEST_REJECTED, RUN_CANCELLED,
};
use runmate_core::push::{user_channel, PushChannel};
use serde_json::Value;
use std::sync::Arc;
use tracing;
use uuid::Uuid;

pub const NOTIFICATION_EVENT: &str = "notification";

pub struct NotificationService {
    push: Arc<dyn PushChannel>,
}

fn user_field(event_data: &Value, field: &str) -> Option<Uuid> {
    event_data.get(field).and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
}

fn user_list(event_data: &Value, field: &str) -> Vec<Uuid> {
    event_data
        .get(field)
        .and_then(|v| v.as_array())
        .map(|ids| ids.iter().filter_map(|v| v.as_str()).filter_map(|s| s.parse().ok()).collect())
        .unwrap_or_default()
}

impl NotificationService {
    pub fn new(push: Arc<dyn PushChannel>) -> Self {
        Self { push }
    }

    pub async fn process_event(&self, event_type: &str, event_data: &Value) -> Result<()> {
        tracing::debug!("Processing notification event: {}", event_type);

        let recipients = extract_recipients(event_type, event_data);
        if recipients.is_empty() {
            return Ok(());
        }

        let (title, body) = format_notification(event_type, event_data);
        for recipient in recipients {
            let notification = serde_json::json!({
                "id": Uuid::new_v4(),
                "userId": recipient,
                "notificationType": event_type,
                "title": title,
                "body": body,
                "data": event_data,
                "createdAt": Utc::now(),
            });
            self.push
                .emit(&user_channel(recipient), NOTIFICATION_EVENT, notification)
                .await;
        }

        Ok(())
    }
}

/// Users who should hear about the event.
pub fn extract_recipients(event_type: &str, event_data: &Value) -> Vec<Uuid> {
    match event_type {
        JOIN_REQUESTED | PARTICIPANT_LEFT => user_field(event_data, "hostId").into_iter().collect(),
        REQUEST_APPROVED | REQUEST_REJECTED => user_field(event_data, "userId").into_iter().collect(),
        RUN_CANCELLED => {
            let mut recipients = user_list(event_data, "participants");
            for pending in user_list(event_data, "pendingRequests") {
                if !recipients.contains(&pending) {
                    recipients.push(pending);
                }
            }
            recipients
        }
        RATING_CREATED => user_field(event_data, "rateeId").into_iter().collect(),
        _ => {
            tracing::warn!("Unknown event type for recipient extraction: {}", event_type);
            Vec::new()
        }
    }
}

pub fn format_notification(event_type: &str, event_data: &Value) -> (String, String) {
    let title = event_data.get("title").and_then(|v| v.as_str()).unwrap_or("your run");
    match event_type {
        JOIN_REQUESTED => (
            "New join request".to_string(),
            format!("Someone wants to join {}", title),
        ),
        REQUEST_APPROVED => (
            "Request approved".to_string(),
            format!("You are in! See you at {}", title),
        ),
        REQUEST_REJECTED => {
            let body = if event_data.get("reason").and_then(|v| v.as_str()) == Some("full") {
                format!("{} is already full", title)
            } else {
                format!("Your request to join {} was declined", title)
            };
            ("Request declined".to_string(), body)
        }
        PARTICIPANT_LEFT => (
            "Participant left".to_string(),
            format!("A runner left {}", title),
        ),
        RUN_CANCELLED => (
            "Run cancelled".to_string(),
            format!("{} has been cancelled", title),
        ),
        RATING_CREATED => {
            let score = event_data.get("overallRating").and_then(|v| v.as_u64()).unwrap_or(0);
            (
                "New rating".to_string(),
                format!("A co-runner from {} rated you {}/5", title, score),
            )
        }
        _ => {
            tracing::warn!("Unknown event type for notification formatting: {}", event_type);
            (
                "Notification".to_string(),
                "You have a new notification".to_string(),
            )
        }
    }
}
