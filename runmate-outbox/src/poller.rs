use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use runmate_core::outbox::{topic_for, OutboxEvent};
use runmate_core::schema::outbox_events;
use runmate_core::{RunmateContext, redpanda::produce_json};
use serde_json::{json, Value};
use std::time::Duration;
use tracing;

#[derive(Queryable, Selectable)]
#[diesel(table_name = runmate_core::schema::outbox_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct OutboxRow {
    id: i64,
    event_type: String,
    event_data: serde_json::Value,
    aggregate_id: Option<String>,
    created_at: chrono::DateTime<Utc>,
}

impl From<OutboxRow> for OutboxEvent {
    fn from(row: OutboxRow) -> Self {
        OutboxEvent {
            id: row.id,
            event_type: row.event_type,
            event_data: row.event_data,
            aggregate_id: row.aggregate_id,
            created_at: row.created_at,
        }
    }
}

const POLL_INTERVAL_MS: u64 = 150;
const BATCH_SIZE: usize = 100;
const MAX_RETRIES: i32 = 3;

pub async fn run(ctx: RunmateContext) -> Result<()> {
    tracing::info!("Starting outbox poller");

    loop {
        match poll_and_publish(&ctx).await {
            Ok(_) => {
                tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!("Error in outbox poller: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn poll_and_publish(ctx: &RunmateContext) -> Result<()> {
    let mut conn = ctx.db_pool.get().await?;

    let rows: Vec<OutboxRow> = outbox_events::table
        .filter(outbox_events::processed_at.is_null())
        .filter(outbox_events::retry_count.lt(MAX_RETRIES))
        .order(outbox_events::id.asc())
        .limit(BATCH_SIZE as i64)
        .select(OutboxRow::as_select())
        .load(&mut conn)
        .await?;

    if rows.is_empty() {
        return Ok(());
    }

    tracing::debug!("Found {} unprocessed outbox events", rows.len());

    for row in rows {
        let event = OutboxEvent::from(row);
        let topic = topic_for(&event.event_type);

        match produce_json(&ctx.redpanda_producer, topic, event.aggregate_id.as_deref(), &envelope(&event)).await {
            Ok(_) => {
                let now = Utc::now();
                diesel::update(outbox_events::table.find(event.id))
                    .set((
                        outbox_events::processed_at.eq(now),
                        outbox_events::published_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await?;

                tracing::debug!("Published outbox event {} ({}) to {}", event.id, event.event_type, topic);
            }
            Err(e) => {
                diesel::update(outbox_events::table.find(event.id))
                    .set((
                        outbox_events::retry_count.eq(outbox_events::retry_count + 1),
                        outbox_events::error_message.eq(Some(e.to_string())),
                    ))
                    .execute(&mut conn)
                    .await?;

                tracing::warn!("Failed to publish outbox event {}: {}", event.id, e);
            }
        }
    }

    Ok(())
}

/// Message body published for an outbox row.
pub fn envelope(event: &OutboxEvent) -> Value {
    json!({
        "event_type": event.event_type,
        "event_data": event.event_data,
        "aggregate_id": event.aggregate_id,
        "outbox_id": event.id,
        "created_at": event.created_at,
        "timestamp": Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use runmate_core::outbox::REQUEST_APPROVED;

    #[test]
    fn envelope_carries_type_and_data() {
        let event = OutboxEvent {
            id: 7,
            event_type: REQUEST_APPROVED.to_string(),
            event_data: json!({ "userId": "u" }),
            aggregate_id: Some("agg".to_string()),
            created_at: Utc::now(),
        };

        let body = envelope(&event);
        assert_eq!(body["event_type"], REQUEST_APPROVED);
        assert_eq!(body["event_data"]["userId"], "u");
        assert_eq!(body["aggregate_id"], "agg");
        assert_eq!(body["outbox_id"], 7);
    }
}
