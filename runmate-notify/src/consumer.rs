use anyhow::{Result, anyhow};
use rdkafka::Message;
use runmate_core::outbox::{RATING_TOPIC, RUN_EVENT_TOPIC};
use runmate_core::{RunmateContext, redpanda::subscribe};
use crate::service::NotificationService;
use std::time::Duration;
use tracing;

const TOPICS: &[&str] = &[RUN_EVENT_TOPIC, RATING_TOPIC];

pub async fn run(ctx: RunmateContext) -> Result<()> {
    tracing::info!("Starting notification consumer");

    let consumer = ctx.create_consumer(Some("runmate-notify"))?;
    let service = NotificationService::new(ctx.push.clone());

    subscribe(&consumer, TOPICS)?;

    let mut error_count = 0u32;
    let mut last_error_log = std::time::Instant::now();

    loop {
        match consumer.recv().await {
            Ok(message) => {
                error_count = 0;
                if let Some(payload) = message.payload() {
                    match handle_event(&service, payload).await {
                        Ok(_) => {
                            tracing::debug!("Processed notification event");
                        }
                        Err(e) => {
                            tracing::error!("Error processing notification event: {}", e);
                        }
                    }
                }
            }
            Err(e) => {
                error_count += 1;
                // Log at most every 30 seconds while the broker is unreachable.
                if last_error_log.elapsed().as_secs() >= 30 {
                    tracing::warn!(
                        "Error receiving message from Redpanda (error count: {}): {}",
                        error_count,
                        e
                    );
                    last_error_log = std::time::Instant::now();
                }
                // 1s, 2s, 4s ... capped at 30s
                let backoff = Duration::from_secs(1 << error_count.min(5)).min(Duration::from_secs(30));
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn handle_event(service: &NotificationService, payload: &[u8]) -> Result<()> {
    let event: serde_json::Value = serde_json::from_slice(payload)?;

    let event_type = event.get("event_type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing event_type"))?;

    let event_data = event.get("event_data")
        .ok_or_else(|| anyhow!("Missing event_data"))?;

    service.process_event(event_type, event_data).await
}
