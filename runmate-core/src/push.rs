//! Best-effort real-time delivery to per-user channels.
//!
//! Emission never fails the caller: implementations log and swallow their
//! own errors.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

use crate::redis::{get_connection, RedisPool};

const CHANNEL_PREFIX: &str = "user:";

/// Name of the channel a single user listens on.
pub fn user_channel(user: Uuid) -> String {
    format!("{}{}", CHANNEL_PREFIX, user)
}

/// Redis stream backing a user's channel.
pub fn user_stream_key(user: Uuid) -> String {
    format!("STREAM:USER:{}", user)
}

#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn emit(&self, channel: &str, event: &str, payload: Value);
}

/// Appends each push to the target user's Redis stream, which the
/// WebSocket endpoint tails.
pub struct RedisPush {
    redis_pool: RedisPool,
}

impl RedisPush {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self { redis_pool }
    }

    async fn append(&self, stream_key: &str, data: String) -> anyhow::Result<()> {
        let mut conn = get_connection(&self.redis_pool).await?;
        let _: String = redis::cmd("XADD")
            .arg(stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(1000)
            .arg("*")
            .arg("data")
            .arg(data)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PushChannel for RedisPush {
    async fn emit(&self, channel: &str, event: &str, payload: Value) {
        let Some(user) = channel
            .strip_prefix(CHANNEL_PREFIX)
            .and_then(|id| id.parse::<Uuid>().ok())
        else {
            tracing::warn!("Dropping push for unroutable channel {}", channel);
            return;
        };

        let data = serde_json::json!({ "event": event, "payload": payload }).to_string();
        if let Err(e) = self.append(&user_stream_key(user), data).await {
            tracing::warn!("Failed to push {} to {}: {}", event, channel, e);
        }
    }
}

/// Discards everything; used when no real-time layer is configured.
pub struct NoopPush;

#[async_trait]
impl PushChannel for NoopPush {
    async fn emit(&self, _channel: &str, _event: &str, _payload: Value) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// Keeps every emission in memory so tests can assert on them.
#[derive(Default)]
pub struct RecordingPush {
    emitted: Mutex<Vec<Emitted>>,
}

impl RecordingPush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<Emitted> {
        self.emitted.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events delivered to one channel, in order.
    pub fn events_for(&self, channel: &str) -> Vec<String> {
        self.emitted()
            .into_iter()
            .filter(|e| e.channel == channel)
            .map(|e| e.event)
            .collect()
    }
}

#[async_trait]
impl PushChannel for RecordingPush {
    async fn emit(&self, channel: &str, event: &str, payload: Value) {
        if let Ok(mut emitted) = self.emitted.lock() {
            emitted.push(Emitted {
                channel: channel.to_string(),
                event: event.to_string(),
                payload,
            });
        }
    }
}
