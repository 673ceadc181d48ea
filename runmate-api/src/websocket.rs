use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Extension, Query},
    http::StatusCode,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use redis::streams::{StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use runmate_core::push::user_stream_key;
use runmate_core::redis::get_connection;
use runmate_core::RedisPool;
use serde::Deserialize;
use std::time::Duration;
use tracing;
use uuid::Uuid;

use crate::auth::verify_token;
use crate::response::failure;
use crate::state::ApiState;

const BLOCK_MS: usize = 1000;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// `GET /ws?token=<jwt>`: streams the caller's pushes as text frames.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<ApiState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let Some(token) = query.token else {
        return failure(StatusCode::UNAUTHORIZED, "Authentication required");
    };
    let user = match verify_token(&token, &state.jwt_secret) {
        Ok(user) => user,
        Err(status) => return failure(status, "Invalid or expired token"),
    };
    let Some(redis_pool) = state.redis_pool.clone() else {
        return failure(StatusCode::SERVICE_UNAVAILABLE, "Real-time updates are unavailable");
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user, redis_pool))
}

/// XREAD cursor that skips everything already in the stream.
fn resume_after(latest: &StreamRangeReply) -> String {
    latest
        .ids
        .first()
        .map(|entry| entry.id.clone())
        .unwrap_or_else(|| "0-0".to_string())
}

async fn handle_socket(socket: WebSocket, user: Uuid, redis_pool: RedisPool) {
    tracing::info!("WebSocket connection established for user: {}", user);

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let stream_key = user_stream_key(user);
        let options = StreamReadOptions::default().block(BLOCK_MS);
        let mut last_id: Option<String> = None;

        loop {
            let mut conn = match get_connection(&redis_pool).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Failed to get Redis connection: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            // Start after the newest entry present when the socket opened,
            // using ids assigned by Redis itself.
            let cursor = if let Some(id) = last_id.clone() {
                id
            } else {
                let latest: Result<StreamRangeReply, redis::RedisError> =
                    conn.xrevrange_count(&stream_key, "+", "-", 1).await;
                match latest {
                    Ok(latest) => {
                        let id = resume_after(&latest);
                        last_id = Some(id.clone());
                        id
                    }
                    Err(e) => {
                        tracing::error!("Redis stream read error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                }
            };

            let reply: Result<Option<StreamReadReply>, redis::RedisError> = conn
                .xread_options(&[&stream_key], &[&cursor], &options)
                .await;

            match reply {
                Ok(Some(reply)) => {
                    for entry in reply.keys.into_iter().flat_map(|k| k.ids) {
                        last_id = Some(entry.id.clone());
                        let Some(data) = entry.get::<String>("data") else {
                            continue;
                        };
                        if let Err(e) = sender.send(Message::Text(data)).await {
                            tracing::debug!("WebSocket send failed for {}: {}", user, e);
                            return;
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Redis stream read error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("WebSocket connection closed for user: {}", user);
}
