use anyhow::Result;
use axum::{
    extract::Extension,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use runmate_core::RunmateContext;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing;

use crate::auth;
use crate::handlers::{self, chats, ratings, run_events};
use crate::state::ApiState;
use crate::websocket;

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some(origins) => {
            let mut cors = CorsLayer::new();
            for origin in origins.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
                if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                    cors = cors.allow_origin(parsed);
                }
            }
            cors.allow_methods(Any).allow_headers(Any)
        }
        None => {
            tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
            CorsLayer::permissive()
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(websocket::websocket_handler))
        .route("/chats", get(chats::list).post(chats::create))
        .route("/chats/direct", post(chats::direct))
        .route("/chats/group", post(chats::group))
        .route("/chats/unread", get(chats::total_unread))
        .route("/chats/:id", get(chats::get))
        .route("/chats/:id/unread", get(chats::unread))
        .route("/chats/:id/messages", get(chats::messages).post(chats::send))
        .route("/chats/:id/read", put(chats::mark_read))
        .route("/chats/:id/messages/:message_id", delete(chats::delete_message))
        .route("/runevents", get(run_events::list).post(run_events::create))
        .route(
            "/runevents/:id",
            get(run_events::get).put(run_events::update).delete(run_events::cancel),
        )
        .route("/runevents/:id/join", post(run_events::join))
        .route("/runevents/:id/requests", put(run_events::decide))
        .route("/runevents/:id/leave", post(run_events::leave))
        .route("/ratings", post(ratings::create))
        .route("/ratings/report", post(ratings::report))
        .route("/ratings/pending", get(ratings::pending))
        .route("/ratings/user/:id", get(ratings::for_user))
        .route("/ratings/user/:id/stats", get(ratings::stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(state))
                .layer(middleware::from_fn(auth::auth_middleware)),
        )
}

pub async fn run(ctx: RunmateContext) -> Result<()> {
    let state = ApiState::from_context(&ctx);
    let app = router(state).layer(cors_layer(ctx.config.server.cors_origins.as_deref()));

    let host: std::net::IpAddr = ctx.config.server.host.parse()?;
    let addr = SocketAddr::from((host, ctx.config.server.api_port));
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

