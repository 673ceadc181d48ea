use runmate_chat::ChatService;
use runmate_core::config::PagingConfig;
use runmate_core::store::{ChatRepository, RatingRepository, RunEventRepository, UserRepository};
use runmate_core::{Config, PushChannel, RedisPool, RunmateContext};
use runmate_ratings::RatingService;
use runmate_runs::RunEventService;
use std::sync::Arc;

/// Everything a request handler needs, shared through an `Extension` layer.
#[derive(Clone)]
pub struct ApiState {
    pub chats: Arc<ChatService>,
    pub runs: Arc<RunEventService>,
    pub ratings: Arc<RatingService>,
    pub jwt_secret: Arc<str>,
    pub paging: PagingConfig,
    /// Source for the WebSocket stream tail; absent when running without Redis.
    pub redis_pool: Option<RedisPool>,
}

impl ApiState {
    pub fn new<S>(store: Arc<S>, push: Arc<dyn PushChannel>, config: &Config, redis_pool: Option<RedisPool>) -> Self
    where
        S: ChatRepository + RunEventRepository + RatingRepository + UserRepository + 'static,
    {
        let chats: Arc<dyn ChatRepository> = store.clone();
        let events: Arc<dyn RunEventRepository> = store.clone();
        let ratings: Arc<dyn RatingRepository> = store.clone();
        let users: Arc<dyn UserRepository> = store;

        ApiState {
            chats: Arc::new(ChatService::new(chats, users.clone(), push)),
            runs: Arc::new(RunEventService::new(events.clone())),
            ratings: Arc::new(RatingService::new(ratings, events, users)),
            jwt_secret: Arc::from(config.server.jwt_secret.as_str()),
            paging: config.paging,
            redis_pool,
        }
    }

    pub fn from_context(ctx: &RunmateContext) -> Self {
        ApiState::new(
            ctx.store.clone(),
            ctx.push.clone(),
            &ctx.config,
            Some(ctx.redis_pool.clone()),
        )
    }
}
