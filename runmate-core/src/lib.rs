pub mod chat;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod outbox;
pub mod pagination;
pub mod push;
pub mod rating;
pub mod redis;
pub mod redpanda;
pub mod run_event;
pub mod schema;
pub mod store;
pub mod user;

pub use config::Config;
pub use context::RunmateContext;
pub use db::DbPool;
pub use error::{Result, RunmateError, StoreError};
pub use push::{user_channel, PushChannel};
pub use redis::RedisPool;
pub use redpanda::{RedpandaConsumer, RedpandaProducer};
