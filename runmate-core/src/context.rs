use std::sync::Arc;
use crate::config::Config;
use crate::db::{DbPool, create_pool as create_db_pool, run_migrations};
use crate::push::{PushChannel, RedisPush};
use crate::redis::{RedisPool, create_pool as create_redis_pool};
use crate::redpanda::{RedpandaProducer, RedpandaConsumer, create_producer, create_consumer};
use crate::store::PgStore;

/// Shared handles to every backing service, cloned into each task.
#[derive(Clone)]
pub struct RunmateContext {
    pub config: Arc<Config>,
    pub db_pool: Arc<DbPool>,
    pub redis_pool: RedisPool,
    pub redpanda_producer: RedpandaProducer,
    pub store: Arc<PgStore>,
    pub push: Arc<dyn PushChannel>,
}

impl RunmateContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        if config.database.run_migrations {
            run_migrations(&config.database).await?;
        }
        let db_pool = create_db_pool(&config.database).await?;
        let redis_pool = create_redis_pool(&config.redis).await?;
        let redpanda_producer = create_producer(&config.redpanda)?;

        let store = Arc::new(PgStore::new(db_pool.clone()));
        let push: Arc<dyn PushChannel> = Arc::new(RedisPush::new(redis_pool.clone()));

        Ok(RunmateContext {
            config: Arc::new(config),
            db_pool,
            redis_pool,
            redpanda_producer,
            store,
            push,
        })
    }

    pub fn create_consumer(&self, group_id: Option<&str>) -> anyhow::Result<RedpandaConsumer> {
        create_consumer(&self.config.redpanda, group_id)
    }
}
