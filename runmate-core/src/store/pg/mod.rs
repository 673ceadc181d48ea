//! Postgres-backed repositories on top of the shared diesel-async pool.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::sync::Arc;
use uuid::Uuid;

use super::UserRepository;
use crate::db::{DbConnection, DbPool};
use crate::error::StoreError;
use crate::rating::RatingSummary;
use crate::schema::users;
use crate::user::{User, UserSummary};

mod chats;
mod ratings;
mod rows;
mod run_events;

use rows::UserRow;

#[derive(Clone)]
pub struct PgStore {
    pool: Arc<DbPool>,
}

impl PgStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<DbConnection, StoreError> {
        self.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let row = UserRow::from_user(user)?;
        let mut conn = self.conn().await?;
        diesel::insert_into(users::table)
            .values(&row)
            .on_conflict(users::id)
            .do_update()
            .set(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn().await?;
        let row: Option<UserRow> = users::table
            .find(id)
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(UserRow::into_user).transpose()
    }

    async fn get_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let rows: Vec<UserRow> = users::table
            .filter(users::id.eq_any(ids.to_vec()))
            .select(UserRow::as_select())
            .load(&mut conn)
            .await?;

        // Keep the caller's ordering.
        Ok(ids
            .iter()
            .filter_map(|id| rows.iter().find(|r| r.id == *id))
            .map(UserRow::summary)
            .collect())
    }

    async fn cache_rating_stats(&self, id: Uuid, summary: &RatingSummary) -> Result<(), StoreError> {
        let json = serde_json::to_value(summary).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let mut conn = self.conn().await?;
        diesel::update(users::table.find(id))
            .set(users::rating_stats.eq(Some(json)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}
