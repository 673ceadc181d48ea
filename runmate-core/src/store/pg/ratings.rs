use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::rows::{NewOutboxRow, RatingRow};
use super::PgStore;
use crate::error::StoreError;
use crate::outbox::NewOutboxEvent;
use crate::pagination::Page;
use crate::rating::Rating;
use crate::schema::{outbox_events, ratings};
use crate::store::RatingRepository;

#[async_trait]
impl RatingRepository for PgStore {
    async fn find_rating(&self, rater: Uuid, ratee: Uuid, event: Uuid) -> Result<Option<Rating>, StoreError> {
        let mut conn = self.conn().await?;
        let row: Option<RatingRow> = ratings::table
            .filter(ratings::rater.eq(rater))
            .filter(ratings::ratee.eq(ratee))
            .filter(ratings::related_event.eq(event))
            .select(RatingRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(RatingRow::into_rating).transpose()
    }

    async fn insert_rating(&self, rating: &Rating, outbox: &[NewOutboxEvent]) -> Result<(), StoreError> {
        let row = RatingRow::from_rating(rating)?;
        let outbox_rows: Vec<NewOutboxRow> = outbox.iter().map(NewOutboxRow::from).collect();

        let mut conn = self.conn().await?;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                diesel::insert_into(ratings::table)
                    .values(&row)
                    .execute(conn)
                    .await
                    .map_err(StoreError::from_diesel)?;

                if !outbox_rows.is_empty() {
                    diesel::insert_into(outbox_events::table)
                        .values(&outbox_rows)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn approved_for(&self, ratee: Uuid, page: Option<Page>) -> Result<Vec<Rating>, StoreError> {
        let mut query = ratings::table
            .filter(ratings::ratee.eq(ratee))
            .filter(ratings::is_approved.eq(true))
            .order(ratings::created_at.desc())
            .select(RatingRow::as_select())
            .into_boxed();
        if let Some(page) = page {
            query = query.offset(page.offset() as i64).limit(page.limit() as i64);
        }

        let mut conn = self.conn().await?;
        let rows: Vec<RatingRow> = query.load(&mut conn).await?;
        rows.into_iter().map(RatingRow::into_rating).collect()
    }

    async fn given_by(&self, rater: Uuid) -> Result<Vec<Rating>, StoreError> {
        let mut conn = self.conn().await?;
        let rows: Vec<RatingRow> = ratings::table
            .filter(ratings::rater.eq(rater))
            .order(ratings::created_at.desc())
            .select(RatingRow::as_select())
            .load(&mut conn)
            .await?;
        rows.into_iter().map(RatingRow::into_rating).collect()
    }
}
