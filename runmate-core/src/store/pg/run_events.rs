use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use super::rows::{ChatRow, NewOutboxRow, RunEventRow};
use super::PgStore;
use crate::error::StoreError;
use crate::pagination::Page;
use crate::run_event::RunEvent;
use crate::schema::{chats, outbox_events, run_events};
use crate::store::{ChatWrite, RunEventCommit, RunEventFilter, RunEventRepository};

/// Locks the chat row, applies the membership change in memory and writes it back.
async fn apply_chat_write(conn: &mut AsyncPgConnection, write: ChatWrite) -> Result<(), StoreError> {
    let (chat_id, user, at, adding) = match write {
        ChatWrite::Insert(chat) => {
            let row = ChatRow::from_chat(&chat)?;
            diesel::insert_into(chats::table).values(&row).execute(conn).await?;
            return Ok(());
        }
        ChatWrite::AddParticipant { chat_id, user, at } => (chat_id, user, at, true),
        ChatWrite::RemoveParticipant { chat_id, user, at } => (chat_id, user, at, false),
    };

    let row: Option<ChatRow> = chats::table
        .find(chat_id)
        .select(ChatRow::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?;

    let mut chat = match (row, adding) {
        (Some(row), _) => row.into_chat()?,
        (None, true) => return Err(StoreError::Corrupt(format!("chat {} missing", chat_id))),
        (None, false) => return Ok(()),
    };

    let changed = if adding {
        chat.add_participant(user, at)
    } else {
        chat.remove_participant(user, at)
    };
    if changed {
        diesel::update(chats::table.find(chat_id))
            .set((
                chats::participants.eq(&chat.participants),
                chats::admins.eq(&chat.admins),
                chats::last_activity.eq(chat.last_activity),
            ))
            .execute(conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl RunEventRepository for PgStore {
    async fn insert_event(&self, event: &RunEvent) -> Result<(), StoreError> {
        let row = RunEventRow::from(event);
        let mut conn = self.conn().await?;
        diesel::insert_into(run_events::table)
            .values(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<RunEvent>, StoreError> {
        let mut conn = self.conn().await?;
        let row: Option<RunEventRow> = run_events::table
            .find(id)
            .select(RunEventRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(RunEventRow::into_event).transpose()
    }

    async fn list_events(&self, filter: &RunEventFilter, page: Option<Page>) -> Result<Vec<RunEvent>, StoreError> {
        let mut query = run_events::table
            .select(RunEventRow::as_select())
            .order(run_events::event_date.asc())
            .into_boxed();

        if let Some(status) = filter.status {
            query = query.filter(run_events::status.eq(status.as_str()));
        }
        if let Some(host) = filter.host {
            query = query.filter(run_events::host.eq(host));
        }
        if let Some(participant) = filter.participant {
            query = query.filter(run_events::participants.contains(vec![participant]));
        }
        if let Some(before) = filter.before {
            query = query.filter(run_events::event_date.lt(before));
        }
        if let Some(page) = page {
            query = query.offset(page.offset() as i64).limit(page.limit() as i64);
        }

        let mut conn = self.conn().await?;
        let rows: Vec<RunEventRow> = query.load(&mut conn).await?;
        rows.into_iter().map(RunEventRow::into_event).collect()
    }

    async fn commit(&self, commit: RunEventCommit) -> Result<(), StoreError> {
        let RunEventCommit {
            event,
            expected_updated_at,
            chat,
            outbox,
        } = commit;
        let row = RunEventRow::from(&event);
        let outbox_rows: Vec<NewOutboxRow> = outbox.iter().map(NewOutboxRow::from).collect();

        let mut conn = self.conn().await?;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                // The chat goes first so a freshly created chat exists before
                // the event row references it.
                if let Some(write) = chat {
                    apply_chat_write(conn, write).await?;
                }

                // Compare-and-set on updated_at; a concurrent commit makes this
                // match nothing and rolls back the chat write above.
                let updated = match expected_updated_at {
                    Some(prev) => {
                        diesel::update(
                            run_events::table
                                .find(row.id)
                                .filter(run_events::updated_at.eq(prev)),
                        )
                        .set(&row)
                        .execute(conn)
                        .await?
                    }
                    None => {
                        diesel::update(run_events::table.find(row.id))
                            .set(&row)
                            .execute(conn)
                            .await?
                    }
                };
                if updated == 0 {
                    let exists: bool = diesel::select(diesel::dsl::exists(run_events::table.find(row.id)))
                        .get_result(conn)
                        .await?;
                    return Err(if exists {
                        StoreError::StaleWrite(format!("run event {}", row.id))
                    } else {
                        StoreError::Corrupt(format!("run event {} missing", row.id))
                    });
                }

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
        .await?;

        tracing::debug!("Committed run event {} with {} outbox events", event.id, outbox.len());
        Ok(())
    }
}
