use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use std::collections::HashSet;
use uuid::Uuid;

use super::rows::{assemble_messages, ChatRow, MessageRow, NewMessageRow, ReadRow};
use super::PgStore;
use crate::chat::{direct_key, Chat, ChatType, LastMessage, Message};
use crate::error::StoreError;
use crate::pagination::Page;
use crate::schema::{chat_message_reads, chat_messages, chats};
use crate::store::ChatRepository;

async fn load_direct(conn: &mut AsyncPgConnection, key: &str) -> Result<Option<Chat>, StoreError> {
    let row: Option<ChatRow> = chats::table
        .filter(chats::chat_type.eq(ChatType::Direct.as_str()))
        .filter(chats::direct_key.eq(key))
        .select(ChatRow::as_select())
        .first(conn)
        .await
        .optional()?;
    row.map(ChatRow::into_chat).transpose()
}

async fn load_reads(conn: &mut AsyncPgConnection, message_ids: Vec<Uuid>) -> Result<Vec<ReadRow>, StoreError> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(chat_message_reads::table
        .filter(chat_message_reads::message_id.eq_any(message_ids))
        .select(ReadRow::as_select())
        .load(conn)
        .await?)
}

#[async_trait]
impl ChatRepository for PgStore {
    async fn find_direct_chat(&self, a: Uuid, b: Uuid) -> Result<Option<Chat>, StoreError> {
        let mut conn = self.conn().await?;
        load_direct(&mut conn, &direct_key(a, b)).await
    }

    async fn insert_chat(&self, chat: &Chat) -> Result<Chat, StoreError> {
        let row = ChatRow::from_chat(chat)?;
        let mut conn = self.conn().await?;

        let inserted = diesel::insert_into(chats::table).values(&row).execute(&mut conn).await;
        match inserted {
            Ok(_) => Ok(chat.clone()),
            Err(err) => match (StoreError::from_diesel(err), row.direct_key) {
                (StoreError::UniqueViolation(_), Some(key)) => {
                    tracing::debug!("Direct chat {} created concurrently, reusing it", key);
                    load_direct(&mut conn, &key)
                        .await?
                        .ok_or_else(|| StoreError::Corrupt(format!("direct chat {} vanished", key)))
                }
                (other, _) => Err(other),
            },
        }
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError> {
        let mut conn = self.conn().await?;
        let row: Option<ChatRow> = chats::table
            .find(id)
            .select(ChatRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(ChatRow::into_chat).transpose()
    }

    async fn list_user_chats(&self, user: Uuid, page: Page) -> Result<Vec<Chat>, StoreError> {
        let mut conn = self.conn().await?;
        let rows: Vec<ChatRow> = chats::table
            .filter(chats::is_active.eq(true))
            .filter(chats::participants.contains(vec![user]))
            .order(chats::last_activity.desc())
            .offset(page.offset() as i64)
            .limit(page.limit() as i64)
            .select(ChatRow::as_select())
            .load(&mut conn)
            .await?;
        rows.into_iter().map(ChatRow::into_chat).collect()
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let row = NewMessageRow::from(message);
        let receipts: Vec<ReadRow> = message
            .read_by
            .iter()
            .map(|r| ReadRow {
                message_id: message.id,
                user_id: r.user,
                read_at: r.read_at,
            })
            .collect();
        let last_message = serde_json::to_value(LastMessage {
            message_id: message.id,
            content: message.content.clone(),
            sender: message.sender,
            message_type: message.message_type,
            timestamp: message.created_at,
        })
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let chat_id = message.chat_id;
        let at = message.created_at;

        let mut conn = self.conn().await?;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                diesel::insert_into(chat_messages::table)
                    .values(&row)
                    .execute(conn)
                    .await?;

                if !receipts.is_empty() {
                    diesel::insert_into(chat_message_reads::table)
                        .values(&receipts)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                }

                let updated = diesel::update(chats::table.find(chat_id))
                    .set((chats::last_message.eq(Some(last_message)), chats::last_activity.eq(at)))
                    .execute(conn)
                    .await?;
                if updated == 0 {
                    return Err(StoreError::Corrupt(format!("chat {} missing", chat_id)));
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn get_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<Option<Message>, StoreError> {
        let mut conn = self.conn().await?;
        let row: Option<MessageRow> = chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .filter(chat_messages::id.eq(message_id))
            .select(MessageRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };
        let reads = load_reads(&mut conn, vec![row.id]).await?;
        Ok(assemble_messages(vec![row], reads)?.pop())
    }

    async fn count_visible_messages(&self, chat_id: Uuid) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let count: i64 = chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .filter(chat_messages::is_deleted.eq(false))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count as usize)
    }

    async fn visible_messages(&self, chat_id: Uuid, offset: usize, limit: usize) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.conn().await?;
        let rows: Vec<MessageRow> = chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .filter(chat_messages::is_deleted.eq(false))
            .order(chat_messages::seq.asc())
            .offset(offset as i64)
            .limit(limit as i64)
            .select(MessageRow::as_select())
            .load(&mut conn)
            .await?;

        let reads = load_reads(&mut conn, rows.iter().map(|r| r.id).collect()).await?;
        assemble_messages(rows, reads)
    }

    async fn mark_read(
        &self,
        chat_id: Uuid,
        user: Uuid,
        message_ids: Option<&[Uuid]>,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;

        let mut candidates = chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .filter(chat_messages::is_deleted.eq(false))
            .select(chat_messages::id)
            .into_boxed();
        if let Some(ids) = message_ids {
            candidates = candidates.filter(chat_messages::id.eq_any(ids.to_vec()));
        }
        let candidates: Vec<Uuid> = candidates.load(&mut conn).await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let already_read: HashSet<Uuid> = chat_message_reads::table
            .filter(chat_message_reads::user_id.eq(user))
            .filter(chat_message_reads::message_id.eq_any(candidates.clone()))
            .select(chat_message_reads::message_id)
            .load::<Uuid>(&mut conn)
            .await?
            .into_iter()
            .collect();

        let receipts: Vec<ReadRow> = candidates
            .into_iter()
            .filter(|id| !already_read.contains(id))
            .map(|message_id| ReadRow {
                message_id,
                user_id: user,
                read_at: at,
            })
            .collect();
        if receipts.is_empty() {
            return Ok(0);
        }

        let inserted = diesel::insert_into(chat_message_reads::table)
            .values(&receipts)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(inserted)
    }

    async fn unread_count(&self, chat_id: Uuid, user: Uuid) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;

        let incoming: i64 = chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .filter(chat_messages::is_deleted.eq(false))
            .filter(chat_messages::sender.ne(user))
            .count()
            .get_result(&mut conn)
            .await?;

        let read: i64 = chat_message_reads::table
            .inner_join(chat_messages::table)
            .filter(chat_message_reads::user_id.eq(user))
            .filter(chat_messages::chat_id.eq(chat_id))
            .filter(chat_messages::is_deleted.eq(false))
            .filter(chat_messages::sender.ne(user))
            .count()
            .get_result(&mut conn)
            .await?;

        Ok(incoming.saturating_sub(read).max(0) as usize)
    }

    async fn soft_delete_message(&self, chat_id: Uuid, message_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            chat_messages::table
                .filter(chat_messages::chat_id.eq(chat_id))
                .filter(chat_messages::id.eq(message_id)),
        )
        .set((chat_messages::is_deleted.eq(true), chat_messages::deleted_at.eq(Some(at))))
        .execute(&mut conn)
        .await?;
        Ok(updated > 0)
    }
}
