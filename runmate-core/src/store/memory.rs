use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ChatRepository, ChatWrite, RatingRepository, RunEventCommit, RunEventFilter, RunEventRepository, UserRepository};
use crate::chat::{direct_key, Chat, ChatType, Message};
use crate::error::StoreError;
use crate::outbox::NewOutboxEvent;
use crate::pagination::Page;
use crate::rating::{Rating, RatingSummary};
use crate::run_event::RunEvent;
use crate::user::{User, UserSummary};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    chats: HashMap<Uuid, Chat>,
    messages: HashMap<Uuid, Vec<Message>>,
    run_events: HashMap<Uuid, RunEvent>,
    ratings: Vec<Rating>,
    outbox: Vec<NewOutboxEvent>,
}

/// Single-lock store; every multi-aggregate write happens under one guard,
/// which gives it the same all-or-nothing behaviour as a transaction.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbox events recorded so far, oldest first.
    pub async fn outbox(&self) -> Vec<NewOutboxEvent> {
        self.state.lock().await.outbox.clone()
    }

    /// Every stored message of a chat, deleted ones included.
    pub async fn all_messages(&self, chat_id: Uuid) -> Vec<Message> {
        self.state
            .lock()
            .await
            .messages
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn chat_count(&self) -> usize {
        self.state.lock().await.chats.len()
    }
}

fn find_direct(state: &MemoryState, a: Uuid, b: Uuid) -> Option<Chat> {
    let key = direct_key(a, b);
    state
        .chats
        .values()
        .find(|c| c.chat_type == ChatType::Direct && direct_key(c.participants[0], c.participants[1]) == key)
        .cloned()
}

fn apply_chat_write(state: &mut MemoryState, write: &ChatWrite) -> Result<(), StoreError> {
    match write {
        ChatWrite::Insert(chat) => {
            state.messages.entry(chat.id).or_default();
            state.chats.insert(chat.id, chat.clone());
        }
        ChatWrite::AddParticipant { chat_id, user, at } => {
            let chat = state
                .chats
                .get_mut(chat_id)
                .ok_or_else(|| StoreError::Corrupt(format!("chat {} missing", chat_id)))?;
            chat.add_participant(*user, *at);
        }
        ChatWrite::RemoveParticipant { chat_id, user, at } => {
            if let Some(chat) = state.chats.get_mut(chat_id) {
                chat.remove_participant(*user, *at);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ChatRepository for MemoryStore {
    async fn find_direct_chat(&self, a: Uuid, b: Uuid) -> Result<Option<Chat>, StoreError> {
        let state = self.state.lock().await;
        Ok(find_direct(&state, a, b))
    }

    async fn insert_chat(&self, chat: &Chat) -> Result<Chat, StoreError> {
        let mut state = self.state.lock().await;
        if chat.chat_type == ChatType::Direct {
            if let Some(existing) = find_direct(&state, chat.participants[0], chat.participants[1]) {
                return Ok(existing);
            }
        }
        state.chats.insert(chat.id, chat.clone());
        state.messages.entry(chat.id).or_default();
        Ok(chat.clone())
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError> {
        Ok(self.state.lock().await.chats.get(&id).cloned())
    }

    async fn list_user_chats(&self, user: Uuid, page: Page) -> Result<Vec<Chat>, StoreError> {
        let state = self.state.lock().await;
        let mut chats: Vec<Chat> = state
            .chats
            .values()
            .filter(|c| c.is_active && c.is_participant(user))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(chats.into_iter().skip(page.offset()).take(page.limit()).collect())
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let chat = state
            .chats
            .get_mut(&message.chat_id)
            .ok_or_else(|| StoreError::Corrupt(format!("chat {} missing", message.chat_id)))?;
        chat.record_message(message);
        state.messages.entry(message.chat_id).or_default().push(message.clone());
        Ok(())
    }

    async fn get_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<Option<Message>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .get(&chat_id)
            .and_then(|msgs| msgs.iter().find(|m| m.id == message_id))
            .cloned())
    }

    async fn count_visible_messages(&self, chat_id: Uuid) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .get(&chat_id)
            .map_or(0, |msgs| msgs.iter().filter(|m| !m.is_deleted).count()))
    }

    async fn visible_messages(&self, chat_id: Uuid, offset: usize, limit: usize) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .get(&chat_id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| !m.is_deleted)
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn mark_read(
        &self,
        chat_id: Uuid,
        user: Uuid,
        message_ids: Option<&[Uuid]>,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let Some(msgs) = state.messages.get_mut(&chat_id) else {
            return Ok(0);
        };
        let mut marked = 0;
        for msg in msgs.iter_mut().filter(|m| !m.is_deleted) {
            if let Some(ids) = message_ids {
                if !ids.contains(&msg.id) {
                    continue;
                }
            }
            if msg.mark_read(user, at) {
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn unread_count(&self, chat_id: Uuid, user: Uuid) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .get(&chat_id)
            .map_or(0, |msgs| msgs.iter().filter(|m| m.is_unread_for(user)).count()))
    }

    async fn soft_delete_message(&self, chat_id: Uuid, message_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(msg) = state
            .messages
            .get_mut(&chat_id)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.id == message_id))
        else {
            return Ok(false);
        };
        msg.soft_delete(at);
        Ok(true)
    }
}

#[async_trait]
impl RunEventRepository for MemoryStore {
    async fn insert_event(&self, event: &RunEvent) -> Result<(), StoreError> {
        self.state.lock().await.run_events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<RunEvent>, StoreError> {
        Ok(self.state.lock().await.run_events.get(&id).cloned())
    }

    async fn list_events(&self, filter: &RunEventFilter, page: Option<Page>) -> Result<Vec<RunEvent>, StoreError> {
        let state = self.state.lock().await;
        let mut events: Vec<RunEvent> = state
            .run_events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(match page {
            Some(page) => events.into_iter().skip(page.offset()).take(page.limit()).collect(),
            None => events,
        })
    }

    async fn commit(&self, commit: RunEventCommit) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.run_events.get(&commit.event.id) else {
            return Err(StoreError::Corrupt(format!("run event {} missing", commit.event.id)));
        };
        if commit.expected_updated_at.is_some_and(|at| at != stored.updated_at) {
            return Err(StoreError::StaleWrite(format!("run event {}", commit.event.id)));
        }
        if let Some(write) = &commit.chat {
            apply_chat_write(&mut state, write)?;
        }
        state.run_events.insert(commit.event.id, commit.event);
        state.outbox.extend(commit.outbox);
        Ok(())
    }
}

#[async_trait]
impl RatingRepository for MemoryStore {
    async fn find_rating(&self, rater: Uuid, ratee: Uuid, event: Uuid) -> Result<Option<Rating>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .ratings
            .iter()
            .find(|r| r.rater == rater && r.ratee == ratee && r.related_event == event)
            .cloned())
    }

    async fn insert_rating(&self, rating: &Rating, outbox: &[NewOutboxEvent]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let duplicate = state
            .ratings
            .iter()
            .any(|r| r.rater == rating.rater && r.ratee == rating.ratee && r.related_event == rating.related_event);
        if duplicate {
            return Err(StoreError::UniqueViolation("ratings_rater_ratee_event_key".to_string()));
        }
        state.ratings.push(rating.clone());
        state.outbox.extend_from_slice(outbox);
        Ok(())
    }

    async fn approved_for(&self, ratee: Uuid, page: Option<Page>) -> Result<Vec<Rating>, StoreError> {
        let state = self.state.lock().await;
        let mut ratings: Vec<Rating> = state
            .ratings
            .iter()
            .filter(|r| r.ratee == ratee && r.is_approved)
            .cloned()
            .collect();
        ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(match page {
            Some(page) => ratings.into_iter().skip(page.offset()).take(page.limit()).collect(),
            None => ratings,
        })
    }

    async fn given_by(&self, rater: Uuid) -> Result<Vec<Rating>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.ratings.iter().filter(|r| r.rater == rater).cloned().collect())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        self.state.lock().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>, StoreError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id))
            .map(UserSummary::from)
            .collect())
    }

    async fn cache_rating_stats(&self, id: Uuid, summary: &RatingSummary) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get_mut(&id) {
            user.rating_stats = Some(summary.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageType;

    #[tokio::test]
    async fn direct_chat_insert_is_idempotent_per_pair() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = store.insert_chat(&Chat::new_direct(a, b, Utc::now()).unwrap()).await.unwrap();
        let second = store.insert_chat(&Chat::new_direct(b, a, Utc::now()).unwrap()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.chat_count().await, 1);
    }

    #[tokio::test]
    async fn mark_read_restricted_to_ids() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let chat = store.insert_chat(&Chat::new_direct(a, b, Utc::now()).unwrap()).await.unwrap();

        let m1 = Message::new(chat.id, a, "one".into(), MessageType::Text, None, Utc::now());
        let m2 = Message::new(chat.id, a, "two".into(), MessageType::Text, None, Utc::now());
        store.append_message(&m1).await.unwrap();
        store.append_message(&m2).await.unwrap();

        assert_eq!(store.unread_count(chat.id, b).await.unwrap(), 2);
        assert_eq!(store.mark_read(chat.id, b, Some(&[m1.id]), Utc::now()).await.unwrap(), 1);
        assert_eq!(store.unread_count(chat.id, b).await.unwrap(), 1);
        assert_eq!(store.mark_read(chat.id, b, None, Utc::now()).await.unwrap(), 1);
        assert_eq!(store.mark_read(chat.id, b, None, Utc::now()).await.unwrap(), 0);
    }
}
