//! Repository interfaces over the aggregates, with a Postgres backend for
//! production and an in-memory backend with the same semantics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chat::{Chat, Message};
use crate::error::StoreError;
use crate::outbox::NewOutboxEvent;
use crate::pagination::Page;
use crate::rating::{Rating, RatingSummary};
use crate::run_event::{RunEvent, RunEventStatus};
use crate::user::{User, UserSummary};

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn find_direct_chat(&self, a: Uuid, b: Uuid) -> Result<Option<Chat>, StoreError>;

    /// Stores a new chat. A direct chat losing a creation race returns the
    /// chat that won instead.
    async fn insert_chat(&self, chat: &Chat) -> Result<Chat, StoreError>;

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError>;

    /// Active chats the user takes part in, most recently active first.
    async fn list_user_chats(&self, user: Uuid, page: Page) -> Result<Vec<Chat>, StoreError>;

    /// Appends the message and refreshes the chat's last-message cache.
    async fn append_message(&self, message: &Message) -> Result<(), StoreError>;

    async fn get_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<Option<Message>, StoreError>;

    /// Number of messages that are not soft-deleted.
    async fn count_visible_messages(&self, chat_id: Uuid) -> Result<usize, StoreError>;

    /// Non-deleted messages in chronological order, `offset` counted from the oldest.
    async fn visible_messages(&self, chat_id: Uuid, offset: usize, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// Adds read receipts for `user`, restricted to `message_ids` when given.
    /// Returns how many messages were newly marked.
    async fn mark_read(
        &self,
        chat_id: Uuid,
        user: Uuid,
        message_ids: Option<&[Uuid]>,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    async fn unread_count(&self, chat_id: Uuid, user: Uuid) -> Result<usize, StoreError>;

    async fn soft_delete_message(&self, chat_id: Uuid, message_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

/// Chat change that must land together with a run event update.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatWrite {
    Insert(Chat),
    AddParticipant { chat_id: Uuid, user: Uuid, at: DateTime<Utc> },
    RemoveParticipant { chat_id: Uuid, user: Uuid, at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct RunEventCommit {
    pub event: RunEvent,
    /// `updated_at` of the stored row the change was computed from.
    pub expected_updated_at: Option<DateTime<Utc>>,
    pub chat: Option<ChatWrite>,
    pub outbox: Vec<NewOutboxEvent>,
}

impl RunEventCommit {
    pub fn new(event: RunEvent) -> Self {
        RunEventCommit {
            event,
            expected_updated_at: None,
            chat: None,
            outbox: Vec::new(),
        }
    }

    /// Only commit if the stored event is still at `updated_at`.
    pub fn expecting(mut self, updated_at: DateTime<Utc>) -> Self {
        self.expected_updated_at = Some(updated_at);
        self
    }

    pub fn with_chat(mut self, chat: ChatWrite) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_event(mut self, event: NewOutboxEvent) -> Self {
        self.outbox.push(event);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunEventFilter {
    pub status: Option<RunEventStatus>,
    pub host: Option<Uuid>,
    pub participant: Option<Uuid>,
    /// Only events dated strictly before this instant.
    pub before: Option<DateTime<Utc>>,
}

impl RunEventFilter {
    pub fn matches(&self, event: &RunEvent) -> bool {
        self.status.map_or(true, |s| event.status == s)
            && self.host.map_or(true, |h| event.host == h)
            && self.participant.map_or(true, |p| event.is_participant(p))
            && self.before.map_or(true, |b| event.date < b)
    }
}

#[async_trait]
pub trait RunEventRepository: Send + Sync {
    async fn insert_event(&self, event: &RunEvent) -> Result<(), StoreError>;

    async fn get_event(&self, id: Uuid) -> Result<Option<RunEvent>, StoreError>;

    /// Ordered by run date, soonest first. `None` returns every match.
    async fn list_events(&self, filter: &RunEventFilter, page: Option<Page>) -> Result<Vec<RunEvent>, StoreError>;

    /// Saves the event, applies the chat change and records the outbox
    /// events atomically. Fails with `StaleWrite`, writing nothing, when the
    /// stored event no longer matches `expected_updated_at`.
    async fn commit(&self, commit: RunEventCommit) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RatingRepository: Send + Sync {
    async fn find_rating(&self, rater: Uuid, ratee: Uuid, event: Uuid) -> Result<Option<Rating>, StoreError>;

    /// Fails with `UniqueViolation` when the (rater, ratee, event) triple exists.
    async fn insert_rating(&self, rating: &Rating, outbox: &[NewOutboxEvent]) -> Result<(), StoreError>;

    /// Approved ratings received by `ratee`, newest first.
    async fn approved_for(&self, ratee: Uuid, page: Option<Page>) -> Result<Vec<Rating>, StoreError>;

    /// Everything `rater` has submitted, reports included.
    async fn given_by(&self, rater: Uuid) -> Result<Vec<Rating>, StoreError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Display fields for the given ids; unknown ids are skipped.
    async fn get_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>, StoreError>;

    async fn cache_rating_stats(&self, id: Uuid, summary: &RatingSummary) -> Result<(), StoreError>;
}

/// Display fields for `ids` in the same order, with placeholders for ids the
/// directory does not know.
pub async fn expand_users(users: &dyn UserRepository, ids: &[Uuid]) -> Result<Vec<UserSummary>, StoreError> {
    let found = users.get_summaries(ids).await?;
    Ok(ids
        .iter()
        .map(|id| {
            found
                .iter()
                .find(|s| s.id == *id)
                .cloned()
                .unwrap_or_else(|| UserSummary::unknown(*id))
        })
        .collect())
}
