use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use crate::chat::{direct_key, Chat, ChatType, LastMessage, Message, ReadReceipt};
use crate::error::StoreError;
use crate::outbox::NewOutboxEvent;
use crate::rating::{Rating, RatingCategories, SupportReport};
use crate::run_event::{Location, RunEvent};
use crate::schema::{chat_message_reads, chat_messages, chats, outbox_events, ratings, run_events, users};
use crate::user::{User, UserSummary};

fn corrupt(table: &str, id: Uuid, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{} {}: {}", table, id, detail))
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = chats)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ChatRow {
    pub id: Uuid,
    pub chat_type: String,
    pub direct_key: Option<String>,
    pub participants: Vec<Uuid>,
    pub admins: Vec<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub created_by: Uuid,
    pub last_message: Option<serde_json::Value>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub run_event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ChatRow {
    pub fn from_chat(chat: &Chat) -> Result<Self, StoreError> {
        let direct_key = match chat.chat_type {
            ChatType::Direct => Some(direct_key(chat.participants[0], chat.participants[1])),
            ChatType::Group => None,
        };
        let last_message = chat
            .last_message
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| corrupt("chats", chat.id, e))?;

        Ok(ChatRow {
            id: chat.id,
            chat_type: chat.chat_type.as_str().to_string(),
            direct_key,
            participants: chat.participants.clone(),
            admins: chat.admins.clone(),
            name: chat.name.clone(),
            description: chat.description.clone(),
            avatar: chat.avatar.clone(),
            created_by: chat.created_by,
            last_message,
            last_activity: chat.last_activity,
            is_active: chat.is_active,
            run_event_id: chat.run_event_id,
            created_at: chat.created_at,
        })
    }

    pub fn into_chat(self) -> Result<Chat, StoreError> {
        let chat_type = self.chat_type.parse().map_err(|e| corrupt("chats", self.id, e))?;
        let last_message = self
            .last_message
            .map(serde_json::from_value::<LastMessage>)
            .transpose()
            .map_err(|e| corrupt("chats", self.id, e))?;

        Ok(Chat {
            id: self.id,
            participants: self.participants,
            chat_type,
            name: self.name,
            description: self.description,
            avatar: self.avatar,
            admins: self.admins,
            created_by: self.created_by,
            last_message,
            last_activity: self.last_activity,
            is_active: self.is_active,
            run_event_id: self.run_event_id,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = chat_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct MessageRow {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: Uuid,
    pub content: String,
    pub message_type: String,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub reply_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chat_messages)]
pub(crate) struct NewMessageRow {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: Uuid,
    pub content: String,
    pub message_type: String,
    pub reply_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for NewMessageRow {
    fn from(m: &Message) -> Self {
        NewMessageRow {
            id: m.id,
            chat_id: m.chat_id,
            sender: m.sender,
            content: m.content.clone(),
            message_type: m.message_type.as_str().to_string(),
            reply_to: m.reply_to,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = chat_message_reads)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ReadRow {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// Joins message rows with their read receipts, preserving row order.
pub(crate) fn assemble_messages(rows: Vec<MessageRow>, reads: Vec<ReadRow>) -> Result<Vec<Message>, StoreError> {
    let mut by_message: HashMap<Uuid, Vec<ReadReceipt>> = HashMap::new();
    for read in reads {
        by_message.entry(read.message_id).or_default().push(ReadReceipt {
            user: read.user_id,
            read_at: read.read_at,
        });
    }

    rows.into_iter()
        .map(|row| {
            let message_type = row.message_type.parse().map_err(|e| corrupt("chat_messages", row.id, e))?;
            let mut read_by = by_message.remove(&row.id).unwrap_or_default();
            read_by.sort_by(|a, b| a.read_at.cmp(&b.read_at));
            Ok(Message {
                id: row.id,
                chat_id: row.chat_id,
                sender: row.sender,
                content: row.content,
                message_type,
                read_by,
                is_edited: row.is_edited,
                edited_at: row.edited_at,
                is_deleted: row.is_deleted,
                deleted_at: row.deleted_at,
                reply_to: row.reply_to,
                created_at: row.created_at,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = run_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub(crate) struct RunEventRow {
    pub id: Uuid,
    pub host: Uuid,
    pub title: String,
    pub description: String,
    pub location_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_km: f64,
    pub pace_seconds_per_km: i32,
    pub event_date: DateTime<Utc>,
    pub max_participants: i32,
    pub participants: Vec<Uuid>,
    pub pending_requests: Vec<Uuid>,
    pub status: String,
    pub chat_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&RunEvent> for RunEventRow {
    fn from(e: &RunEvent) -> Self {
        RunEventRow {
            id: e.id,
            host: e.host,
            title: e.title.clone(),
            description: e.description.clone(),
            location_name: e.location.name.clone(),
            latitude: e.location.latitude,
            longitude: e.location.longitude,
            distance_km: e.distance,
            pace_seconds_per_km: e.pace as i32,
            event_date: e.date,
            max_participants: e.max_participants as i32,
            participants: e.participants.clone(),
            pending_requests: e.pending_requests.clone(),
            status: e.status.as_str().to_string(),
            chat_id: e.chat_id,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

impl RunEventRow {
    pub fn into_event(self) -> Result<RunEvent, StoreError> {
        let status = self.status.parse().map_err(|e| corrupt("run_events", self.id, e))?;
        let pace = u32::try_from(self.pace_seconds_per_km).map_err(|e| corrupt("run_events", self.id, e))?;
        let max_participants = u32::try_from(self.max_participants).map_err(|e| corrupt("run_events", self.id, e))?;

        Ok(RunEvent {
            id: self.id,
            host: self.host,
            title: self.title,
            description: self.description,
            location: Location {
                name: self.location_name,
                latitude: self.latitude,
                longitude: self.longitude,
            },
            distance: self.distance_km,
            pace,
            date: self.event_date,
            max_participants,
            participants: self.participants,
            pending_requests: self.pending_requests,
            status,
            chat_id: self.chat_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ratings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RatingRow {
    pub id: Uuid,
    pub rater: Uuid,
    pub ratee: Uuid,
    pub related_event: Uuid,
    pub categories: serde_json::Value,
    pub comment: Option<String>,
    pub overall_rating: i16,
    pub is_approved: bool,
    pub has_report: bool,
    pub report_reason: Option<String>,
    pub report_details: Option<String>,
    pub report_handled: bool,
    pub created_at: DateTime<Utc>,
}

impl RatingRow {
    pub fn from_rating(r: &Rating) -> Result<Self, StoreError> {
        Ok(RatingRow {
            id: r.id,
            rater: r.rater,
            ratee: r.ratee,
            related_event: r.related_event,
            categories: serde_json::to_value(r.categories).map_err(|e| corrupt("ratings", r.id, e))?,
            comment: r.comment.clone(),
            overall_rating: r.overall_rating as i16,
            is_approved: r.is_approved,
            has_report: r.report_to_support.has_report,
            report_reason: r.report_to_support.reason.map(|reason| reason.as_str().to_string()),
            report_details: r.report_to_support.details.clone(),
            report_handled: r.report_to_support.is_handled,
            created_at: r.created_at,
        })
    }

    pub fn into_rating(self) -> Result<Rating, StoreError> {
        let categories: RatingCategories =
            serde_json::from_value(self.categories).map_err(|e| corrupt("ratings", self.id, e))?;
        let reason = self
            .report_reason
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e| corrupt("ratings", self.id, e))?;
        let overall_rating = u8::try_from(self.overall_rating).map_err(|e| corrupt("ratings", self.id, e))?;

        Ok(Rating {
            id: self.id,
            rater: self.rater,
            ratee: self.ratee,
            related_event: self.related_event,
            categories,
            comment: self.comment,
            overall_rating,
            is_approved: self.is_approved,
            report_to_support: SupportReport {
                has_report: self.has_report,
                reason,
                details: self.report_details,
                is_handled: self.report_handled,
            },
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub rating_stats: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn from_user(u: &User) -> Result<Self, StoreError> {
        let rating_stats = u
            .rating_stats
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| corrupt("users", u.id, e))?;
        Ok(UserRow {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            profile_picture: u.profile_picture.clone(),
            rating_stats,
            created_at: u.created_at,
        })
    }

    pub fn into_user(self) -> Result<User, StoreError> {
        let rating_stats = self
            .rating_stats
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| corrupt("users", self.id, e))?;
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            profile_picture: self.profile_picture,
            rating_stats,
            created_at: self.created_at,
        })
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            profile_picture: self.profile_picture.clone(),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = outbox_events)]
pub(crate) struct NewOutboxRow {
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub aggregate_id: Option<String>,
}

impl From<&NewOutboxEvent> for NewOutboxRow {
    fn from(e: &NewOutboxEvent) -> Self {
        NewOutboxRow {
            event_type: e.event_type.clone(),
            event_data: e.event_data.clone(),
            aggregate_id: e.aggregate_id.clone(),
        }
    }
}
