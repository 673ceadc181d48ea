use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RunmateError;

pub const MAX_MESSAGE_LENGTH: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Direct => "direct",
            ChatType::Group => "group",
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = RunmateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ChatType::Direct),
            "group" => Ok(ChatType::Group),
            other => Err(RunmateError::validation(format!("unknown chat type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::System => "system",
        }
    }
}

impl FromStr for MessageType {
    type Err = RunmateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            "system" => Ok(MessageType::System),
            other => Err(RunmateError::validation(format!("unknown message type: {}", other))),
        }
    }
}

/// Summary of the newest message, cached on the chat row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub message_id: Uuid,
    pub content: String,
    pub sender: Uuid,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
    pub chat_type: ChatType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub admins: Vec<Uuid>,
    pub created_by: Uuid,
    pub last_message: Option<LastMessage>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub run_event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new_direct(initiator: Uuid, other: Uuid, now: DateTime<Utc>) -> Result<Self, RunmateError> {
        if initiator == other {
            return Err(RunmateError::validation("cannot start a direct chat with yourself"));
        }
        Ok(Chat {
            id: Uuid::new_v4(),
            participants: vec![initiator, other],
            chat_type: ChatType::Direct,
            name: None,
            description: None,
            avatar: None,
            admins: Vec::new(),
            created_by: initiator,
            last_message: None,
            last_activity: now,
            is_active: true,
            run_event_id: None,
            created_at: now,
        })
    }

    /// The creator is always a participant and the only initial admin,
    /// whatever the supplied id list contains.
    pub fn new_group(
        creator: Uuid,
        participant_ids: &[Uuid],
        name: Option<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut participants = vec![creator];
        for id in participant_ids {
            if !participants.contains(id) {
                participants.push(*id);
            }
        }

        Chat {
            id: Uuid::new_v4(),
            participants,
            chat_type: ChatType::Group,
            name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            description,
            avatar: None,
            admins: vec![creator],
            created_by: creator,
            last_message: None,
            last_activity: now,
            is_active: true,
            run_event_id: None,
            created_at: now,
        }
    }

    /// Group chat that belongs to a run event; host and first approved runner.
    pub fn for_run_event(
        run_event_id: Uuid,
        host: Uuid,
        applicant: Uuid,
        title: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let mut chat = Chat::new_group(host, &[applicant], Some(title.to_string()), None, now);
        chat.run_event_id = Some(run_event_id);
        chat
    }

    pub fn is_participant(&self, user: Uuid) -> bool {
        self.participants.contains(&user)
    }

    pub fn is_admin(&self, user: Uuid) -> bool {
        self.admins.contains(&user)
    }

    pub fn add_participant(&mut self, user: Uuid, now: DateTime<Utc>) -> bool {
        if self.is_participant(user) {
            return false;
        }
        self.participants.push(user);
        self.last_activity = now;
        true
    }

    pub fn remove_participant(&mut self, user: Uuid, now: DateTime<Utc>) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| *p != user);
        self.admins.retain(|a| *a != user);
        if self.participants.len() == before {
            return false;
        }
        self.last_activity = now;
        true
    }

    pub fn others(&self, user: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.participants.iter().copied().filter(move |p| *p != user)
    }

    pub fn record_message(&mut self, message: &Message) {
        self.last_message = Some(LastMessage {
            message_id: message.id,
            content: message.content.clone(),
            sender: message.sender,
            message_type: message.message_type,
            timestamp: message.created_at,
        });
        self.last_activity = message.created_at;
    }
}

/// Key identifying a direct chat regardless of who started it.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (first, second) = if a < b { (a, b) } else { (b, a) };
    format!("{}:{}", first, second)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub read_by: Vec<ReadReceipt>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub reply_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The sender has implicitly read what they wrote.
    pub fn new(
        chat_id: Uuid,
        sender: Uuid,
        content: String,
        message_type: MessageType,
        reply_to: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Message {
            id: Uuid::new_v4(),
            chat_id,
            sender,
            content,
            message_type,
            read_by: vec![ReadReceipt { user: sender, read_at: now }],
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            reply_to,
            created_at: now,
        }
    }

    pub fn is_read_by(&self, user: Uuid) -> bool {
        self.read_by.iter().any(|r| r.user == user)
    }

    /// Returns false when the user had already read the message.
    pub fn mark_read(&mut self, user: Uuid, now: DateTime<Utc>) -> bool {
        if self.is_read_by(user) {
            return false;
        }
        self.read_by.push(ReadReceipt { user, read_at: now });
        true
    }

    pub fn is_unread_for(&self, user: Uuid) -> bool {
        !self.is_deleted && self.sender != user && !self.is_read_by(user)
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(now);
    }
}

/// Trims and length-checks message content.
pub fn normalize_content(raw: &str) -> Result<String, RunmateError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(RunmateError::validation("message content cannot be empty"));
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(RunmateError::validation(format!(
            "message content cannot exceed {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_chat_dedupes_creator() {
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();
        let chat = Chat::new_group(creator, &[other, creator, other], Some(" Lunch run ".into()), None, Utc::now());

        assert_eq!(chat.participants, vec![creator, other]);
        assert_eq!(chat.admins, vec![creator]);
        assert_eq!(chat.name.as_deref(), Some("Lunch run"));
    }

    #[test]
    fn direct_key_ignores_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(direct_key(a, b), direct_key(b, a));
    }

    #[test]
    fn direct_chat_needs_two_people() {
        let a = Uuid::new_v4();
        assert!(Chat::new_direct(a, a, Utc::now()).is_err());
    }

    #[test]
    fn message_starts_read_by_sender() {
        let sender = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let mut msg = Message::new(Uuid::new_v4(), sender, "hej".into(), MessageType::Text, None, Utc::now());

        assert!(msg.is_read_by(sender));
        assert!(!msg.is_unread_for(sender));
        assert!(msg.is_unread_for(reader));
        assert!(msg.mark_read(reader, Utc::now()));
        assert!(!msg.mark_read(reader, Utc::now()));
        assert_eq!(msg.read_by.len(), 2);
    }

    #[test]
    fn deleted_messages_are_never_unread() {
        let mut msg = Message::new(Uuid::new_v4(), Uuid::new_v4(), "x".into(), MessageType::Text, None, Utc::now());
        msg.soft_delete(Utc::now());
        assert!(!msg.is_unread_for(Uuid::new_v4()));
    }

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(normalize_content("  hi  ").unwrap(), "hi");
        assert!(normalize_content("   ").is_err());
        assert!(normalize_content(&"a".repeat(MAX_MESSAGE_LENGTH)).is_ok());
        assert!(normalize_content(&"a".repeat(MAX_MESSAGE_LENGTH + 1)).is_err());
    }

    #[test]
    fn removing_participant_drops_admin_role() {
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut chat = Chat::new_group(creator, &[other], None, None, Utc::now());
        assert!(chat.remove_participant(creator, Utc::now()));
        assert!(!chat.is_admin(creator));
        assert!(!chat.remove_participant(creator, Utc::now()));
    }
}
