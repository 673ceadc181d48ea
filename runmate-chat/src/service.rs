use chrono::{DateTime, Utc};
use runmate_core::chat::{normalize_content, Chat, ChatType, LastMessage, Message, MessageType};
use runmate_core::pagination::{Page, TailWindow};
use runmate_core::push::{user_channel, PushChannel};
use runmate_core::store::{expand_users, ChatRepository, UserRepository};
use runmate_core::user::UserSummary;
use runmate_core::{Result, RunmateError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

/// Chat as returned to clients, with participant ids expanded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub id: Uuid,
    pub participants: Vec<UserSummary>,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<usize>,
}

impl ChatView {
    fn new(chat: Chat, participants: Vec<UserSummary>) -> Self {
        ChatView {
            id: chat.id,
            participants,
            chat_type: chat.chat_type,
            name: chat.name,
            description: chat.description,
            avatar: chat.avatar,
            admins: chat.admins,
            created_by: chat.created_by,
            last_message: chat.last_message,
            last_activity: chat.last_activity,
            is_active: chat.is_active,
            run_event_id: chat.run_event_id,
            created_at: chat.created_at,
            unread_count: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroupChat {
    #[serde(default)]
    pub participants: Vec<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub pagination: MessagePagination,
}

pub struct ChatService {
    chats: Arc<dyn ChatRepository>,
    users: Arc<dyn UserRepository>,
    push: Arc<dyn PushChannel>,
}

impl ChatService {
    pub fn new(chats: Arc<dyn ChatRepository>, users: Arc<dyn UserRepository>, push: Arc<dyn PushChannel>) -> Self {
        Self { chats, users, push }
    }

    /// Returns the direct chat between the two users, creating it on first use.
    pub async fn find_or_create_direct_chat(&self, user: Uuid, other: Uuid) -> Result<ChatView> {
        if user == other {
            return Err(RunmateError::validation("cannot start a direct chat with yourself"));
        }
        if self.users.get_user(other).await?.is_none() {
            return Err(RunmateError::not_found("user"));
        }

        let chat = match self.chats.find_direct_chat(user, other).await? {
            Some(existing) => existing,
            None => {
                let fresh = Chat::new_direct(user, other, Utc::now())?;
                let stored = self.chats.insert_chat(&fresh).await?;
                if stored.id == fresh.id {
                    tracing::info!("Created direct chat {} between {} and {}", stored.id, user, other);
                    self.announce_chat(&stored, user).await;
                }
                stored
            }
        };

        self.view(chat).await
    }

    pub async fn create_group_chat(&self, creator: Uuid, input: NewGroupChat) -> Result<ChatView> {
        let chat = Chat::new_group(creator, &input.participants, input.name, input.description, Utc::now());
        if chat.participants.len() < 2 {
            return Err(RunmateError::validation("a group chat needs at least one other participant"));
        }

        let chat = self.chats.insert_chat(&chat).await?;
        tracing::info!("Created group chat {} with {} participants", chat.id, chat.participants.len());
        self.announce_chat(&chat, creator).await;

        self.view(chat).await
    }

    /// Active chats of the user, most recent activity first, each with its
    /// unread count.
    pub async fn get_user_chats(&self, user: Uuid, page: Page) -> Result<Vec<ChatView>> {
        let chats = self.chats.list_user_chats(user, page).await?;

        let mut views = Vec::with_capacity(chats.len());
        for chat in chats {
            let unread = self.chats.unread_count(chat.id, user).await?;
            let mut view = self.view(chat).await?;
            view.unread_count = Some(unread);
            views.push(view);
        }
        Ok(views)
    }

    pub async fn get_chat(&self, user: Uuid, chat_id: Uuid) -> Result<ChatView> {
        let chat = self.load_for_participant(user, chat_id).await?;
        let unread = self.chats.unread_count(chat.id, user).await?;
        let mut view = self.view(chat).await?;
        view.unread_count = Some(unread);
        Ok(view)
    }

    pub async fn send_message(&self, user: Uuid, chat_id: Uuid, input: SendMessage) -> Result<Message> {
        let chat = self.load_for_participant(user, chat_id).await?;
        let content = normalize_content(&input.content)?;

        if let Some(reply_to) = input.reply_to {
            if self.chats.get_message(chat_id, reply_to).await?.is_none() {
                return Err(RunmateError::validation("replyTo does not reference a message in this chat"));
            }
        }

        let message = Message::new(chat_id, user, content, input.message_type, input.reply_to, Utc::now());
        self.chats.append_message(&message).await?;

        let payload = json!({ "chatId": chat_id, "message": message });
        self.notify_others(&chat, user, "new_message", payload).await;

        Ok(message)
    }

    /// Newest-first windows over the visible history, each returned in
    /// chronological order.
    pub async fn get_messages(&self, user: Uuid, chat_id: Uuid, page: Page) -> Result<MessagePage> {
        self.load_for_participant(user, chat_id).await?;

        let total = self.chats.count_visible_messages(chat_id).await?;
        let window = TailWindow::compute(total, page);
        let messages = if window.is_empty() {
            Vec::new()
        } else {
            self.chats.visible_messages(chat_id, window.start, window.len()).await?
        };

        Ok(MessagePage {
            messages,
            pagination: MessagePagination {
                page: page.page,
                limit: page.limit,
                total,
                has_more: window.has_more,
            },
        })
    }

    /// Marks the given messages, or everything when `message_ids` is `None`,
    /// as read by `user`. Returns how many were newly marked.
    pub async fn mark_as_read(&self, user: Uuid, chat_id: Uuid, message_ids: Option<Vec<Uuid>>) -> Result<usize> {
        let chat = self.load_for_participant(user, chat_id).await?;
        let marked = self
            .chats
            .mark_read(chat_id, user, message_ids.as_deref(), Utc::now())
            .await?;

        if marked > 0 {
            let payload = json!({ "chatId": chat_id, "userId": user, "count": marked });
            self.notify_others(&chat, user, "messages_read", payload).await;
        }
        Ok(marked)
    }

    pub async fn get_unread_count(&self, user: Uuid, chat_id: Uuid) -> Result<usize> {
        self.load_for_participant(user, chat_id).await?;
        Ok(self.chats.unread_count(chat_id, user).await?)
    }

    /// Unread messages across every active chat of the user.
    pub async fn get_total_unread(&self, user: Uuid) -> Result<usize> {
        const BATCH: u32 = 100;
        let mut total = 0;
        let mut page_no = 1;
        loop {
            let chats = self.chats.list_user_chats(user, Page::new(page_no, BATCH)).await?;
            for chat in &chats {
                total += self.chats.unread_count(chat.id, user).await?;
            }
            if chats.len() < BATCH as usize {
                return Ok(total);
            }
            page_no += 1;
        }
    }

    /// Soft-deletes a message. Only its sender may do this.
    pub async fn delete_message(&self, user: Uuid, chat_id: Uuid, message_id: Uuid) -> Result<()> {
        let chat = self.load_for_participant(user, chat_id).await?;
        let message = self
            .chats
            .get_message(chat_id, message_id)
            .await?
            .filter(|m| !m.is_deleted)
            .ok_or_else(|| RunmateError::not_found("message"))?;

        if message.sender != user {
            return Err(RunmateError::unauthorized("only the sender can delete a message"));
        }

        self.chats.soft_delete_message(chat_id, message_id, Utc::now()).await?;

        let payload = json!({ "chatId": chat_id, "messageId": message_id });
        self.notify_others(&chat, user, "message_deleted", payload).await;
        Ok(())
    }

    async fn load_for_participant(&self, user: Uuid, chat_id: Uuid) -> Result<Chat> {
        let chat = self
            .chats
            .get_chat(chat_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| RunmateError::not_found("chat"))?;
        if !chat.is_participant(user) {
            return Err(RunmateError::unauthorized("not a participant of this chat"));
        }
        Ok(chat)
    }

    async fn view(&self, chat: Chat) -> Result<ChatView> {
        let participants = expand_users(self.users.as_ref(), &chat.participants).await?;
        Ok(ChatView::new(chat, participants))
    }

    async fn announce_chat(&self, chat: &Chat, creator: Uuid) {
        let payload = json!({ "chatId": chat.id, "chatType": chat.chat_type, "createdBy": creator });
        self.notify_others(chat, creator, "chat_created", payload).await;
    }

    async fn notify_others(&self, chat: &Chat, actor: Uuid, event: &str, payload: Value) {
        for other in chat.others(actor) {
            self.push.emit(&user_channel(other), event, payload.clone()).await;
        }
    }
}
