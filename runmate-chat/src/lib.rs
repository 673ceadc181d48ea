//! Direct and group chats: membership checks, message history, read
//! receipts and push notifications to the other participants.

pub mod service;

pub use service::{ChatService, ChatView, MessagePage, NewGroupChat, SendMessage};
