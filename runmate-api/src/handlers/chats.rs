use axum::body::Bytes;
use axum::extract::Extension;
use runmate_chat::{NewGroupChat, SendMessage};
use runmate_core::pagination::{Page, PageQuery};
use runmate_core::RunmateError;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::response::{created, message, ok, ApiJson, ApiPath, ApiQuery, ApiResult};
use crate::state::ApiState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectChatRequest {
    pub participant_id: Uuid,
}

/// Body of `POST /chats`: a direct chat with one user or a named group.
#[derive(Deserialize)]
#[serde(tag = "chatType", rename_all = "lowercase")]
pub enum CreateChatRequest {
    Direct(DirectChatRequest),
    Group(NewGroupChat),
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub message_ids: Option<Vec<Uuid>>,
}

pub async fn list(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult {
    let page = Page::resolve(query, &state.paging);
    ok(state.chats.get_user_chats(user.id, page).await?)
}

pub async fn create(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<CreateChatRequest>,
) -> ApiResult {
    match body {
        CreateChatRequest::Direct(req) => {
            ok(state.chats.find_or_create_direct_chat(user.id, req.participant_id).await?)
        }
        CreateChatRequest::Group(req) => created(state.chats.create_group_chat(user.id, req).await?),
    }
}

pub async fn direct(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<DirectChatRequest>,
) -> ApiResult {
    ok(state.chats.find_or_create_direct_chat(user.id, body.participant_id).await?)
}

pub async fn group(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<NewGroupChat>,
) -> ApiResult {
    created(state.chats.create_group_chat(user.id, body).await?)
}

pub async fn total_unread(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult {
    let count = state.chats.get_total_unread(user.id).await?;
    ok(json!({ "unreadCount": count }))
}

pub async fn get(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(chat_id): ApiPath<Uuid>,
) -> ApiResult {
    ok(state.chats.get_chat(user.id, chat_id).await?)
}

pub async fn unread(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(chat_id): ApiPath<Uuid>,
) -> ApiResult {
    let count = state.chats.get_unread_count(user.id, chat_id).await?;
    ok(json!({ "unreadCount": count }))
}

pub async fn messages(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(chat_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult {
    let page = Page::resolve(query, &state.paging);
    ok(state.chats.get_messages(user.id, chat_id, page).await?)
}

pub async fn send(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(chat_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<SendMessage>,
) -> ApiResult {
    created(state.chats.send_message(user.id, chat_id, body).await?)
}

/// An empty body marks everything; a body that is present must be valid.
pub async fn mark_read(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(chat_id): ApiPath<Uuid>,
    body: Bytes,
) -> ApiResult {
    let ids = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<MarkReadRequest>(&body)
            .map_err(|e| RunmateError::validation(format!("invalid request body: {}", e)))?
            .message_ids
    };
    let marked = state.chats.mark_as_read(user.id, chat_id, ids).await?;
    ok(json!({ "markedCount": marked }))
}

pub async fn delete_message(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath((chat_id, message_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult {
    state.chats.delete_message(user.id, chat_id, message_id).await?;
    message("Message deleted")
}
