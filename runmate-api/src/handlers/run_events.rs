use axum::extract::Extension;
use runmate_core::pagination::{Page, PageQuery};
use runmate_core::run_event::{NewRunEvent, RunEventPatch};
use runmate_runs::{RequestDecision, RunEventQuery};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::response::{created, ok, ApiJson, ApiPath, ApiQuery, ApiResult};
use crate::state::ApiState;

pub async fn create(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<NewRunEvent>,
) -> ApiResult {
    created(state.runs.create(user.id, body).await?)
}

pub async fn list(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiQuery(filter): ApiQuery<RunEventQuery>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult {
    let page = Page::resolve(query, &state.paging);
    ok(state.runs.list(user.id, filter, page).await?)
}

pub async fn get(
    Extension(state): Extension<ApiState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    ok(state.runs.get(id).await?)
}

pub async fn update(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<RunEventPatch>,
) -> ApiResult {
    ok(state.runs.update(user.id, id, body).await?)
}

/// `DELETE /runevents/:id` cancels; run events are never hard deleted.
pub async fn cancel(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    ok(state.runs.cancel(user.id, id).await?)
}

pub async fn join(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    ok(state.runs.request_join(user.id, id).await?)
}

pub async fn decide(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<RequestDecision>,
) -> ApiResult {
    ok(state.runs.decide_request(user.id, id, body).await?)
}

pub async fn leave(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    ok(state.runs.leave(user.id, id).await?)
}
