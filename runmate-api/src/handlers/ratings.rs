use axum::extract::Extension;
use runmate_core::pagination::{Page, PageQuery};
use runmate_core::rating::{NewRating, NewSupportReport};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::response::{created, ok, ApiJson, ApiPath, ApiQuery, ApiResult};
use crate::state::ApiState;

pub async fn create(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<NewRating>,
) -> ApiResult {
    created(state.ratings.create(user.id, body).await?)
}

pub async fn report(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<NewSupportReport>,
) -> ApiResult {
    let report = state.ratings.report(user.id, body).await?;
    created(serde_json::json!({ "id": report.id }))
}

pub async fn for_user(
    Extension(state): Extension<ApiState>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult {
    let page = Page::resolve(query, &state.paging);
    ok(state.ratings.user_ratings(user_id, page).await?)
}

pub async fn stats(
    Extension(state): Extension<ApiState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> ApiResult {
    ok(state.ratings.user_stats(user_id).await?)
}

pub async fn pending(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult {
    ok(state.ratings.pending(user.id).await?)
}
