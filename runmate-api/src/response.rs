use axum::{
    extract::{rejection::{JsonRejection, PathRejection, QueryRejection}, FromRequest, FromRequestParts},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use runmate_core::RunmateError;
use serde::Serialize;
use serde_json::json;
use tracing;

/// JSON body whose rejection is reported in the response envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

pub type ApiResult = Result<Response, ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult {
    Ok(Json(json!({ "success": true, "data": data })).into_response())
}

pub fn created<T: Serialize>(data: T) -> ApiResult {
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": data }))).into_response())
}

pub fn message(text: &str) -> ApiResult {
    Ok(Json(json!({ "success": true, "message": text })).into_response())
}

pub fn failure(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "success": false, "message": text }))).into_response()
}

#[derive(Debug)]
pub struct ApiError(pub RunmateError);

impl From<RunmateError> for ApiError {
    fn from(err: RunmateError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(RunmateError::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(RunmateError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(RunmateError::validation(rejection.body_text()))
    }
}

pub fn status_for(err: &RunmateError) -> StatusCode {
    match err {
        RunmateError::Validation(_) => StatusCode::BAD_REQUEST,
        RunmateError::Unauthorized(_) => StatusCode::FORBIDDEN,
        RunmateError::NotFound(_) => StatusCode::NOT_FOUND,
        RunmateError::Conflict(_) => StatusCode::CONFLICT,
        RunmateError::Store(_) | RunmateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if self.0.is_client_error() {
            tracing::debug!("Request rejected ({}): {}", status, self.0);
            failure(status, &self.0.to_string())
        } else {
            tracing::error!("Request failed: {}", self.0);
            failure(status, "Internal server error")
        }
    }
}
