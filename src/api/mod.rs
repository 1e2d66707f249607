//! REST API module.
//!
//! Thin HTTP surface over the repository, the subscription manager and the
//! document resolver.

mod documents;
mod interviews;
mod jobs;
mod stream;

pub use documents::*;
pub use interviews::*;
pub use jobs::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::StoredRecord;
use crate::errors::AppError;
use crate::models::Record;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: crate::errors::AppError, revision_id: i64) -> ApiResult<T> {
    Err(crate::errors::AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Load a record owned by `user_id`. Other users' records read as NotFound.
pub(crate) async fn owned<R: StoredRecord>(
    state: &AppState,
    user_id: &str,
    id: &str,
) -> Result<R, AppError> {
    state
        .repo
        .get::<R>(id)
        .await?
        .filter(|record| record.owner_id() == user_id)
        .ok_or_else(|| AppError::NotFound(format!("{} record {} not found", R::COLLECTION, id)))
}
