//! Interview endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, owned, success, ApiResult};
use crate::auth::Principal;
use crate::models::{CreateInterviewRequest, Interview, InterviewField, Patch};
use crate::AppState;

/// POST /api/interviews - Schedule an interview; the parent moves to `Interview`.
pub async fn create_interview(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Json(request): Json<CreateInterviewRequest>,
) -> ApiResult<Interview> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = request.validate() {
        return error(e, revision_id);
    }

    match state.repo.create_interview(&user_id, &request).await {
        Ok(interview) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(interview, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PATCH /api/interviews/:id - Write only the fields present in the body.
pub async fn update_interview(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> ApiResult<Interview> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let patch = match Patch::<InterviewField>::from_json(&body) {
        Ok(patch) => patch,
        Err(e) => return error(e, revision_id),
    };

    if let Err(e) = owned::<Interview>(&state, &user_id, &id).await {
        return error(e, revision_id);
    }

    match state.repo.update_fields::<Interview>(&id, &patch).await {
        Ok(interview) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(interview, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
