//! Job application endpoints, including the live snapshot stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Serialize;

use super::stream::subscription_events;
use super::{error, owned, success, ApiResult};
use crate::auth::{AuthContext, Principal};
use crate::errors::AppErrorWithRevision;
use crate::models::{
    Application, ApplicationField, CreateApplicationRequest, Interview, Patch, Snapshot,
};
use crate::sync::{RecordStore, SubscriptionManager};
use crate::view::{classify, Bucket, Weight};
use crate::AppState;

/// An application together with its display classification.
#[derive(Debug, Clone, Serialize)]
pub struct JobRow {
    #[serde(flatten)]
    pub application: Application,
    pub bucket: Bucket,
    pub weight: Weight,
}

impl From<Application> for JobRow {
    fn from(application: Application) -> Self {
        let classification = classify(&application);
        Self {
            application,
            bucket: classification.bucket,
            weight: classification.weight,
        }
    }
}

/// Payload of a `snapshot` stream event.
#[derive(Debug, Serialize)]
pub struct JobSnapshot {
    pub revision: i64,
    pub records: Vec<JobRow>,
}

/// GET /api/jobs - The caller's applications, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Principal(user_id): Principal,
) -> ApiResult<Vec<JobRow>> {
    match state
        .repo
        .query::<Application>(&Application::query_for(&user_id))
        .await
    {
        Ok(snapshot) => success(
            snapshot.records.into_iter().map(JobRow::from).collect(),
            snapshot.revision,
        ),
        Err(e) => error(e, state.repo.get_revision_id().await.unwrap_or(0)),
    }
}

/// POST /api/jobs - Create an application.
pub async fn create_job(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Json(request): Json<CreateApplicationRequest>,
) -> ApiResult<JobRow> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = request.validate() {
        return error(e, revision_id);
    }

    match state.repo.create_application(&user_id, &request).await {
        Ok(application) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(application.into(), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/jobs/:id - Get one application.
pub async fn get_job(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Path(id): Path<String>,
) -> ApiResult<JobRow> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match owned::<Application>(&state, &user_id, &id).await {
        Ok(application) => success(application.into(), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PATCH /api/jobs/:id - Write only the fields present in the body.
pub async fn update_job(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> ApiResult<JobRow> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let patch = match Patch::<ApplicationField>::from_json(&body) {
        Ok(patch) => patch,
        Err(e) => return error(e, revision_id),
    };
    if let Err(e) = owned::<Application>(&state, &user_id, &id).await {
        return error(e, revision_id);
    }

    match state.repo.update_fields::<Application>(&id, &patch).await {
        Ok(application) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(application.into(), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/jobs/:id/interviews - Interviews of one application, earliest first.
pub async fn list_job_interviews(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Path(id): Path<String>,
) -> ApiResult<Vec<Interview>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = owned::<Application>(&state, &user_id, &id).await {
        return error(e, revision_id);
    }

    match state
        .repo
        .query::<Interview>(&Interview::query_for(&user_id, &id))
        .await
    {
        Ok(snapshot) => success(snapshot.records, snapshot.revision),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/jobs/stream - Server-sent `snapshot` events for the caller's
/// applications, ending with an `error` event if the live query fails.
pub async fn stream_jobs(
    State(state): State<AppState>,
    Principal(user_id): Principal,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppErrorWithRevision> {
    let manager = SubscriptionManager::new(
        Arc::clone(&state.repo),
        AuthContext::signed_in(user_id.clone()),
    );
    let store = Arc::new(RecordStore::<Application>::new());

    let subscription = manager
        .subscribe(Application::query_for(&user_id), &store)
        .map_err(|error| AppErrorWithRevision {
            error,
            revision_id: 0,
        })?;

    let events = subscription_events(manager, subscription, |snapshot| JobSnapshot {
        revision: snapshot.revision,
        records: snapshot.records.iter().cloned().map(JobRow::from).collect(),
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// GET /api/jobs/:id/interviews/stream - Server-sent `snapshot` events for
/// the interviews of one of the caller's applications.
pub async fn stream_job_interviews(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppErrorWithRevision> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let reject = |error| AppErrorWithRevision { error, revision_id };

    owned::<Application>(&state, &user_id, &id)
        .await
        .map_err(reject)?;

    let manager = SubscriptionManager::new(
        Arc::clone(&state.repo),
        AuthContext::signed_in(user_id.clone()),
    );
    let store = Arc::new(RecordStore::<Interview>::new());
    let subscription = manager
        .subscribe(Interview::query_for(&user_id, &id), &store)
        .map_err(reject)?;

    let events = subscription_events(manager, subscription, |snapshot: &Snapshot<Interview>| {
        snapshot.clone()
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
