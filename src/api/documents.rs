//! Document endpoints: upload, list and download-URL resolution per collection.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};

use super::stream::feed_events;
use super::{error, success, ApiResult};
use crate::db::Repository;
use crate::documents::{DocumentResolver, LocalBlobStorage};
use crate::errors::{AppError, AppErrorWithRevision};
use crate::models::DocumentRecord;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    pub title: String,
    pub file_name: String,
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadUrl {
    pub url: String,
}

fn resolver(
    state: &AppState,
    collection: &str,
) -> Result<DocumentResolver<Repository, LocalBlobStorage>, AppError> {
    DocumentResolver::new(state.repo.clone(), state.blobs.clone(), collection)
}

/// GET /api/documents/:collection - Documents in insertion order.
pub async fn list_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> ApiResult<Vec<DocumentRecord>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = match resolver(&state, &collection) {
        Ok(resolver) => resolver.list().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(documents) => success(documents, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/documents/:collection?title=&fileName=&folder= - Upload the
/// request body and register it. Folder defaults to `<collection>Files/`.
pub async fn upload_document(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<DocumentRecord> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let resolver = match resolver(&state, &collection) {
        Ok(resolver) => resolver,
        Err(e) => return error(e, revision_id),
    };
    let folder = params
        .folder
        .unwrap_or_else(|| format!("{}Files/", collection));

    match resolver
        .upload(body.to_vec(), &params.file_name, &params.title, &folder)
        .await
    {
        Ok(document) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(document, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/documents/:collection/:id/url - Download URL for a document's blob.
pub async fn document_url(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<DownloadUrl> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = match resolver(&state, &collection) {
        Ok(resolver) => resolver.resolve_download_url(&id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(url) => success(DownloadUrl { url }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/documents/:collection/stream - Server-sent `snapshot` events with
/// the collection's documents, sent again after every change.
pub async fn stream_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppErrorWithRevision> {
    let feed = resolver(&state, &collection)
        .map_err(|error| AppErrorWithRevision {
            error,
            revision_id: 0,
        })?
        .watch();

    Ok(Sse::new(feed_events(feed)).keep_alive(KeepAlive::default()))
}
