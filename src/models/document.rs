//! Titled attachment records (resumes, cover letters) pointing into blob storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    /// Owning collection, e.g. `resumes` or `coverLetters`
    pub collection: String,
    pub title: String,
    /// Blob storage path
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}
