//! Document reference resolver.
//!
//! A document is a titled record in a named collection that points at a
//! blob. Uploading writes the blob first and registers the record second;
//! resolving goes from a record id to a download URL for its blob.

mod blob;

pub use blob::*;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;

use crate::db::{DocumentFeed, Repository};
use crate::errors::AppError;
use crate::models::{Application, DocumentRecord, Interview, Record};

/// Record collections a document collection may not shadow.
const RESERVED_COLLECTIONS: [&str; 2] = [Application::COLLECTION, Interview::COLLECTION];

/// Blob storage collaborator.
pub trait BlobStorage: Send + Sync + 'static {
    fn put(&self, path: &str, bytes: Vec<u8>) -> impl Future<Output = Result<(), AppError>> + Send;

    fn download_url(&self, path: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Where document records live.
pub trait DocumentIndex: Send + Sync + 'static {
    fn register(
        &self,
        collection: &str,
        title: &str,
        file_path: &str,
    ) -> impl Future<Output = Result<DocumentRecord, AppError>> + Send;

    fn lookup(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<DocumentRecord>, AppError>> + Send;

    fn list(&self, collection: &str) -> impl Future<Output = Result<Vec<DocumentRecord>, AppError>> + Send;

    /// Live list of a collection: the current documents, then a new list
    /// after every change.
    fn watch(&self, collection: &str) -> DocumentFeed;
}

impl DocumentIndex for Repository {
    async fn register(
        &self,
        collection: &str,
        title: &str,
        file_path: &str,
    ) -> Result<DocumentRecord, AppError> {
        self.create_document(collection, title, file_path).await
    }

    async fn lookup(&self, collection: &str, id: &str) -> Result<Option<DocumentRecord>, AppError> {
        self.get_document(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<DocumentRecord>, AppError> {
        self.list_documents(collection).await
    }

    fn watch(&self, collection: &str) -> DocumentFeed {
        self.watch_documents(collection)
    }
}

/// Check a document collection name: ASCII alphanumerics, `_` and `-`, and
/// not the name of a record collection.
pub fn validate_collection(collection: &str) -> Result<(), AppError> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(AppError::Validation(format!(
            "Invalid document collection: {}",
            collection
        )));
    }
    if RESERVED_COLLECTIONS.contains(&collection) {
        return Err(AppError::Validation(format!(
            "{} is a record collection, not a document collection",
            collection
        )));
    }
    Ok(())
}

/// Upload and resolution for one document collection.
pub struct DocumentResolver<I, B> {
    index: Arc<I>,
    blobs: Arc<B>,
    collection: String,
}

impl<I: DocumentIndex, B: BlobStorage> DocumentResolver<I, B> {
    pub fn new(index: Arc<I>, blobs: Arc<B>, collection: &str) -> Result<Self, AppError> {
        validate_collection(collection)?;
        Ok(Self {
            index,
            blobs,
            collection: collection.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Store `bytes` under `folder` and register a document titled `title`.
    ///
    /// A blob that was written but could not be registered is left in place
    /// and logged.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        title: &str,
        folder: &str,
    ) -> Result<DocumentRecord, AppError> {
        if title.trim().is_empty() {
            return Err(AppError::Validation("Document title is required".to_string()));
        }
        let base_name = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();
        if base_name.is_empty() {
            return Err(AppError::Validation("File name is required".to_string()));
        }

        let path = blob_path(folder, base_name, Utc::now().timestamp_millis());

        self.blobs.put(&path, bytes).await.map_err(|e| match e {
            AppError::Upload(_) | AppError::Validation(_) => e,
            other => AppError::Upload(other.message()),
        })?;

        match self.index.register(&self.collection, title.trim(), &path).await {
            Ok(document) => {
                tracing::info!(
                    "Uploaded document {} to {} ({})",
                    document.id,
                    self.collection,
                    path
                );
                Ok(document)
            }
            Err(e) => {
                tracing::error!(
                    "Orphaned blob {}: document record in {} not created: {}",
                    path,
                    self.collection,
                    e
                );
                Err(e.into_persistence())
            }
        }
    }

    pub async fn resolve_download_url(&self, id: &str) -> Result<String, AppError> {
        let document = self
            .index
            .lookup(&self.collection, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Document {} not found", id)))?;

        self.blobs.download_url(&document.file_path).await
    }

    pub async fn list(&self) -> Result<Vec<DocumentRecord>, AppError> {
        self.index.list(&self.collection).await
    }

    pub fn watch(&self) -> DocumentFeed {
        self.index.watch(&self.collection)
    }
}

fn blob_path(folder: &str, base_name: &str, stamp: i64) -> String {
    let folder = folder.trim_start_matches('/');
    if folder.is_empty() || folder.ends_with('/') {
        format!("{}{}-{}", folder, base_name, stamp)
    } else {
        format!("{}/{}-{}", folder, base_name, stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Snapshot;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MemoryIndex {
        documents: Mutex<Vec<DocumentRecord>>,
        fail: bool,
    }

    impl DocumentIndex for MemoryIndex {
        async fn register(
            &self,
            collection: &str,
            title: &str,
            file_path: &str,
        ) -> Result<DocumentRecord, AppError> {
            if self.fail {
                return Err(AppError::Database("database is locked".to_string()));
            }
            let document = DocumentRecord {
                id: format!("doc-{}", self.documents.lock().len() + 1),
                collection: collection.to_string(),
                title: title.to_string(),
                file_path: file_path.to_string(),
                created_at: Utc::now(),
            };
            self.documents.lock().push(document.clone());
            Ok(document)
        }

        async fn lookup(&self, collection: &str, id: &str) -> Result<Option<DocumentRecord>, AppError> {
            Ok(self
                .documents
                .lock()
                .iter()
                .find(|d| d.collection == collection && d.id == id)
                .cloned())
        }

        async fn list(&self, collection: &str) -> Result<Vec<DocumentRecord>, AppError> {
            Ok(self
                .documents
                .lock()
                .iter()
                .filter(|d| d.collection == collection)
                .cloned()
                .collect())
        }

        fn watch(&self, collection: &str) -> DocumentFeed {
            let records = self
                .documents
                .lock()
                .iter()
                .filter(|d| d.collection == collection)
                .cloned()
                .collect();
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.try_send(Ok(Snapshot {
                revision: 0,
                records,
            }));
            rx
        }
    }

    #[derive(Default)]
    struct MemoryBlobs {
        paths: Mutex<Vec<String>>,
        fail: bool,
    }

    impl BlobStorage for MemoryBlobs {
        async fn put(&self, path: &str, _bytes: Vec<u8>) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::Internal("quota exceeded".to_string()));
            }
            self.paths.lock().push(path.to_string());
            Ok(())
        }

        async fn download_url(&self, path: &str) -> Result<String, AppError> {
            Ok(format!("https://blobs.test/{}", path))
        }
    }

    fn resolver(
        index: MemoryIndex,
        blobs: MemoryBlobs,
    ) -> (
        DocumentResolver<MemoryIndex, MemoryBlobs>,
        Arc<MemoryIndex>,
        Arc<MemoryBlobs>,
    ) {
        let index = Arc::new(index);
        let blobs = Arc::new(blobs);
        (
            DocumentResolver::new(index.clone(), blobs.clone(), "resumes").unwrap(),
            index,
            blobs,
        )
    }

    #[test]
    fn test_blob_path_layout() {
        assert_eq!(blob_path("resumesFiles/", "cv.pdf", 42), "resumesFiles/cv.pdf-42");
        assert_eq!(blob_path("resumesFiles", "cv.pdf", 42), "resumesFiles/cv.pdf-42");
        assert_eq!(blob_path("", "cv.pdf", 42), "cv.pdf-42");
    }

    #[test]
    fn test_collection_names_are_checked() {
        assert!(validate_collection("coverLetters").is_ok());
        assert!(validate_collection("resume_files-2").is_ok());
        for bad in ["", "../jobs", "a b", "jobs", "interviews"] {
            assert!(
                matches!(validate_collection(bad), Err(AppError::Validation(_))),
                "{} accepted",
                bad
            );
        }

        let shadowing = DocumentResolver::new(
            Arc::new(MemoryIndex::default()),
            Arc::new(MemoryBlobs::default()),
            "jobs",
        );
        assert!(matches!(shadowing, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_watch_starts_with_current_list() {
        let (resolver, _, _) = resolver(MemoryIndex::default(), MemoryBlobs::default());
        let document = resolver
            .upload(vec![0], "cv.pdf", "CV", "resumesFiles/")
            .await
            .unwrap();

        let mut feed = resolver.watch();
        let snapshot = feed.recv().await.unwrap().unwrap();
        assert_eq!(snapshot.records, vec![document]);
    }

    #[tokio::test]
    async fn test_upload_then_resolve() {
        let (resolver, _, blobs) = resolver(MemoryIndex::default(), MemoryBlobs::default());

        let document = resolver
            .upload(b"cv".to_vec(), "C:\\Users\\me\\cv.pdf", "Main CV", "resumesFiles/")
            .await
            .unwrap();

        assert_eq!(document.title, "Main CV");
        assert_eq!(document.collection, "resumes");
        assert!(document.file_path.starts_with("resumesFiles/cv.pdf-"));
        assert_eq!(blobs.paths.lock().as_slice(), &[document.file_path.clone()]);

        let url = resolver.resolve_download_url(&document.id).await.unwrap();
        assert_eq!(url, format!("https://blobs.test/{}", document.file_path));
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let (resolver, _, _) = resolver(MemoryIndex::default(), MemoryBlobs::default());
        for title in ["first", "second", "third"] {
            resolver
                .upload(vec![0], "file.txt", title, "resumesFiles/")
                .await
                .unwrap();
        }

        let titles: Vec<String> = resolver
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.title)
            .collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_blob_failure_creates_no_record() {
        let (resolver, index, _) = resolver(
            MemoryIndex::default(),
            MemoryBlobs {
                fail: true,
                ..Default::default()
            },
        );

        let result = resolver.upload(vec![0], "cv.pdf", "CV", "resumesFiles/").await;
        assert!(matches!(result, Err(AppError::Upload(_))));
        assert!(index.documents.lock().is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_leaves_orphan_blob() {
        let (resolver, _, blobs) = resolver(
            MemoryIndex {
                fail: true,
                ..Default::default()
            },
            MemoryBlobs::default(),
        );

        let result = resolver.upload(vec![0], "cv.pdf", "CV", "resumesFiles/").await;
        assert!(matches!(result, Err(AppError::Persistence(_))));
        assert_eq!(blobs.paths.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_requires_title_and_file_name() {
        let (resolver, _, blobs) = resolver(MemoryIndex::default(), MemoryBlobs::default());

        let no_title = resolver.upload(vec![0], "cv.pdf", "  ", "resumesFiles/").await;
        assert!(matches!(no_title, Err(AppError::Validation(_))));
        let no_name = resolver.upload(vec![0], "dir/", "CV", "resumesFiles/").await;
        assert!(matches!(no_name, Err(AppError::Validation(_))));
        assert!(blobs.paths.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_document_is_not_found() {
        let (resolver, _, _) = resolver(MemoryIndex::default(), MemoryBlobs::default());
        let result = resolver.resolve_download_url("missing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
