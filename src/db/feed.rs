//! Live query feeds driven by the repository's change events.

use std::future::Future;

use tokio::sync::{broadcast, mpsc};

use super::repository::{build_select, ChangeEvent, Repository};
use super::tables::StoredRecord;
use crate::errors::AppError;
use crate::models::{DocumentRecord, QueryDescriptor, Snapshot};
use crate::sync::{SnapshotFeed, SnapshotSource};

const FEED_BUFFER: usize = 16;

/// Snapshots of one document collection, in revision order. An `Err` is terminal.
pub type DocumentFeed = mpsc::Receiver<Result<Snapshot<DocumentRecord>, AppError>>;

impl<R: StoredRecord> SnapshotSource<R> for Repository {
    /// Validates the descriptor, then spawns a task that sends the initial
    /// snapshot and a fresh one whenever the result set changes.
    fn watch(&self, descriptor: &QueryDescriptor) -> Result<SnapshotFeed<R>, AppError> {
        build_select::<R>(descriptor)?;

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        // Subscribe before the first query so no write can slip between them.
        let changes = self.changes();
        let repo = self.clone();
        let query_descriptor = descriptor.clone();
        tokio::spawn(run_feed(
            descriptor.collection().to_string(),
            move || {
                let repo = repo.clone();
                let descriptor = query_descriptor.clone();
                async move { repo.query::<R>(&descriptor).await }
            },
            changes,
            tx,
        ));

        Ok(rx)
    }
}

impl Repository {
    /// Live list of one document collection in insertion order.
    pub fn watch_documents(&self, collection: &str) -> DocumentFeed {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let changes = self.changes();
        let repo = self.clone();
        let name = collection.to_string();
        tokio::spawn(run_feed(
            collection.to_string(),
            move || {
                let repo = repo.clone();
                let name = name.clone();
                async move { repo.query_documents(&name).await }
            },
            changes,
            tx,
        ));
        rx
    }
}

/// Send the query's result now and again after every write to `collection`.
///
/// A snapshot whose records equal the last one sent is dropped: writes to
/// other owners' records and lagged re-queries change the revision only.
async fn run_feed<T, Q, F>(
    collection: String,
    query: Q,
    mut changes: broadcast::Receiver<ChangeEvent>,
    tx: mpsc::Sender<Result<Snapshot<T>, AppError>>,
) where
    T: Clone + PartialEq + Send + 'static,
    Q: Fn() -> F + Send + 'static,
    F: Future<Output = Result<Snapshot<T>, AppError>> + Send,
{
    let mut last_records: Option<Vec<T>> = None;

    loop {
        match query().await {
            Ok(snapshot) => {
                if last_records.as_ref() != Some(&snapshot.records) {
                    last_records = Some(snapshot.records.clone());
                    if tx.send(Ok(snapshot)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Live query on {} failed: {}", collection, e);
                let _ = tx
                    .send(Err(AppError::Subscription(format!(
                        "Live query on {} failed: {}",
                        collection,
                        e.message()
                    ))))
                    .await;
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => return,
                event = changes.recv() => match event {
                    Ok(event) if event.collection == collection => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(
                            "Change feed for {} lagged by {} events; re-querying",
                            collection,
                            skipped
                        );
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx
                            .send(Err(AppError::Subscription(
                                "Change feed closed".to_string(),
                            )))
                            .await;
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::models::{
        Application, ApplicationField, CreateApplicationRequest, CreateInterviewRequest,
        Interview, InterviewField, Patch, Priority,
    };
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .expect("Failed to init DB");
        (Repository::new(pool), temp_dir)
    }

    fn request(company: &str) -> CreateApplicationRequest {
        CreateApplicationRequest {
            company_name: company.to_string(),
            job_title: "Engineer".to_string(),
            applied_date: Utc::now(),
            notes: None,
            contact_name: None,
            contact_email: None,
            contact_phone: None,
            job_posting_url: None,
            priority: None,
            auto_follow_up: None,
        }
    }

    async fn next_snapshot<T>(
        feed: &mut mpsc::Receiver<Result<Snapshot<T>, AppError>>,
    ) -> Snapshot<T> {
        tokio::time::timeout(Duration::from_secs(5), feed.recv())
            .await
            .expect("Timed out waiting for snapshot")
            .expect("Feed closed")
            .expect("Feed error")
    }

    #[tokio::test]
    async fn test_watch_sends_initial_and_updated_snapshots() {
        let (repo, _dir) = repo().await;
        let job = repo.create_application("user-1", &request("Acme")).await.unwrap();

        let mut feed: SnapshotFeed<Application> =
            repo.watch(&Application::query_for("user-1")).unwrap();

        let initial = next_snapshot(&mut feed).await;
        assert_eq!(initial.ids(), vec![job.id.as_str()]);

        let patch = Patch::new().with(ApplicationField::Priority, Priority::High);
        repo.update_fields::<Application>(&job.id, &patch).await.unwrap();

        let updated = next_snapshot(&mut feed).await;
        assert!(updated.revision > initial.revision);
        assert_eq!(updated.records[0].priority, Some(Priority::High));
    }

    #[tokio::test]
    async fn test_watch_revisions_never_decrease() {
        let (repo, _dir) = repo().await;
        let mut feed: SnapshotFeed<Application> =
            repo.watch(&Application::query_for("user-1")).unwrap();
        let mut last = next_snapshot(&mut feed).await.revision;

        for i in 0..5 {
            repo.create_application("user-1", &request(&format!("Co {}", i)))
                .await
                .unwrap();
        }

        loop {
            let snapshot = next_snapshot(&mut feed).await;
            assert!(snapshot.revision > last);
            last = snapshot.revision;
            if snapshot.len() == 5 {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_watch_rejects_invalid_descriptor() {
        let (repo, _dir) = repo().await;
        let descriptor = Application::query_for("user-1").filter("nope", "x");
        let result: Result<SnapshotFeed<Application>, _> = repo.watch(&descriptor);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_other_owners_writes_send_nothing() {
        let (repo, _dir) = repo().await;
        let mut feed: SnapshotFeed<Application> =
            repo.watch(&Application::query_for("user-1")).unwrap();
        assert!(next_snapshot(&mut feed).await.is_empty());

        repo.create_application("user-2", &request("Elsewhere")).await.unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(300), feed.recv()).await;
        assert!(quiet.is_err(), "unchanged result set was delivered again");

        let mine = repo.create_application("user-1", &request("Mine")).await.unwrap();
        let next = next_snapshot(&mut feed).await;
        assert_eq!(next.ids(), vec![mine.id.as_str()]);
    }

    #[tokio::test]
    async fn test_watch_interviews_of_one_job() {
        let (repo, _dir) = repo().await;
        let job = repo.create_application("user-1", &request("Acme")).await.unwrap();
        let other = repo.create_application("user-1", &request("Other")).await.unwrap();

        let mut feed: SnapshotFeed<Interview> =
            repo.watch(&Interview::query_for("user-1", &job.id)).unwrap();
        assert!(next_snapshot(&mut feed).await.is_empty());

        let schedule = |job_id: &str| CreateInterviewRequest {
            job_id: job_id.to_string(),
            interview_date_time: Utc::now(),
            interviewers: None,
            contact_info: None,
            notes: None,
        };
        let interview = repo.create_interview("user-1", &schedule(&job.id)).await.unwrap();
        let added = next_snapshot(&mut feed).await;
        assert_eq!(added.ids(), vec![interview.id.as_str()]);

        repo.create_interview("user-1", &schedule(&other.id)).await.unwrap();
        let patch = Patch::new().with(InterviewField::Notes, "panel");
        repo.update_fields::<Interview>(&interview.id, &patch).await.unwrap();

        let updated = next_snapshot(&mut feed).await;
        assert_eq!(updated.len(), 1);
        assert_eq!(updated.records[0].notes.as_deref(), Some("panel"));
    }

    #[tokio::test]
    async fn test_watch_documents_follows_its_collection() {
        let (repo, _dir) = repo().await;
        let first = repo.create_document("resumes", "CV", "resumesFiles/cv").await.unwrap();

        let mut feed = repo.watch_documents("resumes");
        let initial = next_snapshot(&mut feed).await;
        assert_eq!(initial.records, vec![first.clone()]);

        repo.create_document("coverLetters", "Letter", "coverLettersFiles/l")
            .await
            .unwrap();
        let second = repo.create_document("resumes", "CV 2", "resumesFiles/cv2").await.unwrap();

        let next = next_snapshot(&mut feed).await;
        assert!(next.revision > initial.revision);
        assert_eq!(next.records, vec![first, second]);
    }
}
