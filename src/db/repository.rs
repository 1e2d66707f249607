//! Database repository for record operations.
//!
//! Every write runs in a transaction together with the revision bump, and the
//! new revision is published to change-feed subscribers after commit.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::broadcast;

use super::tables::{bind_value, format_timestamp, parse_timestamp, StoredRecord};
use crate::errors::AppError;
use crate::models::{
    stored_precision, Application, ApplicationField, CreateApplicationRequest,
    CreateInterviewRequest, DocumentRecord, FieldValue, Interview, Outcome, Patch, Priority,
    QueryDescriptor, Record, Snapshot,
};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Published after every committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
    pub revision: i64,
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { pool, changes }
    }

    /// Receive a [`ChangeEvent`] for every write committed from now on.
    pub fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("revision_id")?)
    }

    fn notify(&self, collection: &str, revision: i64) {
        tracing::debug!("Change committed to {} at revision {}", collection, revision);
        // No receivers just means nobody is watching.
        let _ = self.changes.send(ChangeEvent {
            collection: collection.to_string(),
            revision,
        });
    }

    // ==================== APPLICATION OPERATIONS ====================

    /// Create a new application with the default outcome, priority and follow-up flag.
    pub async fn create_application(
        &self,
        user_id: &str,
        request: &CreateApplicationRequest,
    ) -> Result<Application, AppError> {
        let application = Application {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            company_name: request.company_name.clone(),
            job_title: request.job_title.clone(),
            applied_date: stored_precision(request.applied_date),
            outcome: Some(Outcome::Applied),
            priority: Some(request.priority.unwrap_or(Priority::Medium)),
            auto_follow_up: request.auto_follow_up.unwrap_or(false),
            notes: request.notes.clone(),
            contact_name: request.contact_name.clone(),
            contact_email: request.contact_email.clone(),
            contact_phone: request.contact_phone.clone(),
            job_posting_url: request.job_posting_url.clone(),
            created_at: stored_precision(Utc::now()),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO jobs (
                id, user_id, company_name, job_title, applied_date, outcome, priority,
                auto_follow_up, notes, contact_name, contact_email, contact_phone,
                job_posting_url, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&application.id)
        .bind(&application.user_id)
        .bind(&application.company_name)
        .bind(&application.job_title)
        .bind(format_timestamp(&application.applied_date))
        .bind(application.outcome.map(|o| o.as_str()))
        .bind(application.priority.map(|p| p.as_str()))
        .bind(application.auto_follow_up as i32)
        .bind(&application.notes)
        .bind(&application.contact_name)
        .bind(&application.contact_email)
        .bind(&application.contact_phone)
        .bind(&application.job_posting_url)
        .bind(format_timestamp(&application.created_at))
        .execute(&mut *tx)
        .await?;

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;
        self.notify(Application::COLLECTION, revision);

        Ok(application)
    }

    // ==================== INTERVIEW OPERATIONS ====================

    /// Schedule an interview, then move the parent application to `Interview`.
    ///
    /// The two writes are independent; a failure on the second leaves the
    /// interview in place and is reported to the caller.
    pub async fn create_interview(
        &self,
        user_id: &str,
        request: &CreateInterviewRequest,
    ) -> Result<Interview, AppError> {
        let parent = self
            .get::<Application>(&request.job_id)
            .await?
            .filter(|job| job.owner_id() == user_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Application {} not found", request.job_id))
            })?;

        let interview = Interview {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: parent.id.clone(),
            user_id: user_id.to_string(),
            interview_date_time: stored_precision(request.interview_date_time),
            interviewers: request.interviewers.clone(),
            contact_info: request.contact_info.clone(),
            notes: request.notes.clone(),
            created_at: stored_precision(Utc::now()),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO interviews (
                id, job_id, user_id, interview_date_time, interviewers, contact_info,
                notes, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&interview.id)
        .bind(&interview.job_id)
        .bind(&interview.user_id)
        .bind(format_timestamp(&interview.interview_date_time))
        .bind(&interview.interviewers)
        .bind(&interview.contact_info)
        .bind(&interview.notes)
        .bind(format_timestamp(&interview.created_at))
        .execute(&mut *tx)
        .await?;

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;
        self.notify(Interview::COLLECTION, revision);

        let outcome = Patch::new().with(ApplicationField::Outcome, Outcome::Interview);
        self.update_fields::<Application>(&parent.id, &outcome)
            .await?;

        Ok(interview)
    }

    // ==================== GENERIC RECORD OPERATIONS ====================

    /// Point read by id.
    pub async fn get<R: StoredRecord>(&self, id: &str) -> Result<Option<R>, AppError> {
        let sql = format!("{} WHERE id = ?", R::SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(R::from_row).transpose()
    }

    /// Partial update: only the columns named in `patch` are written.
    pub async fn update_fields<R: StoredRecord>(
        &self,
        id: &str,
        patch: &Patch<R::Field>,
    ) -> Result<R, AppError> {
        let not_found = || AppError::NotFound(format!("{} record {} not found", R::COLLECTION, id));

        if patch.is_empty() {
            return self.get::<R>(id).await?.ok_or_else(not_found);
        }

        let assignments: Vec<String> = patch
            .iter()
            .map(|(field, _)| format!("{} = ?", R::field_column(field)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            R::TABLE,
            assignments.join(", ")
        );

        let mut tx = self.pool.begin().await?;

        let mut query = sqlx::query(&sql);
        for (_, value) in patch.iter() {
            query = bind_value(query, value);
        }
        let result = query.bind(id).execute(&mut *tx).await?;

        if result.rows_affected() == 0 {
            return Err(not_found());
        }

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;
        self.notify(R::COLLECTION, revision);

        self.get::<R>(id).await?.ok_or_else(not_found)
    }

    /// Run a query descriptor once. Revision and rows come from one read transaction.
    pub async fn query<R: StoredRecord>(
        &self,
        descriptor: &QueryDescriptor,
    ) -> Result<Snapshot<R>, AppError> {
        let (sql, params) = build_select::<R>(descriptor)?;

        let mut tx = self.pool.begin().await?;

        let revision: i64 = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?
            .try_get("revision_id")?;

        let mut query = sqlx::query(&sql);
        for value in &params {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&mut *tx).await?;

        tx.commit().await?;

        let records = rows
            .iter()
            .map(R::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Snapshot::new(revision, records))
    }

    // ==================== DOCUMENT OPERATIONS ====================

    /// Register a blob under a titled document record.
    pub async fn create_document(
        &self,
        collection: &str,
        title: &str,
        file_path: &str,
    ) -> Result<DocumentRecord, AppError> {
        let document = DocumentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            collection: collection.to_string(),
            title: title.to_string(),
            file_path: file_path.to_string(),
            created_at: stored_precision(Utc::now()),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO documents (id, collection, title, file_path, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&document.id)
        .bind(&document.collection)
        .bind(&document.title)
        .bind(&document.file_path)
        .bind(format_timestamp(&document.created_at))
        .execute(&mut *tx)
        .await?;

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;
        self.notify(collection, revision);

        Ok(document)
    }

    /// Get a document record by ID within its collection.
    pub async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<DocumentRecord>, AppError> {
        let row = sqlx::query(
            "SELECT id, collection, title, file_path, created_at FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// List a collection's documents in insertion order.
    pub async fn list_documents(&self, collection: &str) -> Result<Vec<DocumentRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT id, collection, title, file_path, created_at FROM documents WHERE collection = ? ORDER BY rowid",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    /// List a collection's documents together with the revision they were read at.
    pub async fn query_documents(
        &self,
        collection: &str,
    ) -> Result<Snapshot<DocumentRecord>, AppError> {
        let mut tx = self.pool.begin().await?;

        let revision: i64 = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?
            .try_get("revision_id")?;

        let rows = sqlx::query(
            "SELECT id, collection, title, file_path, created_at FROM documents WHERE collection = ? ORDER BY rowid",
        )
        .bind(collection)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Snapshot {
            revision,
            records: rows
                .iter()
                .map(document_from_row)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

/// Increment the revision inside the write's transaction and return the new value.
async fn bump_revision(tx: &mut Transaction<'_, Sqlite>) -> Result<i64, AppError> {
    let now = Utc::now().to_rfc3339();
    let row = sqlx::query(
        "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1 RETURNING revision_id",
    )
    .bind(&now)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.try_get("revision_id")?)
}

/// Translate a descriptor into SQL, rejecting collections, filters and sort
/// keys the record kind does not know.
pub(crate) fn build_select<R: StoredRecord>(
    descriptor: &QueryDescriptor,
) -> Result<(String, Vec<FieldValue>), AppError> {
    if descriptor.collection() != R::COLLECTION {
        return Err(AppError::Validation(format!(
            "Descriptor targets {}, expected {}",
            descriptor.collection(),
            R::COLLECTION
        )));
    }

    let mut conditions = Vec::new();
    let mut params = Vec::new();
    for filter in descriptor.filters() {
        let column = R::column(&filter.field).ok_or_else(|| {
            AppError::Validation(format!("Unknown filter field: {}", filter.field))
        })?;
        if filter.value.is_null() {
            conditions.push(format!("{} IS NULL", column));
        } else {
            conditions.push(format!("{} = ?", column));
            params.push(filter.value.clone());
        }
    }

    let order = descriptor.order_by();
    let sort_column = R::column(&order.field)
        .ok_or_else(|| AppError::Validation(format!("Unknown sort field: {}", order.field)))?;
    let direction = order.direction.as_sql();

    let mut sql = R::SELECT.to_string();
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(&format!(
        " ORDER BY {} {}, id {}",
        sort_column, direction, direction
    ));

    Ok((sql, params))
}

fn document_from_row(row: &SqliteRow) -> Result<DocumentRecord, AppError> {
    let created_at: String = row.try_get("created_at")?;
    Ok(DocumentRecord {
        id: row.try_get("id")?,
        collection: row.try_get("collection")?,
        title: row.try_get("title")?,
        file_path: row.try_get("file_path")?,
        created_at: parse_timestamp(&created_at)?,
    })
}
