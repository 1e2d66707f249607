//! Table mappings for record kinds stored in SQLite.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};

use crate::errors::AppError;
use crate::models::{
    Application, ApplicationField, FieldName, FieldValue, Interview, InterviewField, Outcome,
    Priority, Record,
};

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// A record kind with a table behind it.
pub trait StoredRecord: Record + Unpin {
    const TABLE: &'static str;

    /// SELECT list and FROM clause, without filters or ordering.
    const SELECT: &'static str;

    fn from_row(row: &SqliteRow) -> Result<Self, AppError>;

    /// Column for a wire field name usable in filters and sort keys.
    fn column(name: &str) -> Option<&'static str>;

    /// Column written when an editable field is patched.
    fn field_column(field: Self::Field) -> &'static str;
}

impl StoredRecord for Application {
    const TABLE: &'static str = "jobs";
    const SELECT: &'static str = r#"SELECT id, user_id, company_name, job_title, applied_date,
                  outcome, priority, auto_follow_up, notes, contact_name,
                  contact_email, contact_phone, job_posting_url, created_at
           FROM jobs"#;

    fn from_row(row: &SqliteRow) -> Result<Self, AppError> {
        let outcome: Option<String> = row.try_get("outcome")?;
        let priority: Option<String> = row.try_get("priority")?;
        let auto_follow_up: i32 = row.try_get("auto_follow_up")?;
        let applied_date: String = row.try_get("applied_date")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Application {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            company_name: row.try_get("company_name")?,
            job_title: row.try_get("job_title")?,
            applied_date: parse_timestamp(&applied_date)?,
            outcome: outcome.and_then(|s| Outcome::from_str(&s)),
            priority: priority.and_then(|s| Priority::from_str(&s)),
            auto_follow_up: auto_follow_up != 0,
            notes: row.try_get("notes")?,
            contact_name: row.try_get("contact_name")?,
            contact_email: row.try_get("contact_email")?,
            contact_phone: row.try_get("contact_phone")?,
            job_posting_url: row.try_get("job_posting_url")?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn column(name: &str) -> Option<&'static str> {
        match name {
            "id" => Some("id"),
            "userId" => Some("user_id"),
            "appliedDate" => Some("applied_date"),
            "createdAt" => Some("created_at"),
            other => ApplicationField::parse(other).map(Self::field_column),
        }
    }

    fn field_column(field: ApplicationField) -> &'static str {
        match field {
            ApplicationField::CompanyName => "company_name",
            ApplicationField::JobTitle => "job_title",
            ApplicationField::Outcome => "outcome",
            ApplicationField::Notes => "notes",
            ApplicationField::ContactName => "contact_name",
            ApplicationField::ContactEmail => "contact_email",
            ApplicationField::ContactPhone => "contact_phone",
            ApplicationField::JobPostingUrl => "job_posting_url",
            ApplicationField::Priority => "priority",
            ApplicationField::AutoFollowUp => "auto_follow_up",
        }
    }
}

impl StoredRecord for Interview {
    const TABLE: &'static str = "interviews";
    const SELECT: &'static str = r#"SELECT id, job_id, user_id, interview_date_time, interviewers,
                  contact_info, notes, created_at
           FROM interviews"#;

    fn from_row(row: &SqliteRow) -> Result<Self, AppError> {
        let interview_date_time: String = row.try_get("interview_date_time")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Interview {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            user_id: row.try_get("user_id")?,
            interview_date_time: parse_timestamp(&interview_date_time)?,
            interviewers: row.try_get("interviewers")?,
            contact_info: row.try_get("contact_info")?,
            notes: row.try_get("notes")?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn column(name: &str) -> Option<&'static str> {
        match name {
            "id" => Some("id"),
            "jobId" => Some("job_id"),
            "userId" => Some("user_id"),
            "createdAt" => Some("created_at"),
            other => InterviewField::parse(other).map(Self::field_column),
        }
    }

    fn field_column(field: InterviewField) -> &'static str {
        match field {
            InterviewField::InterviewDateTime => "interview_date_time",
            InterviewField::Interviewers => "interviewers",
            InterviewField::ContactInfo => "contact_info",
            InterviewField::Notes => "notes",
        }
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Database(format!("Invalid stored timestamp {}: {}", raw, e)))
}

pub(crate) fn bind_value<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> SqliteQuery<'q> {
    match value {
        FieldValue::Null => query.bind(None::<String>),
        FieldValue::Text(s) => query.bind(s.clone()),
        FieldValue::Bool(b) => query.bind(*b as i32),
        FieldValue::Outcome(o) => query.bind(o.as_str()),
        FieldValue::Priority(p) => query.bind(p.as_str()),
        FieldValue::Timestamp(t) => query.bind(format_timestamp(t)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_text_orders_like_time() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = early + chrono::Duration::milliseconds(1);
        assert!(format_timestamp(&early) < format_timestamp(&late));
        assert_eq!(parse_timestamp(&format_timestamp(&late)).unwrap(), late);
    }

    #[test]
    fn test_unknown_columns_are_rejected() {
        assert_eq!(Application::column("userId"), Some("user_id"));
        assert_eq!(Application::column("priority"), Some("priority"));
        assert_eq!(Application::column("user_id; DROP TABLE jobs"), None);
        assert_eq!(Interview::column("jobId"), Some("job_id"));
        assert_eq!(Interview::column("companyName"), None);
    }
}
