//! Interview record, stored in the `interviews` collection and nested under an application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FieldKind, FieldName, FieldValue, QueryDescriptor, Record, SortDirection};
use crate::errors::AppError;

/// A scheduled interview for one application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: String,
    pub job_id: String,
    pub user_id: String,
    pub interview_date_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interviewers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Interview {
    /// Interviews of one application, earliest first.
    pub fn query_for(user_id: &str, job_id: &str) -> QueryDescriptor {
        QueryDescriptor::new(Self::COLLECTION, "interviewDateTime", SortDirection::Asc)
            .filter("jobId", job_id)
            .filter("userId", user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InterviewField {
    InterviewDateTime,
    Interviewers,
    ContactInfo,
    Notes,
}

impl FieldName for InterviewField {
    const ALL: &'static [Self] = &[
        InterviewField::InterviewDateTime,
        InterviewField::Interviewers,
        InterviewField::ContactInfo,
        InterviewField::Notes,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn as_str(self) -> &'static str {
        match self {
            InterviewField::InterviewDateTime => "interviewDateTime",
            InterviewField::Interviewers => "interviewers",
            InterviewField::ContactInfo => "contactInfo",
            InterviewField::Notes => "notes",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            InterviewField::InterviewDateTime => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    fn nullable(self) -> bool {
        self != InterviewField::InterviewDateTime
    }
}

impl Record for Interview {
    type Field = InterviewField;
    const COLLECTION: &'static str = "interviews";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn value(&self, field: InterviewField) -> FieldValue {
        match field {
            InterviewField::InterviewDateTime => self.interview_date_time.into(),
            InterviewField::Interviewers => self.interviewers.clone().into(),
            InterviewField::ContactInfo => self.contact_info.clone().into(),
            InterviewField::Notes => self.notes.clone().into(),
        }
    }

    fn apply(&mut self, field: InterviewField, value: FieldValue) -> Result<(), AppError> {
        field.check(&value)?;
        let text = value.as_text().map(str::to_string);
        match field {
            InterviewField::InterviewDateTime => {
                if let FieldValue::Timestamp(t) = value {
                    self.interview_date_time = t;
                }
            }
            InterviewField::Interviewers => self.interviewers = text,
            InterviewField::ContactInfo => self.contact_info = text,
            InterviewField::Notes => self.notes = text,
        }
        Ok(())
    }
}

/// Request body for scheduling an interview.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewRequest {
    pub job_id: String,
    pub interview_date_time: DateTime<Utc>,
    #[serde(default)]
    pub interviewers: Option<String>,
    #[serde(default)]
    pub contact_info: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateInterviewRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.job_id.trim().is_empty() {
            return Err(AppError::Validation("Job id is required".to_string()));
        }
        Ok(())
    }
}
