//! Job application record, stored in the `jobs` collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FieldKind, FieldName, FieldValue, QueryDescriptor, Record, SortDirection};
use crate::errors::AppError;

/// Where an application currently stands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Outcome {
    Applied,
    Interview,
    Denied,
    Hired,
    Ghost,
    #[serde(rename = "No Response")]
    NoResponse,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "Applied",
            Outcome::Interview => "Interview",
            Outcome::Denied => "Denied",
            Outcome::Hired => "Hired",
            Outcome::Ghost => "Ghost",
            Outcome::NoResponse => "No Response",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Applied" => Some(Outcome::Applied),
            "Interview" => Some(Outcome::Interview),
            "Denied" => Some(Outcome::Denied),
            "Hired" => Some(Outcome::Hired),
            "Ghost" => Some(Outcome::Ghost),
            "No Response" => Some(Outcome::NoResponse),
            _ => None,
        }
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Priority::Low),
            "MEDIUM" => Some(Priority::Medium),
            "HIGH" => Some(Priority::High),
            _ => None,
        }
    }
}

/// A job application owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub user_id: String,
    pub company_name: String,
    pub job_title: String,
    pub applied_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub auto_follow_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_posting_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Application {
    /// The live query behind the job list: the user's applications, newest first.
    pub fn query_for(user_id: &str) -> QueryDescriptor {
        QueryDescriptor::new(Self::COLLECTION, "createdAt", SortDirection::Desc)
            .filter("userId", user_id)
    }
}

/// User-editable fields of an [`Application`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApplicationField {
    CompanyName,
    JobTitle,
    Outcome,
    Notes,
    ContactName,
    ContactEmail,
    ContactPhone,
    JobPostingUrl,
    Priority,
    AutoFollowUp,
}

impl FieldName for ApplicationField {
    const ALL: &'static [Self] = &[
        ApplicationField::CompanyName,
        ApplicationField::JobTitle,
        ApplicationField::Outcome,
        ApplicationField::Notes,
        ApplicationField::ContactName,
        ApplicationField::ContactEmail,
        ApplicationField::ContactPhone,
        ApplicationField::JobPostingUrl,
        ApplicationField::Priority,
        ApplicationField::AutoFollowUp,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn as_str(self) -> &'static str {
        match self {
            ApplicationField::CompanyName => "companyName",
            ApplicationField::JobTitle => "jobTitle",
            ApplicationField::Outcome => "outcome",
            ApplicationField::Notes => "notes",
            ApplicationField::ContactName => "contactName",
            ApplicationField::ContactEmail => "contactEmail",
            ApplicationField::ContactPhone => "contactPhone",
            ApplicationField::JobPostingUrl => "jobPostingUrl",
            ApplicationField::Priority => "priority",
            ApplicationField::AutoFollowUp => "autoFollowUp",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            ApplicationField::Outcome => FieldKind::Outcome,
            ApplicationField::Priority => FieldKind::Priority,
            ApplicationField::AutoFollowUp => FieldKind::Bool,
            _ => FieldKind::Text,
        }
    }

    fn nullable(self) -> bool {
        !matches!(
            self,
            ApplicationField::CompanyName
                | ApplicationField::JobTitle
                | ApplicationField::AutoFollowUp
        )
    }
}

impl Record for Application {
    type Field = ApplicationField;
    const COLLECTION: &'static str = "jobs";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn value(&self, field: ApplicationField) -> FieldValue {
        match field {
            ApplicationField::CompanyName => self.company_name.clone().into(),
            ApplicationField::JobTitle => self.job_title.clone().into(),
            ApplicationField::Outcome => self.outcome.into(),
            ApplicationField::Notes => self.notes.clone().into(),
            ApplicationField::ContactName => self.contact_name.clone().into(),
            ApplicationField::ContactEmail => self.contact_email.clone().into(),
            ApplicationField::ContactPhone => self.contact_phone.clone().into(),
            ApplicationField::JobPostingUrl => self.job_posting_url.clone().into(),
            ApplicationField::Priority => self.priority.into(),
            ApplicationField::AutoFollowUp => self.auto_follow_up.into(),
        }
    }

    fn apply(&mut self, field: ApplicationField, value: FieldValue) -> Result<(), AppError> {
        field.check(&value)?;
        match (field, value) {
            (ApplicationField::CompanyName, FieldValue::Text(s)) => self.company_name = s,
            (ApplicationField::JobTitle, FieldValue::Text(s)) => self.job_title = s,
            (ApplicationField::Outcome, FieldValue::Outcome(o)) => self.outcome = Some(o),
            (ApplicationField::Outcome, _) => self.outcome = None,
            (ApplicationField::Priority, FieldValue::Priority(p)) => self.priority = Some(p),
            (ApplicationField::Priority, _) => self.priority = None,
            (ApplicationField::AutoFollowUp, FieldValue::Bool(b)) => self.auto_follow_up = b,
            (ApplicationField::Notes, value) => self.notes = value.as_text().map(str::to_string),
            (ApplicationField::ContactName, value) => {
                self.contact_name = value.as_text().map(str::to_string)
            }
            (ApplicationField::ContactEmail, value) => {
                self.contact_email = value.as_text().map(str::to_string)
            }
            (ApplicationField::ContactPhone, value) => {
                self.contact_phone = value.as_text().map(str::to_string)
            }
            (ApplicationField::JobPostingUrl, value) => {
                self.job_posting_url = value.as_text().map(str::to_string)
            }
            (field, value) => {
                return Err(AppError::Internal(format!(
                    "{:?} passed the type check for {}",
                    value,
                    field.as_str()
                )))
            }
        }
        Ok(())
    }
}

/// Request body for creating a new application.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    pub company_name: String,
    pub job_title: String,
    pub applied_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub job_posting_url: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub auto_follow_up: Option<bool>,
}

impl CreateApplicationRequest {
    /// Boundary check for required fields.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.company_name.trim().is_empty() {
            return Err(AppError::Validation("Company name is required".to_string()));
        }
        if self.job_title.trim().is_empty() {
            return Err(AppError::Validation("Job title is required".to_string()));
        }
        Ok(())
    }
}
