//! Presentation policy derived from a record's state.

use serde::Serialize;

use crate::models::{Application, Outcome, Priority};

/// Display bucket for an application's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Denied,
    Interview,
    Hired,
    Default,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Denied => "denied",
            Bucket::Interview => "interview",
            Bucket::Hired => "hired",
            Bucket::Default => "default",
        }
    }
}

/// Emphasis tier for an application's priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Weight {
    Low,
    High,
    Default,
}

impl Weight {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weight::Low => "low",
            Weight::High => "high",
            Weight::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Classification {
    pub bucket: Bucket,
    pub weight: Weight,
}

pub fn classify(application: &Application) -> Classification {
    classify_fields(application.outcome, application.priority)
}

pub fn classify_fields(outcome: Option<Outcome>, priority: Option<Priority>) -> Classification {
    let bucket = match outcome {
        Some(Outcome::Denied) => Bucket::Denied,
        Some(Outcome::Interview) => Bucket::Interview,
        Some(Outcome::Hired) => Bucket::Hired,
        _ => Bucket::Default,
    };
    let weight = match priority {
        Some(Priority::Low) => Weight::Low,
        Some(Priority::High) => Weight::High,
        _ => Weight::Default,
    };
    Classification { bucket, weight }
}
