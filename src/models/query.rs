//! Live query descriptors and the snapshots they produce.

use serde::{Deserialize, Serialize};

use super::{FieldValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Equality filter on one wire field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Filter {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Collection, ordered equality filters and a single sort key.
///
/// Built by value; a subscription keeps its own copy, so changing the filters
/// means building a new descriptor and subscribing again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    collection: String,
    filters: Vec<Filter>,
    order_by: SortKey,
}

impl QueryDescriptor {
    pub fn new(collection: &str, sort_field: &str, direction: SortDirection) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order_by: SortKey {
                field: sort_field.to_string(),
                direction,
            },
        }
    }

    pub fn filter(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order_by(&self) -> &SortKey {
        &self.order_by
    }
}

/// Ordered result set of a live query at one revision of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<R> {
    pub revision: i64,
    pub records: Vec<R>,
}

impl<R: Record> Snapshot<R> {
    pub fn new(revision: i64, records: Vec<R>) -> Self {
        Self { revision, records }
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id()).collect()
    }
}
