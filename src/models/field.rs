//! Closed field schema shared by every record kind.
//!
//! Each record kind declares its editable fields as an enum implementing
//! [`FieldName`]. Overlay values, edit-mode flags and diffs are all
//! [`FieldMap`]s keyed by that enum, so their shape is fixed at compile time.

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use chrono::{DateTime, SubsecRound, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::{Outcome, Priority};
use crate::errors::AppError;

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Bool,
    Outcome,
    Priority,
    Timestamp,
}

/// A single field value. `Null` stands for an absent optional field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Bool(bool),
    Outcome(Outcome),
    Priority(Priority),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// The kind this value belongs to, `None` for `Null`.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(_) => Some(FieldKind::Text),
            FieldValue::Bool(_) => Some(FieldKind::Bool),
            FieldValue::Outcome(_) => Some(FieldKind::Outcome),
            FieldValue::Priority(_) => Some(FieldKind::Priority),
            FieldValue::Timestamp(_) => Some(FieldKind::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse user input for a field of the given kind.
    ///
    /// Enumerations must match a declared value exactly. Booleans are not
    /// parsed from text.
    pub fn parse(kind: FieldKind, input: &str) -> Result<Self, AppError> {
        match kind {
            FieldKind::Text => Ok(FieldValue::Text(input.to_string())),
            FieldKind::Outcome => Outcome::from_str(input)
                .map(FieldValue::Outcome)
                .ok_or_else(|| AppError::Validation(format!("Unknown outcome: {}", input))),
            FieldKind::Priority => Priority::from_str(input)
                .map(FieldValue::Priority)
                .ok_or_else(|| AppError::Validation(format!("Unknown priority: {}", input))),
            FieldKind::Timestamp => DateTime::parse_from_rfc3339(input)
                .map(|t| FieldValue::Timestamp(stored_precision(t.with_timezone(&Utc))))
                .map_err(|e| AppError::Validation(format!("Invalid timestamp {}: {}", input, e))),
            FieldKind::Bool => Err(AppError::Validation(
                "Boolean fields take a boolean value, not text".to_string(),
            )),
        }
    }

    /// Convert a JSON value for a field of the given kind.
    pub fn from_json(kind: FieldKind, value: &serde_json::Value) -> Result<Self, AppError> {
        match (kind, value) {
            (_, serde_json::Value::Null) => Ok(FieldValue::Null),
            (FieldKind::Bool, serde_json::Value::Bool(b)) => Ok(FieldValue::Bool(*b)),
            (FieldKind::Bool, other) => Err(AppError::Validation(format!(
                "Expected a boolean, got {}",
                other
            ))),
            (kind, serde_json::Value::String(s)) => Self::parse(kind, s),
            (kind, other) => Err(AppError::Validation(format!(
                "Expected a {:?} string, got {}",
                kind, other
            ))),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Outcome> for FieldValue {
    fn from(value: Outcome) -> Self {
        FieldValue::Outcome(value)
    }
}

impl From<Priority> for FieldValue {
    fn from(value: Priority) -> Self {
        FieldValue::Priority(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(stored_precision(value))
    }
}

/// Truncate a timestamp to the microsecond precision the store keeps.
///
/// Values that enter a record must already be at this precision, otherwise
/// a record read back from the store no longer equals the one written.
pub fn stored_precision(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// A closed set of field names for one record kind.
pub trait FieldName: Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static {
    /// Every field, in declaration order. `ALL[f.index()] == f`.
    const ALL: &'static [Self];

    /// Position of this field in [`FieldName::ALL`].
    fn index(self) -> usize;

    /// Wire name, preserved exactly for stored data.
    fn as_str(self) -> &'static str;

    fn kind(self) -> FieldKind;

    /// Whether the field may be absent.
    fn nullable(self) -> bool;

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == name)
    }

    /// Check that `value` fits this field's declared type.
    fn check(self, value: &FieldValue) -> Result<(), AppError> {
        match value.kind() {
            None if self.nullable() => Ok(()),
            None => Err(AppError::Validation(format!(
                "{} is required",
                self.as_str()
            ))),
            Some(kind) if kind == self.kind() => Ok(()),
            Some(kind) => Err(AppError::Validation(format!(
                "{} expects {:?}, got {:?}",
                self.as_str(),
                self.kind(),
                kind
            ))),
        }
    }
}

/// Fixed-shape storage with one slot per field of `F`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap<F, T> {
    slots: Vec<T>,
    _field: PhantomData<fn() -> F>,
}

impl<F: FieldName, T> FieldMap<F, T> {
    pub fn from_fn(mut init: impl FnMut(F) -> T) -> Self {
        Self {
            slots: F::ALL.iter().map(|&field| init(field)).collect(),
            _field: PhantomData,
        }
    }

    pub fn get(&self, field: F) -> &T {
        &self.slots[field.index()]
    }

    pub fn set(&mut self, field: F, value: T) {
        self.slots[field.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (F, &T)> + '_ {
        F::ALL.iter().copied().zip(self.slots.iter())
    }

    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        for slot in &mut self.slots {
            *slot = value.clone();
        }
    }
}

impl<F: FieldName, T: Default> Default for FieldMap<F, T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

/// The set of field values to write for one record: the diff sent on save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch<F: FieldName> {
    entries: FieldMap<F, Option<FieldValue>>,
}

impl<F: FieldName> Default for Patch<F> {
    fn default() -> Self {
        Self {
            entries: FieldMap::default(),
        }
    }
}

impl<F: FieldName> Patch<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used mostly by tests and request parsing.
    pub fn with(mut self, field: F, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value.into());
        self
    }

    pub fn insert(&mut self, field: F, value: FieldValue) {
        self.entries.set(field, Some(value));
    }

    pub fn get(&self, field: F) -> Option<&FieldValue> {
        self.entries.get(field).as_ref()
    }

    pub fn contains(&self, field: F) -> bool {
        self.get(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|(_, v)| v.is_some()).count()
    }

    /// Entries in field declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (F, &FieldValue)> + '_ {
        self.entries
            .iter()
            .filter_map(|(field, value)| value.as_ref().map(|v| (field, v)))
    }

    /// Parse a JSON object of wire field names into a type-checked patch.
    pub fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Result<Self, AppError> {
        let mut patch = Self::new();
        for (name, raw) in object {
            let field = F::parse(name)
                .ok_or_else(|| AppError::Validation(format!("Unknown or read-only field: {}", name)))?;
            let value = FieldValue::from_json(field.kind(), raw)?;
            field.check(&value)?;
            patch.insert(field, value);
        }
        Ok(patch)
    }
}

impl<F: FieldName> Serialize for Patch<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.as_str(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationField;
    use serde_json::json;

    #[test]
    fn test_field_index_matches_all() {
        for (i, field) in ApplicationField::ALL.iter().enumerate() {
            assert_eq!(field.index(), i);
            assert_eq!(ApplicationField::parse(field.as_str()), Some(*field));
        }
    }

    #[test]
    fn test_parse_enumerations_exactly() {
        assert_eq!(
            FieldValue::parse(FieldKind::Outcome, "No Response").unwrap(),
            FieldValue::Outcome(Outcome::NoResponse)
        );
        assert!(FieldValue::parse(FieldKind::Outcome, "no response").is_err());
        assert!(FieldValue::parse(FieldKind::Priority, "high").is_err());
        assert!(FieldValue::parse(FieldKind::Bool, "true").is_err());
    }

    #[test]
    fn test_timestamps_truncate_to_microseconds() {
        let parsed = FieldValue::parse(FieldKind::Timestamp, "2024-03-01T09:00:00.123456789Z")
            .unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-03-01T09:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, FieldValue::Timestamp(expected));

        let nanos = DateTime::parse_from_rfc3339("2024-03-01T09:00:00.999999999Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            FieldValue::from(nanos),
            FieldValue::Timestamp(stored_precision(nanos))
        );
        assert_eq!(stored_precision(nanos).timestamp_subsec_nanos(), 999_999_000);
    }

    #[test]
    fn test_patch_from_json_type_checks() {
        let body = json!({ "priority": "HIGH", "autoFollowUp": true });
        let patch = Patch::<ApplicationField>::from_json(body.as_object().unwrap()).unwrap();
        assert_eq!(patch.len(), 2);
        assert_eq!(
            patch.get(ApplicationField::Priority),
            Some(&FieldValue::Priority(Priority::High))
        );

        let wrong_type = json!({ "autoFollowUp": "yes" });
        assert!(Patch::<ApplicationField>::from_json(wrong_type.as_object().unwrap()).is_err());

        let read_only = json!({ "createdAt": "2024-01-01T00:00:00Z" });
        assert!(Patch::<ApplicationField>::from_json(read_only.as_object().unwrap()).is_err());

        let required = json!({ "companyName": null });
        assert!(Patch::<ApplicationField>::from_json(required.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_patch_serializes_wire_names() {
        let patch = Patch::<ApplicationField>::new()
            .with(ApplicationField::Notes, "follow up")
            .with(ApplicationField::Outcome, Outcome::NoResponse);
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({ "outcome": "No Response", "notes": "follow up" }));
    }
}
