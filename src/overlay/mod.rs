//! Per-record edit overlay.
//!
//! An [`Overlay`] is a working copy of one record's editable fields plus a
//! per-field edit-mode flag. Fields in edit mode are shielded from incoming
//! canonical values; every other field tracks the latest canonical record.
//! Saving sends only the fields that differ from the canonical baseline.

use std::future::Future;

use crate::errors::AppError;
use crate::models::{FieldMap, FieldName, FieldValue, Patch, Record};

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome<F: FieldName> {
    /// Nothing differed from the baseline; no write was issued.
    Unchanged,
    Saved(Patch<F>),
}

/// A save in progress: the diff, the baseline it was computed against and
/// the overlay values it was computed from.
#[derive(Debug, Clone)]
pub struct PendingSave<R: Record> {
    id: String,
    patch: Patch<R::Field>,
    baseline: R,
    values: FieldMap<R::Field, FieldValue>,
}

impl<R: Record> PendingSave<R> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn patch(&self) -> &Patch<R::Field> {
        &self.patch
    }

    pub fn baseline(&self) -> &R {
        &self.baseline
    }
}

#[derive(Debug, Clone)]
pub struct Overlay<R: Record> {
    id: String,
    values: FieldMap<R::Field, FieldValue>,
    editing: FieldMap<R::Field, bool>,
    has_changes: bool,
    baseline: R,
}

impl<R: Record> Overlay<R> {
    pub fn open(record: &R) -> Self {
        Self {
            id: record.id().to_string(),
            values: FieldMap::from_fn(|field| record.value(field)),
            editing: FieldMap::default(),
            has_changes: false,
            baseline: record.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Take a fresher canonical version of the same record.
    ///
    /// Fields in edit mode keep their local value; all others are overwritten.
    pub fn reconcile(&mut self, canonical: &R) -> Result<(), AppError> {
        if canonical.id() != self.id {
            return Err(AppError::Validation(format!(
                "Cannot reconcile overlay for {} with record {}",
                self.id,
                canonical.id()
            )));
        }

        for &field in <R::Field as FieldName>::ALL {
            if !*self.editing.get(field) {
                self.values.set(field, canonical.value(field));
            }
        }
        self.baseline = canonical.clone();
        Ok(())
    }

    /// Flip a field's edit mode and return the new state. Leaving edit mode
    /// keeps whatever value was typed.
    pub fn toggle_edit(&mut self, field: R::Field) -> bool {
        let editing = !*self.editing.get(field);
        self.editing.set(field, editing);
        editing
    }

    pub fn set_value(&mut self, field: R::Field, value: impl Into<FieldValue>) -> Result<(), AppError> {
        let value = value.into();
        field.check(&value)?;
        self.values.set(field, value);
        self.has_changes = true;
        Ok(())
    }

    /// Set a field from raw user input, parsed against the field's kind.
    /// Empty input clears an optional field.
    pub fn set_input(&mut self, field: R::Field, input: &str) -> Result<(), AppError> {
        let value = if input.is_empty() && field.nullable() {
            FieldValue::Null
        } else {
            FieldValue::parse(field.kind(), input)?
        };
        self.set_value(field, value)
    }

    pub fn value(&self, field: R::Field) -> &FieldValue {
        self.values.get(field)
    }

    pub fn is_editing(&self, field: R::Field) -> bool {
        *self.editing.get(field)
    }

    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    /// Whether any field differs from the current baseline.
    pub fn is_dirty(&self) -> bool {
        !self.diff(&self.baseline).is_empty()
    }

    pub fn baseline(&self) -> &R {
        &self.baseline
    }

    /// Fields whose overlay value differs from `baseline`.
    pub fn diff(&self, baseline: &R) -> Patch<R::Field> {
        let mut patch = Patch::new();
        for (field, value) in self.values.iter() {
            if *value != baseline.value(field) {
                patch.insert(field, value.clone());
            }
        }
        patch
    }

    /// Capture the baseline and compute the diff to persist.
    pub fn begin_save(&self) -> PendingSave<R> {
        let baseline = self.baseline.clone();
        PendingSave {
            id: self.id.clone(),
            patch: self.diff(&baseline),
            baseline,
            values: self.values.clone(),
        }
    }

    /// Settle a save started with [`Overlay::begin_save`].
    ///
    /// On success the saved values become both the overlay values and part of
    /// the baseline, and edit mode is cleared. A field edited in edit mode
    /// while the save was in flight keeps that newer value and its edit mode.
    /// On failure the overlay is left exactly as it was.
    pub fn finish_save(
        &mut self,
        pending: PendingSave<R>,
        result: Result<(), AppError>,
    ) -> Result<SaveOutcome<R::Field>, AppError> {
        if pending.id != self.id {
            return Err(AppError::Validation(format!(
                "Save for {} does not belong to overlay {}",
                pending.id, self.id
            )));
        }
        result.map_err(AppError::into_persistence)?;

        let mut newer_edits = false;
        for &field in <R::Field as FieldName>::ALL {
            let edited_since = *self.editing.get(field)
                && self.values.get(field) != pending.values.get(field);
            if edited_since {
                newer_edits = true;
                continue;
            }
            self.editing.set(field, false);
            if let Some(saved) = pending.patch.get(field) {
                self.values.set(field, saved.clone());
            }
        }
        self.has_changes = newer_edits;

        if pending.patch.is_empty() {
            return Ok(SaveOutcome::Unchanged);
        }
        self.baseline.apply_patch(&pending.patch)?;
        Ok(SaveOutcome::Saved(pending.patch))
    }

    /// Persist the diff through `persist(id, patch)`. An empty diff makes no call.
    pub async fn save<P, Fut>(&mut self, persist: P) -> Result<SaveOutcome<R::Field>, AppError>
    where
        P: FnOnce(String, Patch<R::Field>) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        let pending = self.begin_save();
        if pending.patch.is_empty() {
            return self.finish_save(pending, Ok(()));
        }

        tracing::debug!(
            "Saving {} field(s) of {} {}",
            pending.patch.len(),
            R::COLLECTION,
            pending.id
        );
        let result = persist(pending.id.clone(), pending.patch.clone()).await;
        if let Err(e) = &result {
            tracing::warn!("Save of {} {} failed: {}", R::COLLECTION, pending.id, e);
        }
        self.finish_save(pending, result)
    }
}
