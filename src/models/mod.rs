//! Data model for tracked records.
//!
//! Field and collection names are the stored wire names and must not change.

mod application;
mod document;
mod field;
mod interview;
mod query;

pub use application::*;
pub use document::*;
pub use field::*;
pub use interview::*;
pub use query::*;

use crate::errors::AppError;

/// A record kind the engine can subscribe to and edit field by field.
pub trait Record: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Editable fields of this record kind.
    type Field: FieldName;

    /// Collection name in the remote store.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    /// Principal the record belongs to.
    fn owner_id(&self) -> &str;

    /// Current value of an editable field.
    fn value(&self, field: Self::Field) -> FieldValue;

    /// Overwrite one editable field, type-checked against its declaration.
    fn apply(&mut self, field: Self::Field, value: FieldValue) -> Result<(), AppError>;

    fn apply_patch(&mut self, patch: &Patch<Self::Field>) -> Result<(), AppError> {
        for (field, value) in patch.iter() {
            self.apply(field, value.clone())?;
        }
        Ok(())
    }
}
