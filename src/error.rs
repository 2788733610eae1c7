//! Error handling for the pet registry
//!
//! Store-level failures are defined next to the store (`StoreError`); this
//! module holds the errors the resolution service reports to its callers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::StoreError;

/// Per-field validation messages, keyed by field path
/// (`name`, `group.scientific_name`, `traits.0.name`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(value)` when no errors were recorded
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Errors reported by the pet resolution service
#[derive(Error, Debug)]
pub enum PetError {
    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationErrors),

    #[error("Pet not found: {pet_id}")]
    NotFound { pet_id: i64 },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for PetError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PetNotFound { pet_id } => PetError::NotFound { pet_id },
            other => PetError::Store(other),
        }
    }
}

impl From<ValidationErrors> for PetError {
    fn from(errors: ValidationErrors) -> Self {
        PetError::ValidationFailed(errors)
    }
}

pub type PetResult<T> = Result<T, PetError>;
