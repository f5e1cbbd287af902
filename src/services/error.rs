//! Error kinds surfaced by the item services.

use crate::models::item::ItemStatus;
use serde::Serialize;
use std::{fmt, io};
use thiserror::Error;

/// One offending input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every invalid field found while checking one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.field.as_str())
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> ItemResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ItemError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}

/// Persistence failures, from either the database or the image directory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ItemError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("item `{0}` not found")]
    NotFound(String),
    #[error("item `{id}` is not available for collection (status: {status})")]
    InvalidTransition { id: String, status: ItemStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ItemError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.push(field, message);
        Self::Validation(errors)
    }
}

impl From<sqlx::Error> for ItemError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Sqlx(err))
    }
}

impl From<io::Error> for ItemError {
    fn from(err: io::Error) -> Self {
        Self::Store(StoreError::Io(err))
    }
}

pub type ItemResult<T> = Result<T, ItemError>;
