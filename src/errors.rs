use crate::services::error::ItemError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Per-field details for validation failures.
    pub errors: Option<Value>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            errors: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if let Some(errors) = self.errors {
            body["errors"] = errors;
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<ItemError> for AppError {
    fn from(err: ItemError) -> Self {
        match err {
            ItemError::Validation(fields) => {
                let mut app = AppError::bad_request("validation failed");
                app.errors = serde_json::to_value(&fields).ok();
                app
            }
            ItemError::NotFound(_) => AppError::not_found("Item not found"),
            ItemError::InvalidTransition { .. } => AppError::new(
                StatusCode::CONFLICT,
                "Item is not available for collection",
            ),
            ItemError::Store(store) => {
                tracing::error!("store failure: {}", store);
                AppError::internal("Server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::item::ItemStatus, services::error::FieldErrors};

    #[test]
    fn item_errors_map_to_statuses() {
        let mut fields = FieldErrors::new();
        fields.push("status", "bad");
        let validation = AppError::from(ItemError::Validation(fields));
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            validation.errors,
            Some(json!([{ "field": "status", "message": "bad" }]))
        );

        let missing = AppError::from(ItemError::NotFound("x".into()));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let transition = AppError::from(ItemError::InvalidTransition {
            id: "x".into(),
            status: ItemStatus::Archived,
        });
        assert_eq!(transition.status, StatusCode::CONFLICT);

        let store = AppError::from(ItemError::from(std::io::Error::other("disk full")));
        assert_eq!(store.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.message, "Server error");
    }
}
