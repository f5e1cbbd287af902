//! Core data models for the lost-and-found service.
//!
//! These entities map to SQLite tables via `sqlx::FromRow` and serialize
//! as camelCase JSON via `serde`.

pub mod item;
pub mod user;
