//! # varsity-store
//!
//! Durable entity store for the Varsity portal, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model. Notice attachments are embedded in their notice row as an ordered
//! JSON list; their identity is positional and not stable across structural
//! edits.

pub mod database;
pub mod documents;
pub mod events;
pub mod migrations;
pub mod models;
pub mod notices;
pub mod users;

mod convert;
mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
