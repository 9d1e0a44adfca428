//! Durable history of finished games.

mod error;
mod models;
mod repository;

pub use error::{RecordError, RecordErrorKind};
pub use models::{GameRecord, thumbnail_ref};
pub use repository::RecordStore;
