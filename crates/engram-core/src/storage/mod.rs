//! Storage layer: SQLite metadata backend.
//!
//! One physical store holds every table (memories, vectors, waypoints,
//! temporal facts, coactivation jobs). The user id is conjoined into every
//! scoped statement here, so isolation does not depend on callers
//! remembering to filter.

mod migrations;
mod sqlite;

pub use migrations::{apply_migrations, Migration, MIGRATIONS};
pub use sqlite::Storage;
