//! `SQLite` storage for stsvpn.
//!
//! Persists tunnel definitions; the daemon only ever sees them through the
//! rendered config files.

mod db;
mod models;
mod queries;

pub use db::{Database, DatabaseError};
pub use models::*;
