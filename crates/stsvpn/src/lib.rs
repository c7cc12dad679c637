//! stsvpn Library
//!
//! Site-to-site IPsec tunnel management on top of strongSwan:
//! - SQLite storage for tunnel definitions
//! - Rendering of `ipsec.conf` / `ipsec.secrets`
//! - Atomic replacement of both files
//! - Control of the daemon through its CLI, with status parsing
//! - Use cases that keep all of the above in step

pub mod cli;
pub mod control;
pub mod form;
pub mod render;
pub mod storage;
pub mod sync;
pub mod writer;
