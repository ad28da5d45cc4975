//! Device discovery
//!
//! This module handles:
//! - Starting and restarting adapter scans
//! - Accumulating found-events into a de-duplicated device set
//! - Reporting bonded devices alongside discovered ones

mod session;

pub(crate) use session::session_error;
pub use session::DiscoverySession;
