//! Error taxonomy for discovery and connection sessions

use std::io;
use thiserror::Error;

use crate::state_machine::SessionState;
use crate::{CommandCode, Notice};

/// Errors surfaced at the session boundary
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,

    #[error("Required Bluetooth permissions are not granted")]
    PermissionDenied,

    #[error("Connect to {address} failed: {reason}")]
    ConnectFailure { address: String, reason: String },

    #[error("Write of command {code} failed: {source}")]
    WriteFailure {
        code: CommandCode,
        #[source]
        source: io::Error,
    },

    #[error("Bluetooth adapter error: {0}")]
    Adapter(String),

    #[error("Cannot {operation} while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl SessionError {
    /// Blocking message for errors the user has to resolve outside the app
    pub fn blocking_notice(&self) -> Option<Notice> {
        match self {
            SessionError::AdapterDisabled => Some(Notice::AdapterDisabled),
            SessionError::PermissionDenied => Some(Notice::PermissionDenied),
            _ => None,
        }
    }
}
