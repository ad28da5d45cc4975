//! Connection management for the outbound serial link
//!
//! This module handles:
//! - Opening a single RFCOMM (or simulated) stream to a chosen device
//! - Writing single-byte commands
//! - Reporting connect success or failure once

mod config;
mod session;

pub use config::{BluetoothConfig, BluetoothMode, RemoteConfig};
pub use session::{ConnectionEvent, ConnectionSession};
