//! Light Remote Shared Types
//!
//! This crate provides the device model, the command alphabet and the
//! session state machine shared by the remote and the simulated light peer.

pub mod error;
pub mod state_machine;

use std::fmt;

pub use error::SessionError;
pub use uuid::Uuid;

/// Serial Port Profile service UUID (HC-06 and most SPP modules)
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// A single command byte written to the light
///
/// The alphabet is open: the peer interprets raw byte values and nothing
/// here restricts which values may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandCode(pub u8);

impl CommandCode {
    pub fn as_byte(self) -> u8 {
        self.0
    }
}

impl From<u8> for CommandCode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Command values observed on the wire
pub mod commands {
    use super::CommandCode;

    /// Sent once right after the link comes up
    pub const INIT: CommandCode = CommandCode(6);

    /// Turn the light on
    pub const POWER_ON: CommandCode = CommandCode(8);

    /// Turn the light off
    pub const POWER_OFF: CommandCode = CommandCode(9);
}

/// A Bluetooth device as seen by discovery or the bonded-device registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceRecord {
    /// Hardware address, upper case (`AA:BB:CC:DD:EE:FF`)
    pub address: String,
    /// Advertised name, if the device reported one
    pub name: Option<String>,
    /// Whether the device is bonded with the local adapter
    pub paired: bool,
}

impl DeviceRecord {
    /// Create a record for an address with no name
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: normalize_address(&address.into()),
            name: None,
            paired: false,
        }
    }

    /// Set the advertised name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark the record as bonded
    pub fn paired(mut self) -> Self {
        self.paired = true;
        self
    }

    /// Name to show in a device list
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Device")
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.display_name(), self.address)?;
        if self.paired {
            write!(f, " (paired)")?;
        }
        Ok(())
    }
}

/// Canonical form of a hardware address
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_uppercase()
}

/// Short user-facing notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Connected,
    ConnectFailed,
    AdapterDisabled,
    PermissionDenied,
    LightOn,
    LightOff,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Notice::Connected => "Connected successfully.",
            Notice::ConnectFailed => "Connection failed.",
            Notice::AdapterDisabled => "Bluetooth is turned off. Enable it and try again.",
            Notice::PermissionDenied => "Please grant all required permissions.",
            Notice::LightOn => "Turning the light on.",
            Notice::LightOff => "Turning the light off.",
        };
        f.write_str(text)
    }
}

/// Screens the remote walks through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    ConnectionPage,
    ConnectionList,
    ControlPage,
}

impl Screen {
    pub fn route(self) -> &'static str {
        match self {
            Screen::ConnectionPage => "connectionPage",
            Screen::ConnectionList => "connectionList",
            Screen::ControlPage => "controlPage",
        }
    }
}
