//! Remote configuration

use crate::transport::FoundEvent;
use anyhow::{anyhow, Context as _, Result};
use light_remote_shared::{DeviceRecord, Uuid, SPP_UUID};
use std::str::FromStr;
use std::time::Duration;

/// Bluetooth transport mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BluetoothMode {
    /// Use real RFCOMM Bluetooth (requires BlueZ)
    Rfcomm,
    /// Use TCP simulation (for development)
    #[default]
    TcpSimulation,
}

impl FromStr for BluetoothMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rfcomm" | "bluetooth" | "bt" => Ok(BluetoothMode::Rfcomm),
            "tcp" | "sim" | "simulation" => Ok(BluetoothMode::TcpSimulation),
            other => Err(anyhow!("Unknown transport mode: {}", other)),
        }
    }
}

/// Bluetooth configuration
#[derive(Debug, Clone)]
pub struct BluetoothConfig {
    /// Bluetooth transport mode
    pub mode: BluetoothMode,
    /// Fixed RFCOMM channel for `service_id`; looked up from the
    /// device's service record when unset
    pub channel: Option<u8>,
    /// Service the remote connects to
    pub service_id: Uuid,
    /// TCP simulation address (when mode is TcpSimulation)
    pub tcp_address: String,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            mode: BluetoothMode::TcpSimulation,
            channel: None,
            service_id: SPP_UUID,
            tcp_address: "127.0.0.1:9000".into(),
        }
    }
}

/// Configuration for the remote
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Bluetooth configuration
    pub bluetooth: BluetoothConfig,
    /// Device to select automatically once it shows up
    pub target_address: Option<String>,
    /// How long to wait for `target_address` before falling back to the list
    pub scan_window: Duration,
    /// Neighbourhood reported by the simulated adapter
    pub simulated_nearby: Vec<FoundEvent>,
    /// Bonded devices reported by the simulated adapter
    pub simulated_bonded: Vec<DeviceRecord>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bluetooth: BluetoothConfig::default(),
            target_address: None,
            scan_window: Duration::from_secs(10),
            simulated_nearby: vec![
                FoundEvent::new("98:D3:31:00:00:01", Some("HC-06")),
                FoundEvent::new("98:D3:31:00:00:02", None),
            ],
            simulated_bonded: vec![DeviceRecord::new("98:D3:31:00:00:01")
                .with_name("HC-06")
                .paired()],
        }
    }
}

impl RemoteConfig {
    /// Defaults overridden by `LIGHT_REMOTE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(mode) = lookup("LIGHT_REMOTE_MODE") {
            config.bluetooth.mode = mode.parse()?;
        }
        if let Some(channel) = lookup("LIGHT_REMOTE_CHANNEL") {
            let parsed = channel
                .trim()
                .parse::<u8>()
                .with_context(|| format!("Invalid RFCOMM channel: {}", channel))?;
            config.bluetooth.channel = Some(parsed);
        }
        if let Some(address) = lookup("LIGHT_REMOTE_TCP_ADDR") {
            config.bluetooth.tcp_address = address;
        }
        if let Some(target) = lookup("LIGHT_REMOTE_TARGET") {
            config.target_address = Some(light_remote_shared::normalize_address(&target));
        }

        Ok(config)
    }
}
