//! Platform abstractions for the Bluetooth adapter and byte-stream sockets

use anyhow::Result;
use async_trait::async_trait;
use light_remote_shared::{DeviceRecord, Uuid};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// A device reported by the platform while discovery is active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundEvent {
    /// Hardware address as reported by the platform
    pub address: String,
    /// Advertised name, if any
    pub name: Option<String>,
    /// Service UUIDs the device advertised, if any
    pub service_ids: Vec<Uuid>,
}

impl FoundEvent {
    pub fn new(address: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            address: address.into(),
            name: name.map(str::to_owned),
            service_ids: Vec::new(),
        }
    }
}

impl From<FoundEvent> for DeviceRecord {
    fn from(event: FoundEvent) -> Self {
        let record = DeviceRecord::new(event.address);
        match event.name {
            Some(name) => record.with_name(name),
            None => record,
        }
    }
}

/// Sender half used by adapters to deliver found-events
pub type FoundEventSink = mpsc::UnboundedSender<FoundEvent>;

/// The local Bluetooth adapter
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Whether the radio is powered
    async fn is_enabled(&self) -> Result<bool>;

    /// Whether a discovery cycle is running
    async fn is_discovering(&self) -> Result<bool>;

    /// Start a discovery cycle, delivering found devices into `sink`
    async fn start_discovery(&self, sink: FoundEventSink) -> Result<()>;

    /// Stop the running discovery cycle, if any
    async fn cancel_discovery(&self) -> Result<()>;

    /// Devices bonded with this adapter
    async fn bonded_devices(&self) -> Result<Vec<DeviceRecord>>;
}

/// A transport stream that can read and write bytes
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// Factory for point-to-point connections to a chosen device
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Connect to the service `service_id` on `target`
    async fn connect(&self, target: &DeviceRecord, service_id: Uuid) -> Result<Self::Stream>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
