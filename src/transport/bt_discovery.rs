//! BlueZ-backed Bluetooth adapter

use crate::transport::traits::{BluetoothAdapter, FoundEvent, FoundEventSink};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, Address, ErrorKind};
use futures::StreamExt;
use light_remote_shared::{DeviceRecord, SessionError};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Map BlueZ errors onto the session taxonomy where one applies
fn classify(err: bluer::Error) -> anyhow::Error {
    match err.kind {
        ErrorKind::NotAuthorized | ErrorKind::NotPermitted => SessionError::PermissionDenied.into(),
        ErrorKind::NotReady => SessionError::AdapterDisabled.into(),
        _ => anyhow::Error::new(err),
    }
}

/// The default BlueZ adapter
pub struct BluerAdapter {
    adapter: Adapter,
    /// Task draining the BlueZ discovery stream; dropping the stream ends discovery
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl BluerAdapter {
    /// Open the system's default adapter
    pub async fn open_default() -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!(
            "[BT] Using adapter {} (powered: {})",
            adapter.name(),
            adapter.is_powered().await.unwrap_or(false)
        );
        Ok(Self {
            adapter,
            scan_task: Mutex::new(None),
        })
    }

    fn stop_scan_task(&self) -> bool {
        match self.scan_task.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Collect what BlueZ knows about a newly added device
    async fn found_event(adapter: &Adapter, addr: Address) -> FoundEvent {
        let mut event = FoundEvent::new(addr.to_string(), None);
        if let Ok(device) = adapter.device(addr) {
            event.name = device.name().await.ok().flatten();
            event.service_ids = device
                .uuids()
                .await
                .ok()
                .flatten()
                .map(|uuids| uuids.into_iter().collect())
                .unwrap_or_default();
        }
        event
    }

    async fn run_discovery(
        adapter: Adapter,
        sink: FoundEventSink,
        ready: oneshot::Sender<Result<()>>,
    ) {
        // Property changes (names resolved late, new UUIDs) arrive as repeated DeviceAdded
        let discover = match adapter.discover_devices_with_changes().await {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(classify(e)));
                return;
            }
        };
        tokio::pin!(discover);

        while let Some(evt) = discover.next().await {
            if let AdapterEvent::DeviceAdded(addr) = evt {
                let event = Self::found_event(&adapter, addr).await;
                debug!(
                    "[BT] Found {} name={:?} services={:?}",
                    event.address, event.name, event.service_ids
                );
                if sink.send(event).is_err() {
                    break;
                }
            }
        }
        info!("[BT] Discovery stream ended");
    }
}

#[async_trait]
impl BluetoothAdapter for BluerAdapter {
    async fn is_enabled(&self) -> Result<bool> {
        self.adapter.is_powered().await.map_err(classify)
    }

    async fn is_discovering(&self) -> Result<bool> {
        self.adapter.is_discovering().await.map_err(classify)
    }

    async fn start_discovery(&self, sink: FoundEventSink) -> Result<()> {
        if !self.is_enabled().await? {
            return Err(SessionError::AdapterDisabled.into());
        }
        self.stop_scan_task();

        let (ready_tx, ready_rx) = oneshot::channel();
        let adapter = self.adapter.clone();
        let handle = tokio::spawn(Self::run_discovery(adapter, sink, ready_tx));
        *self.scan_task.lock() = Some(handle);

        ready_rx
            .await
            .map_err(|_| anyhow!("Discovery task ended before starting"))?
    }

    async fn cancel_discovery(&self) -> Result<()> {
        if self.stop_scan_task() {
            info!("[BT] Discovery cancelled");
        }
        Ok(())
    }

    async fn bonded_devices(&self) -> Result<Vec<DeviceRecord>> {
        let mut devices = Vec::new();

        for addr in self.adapter.device_addresses().await.map_err(classify)? {
            let device = match self.adapter.device(addr) {
                Ok(device) => device,
                Err(e) => {
                    warn!("[BT] Skipping {}: {}", addr, e);
                    continue;
                }
            };
            if device.is_paired().await.unwrap_or(false) {
                let mut record = DeviceRecord::new(addr.to_string()).paired();
                record.name = device.name().await.ok().flatten();
                devices.push(record);
            }
        }

        Ok(devices)
    }
}

impl Drop for BluerAdapter {
    fn drop(&mut self) {
        self.stop_scan_task();
    }
}
