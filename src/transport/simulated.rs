//! In-memory adapter used in TCP simulation mode and in tests

use crate::transport::traits::{BluetoothAdapter, FoundEvent, FoundEventSink};
use anyhow::Result;
use async_trait::async_trait;
use light_remote_shared::{DeviceRecord, SessionError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Adapter operations, recorded in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterCall {
    StartDiscovery,
    CancelDiscovery,
}

/// Adapter that reports a fixed neighbourhood
pub struct SimulatedAdapter {
    enabled: AtomicBool,
    nearby: Vec<FoundEvent>,
    bonded: Vec<DeviceRecord>,
    sink: Mutex<Option<FoundEventSink>>,
    calls: Mutex<Vec<AdapterCall>>,
}

impl SimulatedAdapter {
    /// Powered adapter that reports `nearby` whenever discovery starts
    pub fn new(nearby: Vec<FoundEvent>, bonded: Vec<DeviceRecord>) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            nearby,
            bonded,
            sink: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Power the simulated radio on or off
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Deliver a found-event as the platform would; dropped when not discovering
    pub fn emit(&self, event: FoundEvent) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    /// Adapter calls made so far
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BluetoothAdapter for SimulatedAdapter {
    async fn is_enabled(&self) -> Result<bool> {
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    async fn is_discovering(&self) -> Result<bool> {
        Ok(self.sink.lock().is_some())
    }

    async fn start_discovery(&self, sink: FoundEventSink) -> Result<()> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(SessionError::AdapterDisabled.into());
        }
        self.calls.lock().push(AdapterCall::StartDiscovery);

        for event in &self.nearby {
            let _ = sink.send(event.clone());
        }
        *self.sink.lock() = Some(sink);
        info!("[SIM] Discovery started ({} nearby)", self.nearby.len());
        Ok(())
    }

    async fn cancel_discovery(&self) -> Result<()> {
        self.calls.lock().push(AdapterCall::CancelDiscovery);
        self.sink.lock().take();
        Ok(())
    }

    async fn bonded_devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.bonded.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_start_reports_nearby_devices() {
        let adapter = SimulatedAdapter::new(vec![FoundEvent::new("AA:BB", Some("HC-06"))], vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        adapter.start_discovery(tx).await.unwrap();
        assert!(adapter.is_discovering().await.unwrap());
        assert_eq!(rx.recv().await.unwrap().address, "AA:BB");

        assert!(adapter.emit(FoundEvent::new("CC:DD", None)));
        assert_eq!(rx.recv().await.unwrap().address, "CC:DD");
    }

    #[tokio::test]
    async fn test_emit_dropped_after_cancel() {
        let adapter = SimulatedAdapter::new(vec![], vec![]);
        let (tx, _rx) = mpsc::unbounded_channel();

        adapter.start_discovery(tx).await.unwrap();
        adapter.cancel_discovery().await.unwrap();

        assert!(!adapter.is_discovering().await.unwrap());
        assert!(!adapter.emit(FoundEvent::new("AA:BB", None)));
        assert_eq!(
            adapter.calls(),
            vec![AdapterCall::StartDiscovery, AdapterCall::CancelDiscovery]
        );
    }

    #[tokio::test]
    async fn test_disabled_adapter_rejects_discovery() {
        let adapter = SimulatedAdapter::new(vec![], vec![]);
        adapter.set_enabled(false);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = adapter.start_discovery(tx).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::AdapterDisabled)
        ));
        assert!(adapter.calls().is_empty());
    }
}
