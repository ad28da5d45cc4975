//! Discovery session: drives adapter scans and owns the discovered-device set

use crate::transport::{BluetoothAdapter, FoundEvent};
use light_remote_shared::{normalize_address, DeviceRecord, SessionError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type DiscoveredSet = Arc<RwLock<HashMap<String, DeviceRecord>>>;

/// Classify an adapter error at the session boundary
pub(crate) fn session_error(err: anyhow::Error) -> SessionError {
    match err.downcast::<SessionError>() {
        Ok(err) => err,
        Err(err) => match err.downcast_ref::<std::io::Error>() {
            Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                SessionError::PermissionDenied
            }
            _ => SessionError::Adapter(format!("{:#}", err)),
        },
    }
}

/// Owns the scan lifecycle and the set of devices seen during this session
pub struct DiscoverySession {
    adapter: Arc<dyn BluetoothAdapter>,
    discovered: DiscoveredSet,
    event_tx: mpsc::UnboundedSender<FoundEvent>,
    /// Sole writer of `discovered`
    pump: JoinHandle<()>,
}

impl DiscoverySession {
    /// Create a session over `adapter` and start consuming found-events
    pub fn new(adapter: Arc<dyn BluetoothAdapter>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<FoundEvent>();
        let discovered: DiscoveredSet = Arc::new(RwLock::new(HashMap::new()));

        let pump = tokio::spawn(Self::pump_events(event_rx, discovered.clone()));

        Self {
            adapter,
            discovered,
            event_tx,
            pump,
        }
    }

    async fn pump_events(
        mut event_rx: mpsc::UnboundedReceiver<FoundEvent>,
        discovered: DiscoveredSet,
    ) {
        while let Some(event) = event_rx.recv().await {
            Self::insert(&discovered, event.into()).await;
        }
    }

    async fn insert(discovered: &DiscoveredSet, record: DeviceRecord) {
        let mut devices = discovered.write().await;
        match devices.get_mut(&record.address) {
            Some(existing) => {
                if record.name.is_some() && existing.name != record.name {
                    debug!(
                        "[DISCOVERY] {} renamed {:?} -> {:?}",
                        record.address, existing.name, record.name
                    );
                    existing.name = record.name;
                }
                existing.paired |= record.paired;
            }
            None => {
                info!("[DISCOVERY] Found {}", record);
                devices.insert(record.address.clone(), record);
            }
        }
    }

    /// Start a fresh scan, cancelling a running one first
    ///
    /// Failures are logged; the caller is expected to have checked
    /// [`is_enabled`](Self::is_enabled) beforehand.
    pub async fn start_scan(&self) {
        match self.adapter.is_discovering().await {
            Ok(true) => {
                info!("[DISCOVERY] Restarting scan");
                if let Err(e) = self.adapter.cancel_discovery().await {
                    warn!("[DISCOVERY] Failed to cancel running scan: {:#}", e);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("[DISCOVERY] Could not query scan state: {:#}", e),
        }

        match self.adapter.start_discovery(self.event_tx.clone()).await {
            Ok(()) => info!("[DISCOVERY] Scan started"),
            Err(e) => warn!("[DISCOVERY] Scan not started: {}", session_error(e)),
        }
    }

    /// Stop the running scan, keeping everything found so far
    pub async fn cancel_scan(&self) {
        if let Err(e) = self.adapter.cancel_discovery().await {
            warn!("[DISCOVERY] Failed to cancel scan: {:#}", e);
        }
    }

    /// Record a device reported by the platform
    pub async fn on_device_found(&self, record: DeviceRecord) {
        Self::insert(&self.discovered, record).await;
    }

    /// Copy of the discovered set, ordered by address
    pub async fn snapshot(&self) -> Vec<DeviceRecord> {
        let devices = self.discovered.read().await;
        let mut records: Vec<DeviceRecord> = devices.values().cloned().collect();
        records.sort_by(|a, b| a.address.cmp(&b.address));
        records
    }

    /// Devices bonded with the adapter
    pub async fn paired_devices(&self) -> Result<Vec<DeviceRecord>, SessionError> {
        self.adapter.bonded_devices().await.map_err(session_error)
    }

    /// Discovered devices, flagged when they are also bonded
    pub async fn device_list(&self) -> Result<Vec<DeviceRecord>, SessionError> {
        let bonded: HashSet<String> = self
            .paired_devices()
            .await?
            .into_iter()
            .map(|d| normalize_address(&d.address))
            .collect();

        Ok(self
            .snapshot()
            .await
            .into_iter()
            .map(|mut record| {
                record.paired |= bonded.contains(&record.address);
                record
            })
            .collect())
    }

    pub async fn is_enabled(&self) -> Result<bool, SessionError> {
        self.adapter.is_enabled().await.map_err(session_error)
    }

    pub async fn is_scanning(&self) -> Result<bool, SessionError> {
        self.adapter.is_discovering().await.map_err(session_error)
    }

    /// The adapter this session drives, for components that must stop scans
    pub fn adapter(&self) -> Arc<dyn BluetoothAdapter> {
        self.adapter.clone()
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{AdapterCall, SimulatedAdapter};
    use std::time::Duration;

    fn session_with(adapter: SimulatedAdapter) -> (Arc<SimulatedAdapter>, DiscoverySession) {
        let adapter = Arc::new(adapter);
        let session = DiscoverySession::new(adapter.clone());
        (adapter, session)
    }

    /// Wait until the pump has applied `count` distinct devices
    async fn wait_for_devices(session: &DiscoverySession, count: usize) -> Vec<DeviceRecord> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = session.snapshot().await;
                if snapshot.len() >= count {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("devices never arrived")
    }

    #[tokio::test]
    async fn test_repeated_identifiers_deduplicated() {
        let (_adapter, session) = session_with(SimulatedAdapter::new(vec![], vec![]));

        session.on_device_found(DeviceRecord::new("AA:BB")).await;
        session
            .on_device_found(DeviceRecord::new("AA:BB").with_name("HC-05"))
            .await;
        session
            .on_device_found(DeviceRecord::new("aa:bb").with_name("HC-06"))
            .await;
        session.on_device_found(DeviceRecord::new("CC:DD")).await;
        // A nameless sighting does not erase the known name
        session.on_device_found(DeviceRecord::new("AA:BB")).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].address, "AA:BB");
        assert_eq!(snapshot[0].name.as_deref(), Some("HC-06"));
        assert_eq!(snapshot[1].address, "CC:DD");
    }

    #[tokio::test]
    async fn test_found_events_reach_the_set() {
        let (adapter, session) = session_with(SimulatedAdapter::new(
            vec![FoundEvent::new("AA:BB", Some("HC-06"))],
            vec![],
        ));

        session.start_scan().await;
        assert!(adapter.emit(FoundEvent::new("CC:DD", None)));
        assert!(adapter.emit(FoundEvent::new("AA:BB", Some("HC-06"))));

        let snapshot = wait_for_devices(&session, 2).await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].display_name(), "HC-06");
        assert_eq!(snapshot[1].display_name(), "Unknown Device");
    }

    #[tokio::test]
    async fn test_late_name_reaches_the_set() {
        let (adapter, session) = session_with(SimulatedAdapter::new(vec![], vec![]));

        session.start_scan().await;
        assert!(adapter.emit(FoundEvent::new("CC:DD", None)));
        wait_for_devices(&session, 1).await;

        // Name resolved after the first sighting, without a rescan
        assert!(adapter.emit(FoundEvent::new("CC:DD", Some("Lamp"))));
        let named = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = session.snapshot().await;
                if snapshot[0].name.is_some() {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].display_name(), "Lamp");
    }

    #[tokio::test]
    async fn test_restart_cancels_before_starting() {
        let (adapter, session) = session_with(SimulatedAdapter::new(vec![], vec![]));

        session.start_scan().await;
        session.start_scan().await;

        assert_eq!(
            adapter.calls(),
            vec![
                AdapterCall::StartDiscovery,
                AdapterCall::CancelDiscovery,
                AdapterCall::StartDiscovery,
            ]
        );
        assert!(session.is_scanning().await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_on_disabled_adapter_fails_silently() {
        let adapter = SimulatedAdapter::new(vec![FoundEvent::new("AA:BB", None)], vec![]);
        adapter.set_enabled(false);
        let (adapter, session) = session_with(adapter);

        assert!(!session.is_enabled().await.unwrap());
        session.start_scan().await;

        assert!(adapter.calls().is_empty());
        assert!(!session.is_scanning().await.unwrap());
        assert!(session.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_cancel() {
        let (_adapter, session) = session_with(SimulatedAdapter::new(
            vec![FoundEvent::new("AA:BB", Some("HC-06"))],
            vec![],
        ));

        session.start_scan().await;
        wait_for_devices(&session, 1).await;
        session.cancel_scan().await;

        assert!(!session.is_scanning().await.unwrap());
        assert_eq!(session.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let (_adapter, session) = session_with(SimulatedAdapter::new(vec![], vec![]));
        session.on_device_found(DeviceRecord::new("AA:BB")).await;

        let mut snapshot = session.snapshot().await;
        snapshot[0].name = Some("changed".into());
        snapshot.clear();

        let fresh = session.snapshot().await;
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].name, None);
    }

    #[tokio::test]
    async fn test_paired_devices_and_device_list() {
        let bonded = vec![DeviceRecord::new("AA:BB").with_name("HC-06").paired()];
        let (_adapter, session) = session_with(SimulatedAdapter::new(vec![], bonded));

        session.on_device_found(DeviceRecord::new("AA:BB")).await;
        session.on_device_found(DeviceRecord::new("CC:DD")).await;

        let paired = session.paired_devices().await.unwrap();
        assert_eq!(paired.len(), 1);
        assert!(paired[0].paired);

        let list = session.device_list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].paired);
        assert!(!list[1].paired);
    }

    #[tokio::test]
    async fn test_empty_when_no_devices_found() {
        let (_adapter, session) = session_with(SimulatedAdapter::new(vec![], vec![]));
        session.start_scan().await;

        assert!(session.snapshot().await.is_empty());
        assert!(session.paired_devices().await.unwrap().is_empty());
    }

    #[test]
    fn test_session_error_classification() {
        let err = session_error(SessionError::AdapterDisabled.into());
        assert!(matches!(err, SessionError::AdapterDisabled));

        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err = session_error(anyhow::Error::new(io));
        assert!(matches!(err, SessionError::PermissionDenied));

        let err = session_error(anyhow::anyhow!("radio exploded"));
        assert!(matches!(err, SessionError::Adapter(_)));
    }
}
