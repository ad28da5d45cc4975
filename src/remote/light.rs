//! Light control on top of a connection session

use crate::connection::{ConnectionEvent, ConnectionSession};
use crate::transport::TransportConnector;
use light_remote_shared::state_machine::SessionState;
use light_remote_shared::{commands, CommandCode, DeviceRecord, Notice, SessionError, Uuid};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Remote for a serial-profile light
///
/// Writes are fire-and-forget: a failed write is logged and the tracked
/// power state still flips, since the light never acknowledges anything.
pub struct LightRemote<C: TransportConnector> {
    session: ConnectionSession<C>,
    power_on: bool,
}

impl<C: TransportConnector> LightRemote<C> {
    /// The light is assumed on until told otherwise
    pub fn new(session: ConnectionSession<C>) -> Self {
        Self {
            session,
            power_on: true,
        }
    }

    /// Carry the power flag over from an earlier link to the same light
    pub fn with_power(mut self, on: bool) -> Self {
        self.power_on = on;
        self
    }

    /// Open the link and send the initialization byte
    pub async fn attach(&mut self, target: &DeviceRecord, service_id: Uuid) -> Result<(), SessionError> {
        self.session.open(target, service_id).await?;
        if let Err(e) = self.session.send(commands::INIT).await {
            warn!("[REMOTE] Init byte not delivered: {}", e);
        }
        Ok(())
    }

    /// Flip the light and report what was requested
    pub async fn toggle(&mut self) -> Notice {
        self.set_power(!self.power_on).await
    }

    pub async fn set_power(&mut self, on: bool) -> Notice {
        let code = if on {
            commands::POWER_ON
        } else {
            commands::POWER_OFF
        };
        if let Err(e) = self.session.send(code).await {
            warn!("[REMOTE] {}", e);
        }
        self.power_on = on;
        info!("[REMOTE] Light {}", if on { "on" } else { "off" });

        if on {
            Notice::LightOn
        } else {
            Notice::LightOff
        }
    }

    /// Send an arbitrary command byte
    pub async fn send_raw(&mut self, code: CommandCode) -> Result<(), SessionError> {
        self.session.send(code).await
    }

    pub fn is_on(&self) -> bool {
        self.power_on
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Take the session's event receiver (can only be called once)
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.session.events()
    }

    pub async fn close(&mut self) {
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryConnector, RefusingConnector};
    use crate::transport::SimulatedAdapter;
    use light_remote_shared::SPP_UUID;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    fn remote<C: TransportConnector>(connector: C) -> LightRemote<C> {
        let adapter = Arc::new(SimulatedAdapter::new(vec![], vec![]));
        LightRemote::new(ConnectionSession::new(Arc::new(connector), adapter))
    }

    #[tokio::test]
    async fn test_attach_sends_init_then_toggles() {
        let (connector, mut peers) = MemoryConnector::new();
        let mut remote = remote(connector);

        remote
            .attach(&DeviceRecord::new("AA:BB").with_name("HC-06"), SPP_UUID)
            .await
            .unwrap();
        assert!(remote.is_on());
        assert_eq!(remote.state(), SessionState::Connected);

        assert_eq!(remote.toggle().await, Notice::LightOff);
        assert!(!remote.is_on());
        assert_eq!(remote.toggle().await, Notice::LightOn);
        remote.send_raw(CommandCode(0x2a)).await.unwrap();

        let mut peer = peers.recv().await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x06, 0x09, 0x08, 0x2a]);

        remote.close().await;
        assert_eq!(remote.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_power_flag_survives_reattach() {
        let (connector, mut peers) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let adapter = Arc::new(SimulatedAdapter::new(vec![], vec![]));
        let target = DeviceRecord::new("AA:BB");

        let mut first = LightRemote::new(ConnectionSession::new(connector.clone(), adapter.clone()));
        first.attach(&target, SPP_UUID).await.unwrap();
        assert_eq!(first.toggle().await, Notice::LightOff);
        first.close().await;

        let mut second = LightRemote::new(ConnectionSession::new(connector, adapter))
            .with_power(first.is_on());
        second.attach(&target, SPP_UUID).await.unwrap();
        assert!(!second.is_on());
        assert_eq!(second.toggle().await, Notice::LightOn);

        let mut buf = [0u8; 2];
        peers.recv().await.unwrap().read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x06, 0x09]);
        peers.recv().await.unwrap().read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x06, 0x08]);
    }

    #[tokio::test]
    async fn test_failed_attach_writes_nothing() {
        let mut remote = remote(RefusingConnector);
        let mut events = remote.events().unwrap();

        let err = remote
            .attach(&DeviceRecord::new("AA:BB"), SPP_UUID)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ConnectFailure { .. }));
        assert_eq!(remote.state(), SessionState::Failed);

        // Toggle on a dead session only logs
        assert_eq!(remote.toggle().await, Notice::LightOff);
        assert!(remote.send_raw(commands::POWER_ON).await.is_err());

        let event = events.try_recv().unwrap();
        assert_eq!(event.notice(), Some(Notice::ConnectFailed));
        assert!(events.try_recv().is_err());
    }
}
