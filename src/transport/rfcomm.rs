//! RFCOMM transport implementation for Bluetooth connections

use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::Address;
use futures::StreamExt;
use light_remote_shared::{DeviceRecord, Uuid, SPP_UUID};
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// RFCOMM stream wrapper implementing TransportStream
pub struct RfcommTransportStream {
    inner: RfcommStream,
    /// Client profile the stream was handed over on; BlueZ tears the
    /// socket down when the profile is unregistered
    _profile: Option<ProfileHandle>,
}

impl RfcommTransportStream {
    /// Create a new RFCOMM transport stream
    pub fn new(stream: RfcommStream, profile: Option<ProfileHandle>) -> Self {
        Self {
            inner: stream,
            _profile: profile,
        }
    }
}

impl AsyncRead for RfcommTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for RfcommTransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl TransportStream for RfcommTransportStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner).await?;
        Ok(())
    }
}

/// Configuration for RFCOMM connector
#[derive(Debug, Clone)]
pub struct RfcommConfig {
    /// Fixed channel for `service_id`; when unset the channel comes from
    /// the peer's service record
    pub channel: Option<u8>,
    /// Service a fixed `channel` belongs to
    pub service_id: Uuid,
}

impl Default for RfcommConfig {
    fn default() -> Self {
        Self {
            channel: None,
            service_id: SPP_UUID,
        }
    }
}

/// How the channel for one connect is found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// BlueZ resolves the service record and hands over the socket
    Service(Uuid),
    /// Dial a channel configured by the user
    Channel(u8),
}

/// RFCOMM connector for serial-profile devices
pub struct RfcommConnector {
    config: RfcommConfig,
    session: OnceCell<bluer::Session>,
}

impl RfcommConnector {
    /// Create a new RFCOMM connector
    pub fn new(config: RfcommConfig) -> Self {
        Self {
            config,
            session: OnceCell::new(),
        }
    }

    /// Parse a record's address into a BlueZ address
    fn target_address(target: &DeviceRecord) -> Result<Address> {
        Address::from_str(&target.address)
            .map_err(|e| anyhow!("Invalid Bluetooth address {}: {}", target.address, e))
    }

    fn route(&self, service_id: Uuid) -> Route {
        match self.config.channel {
            Some(channel) if service_id == self.config.service_id => Route::Channel(channel),
            _ => Route::Service(service_id),
        }
    }

    async fn session(&self) -> Result<&bluer::Session> {
        self.session
            .get_or_try_init(|| async {
                bluer::Session::new()
                    .await
                    .context("Failed to open BlueZ session")
            })
            .await
    }

    /// Let BlueZ look up `service_id` on the device and connect to it
    async fn connect_service(
        &self,
        target_addr: Address,
        service_id: Uuid,
    ) -> Result<RfcommTransportStream> {
        let session = self.session().await?;
        let adapter = session.default_adapter().await?;
        let device = adapter.device(target_addr)?;

        let mut profile = session
            .register_profile(Profile {
                uuid: service_id,
                role: Some(Role::Client),
                require_authentication: Some(false),
                require_authorization: Some(false),
                auto_connect: Some(false),
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to register client profile {}", service_id))?;

        info!("[BT] Connecting to {} service {}", target_addr, service_id);

        // ConnectProfile only returns once the socket was accepted below
        let connect = device.connect_profile(&service_id);
        tokio::pin!(connect);

        let request = tokio::select! {
            biased;
            request = profile.next() => request
                .ok_or_else(|| anyhow!("Profile {} was unregistered", service_id))?,
            result = &mut connect => {
                result.with_context(|| {
                    format!("RFCOMM connect to {} service {} failed", target_addr, service_id)
                })?;
                return Err(anyhow!(
                    "{} connected service {} without handing over a socket",
                    target_addr,
                    service_id
                ));
            }
        };

        let stream = request
            .accept()
            .with_context(|| format!("Failed to accept {} from {}", service_id, target_addr))?;
        if let Err(e) = connect.await {
            debug!("[BT] ConnectProfile reply: {}", e);
        }

        Ok(RfcommTransportStream::new(stream, Some(profile)))
    }

    async fn connect_channel(target_addr: Address, channel: u8) -> Result<RfcommTransportStream> {
        info!("[BT] Connecting to {} channel {}", target_addr, channel);

        let stream = RfcommStream::connect(RfcommAddr::new(target_addr, channel))
            .await
            .with_context(|| format!("RFCOMM connect to {} failed", target_addr))?;

        Ok(RfcommTransportStream::new(stream, None))
    }
}

#[async_trait]
impl TransportConnector for RfcommConnector {
    type Stream = RfcommTransportStream;

    async fn connect(&self, target: &DeviceRecord, service_id: Uuid) -> Result<Self::Stream> {
        let target_addr = Self::target_address(target)?;

        let stream = match self.route(service_id) {
            Route::Service(service_id) => self.connect_service(target_addr, service_id).await?,
            Route::Channel(channel) => Self::connect_channel(target_addr, channel).await?,
        };

        info!("[BT] Connected to {}", target_addr);
        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}
