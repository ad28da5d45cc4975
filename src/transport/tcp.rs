//! TCP transport used to simulate the RFCOMM link during development

use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use light_remote_shared::{DeviceRecord, Uuid};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::info;

/// TCP stream wrapper implementing TransportStream
pub struct TcpTransportStream {
    inner: TcpStream,
}

impl TcpTransportStream {
    pub fn new(stream: TcpStream) -> Self {
        Self { inner: stream }
    }
}

impl AsyncRead for TcpTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpTransportStream {
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
impl TransportStream for TcpTransportStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner).await?;
        Ok(())
    }
}

/// TCP connector standing in for RFCOMM; every target maps to one address
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    /// Create a connector for a simulated light peer
    pub fn new_simulation(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    type Stream = TcpTransportStream;

    async fn connect(&self, target: &DeviceRecord, service_id: Uuid) -> Result<Self::Stream> {
        info!(
            "[SIM] Connecting to {} service {} via {}",
            target.address, service_id, self.address
        );
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("TCP connect to {} failed", self.address))?;
        Ok(TcpTransportStream::new(stream))
    }

    fn name(&self) -> &'static str {
        "Simulation"
    }
}
