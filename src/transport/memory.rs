//! In-memory connectors for exercising sessions without a radio

use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use light_remote_shared::{DeviceRecord, Uuid};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

#[async_trait]
impl TransportStream for DuplexStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

/// Hands the far end of every connection to the test
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<DuplexStream>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        (Self { peers }, peer_rx)
    }
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _target: &DeviceRecord, _service_id: Uuid) -> Result<Self::Stream> {
        let (near, far) = tokio::io::duplex(64);
        self.peers
            .send(far)
            .map_err(|_| anyhow!("test dropped the peer receiver"))?;
        Ok(near)
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

/// Every connect is refused
pub struct RefusingConnector;

#[async_trait]
impl TransportConnector for RefusingConnector {
    type Stream = DuplexStream;

    async fn connect(&self, target: &DeviceRecord, _service_id: Uuid) -> Result<Self::Stream> {
        Err(anyhow::Error::new(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("{} is unreachable", target.address),
        )))
    }

    fn name(&self) -> &'static str {
        "Refusing"
    }
}

/// Connect never completes
pub struct PendingConnector;

#[async_trait]
impl TransportConnector for PendingConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _target: &DeviceRecord, _service_id: Uuid) -> Result<Self::Stream> {
        std::future::pending().await
    }

    fn name(&self) -> &'static str {
        "Pending"
    }
}

/// Link that stays up but rejects every write
pub struct UnwritableStream;

impl AsyncRead for UnwritableStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for UnwritableStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl TransportStream for UnwritableStream {
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct UnwritableConnector;

#[async_trait]
impl TransportConnector for UnwritableConnector {
    type Stream = UnwritableStream;

    async fn connect(&self, _target: &DeviceRecord, _service_id: Uuid) -> Result<Self::Stream> {
        Ok(UnwritableStream)
    }

    fn name(&self) -> &'static str {
        "Unwritable"
    }
}
