//! Stand-in for an HC-06 driven light
//!
//! Accepts one link at a time over TCP or RFCOMM and applies every received
//! byte to a `LightState`.

mod light;

use anyhow::{Context, Result};
use bluer::rfcomm::{Profile, Role};
use futures::StreamExt;
use light::LightState;
use light_remote_shared::{CommandCode, SPP_UUID};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mode = std::env::var("LIGHT_PEER_MODE").unwrap_or_else(|_| "tcp".to_string());
    let mut light = LightState::default();

    match mode.to_ascii_lowercase().as_str() {
        "rfcomm" => {
            let channel = match std::env::var("LIGHT_PEER_CHANNEL") {
                Ok(value) => value
                    .parse::<u8>()
                    .with_context(|| format!("Invalid LIGHT_PEER_CHANNEL: {}", value))?,
                Err(_) => 1,
            };
            serve_rfcomm(channel, &mut light).await
        }
        "tcp" => {
            let addr =
                std::env::var("LIGHT_PEER_ADDR").unwrap_or_else(|_| "127.0.0.1:9000".to_string());
            serve_tcp(&addr, &mut light).await
        }
        other => anyhow::bail!("Unknown LIGHT_PEER_MODE: {} (expected tcp or rfcomm)", other),
    }
}

async fn serve_tcp(addr: &str, light: &mut LightState) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("[PEER] Listening on tcp://{}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                info!("[PEER] Connection from {}", remote);
                serve_link(stream, light).await;
            }
            Err(e) => {
                error!("[PEER] Accept error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}

async fn serve_rfcomm(channel: u8, light: &mut LightState) -> Result<()> {
    let session = bluer::Session::new().await?;
    let adapter = session.default_adapter().await?;
    if !adapter.is_powered().await? {
        info!("[PEER] Powering on adapter {}", adapter.name());
        adapter.set_powered(true).await?;
    }
    adapter.set_discoverable(true).await?;
    adapter.set_pairable(true).await?;

    // Publishes the SDP record remotes resolve the channel from
    let mut profile = session
        .register_profile(Profile {
            uuid: SPP_UUID,
            name: Some("Light".into()),
            role: Some(Role::Server),
            channel: Some(channel.into()),
            require_authentication: Some(false),
            require_authorization: Some(false),
            ..Default::default()
        })
        .await
        .context("Failed to register serial port profile")?;
    info!(
        "[PEER] Serving {} on RFCOMM channel {} ({})",
        SPP_UUID,
        channel,
        adapter.address().await?
    );

    while let Some(request) = profile.next().await {
        info!("[PEER] Connection from {}", request.device());
        match request.accept() {
            Ok(stream) => serve_link(stream, light).await,
            Err(e) => error!("[PEER] Accept error: {}", e),
        }
    }

    anyhow::bail!("Serial port profile was unregistered")
}

/// Apply bytes until the remote hangs up
async fn serve_link<S: AsyncRead + Unpin>(mut stream: S, light: &mut LightState) {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                info!("[PEER] Remote closed the link");
                break;
            }
            Ok(n) => {
                for byte in &buf[..n] {
                    light.apply(CommandCode(*byte));
                }
            }
            Err(e) => {
                warn!("[PEER] Read error: {}", e);
                break;
            }
        }
    }
}
