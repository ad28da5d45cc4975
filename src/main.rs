mod connection;
mod discovery;
mod remote;
mod transport;

use anyhow::Result;
use connection::{BluetoothMode, ConnectionEvent, ConnectionSession, RemoteConfig};
use discovery::DiscoverySession;
use light_remote_shared::{CommandCode, DeviceRecord, Notice, Screen, SessionError, Uuid};
use remote::LightRemote;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use transport::{
    BluerAdapter, BluetoothAdapter, RfcommConfig, RfcommConnector, SimulatedAdapter, TcpConnector,
    TransportConnector,
};

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ctrl-C presses from a single process-wide listener
///
/// `tokio::signal::ctrl_c` replaces the default SIGINT behavior for the
/// rest of the process once polled, so every screen has to listen.
struct Interrupts {
    rx: mpsc::UnboundedReceiver<()>,
}

impl Interrupts {
    fn listen() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        Self { rx }
    }

    #[cfg(test)]
    fn channel() -> (mpsc::UnboundedSender<()>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Resolves on the next Ctrl-C; never, once the listener is gone
    async fn recv(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = RemoteConfig::from_env()?;
    info!("Light remote starting ({:?})", config.bluetooth.mode);
    info!("  Service: {}", config.bluetooth.service_id);

    match config.bluetooth.mode {
        BluetoothMode::Rfcomm => {
            let adapter = Arc::new(BluerAdapter::open_default().await?);
            let connector = RfcommConnector::new(RfcommConfig {
                channel: config.bluetooth.channel,
                service_id: config.bluetooth.service_id,
            });
            run(config, adapter, connector).await
        }
        BluetoothMode::TcpSimulation => {
            info!("  Simulated light: {}", config.bluetooth.tcp_address);
            let adapter = Arc::new(SimulatedAdapter::new(
                config.simulated_nearby.clone(),
                config.simulated_bonded.clone(),
            ));
            let connector = TcpConnector::new_simulation(config.bluetooth.tcp_address.clone());
            run(config, adapter, connector).await
        }
    }
}

fn notify(notice: Notice) {
    println!("* {}", notice);
}

fn enter(screen: Screen) {
    info!("[UI] -> {}", screen.route());
}

/// Walk the connection page, device list and control page until the user quits
async fn run<C: TransportConnector>(
    config: RemoteConfig,
    adapter: Arc<dyn BluetoothAdapter>,
    connector: C,
) -> Result<()> {
    let connector = Arc::new(connector);
    let discovery = DiscoverySession::new(adapter);
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut interrupts = Interrupts::listen();

    enter(Screen::ConnectionPage);
    match discovery.is_enabled().await {
        Ok(true) => {}
        Ok(false) => {
            notify(Notice::AdapterDisabled);
            return Ok(());
        }
        Err(e) => match e.blocking_notice() {
            Some(notice) => {
                notify(notice);
                return Ok(());
            }
            None => return Err(e.into()),
        },
    }

    let mut auto_target = config.target_address.clone();
    // Survives reconnects, like the light itself
    let mut light_on = true;

    loop {
        enter(Screen::ConnectionList);
        discovery.start_scan().await;

        let chosen = match auto_target.take() {
            Some(address) => {
                let found = tokio::select! {
                    found = wait_for_target(&discovery, &address, config.scan_window) => found,
                    _ = interrupts.recv() => break,
                };
                match found {
                    Some(record) => Some(record),
                    None => {
                        warn!("{} not seen within {:?}", address, config.scan_window);
                        choose_device(&discovery, &mut input, &mut interrupts).await?
                    }
                }
            }
            None => choose_device(&discovery, &mut input, &mut interrupts).await?,
        };
        let Some(target) = chosen else { break };

        enter(Screen::ControlPage);
        let mut remote = LightRemote::new(ConnectionSession::new(
            connector.clone(),
            discovery.adapter(),
        ))
        .with_power(light_on);
        if let Some(mut events) = remote.events() {
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match (event.notice(), &event) {
                        (Some(notice), _) => notify(notice),
                        (None, ConnectionEvent::Disconnected { reason }) => {
                            println!("* Link closed: {}", reason)
                        }
                        (None, other) => info!("{:?}", other),
                    }
                }
            });
        }

        let service_id = config.bluetooth.service_id;
        match attach_or_interrupt(&mut remote, &target, service_id, &mut interrupts).await {
            Some(Ok(())) => {
                let quit = control(&mut remote, &mut input, &mut interrupts).await?;
                light_on = remote.is_on();
                remote.close().await;
                if quit {
                    break;
                }
            }
            Some(Err(e)) => {
                if let Some(notice) = e.blocking_notice() {
                    notify(notice);
                }
                warn!("Back to device list: {}", e);
                remote.close().await;
            }
            None => {
                info!("Connect to {} abandoned", target.address);
                remote.close().await;
            }
        }
    }

    discovery.cancel_scan().await;
    info!("Light remote stopped");
    Ok(())
}

/// Attach unless Ctrl-C comes first; `None` means the connect was dropped
async fn attach_or_interrupt<C: TransportConnector>(
    remote: &mut LightRemote<C>,
    target: &DeviceRecord,
    service_id: Uuid,
    interrupts: &mut Interrupts,
) -> Option<Result<(), SessionError>> {
    tokio::select! {
        result = remote.attach(target, service_id) => Some(result),
        _ = interrupts.recv() => None,
    }
}

/// Discovered devices first, then bonded devices not seen by this scan
async fn selectable_devices(discovery: &DiscoverySession) -> Vec<DeviceRecord> {
    let mut devices = match discovery.device_list().await {
        Ok(devices) => devices,
        Err(e) => {
            warn!("Paired devices unavailable: {}", e);
            discovery.snapshot().await
        }
    };
    if let Ok(bonded) = discovery.paired_devices().await {
        for record in bonded {
            if !devices.iter().any(|d| d.address == record.address) {
                devices.push(record);
            }
        }
    }
    devices
}

async fn wait_for_target(
    discovery: &DiscoverySession,
    address: &str,
    window: Duration,
) -> Option<DeviceRecord> {
    tokio::time::timeout(window, async {
        loop {
            let devices = selectable_devices(discovery).await;
            if let Some(record) = devices.into_iter().find(|d| d.address == address) {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await
    .ok()
}

async fn print_devices(discovery: &DiscoverySession) -> Vec<DeviceRecord> {
    let devices = selectable_devices(discovery).await;
    if devices.is_empty() {
        println!("  Device Not Found");
    }
    for (index, record) in devices.iter().enumerate() {
        println!("  [{}] {}", index, record);
    }
    devices
}

/// Device list screen; `None` when the user quits
async fn choose_device<R: AsyncBufRead + Unpin>(
    discovery: &DiscoverySession,
    input: &mut Lines<R>,
    interrupts: &mut Interrupts,
) -> Result<Option<DeviceRecord>> {
    println!("Available devices (scan | list | <number> | quit):");
    let mut shown = print_devices(discovery).await;

    loop {
        let line = tokio::select! {
            line = input.next_line() => line?,
            _ = interrupts.recv() => return Ok(None),
        };
        let Some(line) = line else { return Ok(None) };

        match line.trim() {
            "" => {}
            "scan" => {
                discovery.start_scan().await;
                println!("Scanning...");
            }
            "list" | "ls" => shown = print_devices(discovery).await,
            "quit" | "q" => return Ok(None),
            other => match other.parse::<usize>().ok().and_then(|i| shown.get(i)) {
                Some(record) => return Ok(Some(record.clone())),
                None => println!("Unknown command or device: {}", other),
            },
        }
    }
}

/// Control screen; returns true when the user wants to quit entirely
async fn control<C: TransportConnector, R: AsyncBufRead + Unpin>(
    remote: &mut LightRemote<C>,
    input: &mut Lines<R>,
    interrupts: &mut Interrupts,
) -> Result<bool> {
    println!("Light control (toggle | on | off | send <byte> | back | quit):");

    loop {
        let line = tokio::select! {
            line = input.next_line() => line?,
            _ = interrupts.recv() => return Ok(true),
        };
        let Some(line) = line else { return Ok(true) };

        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (None, _) => {}
            (Some("toggle" | "t"), _) => notify(remote.toggle().await),
            (Some("on"), _) => notify(remote.set_power(true).await),
            (Some("off"), _) => notify(remote.set_power(false).await),
            (Some("send"), Some(value)) => match parse_byte(value) {
                Some(byte) => {
                    if let Err(e) = remote.send_raw(CommandCode(byte)).await {
                        warn!("{}", e);
                    }
                }
                None => println!("Not a byte value: {}", value),
            },
            (Some("back" | "b"), _) => return Ok(false),
            (Some("quit" | "q"), _) => return Ok(true),
            (Some(other), _) => println!("Unknown command: {}", other),
        }

        if remote.state().is_terminal() {
            println!("Link lost, back to the device list");
            return Ok(false);
        }
    }
}

/// Decimal (`8`) or hex (`0x08`) byte
fn parse_byte(value: &str) -> Option<u8> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
