//! Connection session: one outbound serial-profile link

use crate::discovery::session_error;
use crate::transport::{BluetoothAdapter, TransportConnector, TransportStream};
use light_remote_shared::state_machine::{SessionEvent, SessionState, SessionStateMachine, TransitionResult};
use light_remote_shared::{CommandCode, DeviceRecord, Notice, SessionError, Uuid};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle shared between the session and its inbound watcher
type SharedFsm = Arc<Mutex<SessionStateMachine>>;

/// Events emitted by a connection session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Stream established
    Connected { address: String },
    /// The single connect attempt failed
    ConnectionFailed { address: String, reason: String },
    /// Link released, by the owner or by the peer
    Disconnected { reason: String },
    /// A command byte could not be written
    WriteFailed { code: CommandCode, reason: String },
}

impl ConnectionEvent {
    /// User-facing notice for this event, if it warrants one
    pub fn notice(&self) -> Option<Notice> {
        match self {
            ConnectionEvent::Connected { .. } => Some(Notice::Connected),
            ConnectionEvent::ConnectionFailed { .. } => Some(Notice::ConnectFailed),
            _ => None,
        }
    }
}

/// Both halves of an open stream
struct Link<S> {
    writer: WriteHalf<S>,
    /// Inbound watcher; hands the read half back when it ends, with
    /// `true` if the peer hung up
    monitor: JoinHandle<(ReadHalf<S>, bool)>,
    stop: oneshot::Sender<()>,
}

/// Map a connector error to the session taxonomy
fn connect_error(target: &DeviceRecord, err: anyhow::Error) -> SessionError {
    match session_error(err) {
        SessionError::Adapter(reason) => SessionError::ConnectFailure {
            address: target.address.clone(),
            reason,
        },
        other => other,
    }
}

/// Drain inbound bytes until stopped or the peer goes away
async fn watch_inbound<S: TransportStream>(
    mut reader: ReadHalf<S>,
    mut stop: oneshot::Receiver<()>,
    address: String,
    fsm: SharedFsm,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
) -> (ReadHalf<S>, bool) {
    let mut buf = [0u8; 64];

    let reason = loop {
        tokio::select! {
            _ = &mut stop => return (reader, false),
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    info!("[SESSION] {} closed the link", address);
                    break "Peer closed connection".to_string();
                }
                Ok(n) => debug!("[SESSION] {} sent {:02x?}", address, &buf[..n]),
                Err(e) => {
                    warn!("[SESSION] Read from {} failed: {}", address, e);
                    break format!("Read error: {}", e);
                }
            }
        }
    };

    let transition = fsm.lock().process_event(SessionEvent::PeerClosed);
    if let TransitionResult::Success(_) = transition {
        let _ = event_tx.send(ConnectionEvent::Disconnected { reason });
    }
    (reader, true)
}

/// Holds at most one connection to a chosen device
pub struct ConnectionSession<C: TransportConnector> {
    connector: Arc<C>,
    /// Discovery is cancelled through this before connecting
    adapter: Arc<dyn BluetoothAdapter>,
    fsm: SharedFsm,
    target: Option<DeviceRecord>,
    link: Option<Link<C::Stream>>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
}

impl<C: TransportConnector> ConnectionSession<C> {
    /// Create an idle session
    pub fn new(connector: Arc<C>, adapter: Arc<dyn BluetoothAdapter>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            adapter,
            fsm: Arc::new(Mutex::new(SessionStateMachine::new())),
            target: None,
            link: None,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.event_rx.take()
    }

    /// Current state; becomes Closed as soon as the peer hangs up
    pub fn state(&self) -> SessionState {
        self.fsm.lock().state()
    }

    /// The device this session was opened against
    pub fn target(&self) -> Option<&DeviceRecord> {
        self.target.as_ref()
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Connect to `service_id` on `target`; a single attempt, no retry
    ///
    /// Dropping the returned future cancels the connect; call
    /// [`close`](Self::close) afterwards to release the session.
    pub async fn open(&mut self, target: &DeviceRecord, service_id: Uuid) -> Result<(), SessionError> {
        let transition = self.fsm.lock().process_event(SessionEvent::OpenRequested);
        if let TransitionResult::Invalid { from, .. } = transition {
            return Err(SessionError::InvalidState {
                operation: "open",
                state: from,
            });
        }
        self.target = Some(target.clone());

        // Scanning and connecting must not overlap
        if let Err(e) = self.adapter.cancel_discovery().await {
            warn!("[SESSION] Could not cancel discovery: {:#}", e);
        }

        info!(
            "[SESSION] Opening {} via {} (service {})",
            target,
            self.connector.name(),
            service_id
        );

        match self.connector.connect(target, service_id).await {
            Ok(stream) => {
                // Connected before the watcher can report a hang-up
                self.fsm.lock().process_event(SessionEvent::ConnectSucceeded);

                let (reader, writer) = tokio::io::split(stream);
                let (stop, stop_rx) = oneshot::channel();
                let monitor = tokio::spawn(watch_inbound(
                    reader,
                    stop_rx,
                    target.address.clone(),
                    self.fsm.clone(),
                    self.event_tx.clone(),
                ));
                self.link = Some(Link {
                    writer,
                    monitor,
                    stop,
                });

                info!("[SESSION] Connected to {}", target.address);
                self.emit(ConnectionEvent::Connected {
                    address: target.address.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.fsm.lock().process_event(SessionEvent::ConnectFailed);
                let err = connect_error(target, e);
                error!("[SESSION] {}", err);
                self.emit(ConnectionEvent::ConnectionFailed {
                    address: target.address.clone(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Write exactly one command byte
    pub async fn send(&mut self, code: CommandCode) -> Result<(), SessionError> {
        let state = self.state();
        let link = match self.link.as_mut() {
            Some(link) if state.can_send() => link,
            _ => {
                return Err(SessionError::InvalidState {
                    operation: "send",
                    state,
                })
            }
        };

        let mut result = link.writer.write_all(&[code.as_byte()]).await;
        if result.is_ok() {
            result = link.writer.flush().await;
        }

        match result {
            Ok(()) => {
                debug!("[SESSION] Sent {}", code);
                Ok(())
            }
            Err(source) => {
                warn!("[SESSION] Write of {} failed: {}", code, source);
                self.emit(ConnectionEvent::WriteFailed {
                    code,
                    reason: source.to_string(),
                });
                Err(SessionError::WriteFailure { code, source })
            }
        }
    }

    /// Release the socket and both streams; safe to call repeatedly
    pub async fn close(&mut self) {
        let previous = self.state();
        let link = self.link.take();
        if previous == SessionState::Closed && link.is_none() {
            return;
        }
        self.fsm.lock().process_event(SessionEvent::CloseRequested);

        if let Some(link) = link {
            let _ = link.stop.send(());
            match link.monitor.await {
                Ok((reader, peer_closed)) => {
                    let mut stream = reader.unsplit(link.writer);
                    if let Err(e) = TransportStream::shutdown(&mut stream).await {
                        debug!("[SESSION] Shutdown: {:#}", e);
                    }
                    // A hang-up was already reported by the watcher
                    if !peer_closed {
                        self.emit(ConnectionEvent::Disconnected {
                            reason: "Closed by user".into(),
                        });
                    }
                }
                Err(e) => debug!("[SESSION] Inbound watcher ended abnormally: {}", e),
            }
        }

        info!("[SESSION] Closed (was {:?})", previous);
    }
}

impl<C: TransportConnector> Drop for ConnectionSession<C> {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.monitor.abort();
        }
    }
}
