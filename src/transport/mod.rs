pub mod bt_discovery;
#[cfg(test)]
pub mod memory;
pub mod rfcomm;
pub mod simulated;
pub mod tcp;
pub mod traits;

pub use bt_discovery::BluerAdapter;
pub use rfcomm::{RfcommConfig, RfcommConnector, RfcommTransportStream};
pub use simulated::{AdapterCall, SimulatedAdapter};
pub use tcp::{TcpConnector, TcpTransportStream};
pub use traits::{BluetoothAdapter, FoundEvent, FoundEventSink, TransportConnector, TransportStream};
