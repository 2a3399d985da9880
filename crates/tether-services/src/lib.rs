//! tether-services: transports, the discovery registry, the transport
//! manager, and the settlement handshake that ties them together.

pub mod discovery;
pub mod manager;
pub mod settlement;
pub mod transport;

pub use discovery::{DiscoveryClient, DiscoveryError, EntryWithStatus, MemoryDiscovery, Status};
pub use manager::{Manager, SharedManager};
pub use settlement::{SettlementError, SettlementInitiator, SettlementResponder};
pub use transport::{pipe, FramedTransport, Transport, TransportError};
