//! Camera remote functionality
//! This module handles all bluetooth operations of the remote: advertisement
//! filtering, connecting to the camera, decoding its status notifications
//! and sending shutter commands.

mod advertisement;
mod bluest_transport;
mod commands;
mod constants;
mod error;
mod link;
mod notification;
mod scanner;
mod session;
mod transport;
mod types;

#[cfg(test)]
mod fake_transport;

// Re-export types that should be publicly accessible
pub use advertisement::{Classification, classify, is_ready_to_pair, is_supported_camera, manufacturer_payload};
pub use bluest_transport::BluestTransport;
pub use commands::{CameraCommand, CommandExecutor, CommandSender};
pub use constants::*; // Re-export all constants
pub use error::SessionError;
pub use link::CameraLink;
pub use notification::{CameraStatus, StatusField, StatusUpdate, decode};
pub use scanner::{PollOutcome, ScanOrchestrator};
pub use session::{ConnectionSession, SessionSettings};
pub use transport::{BleTransport, FixedPasskey, NotifyFn, SecurityResponder, TransportListener};
pub use types::{
    CharacteristicHandle, ClientId, ConnectionParams, PeripheralIdentity, ScanParams,
    ServiceHandle, SessionState,
};
