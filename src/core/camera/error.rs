//! Errors raised while setting up or using a camera session

use thiserror::Error;
use uuid::Uuid;

use crate::core::camera::types::{PeripheralIdentity, SessionState};

/// Failures of a connection session. None of them is fatal: setup failures
/// end in a disconnect and a rescan, command failures can be retried at once.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no camera selected for connection")]
    NoCandidate,

    #[error("failed to connect to {0}")]
    ConnectFailure(PeripheralIdentity),

    #[error("max clients reached ({0}), no more connections available")]
    ClientLimitReached(usize),

    #[error("service {0} not found")]
    ServiceMissing(Uuid),

    #[error("characteristic {0} not found")]
    CharacteristicMissing(Uuid),

    #[error("characteristic {uuid} cannot {capability}")]
    CharacteristicCapabilityMissing { uuid: Uuid, capability: &'static str },

    #[error("failed to subscribe to {0}")]
    SubscribeFailure(Uuid),

    #[error("link to {0} is not encrypted")]
    EncryptionFailure(PeripheralIdentity),

    #[error("failed to write {0:#06x} to the command characteristic")]
    WriteFailure(u16),

    #[error("session does not accept commands in state {0:?}")]
    NotReady(SessionState),
}
