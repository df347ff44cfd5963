//! Advertisement classification
//! Decides from raw manufacturer data whether a peripheral is a supported
//! camera and whether it is currently open for pairing.

use crate::core::camera::constants::{
    CAMERA_MANUFACTURER_LOOKUP, PAIRING_ENABLED, PAIRING_STATUS_MARKER, REMOTE_FUNCTION_ENABLED,
};

/// Outcome of looking at one advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Not a supported camera, ignored silently
    Mismatch,
    /// A supported camera that does not accept pairing right now
    PairingNotReady,
    /// A supported camera ready to pair
    Ready,
}

/// Rebuilds the manufacturer payload as sent over the air: the company id
/// little-endian, followed by the manufacturer specific bytes.
pub fn manufacturer_payload(company_id: u16, data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(data.len() + 2);
    payload.extend_from_slice(&company_id.to_le_bytes());
    payload.extend_from_slice(data);
    payload
}

/// Returns true if the payload starts with the camera manufacturer identity.
/// Payloads shorter than the identity are rejected.
pub fn is_supported_camera(payload: &[u8]) -> bool {
    payload.len() >= CAMERA_MANUFACTURER_LOOKUP.len()
        && payload[..CAMERA_MANUFACTURER_LOOKUP.len()] == CAMERA_MANUFACTURER_LOOKUP
}

/// Returns true if the camera is open for pairing: the byte after the first
/// pairing status marker has both the pairing and remote function bits set.
pub fn is_ready_to_pair(payload: &[u8]) -> bool {
    const REQUIRED: u8 = PAIRING_ENABLED | REMOTE_FUNCTION_ENABLED;

    payload
        .iter()
        .position(|&b| b == PAIRING_STATUS_MARKER)
        .and_then(|marker| payload.get(marker + 1))
        .is_some_and(|&status| status & REQUIRED == REQUIRED)
}

pub fn classify(payload: &[u8]) -> Classification {
    if !is_supported_camera(payload) {
        Classification::Mismatch
    } else if is_ready_to_pair(payload) {
        Classification::Ready
    } else {
        Classification::PairingNotReady
    }
}
