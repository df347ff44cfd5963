//! Defines shared data structures for the camera module.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::camera::constants::{
    DEFAULT_SCAN_DURATION_SECS, DEFAULT_SCAN_INTERVAL_MS, DEFAULT_SCAN_WINDOW_MS,
};

static MAC_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok());

/// Opaque identity of a discovered peripheral, as handed out by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralIdentity(String);

impl PeripheralIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The MAC address embedded in the platform id, if there is one
    /// (macOS ids are UUIDs and carry none).
    pub fn address(&self) -> Option<String> {
        let re = MAC_ADDRESS.as_ref()?;
        re.find_iter(&self.0)
            .last()
            .map(|m| m.as_str().to_uppercase())
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(address) => f.write_str(&address),
            None => f.write_str(&self.0),
        }
    }
}

/// Handle of a transport client slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

/// Reference to a remote service of a connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub client: ClientId,
    pub uuid: Uuid,
}

/// Reference to a remote characteristic, with its capability flags.
/// Valid until the owning client disconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub client: ClientId,
    pub service: Uuid,
    pub uuid: Uuid,
    pub can_write: bool,
    pub can_notify: bool,
}

/// Connection session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    BindingCharacteristics,
    Subscribing,
    Ready,
    CommandInFlight,
    Disconnecting,
    Failed,
}

impl SessionState {
    /// Whether commands may be issued from this state
    pub fn accepts_commands(self) -> bool {
        matches!(self, Self::Ready | Self::CommandInFlight)
    }

    /// Whether a link to the camera exists in this state
    pub fn is_connected_state(self) -> bool {
        matches!(
            self,
            Self::BindingCharacteristics | Self::Subscribing | Self::Ready | Self::CommandInFlight
        )
    }
}

/// Scan configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParams {
    /// How often to scan, in milliseconds
    pub interval_ms: u16,
    /// How long to listen per interval, in milliseconds
    pub window_ms: u16,
    /// Request scan responses from advertisers
    pub active: bool,
    /// Scan duration in seconds; 0 scans until stopped
    pub duration_secs: u64,
}

impl ScanParams {
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            window_ms: DEFAULT_SCAN_WINDOW_MS,
            active: true,
            duration_secs: DEFAULT_SCAN_DURATION_SECS,
        }
    }
}

/// Link-layer connection parameters.
/// Intervals are in 1.25ms units, the supervision timeout in 10ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

impl ConnectionParams {
    /// 15ms interval, 0 latency, 510ms timeout
    pub const INITIAL: Self = Self::new(12, 12, 0, 51);

    /// 150ms interval, 0 latency, 600ms timeout
    pub const POST_CONNECT: Self = Self::new(120, 120, 0, 60);

    pub const fn new(min_interval: u16, max_interval: u16, latency: u16, supervision_timeout: u16) -> Self {
        Self {
            min_interval,
            max_interval,
            latency,
            supervision_timeout,
        }
    }

    /// Whether a parameter update requested by the peer should be applied
    pub fn is_acceptable_update(&self) -> bool {
        self.min_interval >= 24
            && self.max_interval <= 40
            && self.latency <= 2
            && self.supervision_timeout <= 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_extracted_from_platform_ids() {
        let id = PeripheralIdentity::new("BluetoothLE#BluetoothLEe0:d4:e8:01:02:03-d8:12:34:ab:cd:ef");
        assert_eq!(id.address().as_deref(), Some("D8:12:34:AB:CD:EF"));
        assert_eq!(id.to_string(), "D8:12:34:AB:CD:EF");

        let mac_less = PeripheralIdentity::new("6F1C0E8A-4B61-4AD0-9C3F-2E2D2C1B0A99");
        assert_eq!(mac_less.address(), None);
        assert_eq!(mac_less.to_string(), "6F1C0E8A-4B61-4AD0-9C3F-2E2D2C1B0A99");
    }

    #[test]
    fn peer_parameter_updates_are_bounded() {
        assert!(ConnectionParams::new(24, 40, 2, 100).is_acceptable_update());
        assert!(!ConnectionParams::new(23, 40, 0, 60).is_acceptable_update());
        assert!(!ConnectionParams::new(24, 41, 0, 60).is_acceptable_update());
        assert!(!ConnectionParams::new(24, 40, 3, 60).is_acceptable_update());
        assert!(!ConnectionParams::new(24, 40, 0, 101).is_acceptable_update());
    }

    #[test]
    fn commands_only_from_ready_states() {
        assert!(SessionState::Ready.accepts_commands());
        assert!(SessionState::CommandInFlight.accepts_commands());
        assert!(!SessionState::Idle.accepts_commands());
        assert!(!SessionState::Subscribing.accepts_commands());
        assert!(!SessionState::Failed.accepts_commands());
    }

    #[test]
    fn zero_scan_duration_means_forever() {
        assert_eq!(ScanParams::default().duration(), None);
        let timed = ScanParams {
            duration_secs: 30,
            ..ScanParams::default()
        };
        assert_eq!(timed.duration(), Some(Duration::from_secs(30)));
    }
}
