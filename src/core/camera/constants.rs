//! Constants used throughout the camera remote
//! This module contains the protocol constants of the camera remote service,
//! such as UUIDs, advertisement markers, command codes and default timings.

use uuid::Uuid;

/// Manufacturer data prefix of a supported camera:
/// company id 0x012D (little-endian) followed by product type 0x0003 (camera).
pub const CAMERA_MANUFACTURER_LOOKUP: [u8; 4] = [0x2D, 0x01, 0x03, 0x00];

/// Marker byte that precedes the pairing status byte in the manufacturer data
pub const PAIRING_STATUS_MARKER: u8 = 0x22;

/// Pairing status bits
pub const PAIRING_SUPPORTED: u8 = 0x80;
pub const PAIRING_ENABLED: u8 = 0x40;
pub const LOCATION_FUNCTION_SUPPORTED: u8 = 0x20;
pub const LOCATION_FUNCTION_ENABLED: u8 = 0x10;
pub const REMOTE_FUNCTION_ENABLED: u8 = 0x02;

/// The UUID of the camera remote control service
pub const UUID_REMOTE_CONTROL_SERVICE: Uuid = Uuid::from_u128(0x8000ff00_ff00_ffff_ffff_ffffffffffff);

/// The UUID of the command characteristic (0xFF01)
pub const UUID_REMOTE_COMMAND_CHAR: Uuid = Uuid::from_u128(0x0000ff01_0000_1000_8000_00805f9b34fb);

/// The UUID of the status notification characteristic (0xFF02)
pub const UUID_REMOTE_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x0000ff02_0000_1000_8000_00805f9b34fb);

/// Command wire codes, written big-endian to the command characteristic
pub const SHUTTER_RELEASED: u16 = 0x0106;
pub const PRESS_TO_FOCUS: u16 = 0x0107;
pub const HOLD_FOCUS: u16 = 0x0108;
pub const TAKE_PICTURE: u16 = 0x0109;

/// Status notification frame layout
pub const STATUS_FRAME_LEN: usize = 3;
pub const STATUS_FRAME_HEADER: u8 = 0x02;
pub const STATUS_FOCUS: u8 = 0x3F;
pub const STATUS_SHUTTER: u8 = 0xA0;
pub const STATUS_RECORDING: u8 = 0xD5;

/// Status value reported once focus is acquired or the shutter fired
pub const STATUS_ACTIVE: u8 = 0x20;

/// Maximum number of clients the transport keeps at once
pub const MAX_CLIENTS: usize = 3;

/// Scan interval and window in milliseconds
pub const DEFAULT_SCAN_INTERVAL_MS: u16 = 45;
pub const DEFAULT_SCAN_WINDOW_MS: u16 = 15;

/// Scan duration in seconds, 0 scans until stopped
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 0;

/// Timeout for a connection attempt in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Delay between subscribing and the initial release command
pub const SETTLE_DELAY_MS: u64 = 500;

/// Delay between the steps of the trigger sequence
pub const TRIGGER_STEP_DELAY_MS: u64 = 3000;

/// Poll loop tick
pub const POLL_INTERVAL_MS: u64 = 10;

/// Passkey returned to the camera during pairing
pub const DEFAULT_PASSKEY: u32 = 123456;

/// Transmit power in dBm
pub const DEFAULT_TX_POWER_DBM: i8 = 9;
