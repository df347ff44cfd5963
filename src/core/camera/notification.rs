//! Status notification decoding
//! The camera pushes 3-byte status frames on the notify characteristic:
//! `[0x02, selector, value]`, where the selector picks the focus, shutter
//! or recording status.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::core::camera::constants::{
    STATUS_ACTIVE, STATUS_FOCUS, STATUS_FRAME_HEADER, STATUS_FRAME_LEN, STATUS_RECORDING,
    STATUS_SHUTTER,
};

/// Which status field a frame updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    Focus,
    Shutter,
    Recording,
    /// Well-formed frame with a selector we do not track
    Unknown(u8),
}

impl From<u8> for StatusField {
    fn from(selector: u8) -> Self {
        match selector {
            STATUS_FOCUS => Self::Focus,
            STATUS_SHUTTER => Self::Shutter,
            STATUS_RECORDING => Self::Recording,
            other => Self::Unknown(other),
        }
    }
}

/// A decoded status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub field: StatusField,
    pub value: u8,
    pub received_at: DateTime<Utc>,
}

/// Decodes a status frame. Frames of the wrong length or with the wrong
/// header are dropped.
pub fn decode(frame: &[u8]) -> Option<StatusUpdate> {
    match *frame {
        [STATUS_FRAME_HEADER, selector, value] => Some(StatusUpdate {
            field: StatusField::from(selector),
            value,
            received_at: Utc::now(),
        }),
        _ => {
            debug!(
                "Dropping malformed status frame (len {}, expected {}): {:02X?}",
                frame.len(),
                STATUS_FRAME_LEN,
                frame
            );
            None
        }
    }
}

/// Last known camera status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    pub focus: u8,
    pub shutter: u8,
    pub recording: u8,
    pub last_update: Option<DateTime<Utc>>,
}

impl CameraStatus {
    /// Applies a decoded frame. Unknown selectors change no field but still
    /// count as an update.
    pub fn apply(&mut self, update: &StatusUpdate) {
        match update.field {
            StatusField::Focus => self.focus = update.value,
            StatusField::Shutter => self.shutter = update.value,
            StatusField::Recording => self.recording = update.value,
            StatusField::Unknown(selector) => {
                debug!("Ignoring status selector {:#04x} = {:#04x}", selector, update.value);
            }
        }
        self.last_update = Some(update.received_at);
    }

    pub fn focus_acquired(&self) -> bool {
        self.focus == STATUS_ACTIVE
    }

    pub fn shutter_active(&self) -> bool {
        self.shutter == STATUS_ACTIVE
    }
}
