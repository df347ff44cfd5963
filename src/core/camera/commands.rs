//! Camera remote commands implementation
//! This module contains the commands that can be sent to the camera and the
//! fixed command sequences built from them.

use std::time::Duration;

use log::{info, warn};
use tokio::time::sleep;

use crate::core::camera::constants::{HOLD_FOCUS, PRESS_TO_FOCUS, SHUTTER_RELEASED, TAKE_PICTURE};
use crate::core::camera::error::SessionError;

/// Camera commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraCommand {
    /// Half-press: start focusing (0x0107)
    PressToFocus,
    /// Keep focus locked (0x0108)
    HoldFocus,
    /// Full press: take the picture (0x0109)
    TakePicture,
    /// Release the shutter button (0x0106)
    ShutterReleased,
}

impl CameraCommand {
    /// The 16-bit wire code of the command
    pub fn wire_value(self) -> u16 {
        match self {
            Self::PressToFocus => PRESS_TO_FOCUS,
            Self::HoldFocus => HOLD_FOCUS,
            Self::TakePicture => TAKE_PICTURE,
            Self::ShutterReleased => SHUTTER_RELEASED,
        }
    }

    /// Bytes written to the command characteristic
    pub fn to_bytes(self) -> [u8; 2] {
        self.wire_value().to_be_bytes()
    }
}

/// Raw command ids, as used by input bindings. Anything unknown releases the
/// shutter so that it is never left engaged.
impl From<u8> for CameraCommand {
    fn from(id: u8) -> Self {
        match id {
            0 => Self::PressToFocus,
            1 => Self::HoldFocus,
            2 => Self::TakePicture,
            _ => Self::ShutterReleased,
        }
    }
}

/// Command sender trait
#[async_trait::async_trait]
pub trait CommandSender {
    /// Send a command to the camera
    async fn send_command(&self, command: CameraCommand) -> Result<(), SessionError>;
}

#[async_trait::async_trait]
impl<S: CommandSender + Sync + ?Sized> CommandSender for &S {
    async fn send_command(&self, command: CameraCommand) -> Result<(), SessionError> {
        (**self).send_command(command).await
    }
}

/// Runs the fixed command sequences against a sender
pub struct CommandExecutor<T: CommandSender> {
    command_sender: T,
    step_delay: Duration,
}

impl<T: CommandSender> CommandExecutor<T> {
    /// Create a new CommandExecutor
    pub fn new(command_sender: T, step_delay: Duration) -> Self {
        Self {
            command_sender,
            step_delay,
        }
    }

    /// Take a picture: focus, hold, shoot, release.
    ///
    /// Every step is sent regardless of the focus and shutter status the
    /// camera reports in between, and regardless of earlier failed writes,
    /// so the sequence always ends with a release. Returns the first failure.
    pub async fn trigger(&self) -> Result<(), SessionError> {
        info!("Triggering shutter");
        let mut first_error = None;

        let steps = [
            (CameraCommand::PressToFocus, Duration::ZERO),
            (CameraCommand::HoldFocus, self.step_delay),
            (CameraCommand::TakePicture, self.step_delay),
            (CameraCommand::ShutterReleased, Duration::ZERO),
        ];
        for (command, delay_after) in steps {
            if let Err(e) = self.command_sender.send_command(command).await {
                warn!("Trigger step {:?} failed: {}", command, e);
                first_error.get_or_insert(e);
            }
            if !delay_after.is_zero() {
                sleep(delay_after).await;
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Focus only. Currently just releases the shutter button.
    pub async fn focus(&self) -> Result<(), SessionError> {
        info!("Focus requested");
        self.command_sender.send_command(CameraCommand::ShutterReleased).await
    }

    /// Release the shutter button
    pub async fn release(&self) -> Result<(), SessionError> {
        self.command_sender.send_command(CameraCommand::ShutterReleased).await
    }
}
