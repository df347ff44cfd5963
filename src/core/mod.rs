//! Core functionality for the camera remote bridge
//! This module contains the core functionality for interfacing with the camera

pub mod camera;

// Re-export commonly used types
pub use camera::{BluestTransport, ConnectionSession, ScanOrchestrator};
