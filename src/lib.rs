//! Camera remote bridge library
//! Finds a camera advertising that it is ready to pair, connects to it and
//! drives its shutter over bluetooth.

// Module declarations
pub mod config;
pub mod core;
pub mod logging;
pub mod utils;

pub use crate::config::AppConfig;
pub use crate::core::camera;
