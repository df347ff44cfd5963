use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::camera::{
    CONNECT_TIMEOUT_SECS, ConnectionParams, DEFAULT_PASSKEY, DEFAULT_TX_POWER_DBM, MAX_CLIENTS,
    POLL_INTERVAL_MS, SETTLE_DELAY_MS, SessionSettings, TRIGGER_STEP_DELAY_MS,
};

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Link parameters used while connecting
    pub initial_params: ConnectionParams,
    /// Link parameters requested once connected
    pub post_connect_params: ConnectionParams,
    /// How long to wait for a connection to complete
    pub connect_timeout_secs: u64,
    /// Clients the transport may keep at once
    pub max_clients: usize,
    /// Drop links that end up unencrypted after pairing
    pub require_encryption: bool,
    /// Passkey sent to the camera when it asks for one
    pub passkey: u32,
    /// Transmit power in dBm
    pub tx_power_dbm: i8,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            initial_params: ConnectionParams::INITIAL,
            post_connect_params: ConnectionParams::POST_CONNECT,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            max_clients: MAX_CLIENTS,
            require_encryption: true,
            passkey: DEFAULT_PASSKEY,
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
        }
    }
}

/// Fixed delays of the command sequences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after subscribing before the first release command
    pub settle_ms: u64,
    /// Wait between trigger steps
    pub trigger_step_ms: u64,
    /// Poll loop tick
    pub poll_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            settle_ms: SETTLE_DELAY_MS,
            trigger_step_ms: TRIGGER_STEP_DELAY_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
        }
    }
}

impl TimingConfig {
    /// Poll loop tick, at least 1ms
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl ConnectionConfig {
    /// Settings for the connection session
    pub fn session_settings(&self, timing: &TimingConfig) -> SessionSettings {
        SessionSettings {
            initial_params: self.initial_params,
            post_connect_params: self.post_connect_params,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            settle_delay: Duration::from_millis(timing.settle_ms),
            trigger_step_delay: Duration::from_millis(timing.trigger_step_ms),
            require_encryption: self.require_encryption,
            passkey: self.passkey,
        }
    }
}
