//! The BLE stack as seen by the camera remote.
//!
//! The session and the scan orchestrator only talk to the radio through
//! [`BleTransport`]. Events flow back through a [`TransportListener`] that is
//! registered once; notifications are delivered to the closure handed to
//! [`BleTransport::subscribe`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::core::camera::types::{
    CharacteristicHandle, ClientId, ConnectionParams, PeripheralIdentity, ScanParams,
    ServiceHandle,
};

/// Callback receiving raw notification values, in arrival order
pub type NotifyFn = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Events raised by the transport on its own tasks
pub trait TransportListener: Send + Sync {
    /// An advertisement was received; `payload` is the manufacturer data
    fn on_advertisement(&self, identity: &PeripheralIdentity, payload: &[u8]);

    /// A client finished connecting to `identity`
    fn on_connect(&self, identity: &PeripheralIdentity);

    /// A client lost its link to `identity`
    fn on_disconnect(&self, identity: &PeripheralIdentity);

    /// A timed scan ran out
    fn on_scan_ended(&self);

    /// The peer asked for new connection parameters. Return true to accept.
    fn on_conn_params_update_request(&self, params: &ConnectionParams) -> bool {
        params.is_acceptable_update()
    }
}

/// Answers pairing prompts
pub trait SecurityResponder: Send + Sync {
    /// Passkey to send to the peer
    fn passkey(&self) -> u32;

    /// Confirm a numeric comparison. Return false if the keys do not match.
    fn confirm_pin(&self, pass_key: u32) -> bool;
}

/// Responds with a fixed passkey and accepts every comparison
#[derive(Debug, Clone, Copy)]
pub struct FixedPasskey(pub u32);

impl SecurityResponder for FixedPasskey {
    fn passkey(&self) -> u32 {
        self.0
    }

    fn confirm_pin(&self, pass_key: u32) -> bool {
        log::info!("The passkey YES/NO number: {:06}", pass_key);
        true
    }
}

/// Scan control, client lifecycle and GATT access of a BLE stack
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Register the receiver of transport events
    fn set_listener(&self, listener: Arc<dyn TransportListener>);

    /// Set the transmit power in dBm
    fn set_tx_power(&self, dbm: i8);

    fn configure_scan(&self, params: &ScanParams);

    /// Start scanning. `None` scans until [`BleTransport::stop_scan`].
    async fn start_scan(&self, duration: Option<Duration>) -> Result<()>;

    async fn stop_scan(&self);

    fn client_count(&self) -> usize;

    fn max_clients(&self) -> usize;

    /// A client that already knows this peripheral
    fn client_by_identity(&self, identity: &PeripheralIdentity) -> Option<ClientId>;

    /// Any client without a live link
    fn disconnected_client(&self) -> Option<ClientId>;

    fn create_client(&self) -> ClientId;

    fn delete_client(&self, client: ClientId);

    fn set_connection_params(&self, client: ClientId, params: ConnectionParams);

    fn set_connect_timeout(&self, client: ClientId, timeout: Duration);

    /// Connect `client` to `identity`. With `refresh_services` unset the
    /// cached service database of a known peripheral is reused.
    async fn connect(&self, client: ClientId, identity: &PeripheralIdentity, refresh_services: bool) -> bool;

    async fn disconnect(&self, client: ClientId);

    async fn is_connected(&self, client: ClientId) -> bool;

    /// Request new parameters on a live link
    async fn update_connection_params(&self, client: ClientId, params: ConnectionParams);

    /// Pair if needed and report whether the link ended up encrypted
    async fn secure(&self, client: ClientId, responder: &dyn SecurityResponder) -> bool;

    async fn get_service(&self, client: ClientId, uuid: Uuid) -> Option<ServiceHandle>;

    async fn get_characteristic(&self, service: &ServiceHandle, uuid: Uuid) -> Option<CharacteristicHandle>;

    async fn write_value(&self, characteristic: &CharacteristicHandle, value: &[u8]) -> bool;

    /// Subscribe to notifications (`notify`) or indications
    async fn subscribe(&self, characteristic: &CharacteristicHandle, notify: bool, on_notification: NotifyFn) -> bool;
}
