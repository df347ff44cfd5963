//! Scripted in-memory transport for tests

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::core::camera::constants::{
    UUID_REMOTE_COMMAND_CHAR, UUID_REMOTE_CONTROL_SERVICE, UUID_REMOTE_NOTIFY_CHAR,
};
use crate::core::camera::transport::{BleTransport, NotifyFn, SecurityResponder, TransportListener};
use crate::core::camera::types::{
    CharacteristicHandle, ClientId, ConnectionParams, PeripheralIdentity, ScanParams,
    ServiceHandle,
};

/// What the fake camera supports and which steps fail
#[derive(Debug, Clone)]
pub(crate) struct FakeBehaviour {
    pub connect_ok: bool,
    pub encrypted: bool,
    pub has_service: bool,
    pub has_command_char: bool,
    pub has_notify_char: bool,
    pub command_writable: bool,
    pub notify_capable: bool,
    pub subscribe_ok: bool,
    pub write_ok: bool,
    pub max_clients: usize,
    /// Advertisement still delivered while the scan is being stopped
    pub advertise_on_stop: Option<(PeripheralIdentity, Vec<u8>)>,
    /// The camera drops the link right after the subscription succeeds
    pub drop_on_subscribe: bool,
}

impl Default for FakeBehaviour {
    fn default() -> Self {
        Self {
            connect_ok: true,
            encrypted: true,
            has_service: true,
            has_command_char: true,
            has_notify_char: true,
            command_writable: true,
            notify_capable: true,
            subscribe_ok: true,
            write_ok: true,
            max_clients: 3,
            advertise_on_stop: None,
            drop_on_subscribe: false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeClient {
    pub id: ClientId,
    pub identity: Option<PeripheralIdentity>,
    pub connected: bool,
    pub params: Option<ConnectionParams>,
    pub connect_timeout: Option<Duration>,
}

#[derive(Default)]
pub(crate) struct FakeRecord {
    pub tx_power: Option<i8>,
    pub scan_params: Option<ScanParams>,
    pub scanning: bool,
    pub scan_starts: Vec<Option<Duration>>,
    pub scan_stops: usize,
    pub clients: Vec<FakeClient>,
    pub next_client: u32,
    pub connects: Vec<(ClientId, bool)>,
    pub disconnects: Vec<ClientId>,
    pub deleted: Vec<ClientId>,
    pub param_updates: Vec<(ClientId, ConnectionParams)>,
    pub passkeys: Vec<u32>,
    pub writes: Vec<Vec<u8>>,
    pub subscribers: Vec<NotifyFn>,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    pub behaviour: Mutex<FakeBehaviour>,
    record: Mutex<FakeRecord>,
    listener: Mutex<Option<Arc<dyn TransportListener>>>,
}

impl FakeTransport {
    pub fn new(behaviour: FakeBehaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour: Mutex::new(behaviour),
            ..Default::default()
        })
    }

    pub fn record(&self) -> MutexGuard<'_, FakeRecord> {
        self.record.lock().unwrap()
    }

    fn behaviour(&self) -> FakeBehaviour {
        self.behaviour.lock().unwrap().clone()
    }

    fn listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.lock().unwrap().clone()
    }

    /// Deliver an advertisement to the registered listener
    pub fn advertise(&self, identity: &PeripheralIdentity, payload: &[u8]) {
        if let Some(listener) = self.listener() {
            listener.on_advertisement(identity, payload);
        }
    }

    /// Push a status frame to every subscriber
    pub fn notify(&self, frame: &[u8]) {
        let subscribers = self.record().subscribers.clone();
        for subscriber in subscribers {
            subscriber(frame);
        }
    }

    /// The camera drops every link
    pub fn drop_links(&self) {
        let dropped: Vec<PeripheralIdentity> = {
            let mut record = self.record();
            record
                .clients
                .iter_mut()
                .filter(|c| c.connected)
                .filter_map(|c| {
                    c.connected = false;
                    c.identity.clone()
                })
                .collect()
        };
        if let Some(listener) = self.listener() {
            for identity in &dropped {
                listener.on_disconnect(identity);
            }
        }
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.record().writes.clone()
    }

    fn client_connected(&self, client: ClientId) -> bool {
        self.record()
            .clients
            .iter()
            .any(|c| c.id == client && c.connected)
    }
}

#[async_trait]
impl BleTransport for FakeTransport {
    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    fn set_tx_power(&self, dbm: i8) {
        self.record().tx_power = Some(dbm);
    }

    fn configure_scan(&self, params: &ScanParams) {
        self.record().scan_params = Some(params.clone());
    }

    async fn start_scan(&self, duration: Option<Duration>) -> Result<()> {
        let mut record = self.record();
        record.scanning = true;
        record.scan_starts.push(duration);
        Ok(())
    }

    async fn stop_scan(&self) {
        if let Some((identity, payload)) = self.behaviour().advertise_on_stop {
            self.advertise(&identity, &payload);
        }
        let mut record = self.record();
        record.scanning = false;
        record.scan_stops += 1;
    }

    fn client_count(&self) -> usize {
        self.record().clients.len()
    }

    fn max_clients(&self) -> usize {
        self.behaviour().max_clients
    }

    fn client_by_identity(&self, identity: &PeripheralIdentity) -> Option<ClientId> {
        self.record()
            .clients
            .iter()
            .find(|c| c.identity.as_ref() == Some(identity))
            .map(|c| c.id)
    }

    fn disconnected_client(&self) -> Option<ClientId> {
        self.record()
            .clients
            .iter()
            .find(|c| !c.connected)
            .map(|c| c.id)
    }

    fn create_client(&self) -> ClientId {
        let mut record = self.record();
        let id = ClientId(record.next_client);
        record.next_client += 1;
        record.clients.push(FakeClient {
            id,
            identity: None,
            connected: false,
            params: None,
            connect_timeout: None,
        });
        id
    }

    fn delete_client(&self, client: ClientId) {
        let mut record = self.record();
        record.clients.retain(|c| c.id != client);
        record.deleted.push(client);
    }

    fn set_connection_params(&self, client: ClientId, params: ConnectionParams) {
        if let Some(c) = self.record().clients.iter_mut().find(|c| c.id == client) {
            c.params = Some(params);
        }
    }

    fn set_connect_timeout(&self, client: ClientId, timeout: Duration) {
        if let Some(c) = self.record().clients.iter_mut().find(|c| c.id == client) {
            c.connect_timeout = Some(timeout);
        }
    }

    async fn connect(&self, client: ClientId, identity: &PeripheralIdentity, refresh_services: bool) -> bool {
        let connect_ok = self.behaviour().connect_ok;
        {
            let mut record = self.record();
            record.connects.push((client, refresh_services));
            if !connect_ok {
                return false;
            }
            match record.clients.iter_mut().find(|c| c.id == client) {
                Some(c) => {
                    c.connected = true;
                    c.identity = Some(identity.clone());
                }
                None => return false,
            }
        }
        if let Some(listener) = self.listener() {
            listener.on_connect(identity);
        }
        true
    }

    async fn disconnect(&self, client: ClientId) {
        let dropped = {
            let mut record = self.record();
            record.disconnects.push(client);
            record
                .clients
                .iter_mut()
                .find(|c| c.id == client && c.connected)
                .and_then(|c| {
                    c.connected = false;
                    c.identity.clone()
                })
        };
        if let (Some(identity), Some(listener)) = (dropped, self.listener()) {
            listener.on_disconnect(&identity);
        }
    }

    async fn is_connected(&self, client: ClientId) -> bool {
        self.client_connected(client)
    }

    async fn update_connection_params(&self, client: ClientId, params: ConnectionParams) {
        self.record().param_updates.push((client, params));
    }

    async fn secure(&self, _client: ClientId, responder: &dyn SecurityResponder) -> bool {
        self.record().passkeys.push(responder.passkey());
        self.behaviour().encrypted
    }

    async fn get_service(&self, client: ClientId, uuid: Uuid) -> Option<ServiceHandle> {
        let has_service = self.behaviour().has_service;
        (self.client_connected(client) && has_service && uuid == UUID_REMOTE_CONTROL_SERVICE)
            .then_some(ServiceHandle { client, uuid })
    }

    async fn get_characteristic(&self, service: &ServiceHandle, uuid: Uuid) -> Option<CharacteristicHandle> {
        let behaviour = self.behaviour();
        let (present, can_write, can_notify) = match uuid {
            UUID_REMOTE_COMMAND_CHAR => (behaviour.has_command_char, behaviour.command_writable, false),
            UUID_REMOTE_NOTIFY_CHAR => (behaviour.has_notify_char, false, behaviour.notify_capable),
            _ => (false, false, false),
        };
        present.then(|| CharacteristicHandle {
            client: service.client,
            service: service.uuid,
            uuid,
            can_write,
            can_notify,
        })
    }

    async fn write_value(&self, characteristic: &CharacteristicHandle, value: &[u8]) -> bool {
        if !self.behaviour().write_ok || !self.client_connected(characteristic.client) {
            return false;
        }
        self.record().writes.push(value.to_vec());
        true
    }

    async fn subscribe(&self, _characteristic: &CharacteristicHandle, _notify: bool, on_notification: NotifyFn) -> bool {
        let behaviour = self.behaviour();
        if !behaviour.subscribe_ok {
            return false;
        }
        self.record().subscribers.push(on_notification);
        if behaviour.drop_on_subscribe {
            self.drop_links();
        }
        true
    }
}
