//! Transport implementation on top of the `bluest` crate.
//!
//! `bluest` has no callbacks, so scanning, link supervision and notification
//! delivery each run on their own task and report to the registered
//! listener. Link parameters, scan timing and transmit power are owned by the
//! host stack; they are recorded and logged only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bluest::{Adapter, AdvertisingDevice, Characteristic, Device, Service};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::camera::advertisement::manufacturer_payload;
use crate::core::camera::transport::{BleTransport, NotifyFn, SecurityResponder, TransportListener};
use crate::core::camera::types::{
    CharacteristicHandle, ClientId, ConnectionParams, PeripheralIdentity, ScanParams,
    ServiceHandle,
};

const LINK_CHECK_INTERVAL: Duration = Duration::from_millis(500);

type SharedListener = Arc<Mutex<Option<Arc<dyn TransportListener>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn current_listener(listener: &SharedListener) -> Option<Arc<dyn TransportListener>> {
    lock(listener).clone()
}

/// One client slot: a device plus the GATT objects resolved on it
struct ClientSlot {
    identity: Option<PeripheralIdentity>,
    device: Option<Device>,
    connected: Arc<AtomicBool>,
    params: ConnectionParams,
    connect_timeout: Duration,
    refresh_services: bool,
    services: HashMap<Uuid, Service>,
    characteristics: HashMap<Uuid, Characteristic>,
    /// Cancels the link watchdog and notification tasks of the current link
    link_token: CancellationToken,
}

impl ClientSlot {
    fn new() -> Self {
        Self {
            identity: None,
            device: None,
            connected: Arc::new(AtomicBool::new(false)),
            params: ConnectionParams::INITIAL,
            connect_timeout: Duration::from_secs(30),
            refresh_services: true,
            services: HashMap::new(),
            characteristics: HashMap::new(),
            link_token: CancellationToken::new(),
        }
    }
}

pub struct BluestTransport {
    adapter: Adapter,
    listener: SharedListener,
    devices: Arc<Mutex<HashMap<PeripheralIdentity, Device>>>,
    clients: Mutex<HashMap<ClientId, ClientSlot>>,
    next_client: AtomicU32,
    max_clients: usize,
    scan_cancel: Mutex<CancellationToken>,
    scan_task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BluestTransport {
    /// Opens the default adapter and waits until it is powered
    pub async fn new(max_clients: usize) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            listener: Arc::new(Mutex::new(None)),
            devices: Arc::new(Mutex::new(HashMap::new())),
            clients: Mutex::new(HashMap::new()),
            next_client: AtomicU32::new(0),
            max_clients,
            scan_cancel: Mutex::new(CancellationToken::new()),
            scan_task_handle: Mutex::new(None),
        })
    }

    async fn internal_scan_task(
        adapter: Adapter,
        devices: Arc<Mutex<HashMap<PeripheralIdentity, Device>>>,
        listener: SharedListener,
        cancel_token: CancellationToken,
        duration: Option<Duration>,
    ) -> Result<()> {
        info!("Starting bluetooth scan");
        let mut scan_stream = adapter.scan(&[]).await?;

        let deadline = async {
            match duration {
                Some(duration) => sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => Self::handle_advertisement(&devices, &listener, discovered),
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = &mut deadline => {
                    if let Some(listener) = current_listener(&listener) {
                        listener.on_scan_ended();
                    }
                    break;
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_advertisement(
        devices: &Mutex<HashMap<PeripheralIdentity, Device>>,
        listener: &SharedListener,
        discovered: AdvertisingDevice,
    ) {
        let identity = PeripheralIdentity::new(discovered.device.id().to_string());
        let payload = discovered
            .adv_data
            .manufacturer_data
            .as_ref()
            .map(|m| manufacturer_payload(m.company_id, &m.data))
            .unwrap_or_default();
        debug!("Found device - {}, RSSI: {:?}", identity, discovered.rssi);

        lock(devices).insert(identity.clone(), discovered.device);
        if let Some(listener) = current_listener(listener) {
            listener.on_advertisement(&identity, &payload);
        }
    }

    /// Watches a live link and reports its loss
    fn spawn_link_watchdog(&self, device: Device, identity: PeripheralIdentity, connected: Arc<AtomicBool>, token: CancellationToken) {
        let listener = Arc::clone(&self.listener);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sleep(LINK_CHECK_INTERVAL) => {
                        if !device.is_connected().await {
                            connected.store(false, Ordering::SeqCst);
                            if let Some(listener) = current_listener(&listener) {
                                listener.on_disconnect(&identity);
                            }
                            break;
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });
    }

    fn slot_device(&self, client: ClientId) -> Option<(Device, bool)> {
        lock(&self.clients)
            .get(&client)
            .and_then(|slot| slot.device.clone().map(|d| (d, slot.refresh_services)))
    }

    fn characteristic(&self, handle: &CharacteristicHandle) -> Option<(Characteristic, CancellationToken)> {
        lock(&self.clients).get(&handle.client).and_then(|slot| {
            slot.characteristics
                .get(&handle.uuid)
                .cloned()
                .map(|c| (c, slot.link_token.clone()))
        })
    }

    async fn process_notifications(
        characteristic: Characteristic,
        on_notification: NotifyFn,
        subscribed: oneshot::Sender<bool>,
        token: CancellationToken,
    ) {
        let mut notification_stream = match characteristic.notify().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = subscribed.send(false);
                return;
            }
        };
        let _ = subscribed.send(true);
        info!("Listening for camera notifications...");

        loop {
            tokio::select! {
                result = notification_stream.next() => {
                    match result {
                        Some(Ok(value)) => on_notification(&value),
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
                _ = token.cancelled() => break,
            }
        }
        info!("Notification stream ended");
    }
}

#[async_trait]
impl BleTransport for BluestTransport {
    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *lock(&self.listener) = Some(listener);
    }

    fn set_tx_power(&self, dbm: i8) {
        info!("Transmit power {}dBm is managed by the host adapter", dbm);
    }

    fn configure_scan(&self, params: &ScanParams) {
        debug!(
            "Scan interval {}ms / window {}ms (active: {}) are chosen by the host stack",
            params.interval_ms, params.window_ms, params.active
        );
    }

    async fn start_scan(&self, duration: Option<Duration>) -> Result<()> {
        let scanning = lock(&self.scan_task_handle).is_some();
        if scanning {
            self.stop_scan().await;
        }

        let cancel_token = CancellationToken::new();
        *lock(&self.scan_cancel) = cancel_token.clone();

        let adapter = self.adapter.clone();
        let devices = Arc::clone(&self.devices);
        let listener = Arc::clone(&self.listener);
        let handle = tokio::spawn(async move {
            if let Err(e) = Self::internal_scan_task(adapter, devices, listener, cancel_token, duration).await {
                error!("Scan task finished with an error: {:?}", e);
            }
        });
        *lock(&self.scan_task_handle) = Some(handle);

        info!("Device scan task started.");
        Ok(())
    }

    async fn stop_scan(&self) {
        info!("Stopping Bluetooth scan.");
        lock(&self.scan_cancel).cancel();

        let handle = lock(&self.scan_task_handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Scan task finished with an unexpected join error: {:?}", e);
                }
            }
        }
    }

    fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }

    fn max_clients(&self) -> usize {
        self.max_clients
    }

    fn client_by_identity(&self, identity: &PeripheralIdentity) -> Option<ClientId> {
        lock(&self.clients)
            .iter()
            .find(|(_, slot)| slot.identity.as_ref() == Some(identity))
            .map(|(id, _)| *id)
    }

    fn disconnected_client(&self) -> Option<ClientId> {
        lock(&self.clients)
            .iter()
            .find(|(_, slot)| !slot.connected.load(Ordering::SeqCst))
            .map(|(id, _)| *id)
    }

    fn create_client(&self) -> ClientId {
        let id = ClientId(self.next_client.fetch_add(1, Ordering::SeqCst));
        lock(&self.clients).insert(id, ClientSlot::new());
        id
    }

    fn delete_client(&self, client: ClientId) {
        if let Some(slot) = lock(&self.clients).remove(&client) {
            slot.link_token.cancel();
            debug!("Deleted client {:?}", client);
        }
    }

    fn set_connection_params(&self, client: ClientId, params: ConnectionParams) {
        if let Some(slot) = lock(&self.clients).get_mut(&client) {
            slot.params = params;
        }
    }

    fn set_connect_timeout(&self, client: ClientId, connect_timeout: Duration) {
        if let Some(slot) = lock(&self.clients).get_mut(&client) {
            slot.connect_timeout = connect_timeout;
        }
    }

    async fn connect(&self, client: ClientId, identity: &PeripheralIdentity, refresh_services: bool) -> bool {
        let Some(device) = lock(&self.devices).get(identity).cloned() else {
            warn!("Device {} was never discovered", identity);
            return false;
        };
        let Some(connect_timeout) = lock(&self.clients).get(&client).map(|s| s.connect_timeout) else {
            warn!("Unknown client {:?}", client);
            return false;
        };

        info!("Initiating connection to {}...", identity);
        match timeout(connect_timeout, self.adapter.connect_device(&device)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Connection to {} failed: {}", identity, e);
                return false;
            }
            Err(_) => {
                warn!("Connection to {} timed out after {:?}", identity, connect_timeout);
                return false;
            }
        }

        let (connected, token) = {
            let mut clients = lock(&self.clients);
            let Some(slot) = clients.get_mut(&client) else {
                return false;
            };
            slot.link_token.cancel();
            slot.link_token = CancellationToken::new();
            slot.identity = Some(identity.clone());
            slot.device = Some(device.clone());
            slot.refresh_services = refresh_services;
            slot.services.clear();
            slot.characteristics.clear();
            slot.connected.store(true, Ordering::SeqCst);
            (Arc::clone(&slot.connected), slot.link_token.clone())
        };

        self.spawn_link_watchdog(device, identity.clone(), connected, token);
        if let Some(listener) = current_listener(&self.listener) {
            listener.on_connect(identity);
        }
        true
    }

    async fn disconnect(&self, client: ClientId) {
        let target = lock(&self.clients).get(&client).and_then(|slot| {
            slot.link_token.cancel();
            let was_connected = slot.connected.swap(false, Ordering::SeqCst);
            match (&slot.device, &slot.identity) {
                (Some(device), Some(identity)) if was_connected => Some((device.clone(), identity.clone())),
                _ => None,
            }
        });
        let Some((device, identity)) = target else {
            return;
        };

        info!("Disconnecting from device {}", identity);
        if let Err(e) = self.adapter.disconnect_device(&device).await {
            warn!("Disconnect from {} failed: {}", identity, e);
        }
        if let Some(listener) = current_listener(&self.listener) {
            listener.on_disconnect(&identity);
        }
    }

    async fn is_connected(&self, client: ClientId) -> bool {
        match self.slot_device(client) {
            Some((device, _)) => device.is_connected().await,
            None => false,
        }
    }

    async fn update_connection_params(&self, client: ClientId, params: ConnectionParams) {
        debug!("Requested connection parameters {:?} for {:?}", params, client);
        if let Some(slot) = lock(&self.clients).get_mut(&client) {
            slot.params = params;
        }
    }

    async fn secure(&self, client: ClientId, responder: &dyn SecurityResponder) -> bool {
        let Some((device, _)) = self.slot_device(client) else {
            return false;
        };
        if device.is_paired().await.unwrap_or(false) {
            return true;
        }

        info!("Pairing with {}, passkey {:06}", device.id(), responder.passkey());
        if let Err(e) = device.pair().await {
            warn!("Pairing with {} failed: {}", device.id(), e);
            return false;
        }
        device.is_paired().await.unwrap_or(false)
    }

    async fn get_service(&self, client: ClientId, uuid: Uuid) -> Option<ServiceHandle> {
        let (device, refresh) = self.slot_device(client)?;
        let services = if refresh {
            device.discover_services_with_uuid(uuid).await
        } else {
            device.services().await
        };
        let services = match services {
            Ok(services) => services,
            Err(e) => {
                error!("Service discovery failed: {}", e);
                return None;
            }
        };

        let Some(service) = services.iter().find(|s| s.uuid() == uuid).cloned() else {
            for service in &services {
                info!("Available service: {}", service.uuid());
            }
            return None;
        };
        info!("Found remote control service: {}", uuid);

        lock(&self.clients).get_mut(&client)?.services.insert(uuid, service);
        Some(ServiceHandle { client, uuid })
    }

    async fn get_characteristic(&self, service: &ServiceHandle, uuid: Uuid) -> Option<CharacteristicHandle> {
        let remote_service = lock(&self.clients)
            .get(&service.client)
            .and_then(|slot| slot.services.get(&service.uuid).cloned())?;

        let characteristic = match remote_service.characteristics().await {
            Ok(characteristics) => characteristics.into_iter().find(|c| c.uuid() == uuid)?,
            Err(e) => {
                error!("Characteristic discovery failed: {}", e);
                return None;
            }
        };
        let properties = match characteristic.properties().await {
            Ok(properties) => properties,
            Err(e) => {
                error!("Failed to read properties of {}: {}", uuid, e);
                return None;
            }
        };

        lock(&self.clients)
            .get_mut(&service.client)?
            .characteristics
            .insert(uuid, characteristic);
        Some(CharacteristicHandle {
            client: service.client,
            service: service.uuid,
            uuid,
            can_write: properties.write,
            can_notify: properties.notify,
        })
    }

    async fn write_value(&self, handle: &CharacteristicHandle, value: &[u8]) -> bool {
        let Some((characteristic, _)) = self.characteristic(handle) else {
            return false;
        };
        match characteristic.write(value).await {
            Ok(()) => true,
            Err(e) => {
                error!("Write to {} failed: {}", handle.uuid, e);
                false
            }
        }
    }

    async fn subscribe(&self, handle: &CharacteristicHandle, notify: bool, on_notification: NotifyFn) -> bool {
        let Some((characteristic, token)) = self.characteristic(handle) else {
            return false;
        };
        if !notify {
            debug!("Indications are negotiated by the host stack for {}", handle.uuid);
        }

        info!("Subscribing to notifications...");
        let (subscribed_tx, subscribed_rx) = oneshot::channel();
        tokio::spawn(Self::process_notifications(characteristic, on_notification, subscribed_tx, token));
        subscribed_rx.await.unwrap_or(false)
    }
}
