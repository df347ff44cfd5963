//! Camera connection session
//! Drives one camera from a selected advertisement to a ready command link:
//! connect, bind the remote control characteristics, subscribe to status
//! frames, then accept commands until the link drops.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::time::sleep;

use crate::core::camera::commands::{CameraCommand, CommandExecutor, CommandSender};
use crate::core::camera::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_PASSKEY, SETTLE_DELAY_MS, TRIGGER_STEP_DELAY_MS,
    UUID_REMOTE_COMMAND_CHAR, UUID_REMOTE_CONTROL_SERVICE, UUID_REMOTE_NOTIFY_CHAR,
};
use crate::core::camera::error::SessionError;
use crate::core::camera::link::CameraLink;
use crate::core::camera::notification::CameraStatus;
use crate::core::camera::transport::{BleTransport, FixedPasskey};
use crate::core::camera::types::{
    CharacteristicHandle, ClientId, ConnectionParams, PeripheralIdentity, SessionState,
};

/// Fixed parameters of the connection sequence
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub initial_params: ConnectionParams,
    pub post_connect_params: ConnectionParams,
    pub connect_timeout: Duration,
    /// Wait between subscribing and the initial release command
    pub settle_delay: Duration,
    /// Wait between the steps of the trigger sequence
    pub trigger_step_delay: Duration,
    pub require_encryption: bool,
    pub passkey: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            initial_params: ConnectionParams::INITIAL,
            post_connect_params: ConnectionParams::POST_CONNECT,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            trigger_step_delay: Duration::from_millis(TRIGGER_STEP_DELAY_MS),
            require_encryption: true,
            passkey: DEFAULT_PASSKEY,
        }
    }
}

/// State machine of one camera connection
pub struct ConnectionSession<T: BleTransport> {
    transport: Arc<T>,
    link: Arc<CameraLink>,
    settings: SessionSettings,
    client: Option<ClientId>,
    command_char: Option<CharacteristicHandle>,
}

impl<T: BleTransport> ConnectionSession<T> {
    pub fn new(transport: Arc<T>, link: Arc<CameraLink>, settings: SessionSettings) -> Self {
        Self {
            transport,
            link,
            settings,
            client: None,
            command_char: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn status(&self) -> CameraStatus {
        self.link.status()
    }

    pub fn link(&self) -> &Arc<CameraLink> {
        &self.link
    }

    /// Connects to `identity` and brings the session to `Ready`.
    ///
    /// Every failure releases the client (disconnect, or delete if it never
    /// connected) and leaves the session in `Failed`.
    pub async fn connect(&mut self, identity: PeripheralIdentity) -> Result<(), SessionError> {
        if self.state() == SessionState::Failed {
            self.link.transition(SessionState::Idle);
        }
        self.command_char = None;
        self.link.transition(SessionState::Connecting);

        let client = match self.acquire_client(&identity).await {
            Ok(client) => client,
            Err(e) => {
                error!("Connection to {} failed: {}", identity, e);
                self.client = None;
                self.link.transition(SessionState::Failed);
                return Err(e);
            }
        };
        self.client = Some(client);

        if let Err(e) = self.setup(client, &identity).await {
            error!("Setting up {} failed: {}", identity, e);
            self.command_char = None;
            self.link.transition(SessionState::Disconnecting);
            self.transport.disconnect(client).await;
            self.link.transition(SessionState::Failed);
            return Err(e);
        }

        info!("Success! Camera {} is ready for commands", identity);
        Ok(())
    }

    /// Finds a client for `identity` and connects it
    async fn acquire_client(&self, identity: &PeripheralIdentity) -> Result<ClientId, SessionError> {
        let transport = &self.transport;
        let mut client = None;

        if transport.client_count() > 0 {
            // A client that already knows the camera skips service discovery.
            if let Some(known) = transport.client_by_identity(identity) {
                if !transport.connect(known, identity, false).await {
                    warn!("Reconnect to {} failed", identity);
                    transport.delete_client(known);
                    return Err(SessionError::ConnectFailure(identity.clone()));
                }
                info!("Reconnected client");
                client = Some(known);
            } else {
                client = transport.disconnected_client();
            }
        }

        let client = match client {
            Some(client) => client,
            None => {
                let max_clients = transport.max_clients();
                if transport.client_count() >= max_clients {
                    return Err(SessionError::ClientLimitReached(max_clients));
                }

                let client = transport.create_client();
                info!("New client created");
                transport.set_connection_params(client, self.settings.initial_params);
                transport.set_connect_timeout(client, self.settings.connect_timeout);

                if !transport.connect(client, identity, true).await {
                    // A fresh client holds no data worth keeping.
                    transport.delete_client(client);
                    warn!("Failed to connect, deleted client");
                    return Err(SessionError::ConnectFailure(identity.clone()));
                }
                client
            }
        };

        if !transport.is_connected(client).await && !transport.connect(client, identity, true).await {
            transport.delete_client(client);
            warn!("Failed to connect to {}", identity);
            return Err(SessionError::ConnectFailure(identity.clone()));
        }

        transport
            .update_connection_params(client, self.settings.post_connect_params)
            .await;
        Ok(client)
    }

    /// Secures the link, binds the characteristics and subscribes
    async fn setup(&mut self, client: ClientId, identity: &PeripheralIdentity) -> Result<(), SessionError> {
        let transport = Arc::clone(&self.transport);

        if self.settings.require_encryption {
            let responder = FixedPasskey(self.settings.passkey);
            if !transport.secure(client, &responder).await {
                error!("Encrypt connection failed - disconnecting");
                return Err(SessionError::EncryptionFailure(identity.clone()));
            }
        }

        self.advance(identity, SessionState::Connecting, SessionState::BindingCharacteristics)?;

        let service = transport
            .get_service(client, UUID_REMOTE_CONTROL_SERVICE)
            .await
            .ok_or(SessionError::ServiceMissing(UUID_REMOTE_CONTROL_SERVICE))?;
        let command_char = transport
            .get_characteristic(&service, UUID_REMOTE_COMMAND_CHAR)
            .await
            .ok_or(SessionError::CharacteristicMissing(UUID_REMOTE_COMMAND_CHAR))?;
        let notify_char = transport
            .get_characteristic(&service, UUID_REMOTE_NOTIFY_CHAR)
            .await
            .ok_or(SessionError::CharacteristicMissing(UUID_REMOTE_NOTIFY_CHAR))?;

        if !command_char.can_write {
            return Err(SessionError::CharacteristicCapabilityMissing {
                uuid: command_char.uuid,
                capability: "write",
            });
        }
        info!("{} can write!", command_char.uuid);

        if !notify_char.can_notify {
            return Err(SessionError::CharacteristicCapabilityMissing {
                uuid: notify_char.uuid,
                capability: "notify",
            });
        }
        info!("{} can notify!", notify_char.uuid);

        self.advance(identity, SessionState::BindingCharacteristics, SessionState::Subscribing)?;

        if !transport
            .subscribe(&notify_char, true, self.link.notification_sink())
            .await
        {
            return Err(SessionError::SubscribeFailure(notify_char.uuid));
        }

        // Put the camera in a known shutter state.
        sleep(self.settings.settle_delay).await;
        if self.state() != SessionState::Subscribing || !self.is_connected() {
            warn!("{} dropped the link while settling", identity);
            return Err(SessionError::ConnectFailure(identity.clone()));
        }
        let release = CameraCommand::ShutterReleased;
        if !transport.write_value(&command_char, &release.to_bytes()).await {
            warn!("Initial {:#06x} write failed", release.wire_value());
        }

        self.command_char = Some(command_char);
        self.advance(identity, SessionState::Subscribing, SessionState::Ready)
    }

    /// Moves the state on, unless a disconnect has reset it in the meantime
    fn advance(&self, identity: &PeripheralIdentity, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.link.transition_from(from, to) {
            Ok(())
        } else {
            warn!("{} dropped the link while {:?}", identity, from);
            Err(SessionError::ConnectFailure(identity.clone()))
        }
    }

    /// Closes the link to the camera
    pub async fn disconnect(&mut self) {
        self.command_char = None;
        let Some(client) = self.client else {
            self.link.transition(SessionState::Idle);
            return;
        };

        if self.transport.is_connected(client).await {
            self.link.transition(SessionState::Disconnecting);
            self.transport.disconnect(client).await;
        } else {
            self.link.transition(SessionState::Idle);
        }
    }

    /// Runs the trigger sequence
    pub async fn trigger(&self) -> Result<(), SessionError> {
        self.executor().trigger().await
    }

    /// Runs the focus operation
    pub async fn focus(&self) -> Result<(), SessionError> {
        self.executor().focus().await
    }

    pub async fn release(&self) -> Result<(), SessionError> {
        self.executor().release().await
    }

    fn executor(&self) -> CommandExecutor<&Self> {
        CommandExecutor::new(self, self.settings.trigger_step_delay)
    }
}

#[async_trait::async_trait]
impl<T: BleTransport> CommandSender for ConnectionSession<T> {
    async fn send_command(&self, command: CameraCommand) -> Result<(), SessionError> {
        let state = self.state();
        let command_char = match &self.command_char {
            Some(chr) if state.accepts_commands() && self.is_connected() && chr.can_write => chr,
            _ => return Err(SessionError::NotReady(state)),
        };

        let value = command.wire_value();
        self.link.transition_from(SessionState::Ready, SessionState::CommandInFlight);
        let written = self.transport.write_value(command_char, &command.to_bytes()).await;
        self.link.transition_from(SessionState::CommandInFlight, SessionState::Ready);

        if written {
            info!("Wrote new value {:#06x} to: {}", value, command_char.uuid);
            Ok(())
        } else {
            warn!("Write of {:#06x} to {} failed", value, command_char.uuid);
            Err(SessionError::WriteFailure(value))
        }
    }
}
