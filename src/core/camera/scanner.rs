//! Scan orchestration
//! Keeps the radio scanning until a camera ready to pair shows up, hands it to
//! the session, and goes back to scanning whenever the connection fails or
//! drops.

use std::sync::Arc;

use anyhow::Result;
use log::{debug, error, info};

use crate::core::camera::error::SessionError;
use crate::core::camera::link::CameraLink;
use crate::core::camera::session::{ConnectionSession, SessionSettings};
use crate::core::camera::transport::BleTransport;
use crate::core::camera::types::{PeripheralIdentity, ScanParams};

/// What one poll iteration did
#[derive(Debug)]
pub enum PollOutcome {
    /// No connection was requested
    Idle,
    /// Scanning was restarted after a disconnect
    Rescanned,
    /// The requested camera is connected and ready
    Connected(PeripheralIdentity),
    /// The connection attempt failed and scanning resumed
    Failed(SessionError),
}

pub struct ScanOrchestrator<T: BleTransport> {
    transport: Arc<T>,
    link: Arc<CameraLink>,
    session: ConnectionSession<T>,
    scan_params: ScanParams,
}

impl<T: BleTransport> ScanOrchestrator<T> {
    pub fn new(transport: Arc<T>, scan_params: ScanParams, settings: SessionSettings) -> Self {
        let link = CameraLink::new();
        let session = ConnectionSession::new(Arc::clone(&transport), Arc::clone(&link), settings);
        Self {
            transport,
            link,
            session,
            scan_params,
        }
    }

    pub fn session(&self) -> &ConnectionSession<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ConnectionSession<T> {
        &mut self.session
    }

    /// Registers for transport events and starts the first scan
    pub async fn start(&self) -> Result<()> {
        self.transport.set_listener(self.link.clone());
        self.transport.configure_scan(&self.scan_params);
        info!(
            "Scanning: interval {}ms, window {}ms, active {}, duration {}s",
            self.scan_params.interval_ms,
            self.scan_params.window_ms,
            self.scan_params.active,
            self.scan_params.duration_secs
        );
        self.transport.start_scan(self.scan_params.duration()).await
    }

    async fn restart_scan(&self) {
        if let Err(e) = self.transport.start_scan(self.scan_params.duration()).await {
            error!("Failed to restart scan: {}", e);
        }
    }

    /// One iteration of the poll loop: restart the scan after a disconnect,
    /// then consume the connect latch if it is set.
    pub async fn poll(&mut self) -> PollOutcome {
        let rescan = self.link.take_rescan_request();

        let Some(identity) = self.link.take_connect_request() else {
            if rescan {
                self.restart_scan().await;
                return PollOutcome::Rescanned;
            }
            return PollOutcome::Idle;
        };
        if !self.link.accepts_connect() {
            debug!("Dropping connect request for {} while {:?}", identity, self.session.state());
            return PollOutcome::Idle;
        }

        self.transport.stop_scan().await;
        // Advertisements still buffered by the scanner may have re-armed the latch.
        self.link.take_connect_request();

        match self.session.connect(identity.clone()).await {
            Ok(()) => {
                // A disconnect of an earlier link must not restart the scan now.
                self.link.take_rescan_request();
                PollOutcome::Connected(identity)
            }
            Err(e) => {
                error!("Failed to connect. Restarting scan... ({})", e);
                self.link.take_rescan_request();
                self.restart_scan().await;
                PollOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::core::camera::commands::{CameraCommand, CommandSender};
    use crate::core::camera::fake_transport::{FakeBehaviour, FakeTransport};
    use crate::core::camera::types::SessionState;

    const READY_PAYLOAD: [u8; 10] = [0x2D, 0x01, 0x03, 0x00, 0x64, 0x00, 0x45, 0x31, 0x22, 0x42];

    fn camera() -> PeripheralIdentity {
        PeripheralIdentity::new("d8:12:34:ab:cd:ef")
    }

    fn scan_params() -> ScanParams {
        ScanParams {
            duration_secs: 30,
            ..ScanParams::default()
        }
    }

    async fn started(behaviour: FakeBehaviour) -> (Arc<FakeTransport>, ScanOrchestrator<FakeTransport>) {
        let transport = FakeTransport::new(behaviour);
        let orchestrator =
            ScanOrchestrator::new(transport.clone(), scan_params(), SessionSettings::default());
        orchestrator.start().await.unwrap();
        (transport, orchestrator)
    }

    #[tokio::test]
    async fn start_configures_and_scans() {
        let (transport, _orchestrator) = started(FakeBehaviour::default()).await;

        let record = transport.record();
        assert_eq!(record.scan_params, Some(scan_params()));
        assert_eq!(record.scan_starts, vec![Some(Duration::from_secs(30))]);
        assert!(record.scanning);
    }

    #[tokio::test]
    async fn nothing_happens_without_a_ready_camera() {
        let (transport, mut orchestrator) = started(FakeBehaviour::default()).await;
        transport.advertise(&camera(), &[0x2D, 0x01, 0x03, 0x00, 0x22, 0x40]);
        transport.advertise(&camera(), &[0x4C, 0x00, 0x22, 0x42]);

        assert!(matches!(orchestrator.poll().await, PollOutcome::Idle));
        assert_eq!(orchestrator.session().state(), SessionState::Idle);
        assert_eq!(transport.record().scan_stops, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_camera_is_connected_and_takes_pictures() {
        let (transport, mut orchestrator) = started(FakeBehaviour::default()).await;

        transport.advertise(&camera(), &READY_PAYLOAD);
        let outcome = orchestrator.poll().await;

        assert!(matches!(outcome, PollOutcome::Connected(ref id) if *id == camera()));
        assert_eq!(transport.record().scan_stops, 1);
        assert!(!transport.record().scanning);
        assert_eq!(
            orchestrator.session().link().recent_states(),
            vec![
                SessionState::Idle,
                SessionState::Connecting,
                SessionState::BindingCharacteristics,
                SessionState::Subscribing,
                SessionState::Ready,
            ]
        );

        orchestrator
            .session()
            .send_command(CameraCommand::TakePicture)
            .await
            .unwrap();
        assert_eq!(transport.writes().last(), Some(&vec![0x01, 0x09]));
        assert_eq!(orchestrator.session().state(), SessionState::Ready);

        // The latch was consumed.
        assert!(matches!(orchestrator.poll().await, PollOutcome::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_failure_resumes_scanning() {
        let (transport, mut orchestrator) = started(FakeBehaviour {
            subscribe_ok: false,
            ..Default::default()
        })
        .await;

        transport.advertise(&camera(), &READY_PAYLOAD);
        let outcome = orchestrator.poll().await;

        assert!(matches!(outcome, PollOutcome::Failed(SessionError::SubscribeFailure(_))));
        assert_eq!(orchestrator.session().state(), SessionState::Failed);
        let record = transport.record();
        assert_eq!(record.disconnects.len(), 1);
        assert_eq!(
            record.scan_starts,
            vec![Some(Duration::from_secs(30)), Some(Duration::from_secs(30))]
        );
        assert!(record.scanning);
        drop(record);

        // The disconnect during cleanup does not start a second scan.
        assert!(matches!(orchestrator.poll().await, PollOutcome::Idle));
        assert_eq!(transport.record().scan_starts.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_session_recovers_on_next_advertisement() {
        let (transport, mut orchestrator) = started(FakeBehaviour {
            connect_ok: false,
            ..Default::default()
        })
        .await;
        transport.advertise(&camera(), &READY_PAYLOAD);
        assert!(matches!(orchestrator.poll().await, PollOutcome::Failed(_)));

        transport.behaviour.lock().unwrap().connect_ok = true;
        transport.advertise(&camera(), &READY_PAYLOAD);

        assert!(matches!(orchestrator.poll().await, PollOutcome::Connected(_)));
        assert_eq!(orchestrator.session().state(), SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_restarts_the_scan() {
        let (transport, mut orchestrator) = started(FakeBehaviour::default()).await;
        transport.advertise(&camera(), &READY_PAYLOAD);
        orchestrator.poll().await;

        transport.drop_links();

        assert_eq!(orchestrator.session().state(), SessionState::Idle);
        assert!(!orchestrator.session().is_connected());
        assert!(matches!(orchestrator.poll().await, PollOutcome::Rescanned));
        let record = transport.record();
        assert_eq!(record.scan_starts.len(), 2);
        assert_eq!(record.scan_starts[1], Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn late_advertisement_does_not_reconnect_a_ready_session() {
        let (transport, mut orchestrator) = started(FakeBehaviour {
            advertise_on_stop: Some((camera(), READY_PAYLOAD.to_vec())),
            ..Default::default()
        })
        .await;

        transport.advertise(&camera(), &READY_PAYLOAD);
        assert!(matches!(orchestrator.poll().await, PollOutcome::Connected(_)));
        assert!(matches!(orchestrator.poll().await, PollOutcome::Idle));

        let record = transport.record();
        assert_eq!(record.connects.len(), 1);
        assert_eq!(record.subscribers.len(), 1);
        assert_eq!(record.passkeys.len(), 1);
        assert_eq!(record.writes, vec![vec![0x01, 0x06]]);
        drop(record);
        assert_eq!(orchestrator.session().state(), SessionState::Ready);
        assert_eq!(
            orchestrator.session().link().recent_states(),
            vec![
                SessionState::Idle,
                SessionState::Connecting,
                SessionState::BindingCharacteristics,
                SessionState::Subscribing,
                SessionState::Ready,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn link_lost_during_setup_fails_and_rescans_once() {
        let (transport, mut orchestrator) = started(FakeBehaviour {
            drop_on_subscribe: true,
            ..Default::default()
        })
        .await;

        transport.advertise(&camera(), &READY_PAYLOAD);
        let outcome = orchestrator.poll().await;

        assert!(matches!(outcome, PollOutcome::Failed(SessionError::ConnectFailure(_))));
        assert_eq!(orchestrator.session().state(), SessionState::Failed);
        assert!(!orchestrator.session().is_connected());
        assert!(transport.writes().is_empty());
        assert_eq!(transport.record().scan_starts.len(), 2);

        assert!(matches!(orchestrator.poll().await, PollOutcome::Idle));
        assert_eq!(transport.record().scan_starts.len(), 2);
    }
}
