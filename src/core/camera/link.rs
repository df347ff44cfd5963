//! State shared between the transport callbacks and the poll loop.
//!
//! Each field has one writer: the advertisement callback sets the connect
//! latch, the connect/disconnect callbacks own the connected flag, and the
//! notification closure owns the camera status. The poll loop only takes
//! the latches and reads the rest.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::core::camera::advertisement::{Classification, classify};
use crate::core::camera::notification::{CameraStatus, decode};
use crate::core::camera::transport::{NotifyFn, TransportListener};
use crate::core::camera::types::{PeripheralIdentity, SessionState};

const STATE_HISTORY_LEN: usize = 16;

/// Shared inbox of one camera connection
pub struct CameraLink {
    connected: AtomicBool,
    connect_requested: AtomicBool,
    rescan_requested: AtomicBool,
    candidate: Mutex<Option<PeripheralIdentity>>,
    state: Mutex<SessionState>,
    history: Mutex<VecDeque<SessionState>>,
    status: Mutex<CameraStatus>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CameraLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            connect_requested: AtomicBool::new(false),
            rescan_requested: AtomicBool::new(false),
            candidate: Mutex::new(None),
            state: Mutex::new(SessionState::Idle),
            history: Mutex::new(VecDeque::from([SessionState::Idle])),
            status: Mutex::new(CameraStatus::default()),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Moves to `to` and records the transition
    pub fn transition(&self, to: SessionState) {
        let mut state = lock(&self.state);
        let from = std::mem::replace(&mut *state, to);
        self.record_transition(from, to);
    }

    /// Moves to `to` only if the current state is still `expected`.
    /// The check and the move happen under one lock, so a concurrent
    /// disconnect either wins or is applied afterwards.
    pub fn transition_from(&self, expected: SessionState, to: SessionState) -> bool {
        let mut state = lock(&self.state);
        if *state != expected {
            return false;
        }
        *state = to;
        self.record_transition(expected, to);
        true
    }

    // Called with the state lock held so history follows the state order.
    fn record_transition(&self, from: SessionState, to: SessionState) {
        if from != to {
            debug!("Session state {:?} -> {:?}", from, to);
        }
        let mut history = lock(&self.history);
        if history.len() == STATE_HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(to);
    }

    /// Whether a new connection attempt may start from the current state
    pub fn accepts_connect(&self) -> bool {
        matches!(self.state(), SessionState::Idle | SessionState::Failed)
    }

    /// Most recent state transitions, oldest first
    pub fn recent_states(&self) -> Vec<SessionState> {
        lock(&self.history).iter().copied().collect()
    }

    pub fn status(&self) -> CameraStatus {
        lock(&self.status).clone()
    }

    /// Takes the connect latch together with the selected peripheral
    pub fn take_connect_request(&self) -> Option<PeripheralIdentity> {
        if !self.connect_requested.swap(false, Ordering::SeqCst) {
            return None;
        }
        lock(&self.candidate).clone()
    }

    pub fn take_rescan_request(&self) -> bool {
        self.rescan_requested.swap(false, Ordering::SeqCst)
    }

    /// The closure handed to the transport when subscribing to status frames
    pub fn notification_sink(self: &Arc<Self>) -> NotifyFn {
        let link = Arc::clone(self);
        Arc::new(move |frame: &[u8]| link.handle_notification(frame))
    }

    fn handle_notification(&self, frame: &[u8]) {
        debug!("Camera data: LEN: {} DATA: {:02X?}", frame.len(), frame);
        if let Some(update) = decode(frame) {
            lock(&self.status).apply(&update);
        }
    }
}

impl TransportListener for CameraLink {
    fn on_advertisement(&self, identity: &PeripheralIdentity, payload: &[u8]) {
        debug!("Advertised device found: {} {:02X?}", identity, payload);

        match classify(payload) {
            Classification::Mismatch => {}
            Classification::PairingNotReady => info!("Camera {} found, not ready to pair", identity),
            Classification::Ready => {
                if self.is_connected() || !self.accepts_connect() {
                    debug!("Session busy ({:?}), ignoring camera {}", self.state(), identity);
                    return;
                }
                info!("Camera {} found and able to pair", identity);
                *lock(&self.candidate) = Some(identity.clone());
                self.connect_requested.store(true, Ordering::SeqCst);
            }
        }
    }

    fn on_connect(&self, identity: &PeripheralIdentity) {
        info!("Connected to {}", identity);
        self.connected.store(true, Ordering::SeqCst);
    }

    fn on_disconnect(&self, identity: &PeripheralIdentity) {
        warn!("{} disconnected - starting scan", identity);
        self.connected.store(false, Ordering::SeqCst);
        self.transition(SessionState::Idle);
        self.rescan_requested.store(true, Ordering::SeqCst);
    }

    fn on_scan_ended(&self) {
        info!("Scan ended");
    }
}
