//! Peripheral: per-module client of the coordinator. Tracks connection, start and solve
//! status, resolves bomb-info queries and resends solve attempts until acknowledged.

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{InfoCorrelation, PeripheralConfig};
use crate::identity::MacAddress;
use crate::pending::PendingRequests;
use crate::protocol::{BombInfo, BombInfoRequest, HeartbeatAck, Message, ModuleKind, SolveAttempt};
use crate::scheduler::RetryScheduler;
use crate::transport::{self, Inbox, Transport, INBOX_CAPACITY};
use crate::wire;

/// One-shot bomb-info consumer.
pub type InfoCallback = Box<dyn FnOnce(&BombInfo) + Send>;

enum InfoWaiter {
    Callback(InfoCallback),
    /// Internal poll for the secret code.
    ManualCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralStatus {
    Connecting,
    Connected,
    Started,
    Solved,
}

/// State transitions accepted during a tick, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralEvent {
    /// The coordinator was discovered and registered with the transport.
    Connected,
    Start,
    Restart,
    /// The secret code changed.
    ManualCode(u16),
}

pub struct Peripheral<T, C> {
    kind: ModuleKind,
    config: PeripheralConfig,
    transport: T,
    clock: C,
    coordinator: Option<MacAddress>,
    connected: bool,
    started: bool,
    solved: bool,
    code: Option<u16>,
    info_waiters: PendingRequests<InfoWaiter>,
    solve_attempts: PendingRequests<SolveAttempt>,
    info_retry: RetryScheduler,
    solve_retry: RetryScheduler,
    code_poll: RetryScheduler,
    inbox: Inbox,
    events: Vec<PeripheralEvent>,
}

impl<T: Transport, C: Clock> Peripheral<T, C> {
    pub fn new(kind: ModuleKind, config: PeripheralConfig, transport: T, clock: C) -> Self {
        Self {
            kind,
            transport,
            clock,
            coordinator: None,
            connected: false,
            started: false,
            solved: false,
            code: None,
            info_waiters: PendingRequests::new(config.pending_capacity),
            solve_attempts: PendingRequests::new(config.pending_capacity),
            info_retry: RetryScheduler::from_millis(config.info_request_interval_ms),
            solve_retry: RetryScheduler::from_millis(config.solve_attempt_interval_ms),
            code_poll: RetryScheduler::from_millis(config.code_poll_interval_ms),
            inbox: Inbox::new(INBOX_CAPACITY),
            events: Vec::new(),
            config,
        }
    }

    /// Drop all local game state and pending requests. Correlation keys keep counting up.
    pub fn initialize(&mut self) {
        self.code = None;
        self.connected = false;
        self.started = false;
        self.solved = false;
        self.solve_attempts.clear();
        self.info_waiters.clear();
    }

    /// Register a one-shot callback invoked with the next matching BombInfo.
    /// Returns the correlation key.
    pub fn with_bomb_info<F>(&mut self, callback: F) -> u32
    where
        F: FnOnce(&BombInfo) + Send + 'static,
    {
        self.issue_waiter(InfoWaiter::Callback(Box::new(callback)))
    }

    fn issue_waiter(&mut self, waiter: InfoWaiter) -> u32 {
        self.info_waiters.issue(waiter).0
    }

    /// Queue a solve attempt; it is resent until the coordinator acknowledges its key.
    pub fn queue_solve_attempt(&mut self, strike: bool, fail: bool) -> u32 {
        let (key, _) = self
            .solve_attempts
            .issue_with(|key| SolveAttempt { strike, key, fail });
        debug!(key, strike, fail, "solve attempt queued");
        key
    }

    /// Mark this module solved and report it.
    pub fn solve(&mut self) -> u32 {
        self.solved = true;
        self.queue_solve_attempt(false, false)
    }

    pub fn strike(&mut self) -> u32 {
        self.queue_solve_attempt(true, false)
    }

    /// Force the bomb to fail (needy modules).
    pub fn fail(&mut self) -> u32 {
        self.queue_solve_attempt(false, true)
    }

    /// Queue a received datagram; it is dispatched on the next `tick()`.
    pub fn on_datagram(&mut self, source: MacAddress, bytes: &[u8]) {
        self.inbox.push(source, bytes);
    }

    pub fn tick(&mut self) -> Vec<PeripheralEvent> {
        let now = self.clock.now_millis();
        for (source, bytes) in self.inbox.drain() {
            self.handle_datagram(source, &bytes);
        }
        self.send_periodic(now);
        std::mem::take(&mut self.events)
    }

    fn handle_datagram(&mut self, source: MacAddress, bytes: &[u8]) {
        let msg = match wire::decode_datagram(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(%source, kind = ?e.kind(), error = %e, "discarding datagram");
                return;
            }
        };
        match msg {
            Message::Connection(_) => self.on_connection(source),
            Message::BombInfo(info) => self.on_bomb_info(&info),
            Message::SolveAttemptAck(ack) => {
                if self.solve_attempts.resolve(ack.key).is_none() {
                    debug!(key = ack.key, "stale solve attempt ack");
                }
            }
            Message::Start => self.on_start(),
            Message::Reset => self.on_reset(),
            Message::Heartbeat => {
                let ack = Message::HeartbeatAck(HeartbeatAck {
                    module_kind: self.kind,
                });
                let _ = transport::unicast_message(&mut self.transport, source, &ack);
            }
            Message::BombInfoRequest(_)
            | Message::SolveAttempt(_)
            | Message::StartAck
            | Message::ResetAck
            | Message::HeartbeatAck(_) => {}
        }
    }

    fn on_connection(&mut self, source: MacAddress) {
        if self.connected {
            return;
        }
        if let Err(e) = self.transport.register_peer(source) {
            warn!(%source, error = %e, "cannot register coordinator");
            return;
        }
        self.coordinator = Some(source);
        self.connected = true;
        info!(coordinator = %source, "connected");
        self.events.push(PeripheralEvent::Connected);
    }

    fn on_bomb_info(&mut self, info: &BombInfo) {
        let waiters = match self.config.info_correlation {
            InfoCorrelation::AllPending => self.info_waiters.take_all(),
            InfoCorrelation::Keyed => self
                .info_waiters
                .resolve(info.request_key)
                .map(|w| vec![(info.request_key, w)])
                .unwrap_or_default(),
        };
        for (_, waiter) in waiters {
            match waiter {
                InfoWaiter::Callback(callback) => callback(info),
                InfoWaiter::ManualCode => {
                    if self.code != Some(info.code) {
                        self.code = Some(info.code);
                        info!(code = info.code, "secret code updated");
                        self.events.push(PeripheralEvent::ManualCode(info.code));
                    }
                }
            }
        }
    }

    fn on_start(&mut self) {
        if self.code.is_none() {
            debug!("start ignored, no code yet");
            return;
        }
        if !self.started {
            self.started = true;
            info!("module started");
            self.events.push(PeripheralEvent::Start);
        }
        self.send_to_coordinator(&Message::StartAck);
    }

    fn on_reset(&mut self) {
        self.initialize();
        // The coordinator keeps its address across games; no rediscovery.
        self.connected = self.coordinator.is_some();
        info!("module reset");
        self.events.push(PeripheralEvent::Restart);
        self.send_to_coordinator(&Message::ResetAck);
    }

    fn send_periodic(&mut self, now: u64) {
        if self.connected
            && !self.has_code_poll_pending()
            && self.code_poll.poll(now).fired()
        {
            self.issue_waiter(InfoWaiter::ManualCode);
        }
        if let Some((key, _)) = self.info_waiters.earliest() {
            if self.info_retry.poll(now).fired() {
                let req = Message::BombInfoRequest(BombInfoRequest { key });
                self.send_to_coordinator(&req);
            }
        }
        if let Some((_, &attempt)) = self.solve_attempts.earliest() {
            if self.solve_retry.poll(now).fired() {
                self.send_to_coordinator(&Message::SolveAttempt(attempt));
            }
        }
    }

    fn has_code_poll_pending(&self) -> bool {
        self.info_waiters
            .values()
            .any(|w| matches!(w, InfoWaiter::ManualCode))
    }

    fn send_to_coordinator(&mut self, msg: &Message) {
        let Some(coordinator) = self.coordinator else {
            debug!(kind = ?msg.kind(), "no coordinator yet");
            return;
        };
        let _ = transport::unicast_message(&mut self.transport, coordinator, msg);
    }

    pub fn status(&self) -> PeripheralStatus {
        if !self.connected {
            PeripheralStatus::Connecting
        } else if !self.started {
            PeripheralStatus::Connected
        } else if !self.solved {
            PeripheralStatus::Started
        } else {
            PeripheralStatus::Solved
        }
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn code(&self) -> Option<u16> {
        self.code
    }

    pub fn coordinator(&self) -> Option<MacAddress> {
        self.coordinator
    }

    pub fn pending_solve_attempts(&self) -> usize {
        self.solve_attempts.len()
    }

    pub fn pending_info_requests(&self) -> usize {
        self.info_waiters.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
