//! Coordinator: owns the authoritative bomb state (timer, strikes, code, outcome), registers
//! peers and advances phases once every registered peer has acknowledged.
//!
//! Host-driven: the host feeds received datagrams to `on_datagram` and calls `tick()` once
//! per loop iteration. `tick()` advances the timer, drains the inbox, performs the debounced
//! broadcasts and returns the events accepted during the tick.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::clock::{self, Clock};
use crate::config::CoordinatorConfig;
use crate::identity::MacAddress;
use crate::protocol::{
    pack_time_str, BombInfo, BombInfoRequest, Connection, Message, ModuleKind, SolveAttempt,
    SolveAttemptAck,
};
use crate::registry::PeerRegistry;
use crate::scheduler::RetryScheduler;
use crate::timer::{self, StageTimer};
use crate::transport::{self, Inbox, Transport, INBOX_CAPACITY};
use crate::wire;

/// Largest secret code; codes are drawn uniformly from `0..=MAX_CODE`.
pub const MAX_CODE: u16 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// Default: HeartbeatAcks populate the registry.
    Registering,
    /// Start scheduled; soliciting late joiners.
    Countdown,
    /// Start time passed; waiting for every registered peer's StartAck.
    Starting,
    Running,
    Solved,
    Failed,
    /// Registry cleared; Reset is broadcast until acknowledged.
    Resetting,
}

/// State transitions accepted during a tick, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// Start quorum reached; the timer is running.
    Started,
    Strike(u8),
    Solved,
    Failed,
}

pub struct Coordinator<T, C> {
    config: CoordinatorConfig,
    address: MacAddress,
    transport: T,
    clock: C,
    rng: StdRng,
    registry: PeerRegistry,
    inbox: Inbox,
    events: Vec<CoordinatorEvent>,
    strikes: u8,
    max_strikes: u8,
    code: u16,
    solved: bool,
    failed: bool,
    started: bool,
    reset_pending: bool,
    start_at: Option<u64>,
    timer: StageTimer,
    connection_retry: RetryScheduler,
    heartbeat_retry: RetryScheduler,
    start_retry: RetryScheduler,
    start_running_retry: RetryScheduler,
    reset_retry: RetryScheduler,
}

impl<T: Transport, C: Clock> Coordinator<T, C> {
    /// `address` is this unit's own hardware address, advertised in Connection broadcasts.
    pub fn new(address: MacAddress, config: CoordinatorConfig, transport: T, clock: C) -> Self {
        let mut coordinator = Self {
            address,
            transport,
            clock,
            rng: StdRng::from_entropy(),
            registry: PeerRegistry::new(config.max_modules),
            inbox: Inbox::new(INBOX_CAPACITY),
            events: Vec::new(),
            strikes: 0,
            max_strikes: config.max_strikes,
            code: 0,
            solved: false,
            failed: false,
            started: false,
            reset_pending: false,
            start_at: None,
            timer: StageTimer::new(config.duration_ms),
            connection_retry: RetryScheduler::from_millis(config.connection_interval_ms),
            heartbeat_retry: RetryScheduler::from_millis(config.heartbeat_interval_ms),
            start_retry: RetryScheduler::from_millis(config.start_interval_ms),
            start_running_retry: RetryScheduler::from_millis(config.start_running_interval_ms),
            reset_retry: RetryScheduler::from_millis(config.reset_interval_ms),
            config,
        };
        coordinator.initialize();
        coordinator
    }

    /// Reseed the code generator (deterministic games and tests) and redraw the code.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self.code = self.rng.gen_range(0..=MAX_CODE);
        self
    }

    /// Fresh game: empty registry, no strikes, no outcome, new code, timer cleared.
    /// Max strikes and duration are kept.
    pub fn initialize(&mut self) {
        for peer in self.registry.clear() {
            self.transport.unregister_peer(peer);
        }
        self.reset_pending = false;
        self.start_at = None;
        self.started = false;
        self.strikes = 0;
        self.solved = false;
        self.failed = false;
        self.code = self.rng.gen_range(0..=MAX_CODE);
        self.timer.clear();
        debug!(code = self.code, "coordinator initialized");
    }

    /// Start a new game: initialize, then broadcast Reset until every registered peer
    /// has acknowledged it.
    pub fn reset(&mut self) {
        self.initialize();
        self.reset_pending = true;
        info!("game reset");
    }

    /// Schedule the start `lead` from now. The countdown phase begins immediately.
    pub fn start_after(&mut self, lead: Duration) {
        let now = self.clock.now_millis();
        let lead_ms = clock::millis(lead);
        self.start_at = Some(now.saturating_add(lead_ms));
        info!(lead_ms, "start scheduled");
    }

    pub fn set_max_strikes(&mut self, max_strikes: u8) {
        self.max_strikes = max_strikes;
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.timer.set_duration(clock::millis(duration));
    }

    /// Queue a received datagram; it is dispatched on the next `tick()`.
    pub fn on_datagram(&mut self, source: MacAddress, bytes: &[u8]) {
        self.inbox.push(source, bytes);
    }

    pub fn tick(&mut self) -> Vec<CoordinatorEvent> {
        let now = self.clock.now_millis();
        self.update_timer(now);
        for (source, bytes) in self.inbox.drain() {
            self.handle_datagram(now, source, &bytes);
        }
        self.send_periodic(now);
        std::mem::take(&mut self.events)
    }

    fn update_timer(&mut self, now: u64) {
        if !self.started || self.solved || self.failed {
            return;
        }
        self.timer.advance(now, self.speed());
        if self.timer.is_expired() {
            info!("time is up");
            self.fail();
        }
    }

    fn handle_datagram(&mut self, now: u64, source: MacAddress, bytes: &[u8]) {
        let msg = match wire::decode_datagram(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(%source, kind = ?e.kind(), error = %e, "discarding datagram");
                return;
            }
        };
        match msg {
            Message::BombInfoRequest(req) => self.on_bomb_info_request(source, req),
            Message::SolveAttempt(attempt) => self.on_solve_attempt(source, attempt),
            Message::StartAck => self.on_start_ack(now, source),
            Message::ResetAck => self.on_reset_ack(source),
            Message::HeartbeatAck(ack) => self.on_presence(source, ack.module_kind),
            Message::Connection(_) => {
                if !self.registry.contains(&source) {
                    self.register_peer(source, ModuleKind::Spectator);
                }
            }
            Message::BombInfo(_)
            | Message::SolveAttemptAck(_)
            | Message::Start
            | Message::Reset
            | Message::Heartbeat => {}
        }
    }

    fn on_bomb_info_request(&mut self, source: MacAddress, req: BombInfoRequest) {
        let mut info = self.bomb_info();
        info.request_key = req.key;
        let _ = transport::unicast_message(&mut self.transport, source, &Message::BombInfo(info));
    }

    fn on_solve_attempt(&mut self, source: MacAddress, attempt: SolveAttempt) {
        // Acknowledge every delivery so the sender stops retrying, duplicate or not.
        let ack = SolveAttemptAck {
            strike: attempt.strike,
            key: attempt.key,
        };
        let _ = transport::unicast_message(
            &mut self.transport,
            source,
            &Message::SolveAttemptAck(ack),
        );

        let Some(peer) = self.registry.get_mut(&source) else {
            debug!(%source, "solve attempt from unregistered peer");
            return;
        };
        if !peer.first_delivery(attempt.key) {
            debug!(%source, key = attempt.key, "duplicate solve attempt");
            return;
        }
        let solved_module = !attempt.strike && !attempt.fail;
        if solved_module {
            peer.solved = true;
        }

        if attempt.strike {
            self.strike();
        } else if attempt.fail {
            info!(%source, "module forced failure");
            self.fail();
        } else {
            info!(%source, "module solved");
            if self.registry.all_puzzles_solved() {
                self.solve();
            }
        }
    }

    fn on_start_ack(&mut self, now: u64, source: MacAddress) {
        if self.started {
            return;
        }
        let Some(peer) = self.registry.get_mut(&source) else {
            return;
        };
        if peer.started {
            return;
        }
        peer.started = true;
        if !self.registry.all_started() {
            return;
        }
        self.started = true;
        self.timer.start(now);
        info!(peers = self.registry.len(), "all modules started");
        self.events.push(CoordinatorEvent::Started);
    }

    // The registry was emptied by `reset()` before Reset went out, so acks are only
    // counted from peers that have registered again since.
    fn on_reset_ack(&mut self, source: MacAddress) {
        let Some(peer) = self.registry.get_mut(&source) else {
            debug!(%source, "reset ack from unregistered peer ignored");
            return;
        };
        if peer.reset {
            return;
        }
        peer.reset = true;
        if self.registry.all_reset() {
            self.reset_pending = false;
            info!("all modules reset");
        }
    }

    fn on_presence(&mut self, source: MacAddress, kind: ModuleKind) {
        if let Some(peer) = self.registry.get_mut(&source) {
            peer.kind = kind;
            return;
        }
        self.register_peer(source, kind);
    }

    fn register_peer(&mut self, source: MacAddress, kind: ModuleKind) {
        if self.registry.is_full() {
            warn!(%source, max = self.config.max_modules, "registry full, peer dropped");
            return;
        }
        if let Err(e) = self.transport.register_peer(source) {
            warn!(%source, error = %e, "transport refused peer");
            return;
        }
        match self.registry.register(source, kind) {
            Ok(_) => info!(%source, ?kind, "module registered"),
            Err(e) => warn!(%source, error = %e, "module not registered"),
        }
    }

    fn strike(&mut self) {
        self.strikes = self.strikes.saturating_add(1).min(self.max_strikes);
        info!(strikes = self.strikes, max = self.max_strikes, "strike");
        if self.strikes >= self.max_strikes {
            self.fail();
        }
        self.events.push(CoordinatorEvent::Strike(self.strikes));
    }

    fn fail(&mut self) {
        if self.failed || self.solved {
            return;
        }
        self.failed = true;
        info!("bomb failed");
        self.events.push(CoordinatorEvent::Failed);
    }

    fn solve(&mut self) {
        if self.failed || self.solved {
            return;
        }
        self.solved = true;
        info!("bomb solved");
        self.events.push(CoordinatorEvent::Solved);
    }

    fn send_periodic(&mut self, now: u64) {
        if self.connection_retry.poll(now).fired() {
            let msg = Message::Connection(Connection::new(self.address));
            let _ = transport::broadcast_message(&mut self.transport, &msg);
        }
        if self.countdown_at(now) && self.heartbeat_retry.poll(now).fired() {
            let _ = transport::broadcast_message(&mut self.transport, &Message::Heartbeat);
        }
        if self.starting_at(now) && self.start_retry.poll(now).fired() {
            let _ = transport::broadcast_message(&mut self.transport, &Message::Start);
        }
        if self.started && self.start_running_retry.poll(now).fired() {
            let _ = transport::broadcast_message(&mut self.transport, &Message::Start);
        }
        if self.reset_pending && self.reset_retry.poll(now).fired() {
            let _ = transport::broadcast_message(&mut self.transport, &Message::Reset);
        }
    }

    fn starting_at(&self, now: u64) -> bool {
        !self.started && self.start_at.is_some_and(|at| now > at)
    }

    fn countdown_at(&self, now: u64) -> bool {
        !self.started && !self.starting_at(now) && self.start_at.is_some()
    }

    /// Snapshot of the current state with `request_key` 0.
    pub fn bomb_info(&self) -> BombInfo {
        let count = |n: usize| n.min(u8::MAX as usize) as u8;
        BombInfo {
            request_key: 0,
            time: pack_time_str(&self.time_str(true)),
            strikes: self.strikes,
            max_strikes: self.max_strikes,
            failed: self.failed,
            solved: self.solved,
            code: self.code,
            total_puzzle_modules: count(self.registry.count_kind(ModuleKind::Puzzle)),
            solved_puzzle_modules: count(self.registry.solved_puzzles()),
            total_needy_modules: count(self.registry.count_kind(ModuleKind::Needy)),
        }
    }

    pub fn phase(&self) -> CoordinatorPhase {
        if self.solved {
            CoordinatorPhase::Solved
        } else if self.failed {
            CoordinatorPhase::Failed
        } else if self.started {
            CoordinatorPhase::Running
        } else if self.starting() {
            CoordinatorPhase::Starting
        } else if self.on_start_countdown() {
            CoordinatorPhase::Countdown
        } else if self.reset_pending {
            CoordinatorPhase::Resetting
        } else {
            CoordinatorPhase::Registering
        }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn starting(&self) -> bool {
        self.starting_at(self.clock.now_millis())
    }

    pub fn on_start_countdown(&self) -> bool {
        self.countdown_at(self.clock.now_millis())
    }

    pub fn solved(&self) -> bool {
        self.solved
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    pub fn strikes(&self) -> u8 {
        self.strikes
    }

    pub fn max_strikes(&self) -> u8 {
        self.max_strikes
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    /// Current speed stage, `min(strikes, SPEED_STAGES - 1)`.
    pub fn speed(&self) -> usize {
        timer::speed_stage(self.strikes)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.timer.elapsed_ms()
    }

    pub fn remaining_ms(&self) -> u64 {
        self.timer.remaining_ms()
    }

    pub fn time_str(&self, show_millis: bool) -> String {
        timer::format_remaining(self.timer.remaining_ms(), show_millis)
    }

    /// Milliseconds until the scheduled start; 0 when none is scheduled or it has passed.
    pub fn time_to_start(&self) -> u64 {
        let now = self.clock.now_millis();
        self.start_at.map_or(0, |at| at.saturating_sub(now))
    }

    pub fn time_to_start_str(&self) -> String {
        timer::format_remaining(self.time_to_start(), true)
    }

    pub fn time_to_next_second(&self) -> u64 {
        self.timer.time_to_next_second(self.speed())
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
