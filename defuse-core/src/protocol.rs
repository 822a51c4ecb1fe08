//! Defuse wire protocol: module kinds, message kinds and their fixed payloads.
//!
//! The protocol is closed and versionless. Every datagram is one tag byte followed by
//! the fixed-width payload of that kind (see the wire module). Changing a field here
//! requires redeploying every unit.

use serde::{Deserialize, Serialize};

use crate::identity::{MacAddress, MAC_STRING_LEN};

/// Width of the formatted remaining-time field (`MM:SS` or `SS.CC` plus NUL).
pub const TIME_STR_LEN: usize = 6;

/// Role of a unit on the bomb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ModuleKind {
    Main,
    Puzzle,
    Needy,
    Spectator,
}

impl From<ModuleKind> for u8 {
    fn from(kind: ModuleKind) -> u8 {
        match kind {
            ModuleKind::Main => 0,
            ModuleKind::Puzzle => 1,
            ModuleKind::Needy => 2,
            ModuleKind::Spectator => 3,
        }
    }
}

impl TryFrom<u8> for ModuleKind {
    type Error = UnknownModuleKind;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ModuleKind::Main),
            1 => Ok(ModuleKind::Puzzle),
            2 => Ok(ModuleKind::Needy),
            3 => Ok(ModuleKind::Spectator),
            other => Err(UnknownModuleKind(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown module kind {0}")]
pub struct UnknownModuleKind(pub u8);

/// Single-byte tag that prefixes every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Decode failure sentinel; never sent.
    Unknown = 0,
    Connection = 1,
    BombInfo = 2,
    BombInfoRequest = 3,
    SolveAttempt = 4,
    SolveAttemptAck = 5,
    Start = 6,
    StartAck = 7,
    Reset = 8,
    ResetAck = 9,
    Heartbeat = 10,
    HeartbeatAck = 11,
}

impl MessageKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Unrecognized tags map to `Unknown`.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => MessageKind::Connection,
            2 => MessageKind::BombInfo,
            3 => MessageKind::BombInfoRequest,
            4 => MessageKind::SolveAttempt,
            5 => MessageKind::SolveAttemptAck,
            6 => MessageKind::Start,
            7 => MessageKind::StartAck,
            8 => MessageKind::Reset,
            9 => MessageKind::ResetAck,
            10 => MessageKind::Heartbeat,
            11 => MessageKind::HeartbeatAck,
            _ => MessageKind::Unknown,
        }
    }
}

/// Coordinator presence: its address in text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub address: [u8; MAC_STRING_LEN],
}

impl Connection {
    pub fn new(address: MacAddress) -> Self {
        Self {
            address: address.to_wire_string(),
        }
    }

    pub fn address(&self) -> Option<MacAddress> {
        MacAddress::from_wire_string(&self.address)
    }
}

/// Snapshot of the bomb, stamped with the requester's correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BombInfo {
    pub request_key: u32,
    pub time: [u8; TIME_STR_LEN],
    pub strikes: u8,
    pub max_strikes: u8,
    pub failed: bool,
    pub solved: bool,
    pub code: u16,
    pub total_puzzle_modules: u8,
    pub solved_puzzle_modules: u8,
    pub total_needy_modules: u8,
}

impl BombInfo {
    /// Remaining time as text, up to the first NUL.
    pub fn time_str(&self) -> &str {
        let end = self
            .time
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TIME_STR_LEN);
        std::str::from_utf8(&self.time[..end]).unwrap_or("")
    }
}

/// Pack a remaining-time string into the fixed field, truncating to fit the NUL.
pub fn pack_time_str(text: &str) -> [u8; TIME_STR_LEN] {
    let mut out = [0u8; TIME_STR_LEN];
    let n = text.len().min(TIME_STR_LEN - 1);
    out[..n].copy_from_slice(&text.as_bytes()[..n]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BombInfoRequest {
    pub key: u32,
}

/// Outcome reported by a module. `strike` and `fail` both false means solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveAttempt {
    pub strike: bool,
    pub key: u32,
    pub fail: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveAttemptAck {
    pub strike: bool,
    pub key: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub module_kind: ModuleKind,
}

/// All wire messages. Encoding is tag byte + bincode payload (see wire module).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Coordinator advertises its address for discovery.
    Connection(Connection),
    /// Response to a BombInfoRequest.
    BombInfo(BombInfo),
    BombInfoRequest(BombInfoRequest),
    SolveAttempt(SolveAttempt),
    SolveAttemptAck(SolveAttemptAck),
    Start,
    StartAck,
    Reset,
    ResetAck,
    /// Solicits late joiners during countdown.
    Heartbeat,
    HeartbeatAck(HeartbeatAck),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Connection(_) => MessageKind::Connection,
            Message::BombInfo(_) => MessageKind::BombInfo,
            Message::BombInfoRequest(_) => MessageKind::BombInfoRequest,
            Message::SolveAttempt(_) => MessageKind::SolveAttempt,
            Message::SolveAttemptAck(_) => MessageKind::SolveAttemptAck,
            Message::Start => MessageKind::Start,
            Message::StartAck => MessageKind::StartAck,
            Message::Reset => MessageKind::Reset,
            Message::ResetAck => MessageKind::ResetAck,
            Message::Heartbeat => MessageKind::Heartbeat,
            Message::HeartbeatAck(_) => MessageKind::HeartbeatAck,
        }
    }
}
