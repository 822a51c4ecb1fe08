//! Module identity: the fixed-width hardware address every unit is known by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Length of a hardware address in bytes.
pub const MAC_LEN: usize = 6;

/// Width of the human-readable address buffer carried in a Connection payload
/// (`AA:BB:CC:DD:EE:FF` plus a NUL terminator).
pub const MAC_STRING_LEN: usize = 18;

/// Hardware address. Used uninterpreted as the transport routing key and as the
/// key of the peer registry and pending-request trackers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MacAddress([u8; MAC_LEN]);

impl MacAddress {
    /// Broadcast destination understood by every transport.
    pub const BROADCAST: MacAddress = MacAddress([0xff; MAC_LEN]);

    pub const fn new(bytes: [u8; MAC_LEN]) -> Self {
        MacAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MAC_LEN] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Random locally-administered unicast address (for hosts without real hardware).
    pub fn random() -> Self {
        let mut bytes: [u8; MAC_LEN] = rand::random();
        bytes[0] = (bytes[0] | 0x02) & 0xfe;
        MacAddress(bytes)
    }

    /// Fixed-width NUL-padded text form, as sent in a Connection payload.
    pub fn to_wire_string(&self) -> [u8; MAC_STRING_LEN] {
        let mut out = [0u8; MAC_STRING_LEN];
        let text = self.to_string();
        out[..text.len()].copy_from_slice(text.as_bytes());
        out
    }

    /// Parse the NUL-padded text form. Returns None when the buffer does not hold an address.
    pub fn from_wire_string(buf: &[u8; MAC_STRING_LEN]) -> Option<Self> {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        std::str::from_utf8(&buf[..end]).ok()?.parse().ok()
    }
}

impl From<[u8; MAC_LEN]> for MacAddress {
    fn from(bytes: [u8; MAC_LEN]) -> Self {
        MacAddress(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; MAC_LEN];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(ParseMacError)?;
            if part.len() != 2 {
                return Err(ParseMacError);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseMacError)?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError);
        }
        Ok(MacAddress(bytes))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid hardware address (expected AA:BB:CC:DD:EE:FF)")]
pub struct ParseMacError;
