//! Framing: 1 tag byte + fixed-width bincode payload. No length field.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::{Message, MessageKind};

/// Encode a message into a single datagram: tag byte followed by its payload.
pub fn encode_datagram(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    let tag = msg.kind().tag();
    let mut out = vec![tag];
    match msg {
        Message::Connection(p) => append_payload(&mut out, p)?,
        Message::BombInfo(p) => append_payload(&mut out, p)?,
        Message::BombInfoRequest(p) => append_payload(&mut out, p)?,
        Message::SolveAttempt(p) => append_payload(&mut out, p)?,
        Message::SolveAttemptAck(p) => append_payload(&mut out, p)?,
        Message::HeartbeatAck(p) => append_payload(&mut out, p)?,
        Message::Start
        | Message::StartAck
        | Message::Reset
        | Message::ResetAck
        | Message::Heartbeat => {}
    }
    Ok(out)
}

fn append_payload<T: Serialize>(out: &mut Vec<u8>, payload: &T) -> Result<(), EncodeError> {
    bincode::serialize_into(out, payload).map_err(EncodeError)
}

/// Error encoding a payload.
#[derive(Debug, thiserror::Error)]
#[error("encode error: {0}")]
pub struct EncodeError(#[source] bincode::Error);

/// Decode one datagram. The remainder after the tag is read as the kind's fixed layout;
/// trailing bytes are ignored.
pub fn decode_datagram(bytes: &[u8]) -> Result<Message, DecodeError> {
    let (&tag, payload) = bytes.split_first().ok_or(DecodeError::Empty)?;
    let kind = MessageKind::from_tag(tag);
    let msg = match kind {
        MessageKind::Unknown => return Err(DecodeError::UnknownTag(tag)),
        MessageKind::Connection => Message::Connection(read_payload(kind, payload)?),
        MessageKind::BombInfo => Message::BombInfo(read_payload(kind, payload)?),
        MessageKind::BombInfoRequest => Message::BombInfoRequest(read_payload(kind, payload)?),
        MessageKind::SolveAttempt => Message::SolveAttempt(read_payload(kind, payload)?),
        MessageKind::SolveAttemptAck => Message::SolveAttemptAck(read_payload(kind, payload)?),
        MessageKind::HeartbeatAck => Message::HeartbeatAck(read_payload(kind, payload)?),
        MessageKind::Start => Message::Start,
        MessageKind::StartAck => Message::StartAck,
        MessageKind::Reset => Message::Reset,
        MessageKind::ResetAck => Message::ResetAck,
        MessageKind::Heartbeat => Message::Heartbeat,
    };
    Ok(msg)
}

fn read_payload<T: DeserializeOwned>(kind: MessageKind, payload: &[u8]) -> Result<T, DecodeError> {
    bincode::deserialize(payload).map_err(|source| DecodeError::Payload { kind, source })
}

/// Error decoding a datagram. The dispatchers discard these silently.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("malformed {kind:?} payload: {source}")]
    Payload {
        kind: MessageKind,
        #[source]
        source: bincode::Error,
    },
}

impl DecodeError {
    /// The kind the tag named; `Unknown` when the tag itself was not recognized.
    pub fn kind(&self) -> MessageKind {
        match self {
            DecodeError::Payload { kind, .. } => *kind,
            _ => MessageKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MacAddress;
    use crate::protocol::*;
    use proptest::prelude::*;

    fn sample_info() -> BombInfo {
        BombInfo {
            request_key: 7,
            time: pack_time_str("04:59"),
            strikes: 1,
            max_strikes: 3,
            failed: false,
            solved: false,
            code: 1234,
            total_puzzle_modules: 4,
            solved_puzzle_modules: 2,
            total_needy_modules: 1,
        }
    }

    #[test]
    fn zero_payload_kinds_are_one_byte() {
        for (msg, tag) in [
            (Message::Start, 6u8),
            (Message::StartAck, 7),
            (Message::Reset, 8),
            (Message::ResetAck, 9),
            (Message::Heartbeat, 10),
        ] {
            assert_eq!(encode_datagram(&msg).unwrap(), vec![tag]);
        }
    }

    #[test]
    fn payload_widths_are_fixed() {
        let conn = Message::Connection(Connection::new(MacAddress::new([1, 2, 3, 4, 5, 6])));
        assert_eq!(encode_datagram(&conn).unwrap().len(), 1 + 18);
        assert_eq!(encode_datagram(&Message::BombInfo(sample_info())).unwrap().len(), 1 + 19);
        let req = Message::BombInfoRequest(BombInfoRequest { key: 3 });
        assert_eq!(encode_datagram(&req).unwrap().len(), 1 + 4);
        let attempt = Message::SolveAttempt(SolveAttempt {
            strike: true,
            key: 9,
            fail: false,
        });
        assert_eq!(encode_datagram(&attempt).unwrap().len(), 1 + 6);
        let ack = Message::SolveAttemptAck(SolveAttemptAck { strike: true, key: 9 });
        assert_eq!(encode_datagram(&ack).unwrap().len(), 1 + 5);
        let hb = Message::HeartbeatAck(HeartbeatAck {
            module_kind: ModuleKind::Needy,
        });
        assert_eq!(encode_datagram(&hb).unwrap(), vec![11, 2]);
    }

    #[test]
    fn solve_attempt_layout() {
        let attempt = Message::SolveAttempt(SolveAttempt {
            strike: true,
            key: 0x0102_0304,
            fail: false,
        });
        assert_eq!(
            encode_datagram(&attempt).unwrap(),
            vec![4, 1, 0x04, 0x03, 0x02, 0x01, 0]
        );
    }

    #[test]
    fn unknown_tag_and_empty() {
        assert!(matches!(decode_datagram(&[]), Err(DecodeError::Empty)));
        assert!(matches!(decode_datagram(&[0]), Err(DecodeError::UnknownTag(0))));
        let err = decode_datagram(&[200, 1, 2]).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTag(200)));
        assert_eq!(err.kind(), MessageKind::Unknown);
    }

    #[test]
    fn short_payload_is_rejected() {
        let err = decode_datagram(&[4, 1, 0]).unwrap_err();
        assert_eq!(err.kind(), MessageKind::SolveAttempt);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = encode_datagram(&Message::BombInfoRequest(BombInfoRequest { key: 5 })).unwrap();
        bytes.extend_from_slice(&[0xde, 0xad]);
        assert_eq!(
            decode_datagram(&bytes).unwrap(),
            Message::BombInfoRequest(BombInfoRequest { key: 5 })
        );
        assert_eq!(decode_datagram(&[6, 9, 9]).unwrap(), Message::Start);
    }

    #[test]
    fn bad_module_kind_is_rejected() {
        assert!(decode_datagram(&[11, 9]).is_err());
    }

    fn module_kind() -> impl Strategy<Value = ModuleKind> {
        prop_oneof![
            Just(ModuleKind::Main),
            Just(ModuleKind::Puzzle),
            Just(ModuleKind::Needy),
            Just(ModuleKind::Spectator),
        ]
    }

    fn message() -> impl Strategy<Value = Message> {
        prop_oneof![
            any::<[u8; 6]>().prop_map(|b| Message::Connection(Connection::new(MacAddress::new(b)))),
            (
                any::<u32>(),
                0u32..6000,
                any::<(u8, u8, bool, bool)>(),
                0u16..=9999,
                any::<(u8, u8, u8)>()
            )
                .prop_map(|(key, secs, (s, m, f, v), code, (tp, sp, tn))| {
                    Message::BombInfo(BombInfo {
                        request_key: key,
                        time: pack_time_str(&format!("{:02}:{:02}", secs / 60, secs % 60)),
                        strikes: s,
                        max_strikes: m,
                        failed: f,
                        solved: v,
                        code,
                        total_puzzle_modules: tp,
                        solved_puzzle_modules: sp,
                        total_needy_modules: tn,
                    })
                }),
            any::<u32>().prop_map(|key| Message::BombInfoRequest(BombInfoRequest { key })),
            any::<(bool, u32, bool)>().prop_map(|(strike, key, fail)| {
                Message::SolveAttempt(SolveAttempt { strike, key, fail })
            }),
            any::<(bool, u32)>()
                .prop_map(|(strike, key)| Message::SolveAttemptAck(SolveAttemptAck { strike, key })),
            Just(Message::Start),
            Just(Message::StartAck),
            Just(Message::Reset),
            Just(Message::ResetAck),
            Just(Message::Heartbeat),
            module_kind().prop_map(|module_kind| Message::HeartbeatAck(HeartbeatAck { module_kind })),
        ]
    }

    proptest! {
        #[test]
        fn every_kind_round_trips(msg in message()) {
            let bytes = encode_datagram(&msg).unwrap();
            prop_assert_eq!(bytes[0], msg.kind().tag());
            let decoded = decode_datagram(&bytes).unwrap();
            prop_assert_eq!(decoded, msg);
            prop_assert_eq!(encode_datagram(&decoded).unwrap(), bytes);
        }
    }
}
