//! ORP message codec: encode/decode of [`Message`] to/from the terse ASCII wire packet.
//!
//! Packet layout after HDLC deframing:
//! ```text
//! offset 0 : packet-type byte (ASCII letter)
//! offset 1 : status | data-type | version | event, depending on packet type
//! offset 2 : sequence number, low byte
//! offset 3 : sequence number, high byte
//! offset 4+: zero or more `<id><content>` fields separated by ','
//! ```
//!
//! Decoded fields are borrowed views into the caller's receive buffer ([`MessageView`]) rather
//! than an owned copy of it; see the crate-level design notes on string ownership.

use crate::error::{OrpError, Result};
use crate::message::{
    DataType, FieldReq, FileEvent, Message, PacketType, Version, MAX_DATA_LEN, MAX_PATH_LEN,
    MAX_UNIT_LEN, TIMESTAMP_UNSET,
};

const SEPARATOR: u8 = b',';
const STATUS_BASE: u8 = 0x40;

fn status_to_byte(status: i32) -> Result<u8> {
    if !(-22..=0).contains(&status) {
        return Err(OrpError::StatusOutOfRange(status));
    }
    Ok((i32::from(STATUS_BASE) - status) as u8)
}

fn byte_to_status(byte: u8) -> i32 {
    i32::from(STATUS_BASE) - i32::from(byte)
}

fn enum_to_base36(value: u8) -> u8 {
    match value {
        0..=9 => b'0' + value,
        10..=35 => b'A' + (value - 10),
        _ => b'0',
    }
}

fn base36_to_enum(letter: u8) -> Option<u8> {
    match letter {
        b'0'..=b'9' => Some(letter - b'0'),
        b'A'..=b'Z' => Some(letter - b'A' + 10),
        _ => None,
    }
}

fn format_timestamp(ts: f64) -> String {
    let mut s = format!("{:.6}", ts);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}

fn parse_timestamp(raw: &str) -> Result<f64> {
    if raw.is_empty() || raw.len() > 17 {
        return Err(OrpError::MalformedTimestamp);
    }
    let mut seen_dot = false;
    for c in raw.chars() {
        if c == '.' {
            if seen_dot {
                return Err(OrpError::MalformedTimestamp);
            }
            seen_dot = true;
        } else if !c.is_ascii_digit() {
            return Err(OrpError::MalformedTimestamp);
        }
    }
    raw.parse::<f64>().map_err(|_| OrpError::MalformedTimestamp)
}

fn parse_decimal(raw: &str, field: &'static str) -> Result<i32> {
    raw.parse::<i32>().map_err(|_| OrpError::MalformedInteger(field))
}

fn validate_required(msg: &Message) -> Result<()> {
    let required = msg.msg_type.required();
    if required.contains(FieldReq::PATH) && msg.path.is_none() {
        return Err(OrpError::MissingField("path"));
    }
    if required.contains(FieldReq::TIME) && msg.timestamp == TIMESTAMP_UNSET {
        return Err(OrpError::MissingField("timestamp"));
    }
    if required.contains(FieldReq::DATA) && msg.data.is_empty() {
        return Err(OrpError::MissingField("data"));
    }
    Ok(())
}

fn encode_header(msg: &Message, out: &mut Vec<u8>) -> Result<()> {
    let info = msg.msg_type.info();
    out.push(info.letter);

    let required = info.required;
    let second_byte = if required.contains(FieldReq::STATUS) {
        status_to_byte(msg.status)?
    } else if required.contains(FieldReq::DATA_TYPE) {
        msg.data_type.to_letter()
    } else if required.contains(FieldReq::VERSION) {
        enum_to_base36(msg.version as u8)
    } else if required.contains(FieldReq::EVENT) {
        enum_to_base36(msg.event as u8)
    } else {
        b' '
    };
    out.push(second_byte);
    out.extend_from_slice(&msg.sequence_num.to_le_bytes());
    Ok(())
}

fn push_field_sep(out: &mut Vec<u8>, first: &mut bool) {
    if !*first {
        out.push(SEPARATOR);
    }
    *first = false;
}

/// Appends `T`, `P`, `U`, `D`, then `M`, `S`, `R` (whichever are present), never exceeding
/// `max_len` total bytes in `out`. Returns how many bytes of `msg.data` were emitted as `D` —
/// less than `msg.data.len()` iff truncation happened.
fn encode_variable_fields(msg: &Message, out: &mut Vec<u8>, max_len: usize) -> Result<usize> {
    let mut first = true;

    if msg.timestamp != TIMESTAMP_UNSET {
        push_field_sep(out, &mut first);
        out.push(b'T');
        out.extend_from_slice(format_timestamp(msg.timestamp).as_bytes());
    }
    if let Some(path) = &msg.path {
        if path.len() > MAX_PATH_LEN {
            return Err(OrpError::FieldTooLong {
                field: "path",
                len: path.len(),
                max: MAX_PATH_LEN,
            });
        }
        push_field_sep(out, &mut first);
        out.push(b'P');
        out.extend_from_slice(path.as_bytes());
    }
    if let Some(unit) = &msg.unit {
        if unit.len() > MAX_UNIT_LEN {
            return Err(OrpError::FieldTooLong {
                field: "unit",
                len: unit.len(),
                max: MAX_UNIT_LEN,
            });
        }
        push_field_sep(out, &mut first);
        out.push(b'U');
        out.extend_from_slice(unit.as_bytes());
    }

    let mut data_emitted = 0;
    if !msg.data.is_empty() {
        let sep_cost = usize::from(!first);
        let overhead = sep_cost + 1; // the 'D' identifier byte
        if max_len > out.len() + overhead {
            let remaining_cap = max_len - out.len() - overhead;
            data_emitted = remaining_cap.min(msg.data.len()).min(MAX_DATA_LEN);
            push_field_sep(out, &mut first);
            out.push(b'D');
            out.extend_from_slice(&msg.data[..data_emitted]);
        }
    }

    if msg.mtu >= 0 {
        push_field_sep(out, &mut first);
        out.push(b'M');
        out.extend_from_slice(msg.mtu.to_string().as_bytes());
    }
    if msg.sent_count >= 0 {
        push_field_sep(out, &mut first);
        out.push(b'S');
        out.extend_from_slice(msg.sent_count.to_string().as_bytes());
    }
    if msg.received_count >= 0 {
        push_field_sep(out, &mut first);
        out.push(b'R');
        out.extend_from_slice(msg.received_count.to_string().as_bytes());
    }

    Ok(data_emitted)
}

/// Encode `msg` to its full ASCII wire packet with no truncation. Use this when the
/// destination has no fixed size limit (tests, or a transport with no packet-size ceiling).
pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    validate_required(msg)?;
    let mut out = Vec::with_capacity(16 + msg.data.len());
    encode_header(msg, &mut out)?;
    let emitted = encode_variable_fields(msg, &mut out, usize::MAX)?;
    debug_assert_eq!(emitted, msg.data.len());
    Ok(out)
}

/// Encode `msg` into at most `max_len` bytes. If `data` doesn't fit, it is truncated and the
/// unsent remainder is left in `msg.data` (its length shrinks) so the caller can send the rest
/// in a follow-up packet.
pub fn encode_capped(msg: &mut Message, max_len: usize) -> Result<Vec<u8>> {
    validate_required(msg)?;
    let mut out = Vec::with_capacity(max_len.min(16 + msg.data.len()));
    encode_header(msg, &mut out)?;
    let emitted = encode_variable_fields(msg, &mut out, max_len)?;
    if emitted < msg.data.len() {
        msg.data.drain(0..emitted);
    }
    Ok(out)
}

/// A decoded ORP message whose string/data fields borrow from the buffer that was decoded.
/// Valid only as long as that buffer isn't reused — see [`crate::session::ClientSession`].
#[derive(Clone, Debug, PartialEq)]
pub struct MessageView<'a> {
    pub msg_type: PacketType,
    pub data_type: DataType,
    pub status: i32,
    pub version: Version,
    pub event: FileEvent,
    pub sequence_num: u16,
    pub timestamp: f64,
    pub path: Option<&'a str>,
    pub unit: Option<&'a str>,
    pub data: &'a [u8],
    pub sent_count: i32,
    pub received_count: i32,
    pub mtu: i32,
}

impl<'a> From<MessageView<'a>> for Message {
    fn from(view: MessageView<'a>) -> Self {
        Message {
            msg_type: view.msg_type,
            data_type: view.data_type,
            status: view.status,
            version: view.version,
            event: view.event,
            sequence_num: view.sequence_num,
            timestamp: view.timestamp,
            path: view.path.map(str::to_owned),
            unit: view.unit.map(str::to_owned),
            data: view.data.to_vec(),
            sent_count: view.sent_count,
            received_count: view.received_count,
            mtu: view.mtu,
        }
    }
}

/// Decode one unframed ORP packet out of `src`.
pub fn decode(src: &[u8]) -> Result<MessageView<'_>> {
    if src.len() < 4 {
        return Err(OrpError::ShortPacket);
    }
    let letter = src[0];
    let msg_type = PacketType::from_letter(letter).ok_or(OrpError::UnknownPacketType(letter))?;
    let required = msg_type.required();
    let second = src[1];

    let mut data_type = DataType::Undef;
    let mut status = 0_i32;
    let mut version = Version::V1;
    let mut event = FileEvent::Info;

    if required.contains(FieldReq::STATUS) {
        status = byte_to_status(second);
    } else if required.contains(FieldReq::DATA_TYPE) {
        data_type = DataType::from_letter(second).ok_or(OrpError::UnknownDataType(second))?;
    } else if required.contains(FieldReq::VERSION) {
        let raw = base36_to_enum(second).ok_or(OrpError::UnknownField(second))?;
        version = Version::from_u8(raw).ok_or(OrpError::UnknownField(second))?;
    } else if required.contains(FieldReq::EVENT) {
        let raw = base36_to_enum(second).ok_or(OrpError::UnknownField(second))?;
        event = FileEvent::from_u8(raw).ok_or(OrpError::UnknownField(second))?;
    }

    let sequence_num = u16::from_le_bytes([src[2], src[3]]);

    let mut path = None;
    let mut unit = None;
    let mut data: &[u8] = &[];
    let mut raw_timestamp: Option<&str> = None;
    let mut sent_count = -1_i32;
    let mut received_count = -1_i32;
    let mut mtu = -1_i32;

    let mut rest = &src[4..];
    while !rest.is_empty() {
        let id = rest[0];
        rest = &rest[1..];
        if id == b'D' {
            data = rest;
            rest = &[];
            break;
        }
        let end = rest.iter().position(|&b| b == SEPARATOR).unwrap_or(rest.len());
        let content = &rest[..end];
        rest = if end < rest.len() { &rest[end + 1..] } else { &[] };
        let content_str =
            std::str::from_utf8(content).map_err(|_| OrpError::UnknownField(id))?;
        match id {
            b'P' => {
                if content.len() > MAX_PATH_LEN {
                    return Err(OrpError::FieldTooLong {
                        field: "path",
                        len: content.len(),
                        max: MAX_PATH_LEN,
                    });
                }
                path = Some(content_str);
            }
            b'U' => {
                if content.len() > MAX_UNIT_LEN {
                    return Err(OrpError::FieldTooLong {
                        field: "unit",
                        len: content.len(),
                        max: MAX_UNIT_LEN,
                    });
                }
                unit = Some(content_str);
            }
            b'T' => raw_timestamp = Some(content_str),
            b'R' => received_count = parse_decimal(content_str, "received_count")?,
            b'S' => sent_count = parse_decimal(content_str, "sent_count")?,
            b'M' => mtu = parse_decimal(content_str, "mtu")?,
            other => return Err(OrpError::UnknownField(other)),
        }
    }

    let timestamp = match raw_timestamp {
        Some(raw) => parse_timestamp(raw)?,
        None => TIMESTAMP_UNSET,
    };

    if required.contains(FieldReq::PATH) && path.is_none() {
        return Err(OrpError::MissingField("path"));
    }
    if required.contains(FieldReq::TIME) && raw_timestamp.is_none() {
        return Err(OrpError::MissingField("timestamp"));
    }
    if required.contains(FieldReq::DATA) && data.is_empty() {
        return Err(OrpError::MissingField("data"));
    }

    Ok(MessageView {
        msg_type,
        data_type,
        status,
        version,
        event,
        sequence_num,
        timestamp,
        path,
        unit,
        data,
        sent_count,
        received_count,
        mtu,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::Status;

    #[test]
    fn scenario_push_numeric() {
        let msg = Message::new(PacketType::PushRqst)
            .with_data_type(DataType::Numeric)
            .with_path("/a/b")
            .with_timestamp(1_541_112_861.0)
            .with_data(*b"123");

        let packet = encode(&msg).expect("encode");
        assert_eq!(packet, b"PN\x00\x00T1541112861.0,P/a/b,D123".to_vec());

        let view = decode(&packet).expect("decode");
        assert_eq!(view.msg_type, PacketType::PushRqst);
        assert_eq!(view.data_type, DataType::Numeric);
        assert_eq!(view.path, Some("/a/b"));
        assert_eq!(view.timestamp, 1_541_112_861.0);
        assert_eq!(view.data, b"123");
    }

    #[test]
    fn scenario_create_input_with_units() {
        let msg = Message::new(PacketType::InputCreateRqst)
            .with_data_type(DataType::Boolean)
            .with_path("/x")
            .with_unit("mV");

        let packet = encode(&msg).expect("encode");
        assert_eq!(packet, b"IB\x00\x00P/x,UmV".to_vec());

        let view = decode(&packet).expect("decode");
        assert_eq!(view.path, Some("/x"));
        assert_eq!(view.unit, Some("mV"));
    }

    #[test]
    fn scenario_response_ok_is_four_bytes() {
        let msg = Message::new(PacketType::PushResp).with_status(Status::Ok.code());
        let packet = encode(&msg).expect("encode");
        assert_eq!(packet, vec![b'p', 0x40, 0x00, 0x00]);
    }

    #[test]
    fn scenario_response_not_found_sets_byte_one() {
        let msg = Message::new(PacketType::GetResp).with_status(Status::NotFound.code());
        let packet = encode(&msg).expect("encode");
        assert_eq!(packet[1], 0x41);

        let view = decode(&packet).expect("decode");
        assert_eq!(view.status, Status::NotFound.code());
    }

    #[test]
    fn scenario_sync_syn_v2_with_counters() {
        let mut msg = Message::new(PacketType::SyncSyn);
        msg.version = Version::V2;
        msg.sent_count = 10;
        msg.received_count = 9;
        msg.mtu = 512;

        let packet = encode(&msg).expect("encode");
        assert_eq!(packet[1], b'1');
        let tail = std::str::from_utf8(&packet[4..]).unwrap();
        assert_eq!(tail, "M512,S10,R9");
    }

    #[test]
    fn decode_rejects_unknown_packet_type() {
        let ok = decode(b"?\x00\x00\x00");
        assert!(ok.is_ok());
        let bogus = decode(b"!\x00\x00\x00");
        assert!(matches!(bogus, Err(OrpError::UnknownPacketType(b'!'))));
    }

    #[rstest::rstest]
    #[case(PacketType::DeleteRqst)]
    #[case(PacketType::HandlerAddRqst)]
    #[case(PacketType::SensorRemoveRqst)]
    fn path_only_round_trip(#[case] ty: PacketType) {
        let msg = Message::new(ty).with_path("/sensors/temp");
        let packet = encode(&msg).expect("encode");
        let view = decode(&packet).expect("decode");
        assert_eq!(view.path, Some("/sensors/temp"));
        assert_eq!(view.msg_type, ty);
    }

    #[test]
    fn missing_required_path_is_a_decode_error() {
        let packet = b"D \x00\x00";
        let err = decode(packet);
        assert!(matches!(err, Err(OrpError::MissingField("path"))));
    }

    #[test]
    fn encode_capped_truncates_and_shrinks_data() {
        let mut msg = Message::new(PacketType::FileDataRqst).with_data(vec![0xAB; 100]);
        let packet = encode_capped(&mut msg, 20).expect("encode_capped");
        assert_eq!(packet.len(), 20);
        assert_eq!(msg.data.len(), 100 - 15);
    }

    #[test]
    fn base36_round_trips_full_range() {
        for v in 0..=35_u8 {
            let letter = enum_to_base36(v);
            assert_eq!(base36_to_enum(letter), Some(v));
        }
    }
}
