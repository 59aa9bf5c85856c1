//! AT-command framing: the alternative to [`crate::hdlc`] used when the transport is an
//! AT-command modem channel. No CRC, no escaping — just a literal wrapper line.
//!
//! Mutually exclusive with HDLC within a session; see [`crate::session::FrameMode`].

/// Literal prefix of every AT-wrapped packet.
pub const AT_PREFIX: &[u8] = b"AT+ORP=\"";
/// Literal suffix of every AT-wrapped packet.
pub const AT_SUFFIX: &[u8] = b"\"\n";

/// Wrap an already-encoded ORP packet in the `AT+ORP="..."` command line.
///
/// The two sequence-number bytes (offset 2/3) are replaced with ASCII `'0'`, `'0'` — the AT
/// channel has no notion of a running sequence number, so the reference client always sends
/// zero there rather than leaving whatever the codec produced.
pub fn pack(packet: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(AT_PREFIX.len() + packet.len() + AT_SUFFIX.len());
    out.extend_from_slice(AT_PREFIX);
    out.extend_from_slice(packet);
    if out.len() >= AT_PREFIX.len() + 4 {
        let seq_start = AT_PREFIX.len() + 2;
        out[seq_start] = b'0';
        out[seq_start + 1] = b'0';
    }
    out.extend_from_slice(AT_SUFFIX);
    out
}

/// AT-channel receive is a pass-through: the caller already has the unframed packet bytes, with
/// no CRC to verify and nothing to unescape.
pub fn unpack(src: &[u8]) -> &[u8] {
    src
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wraps_with_prefix_and_suffix() {
        let packet = b"PN\x00\x00T1.0,P/a,D1";
        let wrapped = pack(packet);
        assert!(wrapped.starts_with(AT_PREFIX));
        assert!(wrapped.ends_with(AT_SUFFIX));
    }

    #[test]
    fn zeroes_the_sequence_number() {
        let packet = b"PN\x2a\x2bT1.0,P/a,D1";
        let wrapped = pack(packet);
        let seq_start = AT_PREFIX.len() + 2;
        assert_eq!(&wrapped[seq_start..seq_start + 2], b"00");
    }

    #[test]
    fn unpack_is_identity() {
        let bytes = b"anything at all";
        assert_eq!(unpack(bytes), bytes);
    }
}
