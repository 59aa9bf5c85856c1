//! Asynchronous HDLC-style byte framing.
//!
//! Frames are delimited by [`FLAG`], byte-stuffed with [`ESC`]/[`ESC_MASK`], and trailed by a
//! CRC-16/CCITT ([`crate::crc16`]) of the unescaped payload. [`Deframer`] is the streaming decode
//! half: it is safe to feed it arbitrarily small chunks, including one byte at a time, across
//! many calls to [`Deframer::unpack`]. [`Framer`] is the encode half; unlike the deframer it
//! operates on a whole payload at once since the pipeline always has the complete outbound
//! packet in hand before framing it.

use crate::crc16;
use crate::error::OrpError;

/// Frame delimiter.
pub const FLAG: u8 = 0x7E;
/// Escape byte.
pub const ESC: u8 = 0x7D;
/// XOR mask applied to an escaped byte.
pub const ESC_MASK: u8 = 0x20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecodeState {
    Init,
    SofSearch,
    SofFound,
    Data,
    Escaped,
}

/// What happened to the most recently processed source byte(s).
#[derive(Debug, PartialEq, Eq)]
pub enum FrameEvent {
    /// More source bytes are needed before a frame can complete.
    NeedMore,
    /// A frame completed and its payload (minus the CRC trailer) was appended to the
    /// destination buffer.
    Complete,
    /// A frame was abandoned because of a framing or CRC error. The deframer has already
    /// reset itself and is ready to hunt for the next [`FLAG`].
    Error(OrpError),
}

/// Streaming HDLC decode context, owned per-direction by the caller (see
/// [`crate::session::ClientSession`]).
///
/// The "windowed emission" trick: the final two unescaped bytes of every frame are the CRC
/// trailer, but the deframer can't know it has reached them until the trailing `FLAG` arrives.
/// So it holds the two most recently unescaped bytes back in `window` and only releases the
/// older one (into the destination buffer, folded into `crc`) once a third byte shows up.
#[derive(Debug)]
pub struct Deframer {
    state: DecodeState,
    crc: u16,
    window: [u8; 2],
    filled: u8,
    processed: usize,
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deframer {
    /// A fresh deframer, hunting for the first `FLAG`.
    pub fn new() -> Self {
        Self {
            state: DecodeState::Init,
            crc: crc16::INITIAL,
            window: [0; 2],
            filled: 0,
            processed: 0,
        }
    }

    /// True exactly when the state machine is at rest, i.e. immediately after construction or
    /// immediately after a frame completed or errored out.
    pub fn is_done(&self) -> bool {
        matches!(self.state, DecodeState::Init)
    }

    /// Total number of bytes processed across the lifetime of this context, including bytes
    /// that were consumed searching for a sync flag.
    pub fn processed_count(&self) -> usize {
        self.processed
    }

    fn reset(&mut self) {
        self.state = DecodeState::Init;
        self.crc = crc16::INITIAL;
        self.window = [0; 2];
        self.filled = 0;
    }

    /// Push one already-unescaped payload byte through the emission window, releasing the
    /// oldest windowed byte (if any) into `dest` and folding it into the running CRC.
    fn window_push(&mut self, byte: u8, dest: &mut Vec<u8>, max_len: usize) -> Option<OrpError> {
        if self.filled < 2 {
            self.window[self.filled as usize] = byte;
            self.filled += 1;
            return None;
        }
        let released = self.window[0];
        self.window[0] = self.window[1];
        self.window[1] = byte;
        if dest.len() >= max_len {
            return Some(OrpError::BufferOverflow {
                got: dest.len() + 1,
                max: max_len,
            });
        }
        dest.push(released);
        self.crc = crc16::update(self.crc, released);
        None
    }

    /// Feed `src` into the state machine, appending emitted payload bytes to `dest` (capped at
    /// `max_len` total). Returns the number of bytes of `src` consumed and what happened.
    ///
    /// Every examined source byte is counted as consumed, including the trailing `FLAG` — see
    /// the design notes on the "trailing flag accounting" open question.
    pub fn unpack(&mut self, dest: &mut Vec<u8>, max_len: usize, src: &[u8]) -> (usize, FrameEvent) {
        for (i, &b) in src.iter().enumerate() {
            self.processed += 1;
            match self.state {
                DecodeState::Init => {
                    self.reset();
                    self.state = DecodeState::SofSearch;
                    // fall through to SofSearch handling for this same byte
                    if b == FLAG {
                        self.state = DecodeState::SofFound;
                    }
                    continue;
                }
                DecodeState::SofSearch => {
                    if b == FLAG {
                        self.state = DecodeState::SofFound;
                    }
                    continue;
                }
                DecodeState::SofFound => {
                    if b == FLAG {
                        continue;
                    }
                    if b == ESC {
                        self.state = DecodeState::Escaped;
                        continue;
                    }
                    self.state = DecodeState::Data;
                    if let Some(err) = self.window_push(b, dest, max_len) {
                        self.reset();
                        return (i + 1, FrameEvent::Error(err));
                    }
                }
                DecodeState::Data => {
                    if b == FLAG {
                        let event = self.end_of_frame();
                        self.reset();
                        return (i + 1, event);
                    }
                    if b == ESC {
                        self.state = DecodeState::Escaped;
                        continue;
                    }
                    if let Some(err) = self.window_push(b, dest, max_len) {
                        self.reset();
                        return (i + 1, FrameEvent::Error(err));
                    }
                }
                DecodeState::Escaped => {
                    if b == FLAG || b == ESC {
                        self.reset();
                        return (i + 1, FrameEvent::Error(OrpError::Framing));
                    }
                    self.state = DecodeState::Data;
                    if let Some(err) = self.window_push(b ^ ESC_MASK, dest, max_len) {
                        self.reset();
                        return (i + 1, FrameEvent::Error(err));
                    }
                }
            }
        }
        (src.len(), FrameEvent::NeedMore)
    }

    fn end_of_frame(&self) -> FrameEvent {
        if self.filled < 2 {
            return FrameEvent::Error(OrpError::Framing);
        }
        let received_crc = u16::from_le_bytes([self.window[0], self.window[1]]);
        if received_crc != self.crc {
            return FrameEvent::Error(OrpError::CrcMismatch {
                expected: received_crc,
                computed: self.crc,
            });
        }
        FrameEvent::Complete
    }
}

/// One-shot HDLC encoder. Escapes `payload`, appends its CRC-16/CCITT trailer (serialized
/// least-significant byte first, matching what [`Deframer`]'s window reassembles on decode —
/// see the design notes on CRC byte order), and wraps the result in leading/trailing `FLAG`s.
pub fn pack(payload: &[u8]) -> Vec<u8> {
    let crc = crc16::checksum(payload);
    let mut out = Vec::with_capacity(payload.len() + 6);
    out.push(FLAG);
    for &b in payload.iter().chain(crc.to_le_bytes().iter()) {
        escape_into(&mut out, b);
    }
    out.push(FLAG);
    out
}

fn escape_into(out: &mut Vec<u8>, byte: u8) {
    if byte == FLAG || byte == ESC {
        out.push(ESC);
        out.push(byte ^ ESC_MASK);
    } else {
        out.push(byte);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode_whole(frame: &[u8]) -> (Vec<u8>, FrameEvent) {
        let mut deframer = Deframer::new();
        let mut dest = Vec::new();
        let (_, event) = deframer.unpack(&mut dest, 1 << 20, frame);
        (dest, event)
    }

    #[rstest::rstest]
    #[case(&[])]
    #[case(b"hello")]
    #[case(&[0x01, 0x02, 0x03, 0xFF])]
    fn roundtrip_no_special_bytes(#[case] payload: &[u8]) {
        let frame = pack(payload);
        let (decoded, event) = decode_whole(&frame);
        assert_eq!(event, FrameEvent::Complete);
        assert_eq!(decoded, payload);
    }

    #[rstest::rstest]
    #[case(&[FLAG])]
    #[case(&[ESC])]
    #[case(&[FLAG, ESC, FLAG])]
    #[case(&[0x00, ESC, FLAG, 0xFF, ESC, ESC])]
    fn roundtrip_with_special_bytes(#[case] payload: &[u8]) {
        let frame = pack(payload);
        let (decoded, event) = decode_whole(&frame);
        assert_eq!(event, FrameEvent::Complete);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn chunking_invariance_single_byte_chunks() {
        let payload = b"chunk me byte by byte, please \x7e\x7d done";
        let frame = pack(payload);

        let mut whole_dest = Vec::new();
        let mut whole = Deframer::new();
        whole.unpack(&mut whole_dest, 1 << 20, &frame);

        let mut chunked_dest = Vec::new();
        let mut chunked = Deframer::new();
        let mut final_event = FrameEvent::NeedMore;
        for &byte in &frame {
            let (_, event) = chunked.unpack(&mut chunked_dest, 1 << 20, &[byte]);
            if !matches!(event, FrameEvent::NeedMore) {
                final_event = event;
            }
        }

        assert_eq!(chunked_dest, whole_dest);
        assert_eq!(final_event, FrameEvent::Complete);
    }

    #[test]
    fn trailing_flag_is_consumed_and_counted() {
        let frame = pack(b"x");
        let mut deframer = Deframer::new();
        let mut dest = Vec::new();
        let mut total_consumed = 0;
        for &byte in &frame {
            let (consumed, event) = deframer.unpack(&mut dest, 1 << 20, &[byte]);
            total_consumed += consumed;
            if matches!(event, FrameEvent::Complete) {
                break;
            }
        }
        assert_eq!(total_consumed, frame.len());
        assert!(deframer.is_done());
    }

    #[test]
    fn crc_error_then_recovers_on_next_frame() {
        let mut frame = pack(b"payload one");
        // flip a bit deep inside the payload, after the leading FLAG
        frame[3] ^= 0x01;
        let good_frame = pack(b"payload two");

        let mut stream = frame;
        stream.extend_from_slice(&good_frame);

        let mut deframer = Deframer::new();
        let mut dest = Vec::new();
        let mut offset = 0;
        let mut events = Vec::new();
        while offset < stream.len() {
            let (consumed, event) = deframer.unpack(&mut dest, 1 << 20, &stream[offset..]);
            offset += consumed;
            if !matches!(event, FrameEvent::NeedMore) {
                events.push(event);
                dest.clear();
            }
        }

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], FrameEvent::Error(OrpError::CrcMismatch { .. })));
        assert!(matches!(events[1], FrameEvent::Complete));
    }

    #[test]
    fn buffer_overflow_is_reported() {
        let frame = pack(b"0123456789");
        let mut deframer = Deframer::new();
        let mut dest = Vec::new();
        let (_, event) = deframer.unpack(&mut dest, 3, &frame);
        assert!(matches!(event, FrameEvent::Error(OrpError::BufferOverflow { .. })));
    }
}
