//! The client send/receive pipeline: owns the fixed-capacity scratch buffers, the persistent
//! receive-side HDLC context, and the file-transfer auto-ack policy, per §4.5/§4.6.
//!
//! Re-architected from the reference client's process-wide globals into an explicit
//! [`ClientSession`] value per the §9 "cyclic/global state" redesign note — this also makes
//! concurrent sessions possible.

use crate::at;
use crate::error::{OrpError, Result};
use crate::file_transfer::FileTransfer;
use crate::hdlc::{self, Deframer, FrameEvent};
use crate::message::{Message, PacketType, Status, MAX_DATA_LEN};
use crate::codec;

/// Largest decoded-packet size this session will accept: the largest `data` payload plus
/// generous room for headers and tagged fields.
pub const PACKET_CAP: usize = MAX_DATA_LEN + 256;
/// Largest raw framed size this session will buffer: worst-case escape expansion (every byte
/// doubles) plus framing overhead. Real traffic needs roughly 1.1x; this sizes for the stress
/// case, matching the reference client's buffer-sizing policy (§4.5).
pub const FRAME_CAP: usize = PACKET_CAP * 2 + 6;

/// Which framer the session uses on this transport. Mutually exclusive within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameMode {
    /// Asynchronous HDLC byte framing ([`crate::hdlc`]).
    Hdlc,
    /// AT-command line wrapper ([`crate::at`]); no CRC, no escaping.
    At,
}

/// Owns everything needed to drive one direction-agnostic ORP conversation over a byte
/// transport: outbound encode/frame, inbound deframe/decode/dispatch, and the file-transfer
/// auto-ack policy.
pub struct ClientSession {
    mode: FrameMode,
    rx_frame: Vec<u8>,
    rx_packet: Vec<u8>,
    deframer: Deframer,
    file_transfer: Option<FileTransfer>,
    pending_acks: Vec<Message>,
}

impl ClientSession {
    /// A fresh session in the given [`FrameMode`], with empty buffers and a reset receive
    /// context.
    pub fn new(mode: FrameMode) -> Self {
        Self {
            mode,
            rx_frame: Vec::with_capacity(FRAME_CAP),
            rx_packet: Vec::with_capacity(PACKET_CAP),
            deframer: Deframer::new(),
            file_transfer: None,
            pending_acks: Vec::new(),
        }
    }

    /// Begin tracking an inbound file transfer; subsequent `FILE_DATA_RQST` messages dispatched
    /// through [`Self::drive_receive`] are cached through it.
    pub fn begin_file_transfer(&mut self, transfer: FileTransfer) {
        self.file_transfer = Some(transfer);
    }

    pub fn file_transfer(&self) -> Option<&FileTransfer> {
        self.file_transfer.as_ref()
    }

    /// Encode and frame `msg` for transmission. Each call uses a fresh, transient HDLC encode
    /// context (distinct from the persistent receive context) — encoding is stateless aside
    /// from the CRC it computes over the one packet being sent.
    pub fn transmit(&self, msg: &Message) -> Result<Vec<u8>> {
        let packet = codec::encode(msg)?;
        log::debug!(
            "transmitting {:?} seq={} ({} bytes)",
            msg.msg_type,
            msg.sequence_num,
            packet.len()
        );
        Ok(match self.mode {
            FrameMode::Hdlc => hdlc::pack(&packet),
            FrameMode::At => at::pack(&packet),
        })
    }

    /// Take any `FILE_DATA_RESP` acknowledgements the auto-ack policy queued during the most
    /// recent [`Self::drive_receive`] call, for the caller to [`Self::transmit`].
    pub fn take_pending_acks(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.pending_acks)
    }

    /// Feed newly read transport bytes through the deframer/decoder, invoking `dispatch` for
    /// every complete message. Safe to call with arbitrarily small `input` chunks, including
    /// one byte at a time; a partial frame straddling two calls is preserved internally.
    pub fn drive_receive(&mut self, input: &[u8], dispatch: &mut dyn FnMut(&Message)) -> Result<()> {
        match self.mode {
            FrameMode::Hdlc => self.drive_receive_hdlc(input, dispatch),
            FrameMode::At => self.drive_receive_at(input, dispatch),
        }
    }

    fn drive_receive_hdlc(
        &mut self,
        input: &[u8],
        dispatch: &mut dyn FnMut(&Message),
    ) -> Result<()> {
        if self.rx_frame.len() + input.len() > FRAME_CAP {
            return Err(OrpError::BufferOverflow {
                got: self.rx_frame.len() + input.len(),
                max: FRAME_CAP,
            });
        }
        self.rx_frame.extend_from_slice(input);

        let mut offset = 0;
        while offset < self.rx_frame.len() {
            let (consumed, event) =
                self.deframer
                    .unpack(&mut self.rx_packet, PACKET_CAP, &self.rx_frame[offset..]);
            offset += consumed;

            match event {
                FrameEvent::NeedMore => break,
                FrameEvent::Error(err) => {
                    log::warn!("HDLC error, resynchronizing: {err}");
                    self.rx_packet.clear();
                }
                FrameEvent::Complete => {
                    log::debug!("frame complete ({} bytes)", self.rx_packet.len());
                    self.handle_packet(dispatch);
                    self.rx_packet.clear();
                }
            }
        }
        self.rx_frame.drain(0..offset);
        Ok(())
    }

    fn drive_receive_at(&mut self, input: &[u8], dispatch: &mut dyn FnMut(&Message)) -> Result<()> {
        let packet = at::unpack(input);
        if packet.is_empty() {
            return Ok(());
        }
        self.rx_packet.clear();
        self.rx_packet.extend_from_slice(packet);
        self.handle_packet(dispatch);
        self.rx_packet.clear();
        Ok(())
    }

    fn handle_packet(&mut self, dispatch: &mut dyn FnMut(&Message)) {
        match codec::decode(&self.rx_packet) {
            Ok(view) => {
                let msg = Message::from(view);
                self.apply_auto_ack(&msg);
                dispatch(&msg);
            }
            Err(err) => {
                log::warn!(
                    "ORP decode error on packet starting {:#04X}: {err}",
                    self.rx_packet.first().copied().unwrap_or(0)
                );
            }
        }
    }

    /// If `msg` is `FILE_DATA_RQST` and a file transfer is tracked in auto-ack mode, cache the
    /// payload and queue an immediate `FILE_DATA_RESP(OK)` — per §4.5.
    fn apply_auto_ack(&mut self, msg: &Message) {
        if msg.msg_type != PacketType::FileDataRqst {
            return;
        }
        let Some(transfer) = self.file_transfer.as_mut() else {
            return;
        };
        if !transfer.is_auto() {
            return;
        }
        if let Err(err) = transfer.cache(&msg.data) {
            log::warn!("file-transfer cache failed: {err}");
            return;
        }
        let ack = Message::new(PacketType::FileDataResp)
            .with_status(Status::Ok.code())
            .with_sequence_num(msg.sequence_num);
        self.pending_acks.push(ack);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::DataType;
    use std::cell::RefCell;

    fn push_message() -> Message {
        Message::new(PacketType::PushRqst)
            .with_data_type(DataType::Numeric)
            .with_path("/a/b")
            .with_data(*b"123")
    }

    #[test]
    fn transmit_then_receive_round_trips() {
        let session = ClientSession::new(FrameMode::Hdlc);
        let msg = push_message();
        let frame = session.transmit(&msg).expect("transmit");

        let mut receiver = ClientSession::new(FrameMode::Hdlc);
        let received = RefCell::new(Vec::new());
        receiver
            .drive_receive(&frame, &mut |m| received.borrow_mut().push(m.clone()))
            .expect("drive_receive");

        assert_eq!(received.into_inner(), vec![msg]);
    }

    #[test]
    fn receive_tolerates_one_byte_at_a_time() {
        let session = ClientSession::new(FrameMode::Hdlc);
        let msg = push_message();
        let frame = session.transmit(&msg).expect("transmit");

        let mut receiver = ClientSession::new(FrameMode::Hdlc);
        let received = RefCell::new(Vec::new());
        for byte in &frame {
            receiver
                .drive_receive(&[*byte], &mut |m| received.borrow_mut().push(m.clone()))
                .expect("drive_receive");
        }

        assert_eq!(received.into_inner(), vec![msg]);
    }

    #[test]
    fn crc_error_then_valid_frame_both_processed_in_one_stream() {
        let session = ClientSession::new(FrameMode::Hdlc);
        let mut bad_frame = session.transmit(&push_message()).expect("transmit");
        bad_frame[3] ^= 0x01;
        let good_frame = session.transmit(&push_message()).expect("transmit");

        let mut stream = bad_frame;
        stream.extend_from_slice(&good_frame);

        let mut receiver = ClientSession::new(FrameMode::Hdlc);
        let received = RefCell::new(Vec::new());
        receiver
            .drive_receive(&stream, &mut |m| received.borrow_mut().push(m.clone()))
            .expect("drive_receive");

        assert_eq!(received.into_inner(), vec![push_message()]);
    }

    #[test]
    fn at_mode_receive_is_pass_through_of_one_packet() {
        let session = ClientSession::new(FrameMode::At);
        let msg = push_message();
        let packet = codec::encode(&msg).expect("encode");

        let mut receiver = ClientSession::new(FrameMode::At);
        let received = RefCell::new(Vec::new());
        receiver
            .drive_receive(&packet, &mut |m| received.borrow_mut().push(m.clone()))
            .expect("drive_receive");

        assert_eq!(received.into_inner(), vec![msg]);
        let _ = session; // constructed only to exercise FrameMode::At symmetrically
    }

    #[test]
    fn auto_ack_queues_file_data_resp() {
        let dir = std::env::temp_dir().join(format!("octave-orp-session-test-{}", std::process::id()));
        let _ = std::fs::remove_file(&dir);

        let mut receiver = ClientSession::new(FrameMode::Hdlc);
        receiver.begin_file_transfer(
            FileTransfer::setup(&dir, 0, true).expect("setup"),
        );

        let msg = Message::new(PacketType::FileDataRqst).with_data(*b"chunk");
        let frame = hdlc::pack(&codec::encode(&msg).expect("encode"));

        receiver.drive_receive(&frame, &mut |_| {}).expect("drive_receive");
        let acks = receiver.take_pending_acks();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].msg_type, PacketType::FileDataResp);
        assert_eq!(acks[0].status, Status::Ok.code());

        std::fs::remove_file(&dir).ok();
    }
}
