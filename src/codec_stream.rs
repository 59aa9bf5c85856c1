//! A [`Decoder`]/[`Encoder`] pair wrapping the HDLC deframer/framer and ORP message codec, for
//! use with `asynchronous_codec::Framed` / `tokio_util::codec::Framed` over any
//! `AsyncRead + AsyncWrite` transport — mirroring the teacher crate's `codec` module.

use bytes::{Buf, BytesMut};

use crate::error::OrpError;
use crate::hdlc::{self, Deframer, FrameEvent};
use crate::message::Message;
use crate::{codec, session::PACKET_CAP};

#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "async-codec", feature = "tokio-codec")))
)]
/// A Codec used to encode/decode [`Message`]s from Streams and Sinks, framed over HDLC.
///
/// Holds the persistent receive-side HDLC context, matching the single-owner discipline
/// [`crate::session::ClientSession`] uses for its own receive path.
pub struct OrpFrameCodec {
    deframer: Deframer,
    packet_buf: Vec<u8>,
}

impl Default for OrpFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl OrpFrameCodec {
    /// A fresh codec with an empty receive-side HDLC context.
    pub fn new() -> Self {
        Self {
            deframer: Deframer::new(),
            packet_buf: Vec::new(),
        }
    }

    fn decode_helper(&mut self, buffer: &mut BytesMut) -> Result<Option<Message>, OrpError> {
        loop {
            if buffer.is_empty() {
                return Ok(None);
            }
            let (consumed, event) =
                self.deframer
                    .unpack(&mut self.packet_buf, PACKET_CAP, buffer.as_ref());
            buffer.advance(consumed);

            match event {
                FrameEvent::NeedMore => return Ok(None),
                FrameEvent::Error(err) => {
                    log::warn!("HDLC error while streaming: {err}");
                    self.packet_buf.clear();
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    continue;
                }
                FrameEvent::Complete => {
                    let view = codec::decode(&self.packet_buf);
                    self.packet_buf.clear();
                    return match view {
                        Ok(view) => Ok(Some(Message::from(view))),
                        Err(err) => {
                            log::warn!("ORP decode error while streaming: {err}");
                            Ok(None)
                        }
                    };
                }
            }
        }
    }
}

#[cfg(feature = "async-codec")]
mod non_tokio {
    use super::*;

    use asynchronous_codec::{Decoder, Encoder};

    impl Decoder for OrpFrameCodec {
        type Item = Message;
        type Error = OrpError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            self.decode_helper(src)
        }
    }

    impl Encoder for OrpFrameCodec {
        type Item = Message;
        type Error = OrpError;

        fn encode(
            &mut self,
            item: Self::Item,
            dst: &mut asynchronous_codec::BytesMut,
        ) -> Result<(), Self::Error> {
            let packet = codec::encode(&item)?;
            let frame = hdlc::pack(&packet);
            dst.reserve(frame.len());
            dst.extend_from_slice(&frame);
            Ok(())
        }
    }
}

#[cfg(feature = "tokio-codec")]
mod tokio_codec {
    use tokio_util::codec::{Decoder, Encoder};

    use super::*;

    impl Decoder for OrpFrameCodec {
        type Item = Message;
        type Error = OrpError;

        fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            self.decode_helper(src)
        }
    }

    impl Encoder<Message> for OrpFrameCodec {
        type Error = OrpError;

        fn encode(&mut self, item: Message, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
            let packet = codec::encode(&item)?;
            let frame = hdlc::pack(&packet);
            dst.reserve(frame.len());
            dst.extend_from_slice(&frame);
            Ok(())
        }
    }
}

#[cfg(all(test, feature = "async-codec"))]
mod test {
    use super::*;

    use asynchronous_codec::Framed;
    use futures::{executor, io::Cursor, SinkExt, TryStreamExt};

    use crate::message::{DataType, PacketType};

    fn sample() -> Message {
        Message::new(PacketType::PushRqst)
            .with_data_type(DataType::Numeric)
            .with_path("/a/b")
            .with_data(*b"123")
    }

    #[test]
    fn round_trip_over_framed_cursor() {
        let buf = vec![0_u8; 64];
        let cursor: Cursor<Vec<u8>> = Cursor::new(buf);
        let mut framed = Framed::new(cursor, OrpFrameCodec::new());

        let expected = sample();
        executor::block_on(framed.send(expected.clone())).unwrap();

        let mut cursor = framed.into_inner();
        cursor.set_position(0);
        let mut framed = Framed::new(cursor, OrpFrameCodec::new());

        let recovered = executor::block_on(framed.try_next()).unwrap().unwrap();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn chunked_byte_delivery_still_decodes() {
        let expected = sample();
        let packet = codec::encode(&expected).unwrap();
        let frame = hdlc::pack(&packet);

        let mut codec = OrpFrameCodec::new();
        let mut decoded = None;
        for byte in frame {
            let mut chunk = BytesMut::from(&[byte][..]);
            if let Ok(Some(msg)) = codec.decode_helper(&mut chunk) {
                decoded = Some(msg);
            }
        }
        assert_eq!(decoded, Some(expected));
    }
}
