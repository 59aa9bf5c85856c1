#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod at;
pub mod codec;
pub mod crc16;
pub mod error;
pub mod file_transfer;
pub mod hdlc;
pub mod message;
pub mod session;

#[cfg(any(feature = "async-codec", feature = "tokio-codec"))]
#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "async-codec", feature = "tokio-codec")))
)]
/// `Decoder`/`Encoder` implementations for `asynchronous-codec` and `tokio-util::codec`,
/// wrapping [`hdlc`] and [`codec`] behind the `Framed` Sink/Stream interface.
pub mod codec_stream;

pub use error::{OrpError, Result};
pub use message::{DataType, FileEvent, Message, PacketType, Status, Version};
pub use session::{ClientSession, FrameMode};
