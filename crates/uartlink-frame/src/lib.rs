//! Sentinel-delimited framing for text and image payloads sharing one byte stream.
//!
//! ```text
//! TextFrame  := <content-bytes> TEXT_DELIMITER
//! ImageFrame := IMAGE_START <raw-bytes> IMAGE_END
//! ```
//!
//! There is no length prefix and no escaping: a payload that contains a
//! marker sequence will desynchronize the receiver.

pub mod decoder;
pub mod encoder;
pub mod markers;

pub use decoder::{DecodeError, DecoderState, FrameDecoder};
pub use encoder::FrameEncoder;
pub use markers::{MarkerError, Markers, IMAGE_END, IMAGE_START, TEXT_DELIMITER};

/// A fully decoded unit of application data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw text bytes, delimiter stripped. Decoding is left to the consumer.
    Text(Vec<u8>),
    Image(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Image,
}

impl Frame {
    pub fn text(content: impl Into<String>) -> Self {
        Frame::Text(content.into().into_bytes())
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Text(_) => FrameKind::Text,
            Frame::Image(_) => FrameKind::Image,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Frame::Text(bytes) | Frame::Image(bytes) => bytes,
        }
    }
}
