//! Core functionalities: serial channels, link lifecycle, transcript, text decoding.

pub mod channel;
pub mod connection;
pub mod encoding;
pub mod error;
pub mod link;
pub mod loopback;
pub mod transcript;

pub use channel::{Channel, ChunkSink, Role};
pub use connection::{list_ports, Connector, PortInfo, SerialConnection, SerialPortConnector};
pub use encoding::TextEncoding;
pub use error::LinkError;
pub use link::{LinkConfig, LinkEvent, LinkManager, Topology};
pub use loopback::LoopbackConnector;
pub use transcript::{Direction, Transcript, TranscriptEntry};
pub use uartlink_frame::{DecodeError, Frame, FrameKind, Markers};
