use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use uartlink_frame::{DecodeError, Frame, FrameDecoder, FrameEncoder, Markers};

use crate::channel::{Channel, ChunkSink, Role};
use crate::connection::Connector;
use crate::error::LinkError;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub baud_rate: u32,
    pub markers: Markers,
    /// Per-frame backlog cap; `None` buffers without bound.
    pub max_backlog: Option<usize>,
    pub idle_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            markers: Markers::default(),
            max_backlog: None,
            idle_delay: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LinkEvent {
    Frame(Frame),
    DecodeError(DecodeError),
    Opened { address: String, role: Role },
    OpenFailed { address: String, error: String },
    Closed { address: String },
}

/// How the send and receive roles map onto open channels.
pub enum Topology {
    Disconnected,
    /// Both roles share one connection because the addresses match.
    Aliased(Arc<Channel>),
    /// Either side is `None` when its open failed.
    Independent {
        send: Option<Arc<Channel>>,
        receive: Option<Arc<Channel>>,
    },
}

impl Topology {
    pub fn send_channel(&self) -> Option<&Arc<Channel>> {
        match self {
            Topology::Disconnected => None,
            Topology::Aliased(channel) => Some(channel),
            Topology::Independent { send, .. } => send.as_ref(),
        }
    }

    pub fn receive_channel(&self) -> Option<&Arc<Channel>> {
        match self {
            Topology::Disconnected => None,
            Topology::Aliased(channel) => Some(channel),
            Topology::Independent { receive, .. } => receive.as_ref(),
        }
    }

    fn channels(&self) -> Vec<&Arc<Channel>> {
        match self {
            Topology::Disconnected => Vec::new(),
            Topology::Aliased(channel) => vec![channel],
            Topology::Independent { send, receive } => send.iter().chain(receive.iter()).collect(),
        }
    }
}

/// Owns the send/receive channels and the shared frame decoder.
pub struct LinkManager {
    config: LinkConfig,
    connector: Arc<dyn Connector>,
    decoder: Arc<Mutex<FrameDecoder>>,
    encoder: FrameEncoder,
    topology: Topology,
    tx_evt: Sender<LinkEvent>,
    rx_evt: Receiver<LinkEvent>,
}

impl LinkManager {
    pub fn new(config: LinkConfig, connector: Arc<dyn Connector>) -> Self {
        let (tx_evt, rx_evt) = unbounded();
        let decoder = Arc::new(Mutex::new(build_decoder(&config)));
        let encoder = FrameEncoder::new(config.markers.clone());
        Self {
            config,
            connector,
            decoder,
            encoder,
            topology: Topology::Disconnected,
            tx_evt,
            rx_evt,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Decoded frames, decode errors, and channel status changes.
    pub fn events(&self) -> &Receiver<LinkEvent> {
        &self.rx_evt
    }

    /// Tear down every channel and reconnect with the given addresses.
    ///
    /// Open failures are reported as [`LinkEvent::OpenFailed`] and leave that
    /// role disconnected until the next call.
    pub fn reconfigure(&mut self, send_address: &str, receive_address: &str) {
        self.shutdown();
        // Partial frames do not survive a channel restart.
        self.decoder.lock().reset();

        self.topology = if send_address == receive_address {
            match self.open_channel(send_address, Role::SendReceive, true) {
                Some(channel) => Topology::Aliased(channel),
                None => Topology::Disconnected,
            }
        } else {
            Topology::Independent {
                send: self.open_channel(send_address, Role::Send, false),
                receive: self.open_channel(receive_address, Role::Receive, true),
            }
        };
        log::info!("ports updated: send {send_address}, receive {receive_address}");
    }

    pub fn send_text(&self, content: &str) -> Result<usize, LinkError> {
        if self.encoder.markers().collides_text(content.as_bytes()) {
            log::warn!("text contains a delimiter or frame marker; it will not arrive as one frame");
        }
        self.send_raw(self.encoder.encode_text(content))
    }

    pub fn send_image(&self, payload: &[u8]) -> Result<usize, LinkError> {
        if self.encoder.markers().collides(payload) {
            log::warn!("image contains a frame marker; the receiver will misframe it");
        }
        self.send_raw(self.encoder.encode_image(payload))
    }

    fn send_raw(&self, wire: Vec<u8>) -> Result<usize, LinkError> {
        let channel = self.topology.send_channel().ok_or(LinkError::NotConnected)?;
        channel.write(&wire)?;
        log::debug!("sent {} bytes to {}", wire.len(), channel.address());
        Ok(wire.len())
    }

    /// Close all channels. Called again on drop.
    pub fn shutdown(&mut self) {
        let topology = std::mem::replace(&mut self.topology, Topology::Disconnected);
        for channel in topology.channels() {
            channel.close();
            let _ = self.tx_evt.send(LinkEvent::Closed {
                address: channel.address().to_string(),
            });
        }
    }

    fn open_channel(&self, address: &str, role: Role, receives: bool) -> Option<Arc<Channel>> {
        let channel = match Channel::open(self.connector.as_ref(), address, self.config.baud_rate, role) {
            Ok(channel) => channel.with_idle_delay(self.config.idle_delay),
            Err(e) => {
                log::error!("{e}");
                let _ = self.tx_evt.send(LinkEvent::OpenFailed {
                    address: address.to_string(),
                    error: e.to_string(),
                });
                return None;
            }
        };

        let sink = receives.then(|| self.decoder_sink());
        if let Err(e) = channel.start(sink) {
            log::error!("{e}");
            let _ = self.tx_evt.send(LinkEvent::OpenFailed {
                address: address.to_string(),
                error: e.to_string(),
            });
            return None;
        }

        let _ = self.tx_evt.send(LinkEvent::Opened {
            address: address.to_string(),
            role,
        });
        Some(Arc::new(channel))
    }

    /// The single serialized entry point into the decoder.
    fn decoder_sink(&self) -> ChunkSink {
        let decoder = Arc::clone(&self.decoder);
        let tx_evt = self.tx_evt.clone();
        Arc::new(move |chunk: &[u8]| {
            let mut decoder = decoder.lock();
            for result in decoder.push(chunk) {
                let event = match result {
                    Ok(frame) => LinkEvent::Frame(frame),
                    Err(e) => LinkEvent::DecodeError(e),
                };
                let _ = tx_evt.send(event);
            }
        })
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_decoder(config: &LinkConfig) -> FrameDecoder {
    let decoder = FrameDecoder::new(config.markers.clone());
    match config.max_backlog {
        Some(limit) => decoder.with_max_backlog(limit),
        None => decoder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackConnector;

    fn manager(connector: &LoopbackConnector) -> LinkManager {
        LinkManager::new(LinkConfig::default(), Arc::new(connector.clone()))
    }

    #[test]
    fn test_same_address_is_aliased() {
        let connector = LoopbackConnector::new();
        let mut link = manager(&connector);
        link.reconfigure("/dev/a", "/dev/a");

        assert!(matches!(link.topology(), Topology::Aliased(_)));
        // Writer plus read-loop clone of the one shared connection.
        assert_eq!(connector.open_handles("/dev/a"), 2);
    }

    #[test]
    fn test_distinct_addresses_are_independent() {
        let connector = LoopbackConnector::new();
        let mut link = manager(&connector);
        link.reconfigure("/dev/a", "/dev/b");

        match link.topology() {
            Topology::Independent { send, receive } => {
                assert_eq!(send.as_ref().map(|c| c.role()), Some(Role::Send));
                assert_eq!(receive.as_ref().map(|c| c.role()), Some(Role::Receive));
            }
            _ => panic!("expected independent channels"),
        }
    }

    #[test]
    fn test_send_without_channel_is_error() {
        let connector = LoopbackConnector::new();
        let link = manager(&connector);
        assert!(matches!(link.send_text("hi"), Err(LinkError::NotConnected)));
    }

    #[test]
    fn test_failed_send_side_keeps_receive_side() {
        let connector = LoopbackConnector::new();
        connector.fail_open("/dev/a");
        let mut link = manager(&connector);
        link.reconfigure("/dev/a", "/dev/b");

        assert!(link.topology().send_channel().is_none());
        assert!(link.topology().receive_channel().is_some());
        assert!(matches!(link.send_image(b"x"), Err(LinkError::NotConnected)));
    }

    #[test]
    fn test_text_with_delimiter_is_sent_unescaped() {
        let connector = LoopbackConnector::new();
        let mut link = manager(&connector);
        link.reconfigure("/dev/a", "/dev/b");

        assert_eq!(link.send_text("one\ntwo").unwrap(), 8);
        assert_eq!(connector.written("/dev/a"), b"one\ntwo\n");
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let connector = LoopbackConnector::new();
        let mut link = manager(&connector);
        link.reconfigure("/dev/a", "/dev/b");
        link.shutdown();
        link.shutdown();

        assert!(matches!(link.topology(), Topology::Disconnected));
        assert_eq!(connector.open_handles("/dev/a"), 0);
        assert_eq!(connector.open_handles("/dev/b"), 0);
    }
}
