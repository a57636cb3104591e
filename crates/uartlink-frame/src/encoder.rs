use crate::markers::{Markers, TEXT_DELIMITER};
use crate::Frame;

/// Serializes outgoing payloads into wire bytes for a single write.
#[derive(Debug, Clone, Default)]
pub struct FrameEncoder {
    markers: Markers,
}

impl FrameEncoder {
    pub fn new(markers: Markers) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn encode_text(&self, content: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(content.len() + 1);
        out.extend_from_slice(content.as_bytes());
        out.push(TEXT_DELIMITER);
        out
    }

    pub fn encode_image(&self, payload: &[u8]) -> Vec<u8> {
        let start = self.markers.image_start();
        let end = self.markers.image_end();
        let mut out = Vec::with_capacity(start.len() + payload.len() + end.len());
        out.extend_from_slice(start);
        out.extend_from_slice(payload);
        out.extend_from_slice(end);
        out
    }

    pub fn encode(&self, frame: &Frame) -> Vec<u8> {
        match frame {
            Frame::Text(bytes) => {
                let mut out = bytes.clone();
                out.push(TEXT_DELIMITER);
                out
            }
            Frame::Image(payload) => self.encode_image(payload),
        }
    }
}
