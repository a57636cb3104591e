use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use uartlink_frame::{Frame, FrameKind};

use crate::encoding::TextEncoding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub direction: Direction,
    pub frame: Frame,
}

/// Bounded history of frames sent and received, oldest first.
pub struct Transcript {
    entries: VecDeque<TranscriptEntry>,
    max_entries: usize,
}

impl Transcript {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn push(&mut self, direction: Direction, frame: Frame) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        self.entries.push_back(TranscriptEntry {
            timestamp,
            direction,
            frame,
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_text(&self, show_timestamp: bool, encoding: TextEncoding) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            if show_timestamp {
                result.push_str(&format_timestamp(entry.timestamp));
                result.push(' ');
            }
            result.push_str(match entry.direction {
                Direction::Rx => "RX: ",
                Direction::Tx => "TX: ",
            });
            match entry.frame.kind() {
                FrameKind::Text => result.push_str(&encoding.decode(entry.frame.payload())),
                FrameKind::Image => {
                    result.push_str(&format!("[image, {} bytes]", entry.frame.payload().len()))
                }
            }
            result.push('\n');
        }
        result
    }
}

/// `[HH:MM:SS.mmm]` in UTC.
fn format_timestamp(timestamp: u64) -> String {
    let millis = timestamp % 1000;
    let secs = timestamp / 1000;
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("[{hours:02}:{minutes:02}:{seconds:02}.{millis:03}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded() {
        let mut transcript = Transcript::new(2);
        transcript.push(Direction::Tx, Frame::text("one"));
        transcript.push(Direction::Rx, Frame::text("two"));
        transcript.push(Direction::Rx, Frame::text("three"));

        assert_eq!(transcript.len(), 2);
        let first = transcript.entries().next().unwrap();
        assert_eq!(first.frame, Frame::text("two"));
    }

    #[test]
    fn test_to_text() {
        let mut transcript = Transcript::new(10);
        transcript.push(Direction::Tx, Frame::text("hello"));
        transcript.push(Direction::Rx, Frame::Image(vec![0; 42]));
        assert_eq!(
            transcript.to_text(false, TextEncoding::Utf8),
            "TX: hello\nRX: [image, 42 bytes]\n"
        );

        transcript.clear();
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(3_723_004), "[01:02:03.004]");
    }
}
