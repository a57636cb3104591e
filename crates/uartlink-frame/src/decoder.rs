use std::fmt;

use thiserror::Error;

use crate::markers::{find, Markers, TEXT_DELIMITER};
use crate::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    #[default]
    AwaitingFrame,
    /// `IMAGE_START` consumed, `IMAGE_END` not yet seen.
    InImage,
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderState::AwaitingFrame => f.write_str("awaiting frame"),
            DecoderState::InImage => f.write_str("in image"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("backlog overflow while {state}: {pending} bytes buffered, limit is {limit}")]
    BacklogOverflow {
        state: DecoderState,
        pending: usize,
        limit: usize,
    },
}

enum Step {
    Stalled,
    Consumed(Option<Frame>),
}

/// Incremental demultiplexer for the text/image byte stream.
///
/// Bytes that do not yet form a complete frame stay in the backlog until a
/// later [`push`](FrameDecoder::push) completes them, so the emitted frames
/// do not depend on how the stream was chunked.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    markers: Markers,
    backlog: Vec<u8>,
    state: DecoderState,
    // Backlog offset before which the current state's search cannot match.
    scan_from: usize,
    max_backlog: Option<usize>,
    // Set once the in-progress frame has overflowed; its remainder is dropped.
    discarding: bool,
}

impl FrameDecoder {
    pub fn new(markers: Markers) -> Self {
        Self {
            markers,
            ..Default::default()
        }
    }

    /// Cap the backlog. A frame that outgrows `limit` fails with
    /// [`DecodeError::BacklogOverflow`] instead of buffering without bound.
    pub fn with_max_backlog(mut self, limit: usize) -> Self {
        let floor = self
            .markers
            .image_start()
            .len()
            .max(self.markers.image_end().len());
        self.max_backlog = Some(limit.max(floor));
        self
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Number of buffered bytes not yet classified.
    pub fn pending(&self) -> usize {
        self.backlog.len()
    }

    pub fn reset(&mut self) {
        self.backlog.clear();
        self.state = DecoderState::AwaitingFrame;
        self.scan_from = 0;
        self.discarding = false;
    }

    /// Append `chunk` and extract every frame it completes, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Frame, DecodeError>> {
        self.backlog.extend_from_slice(chunk);

        let mut out = Vec::new();
        loop {
            let step = match self.state {
                DecoderState::AwaitingFrame => self.step_awaiting(),
                DecoderState::InImage => self.step_image(),
            };
            match step {
                Step::Stalled => break,
                Step::Consumed(Some(frame)) => out.push(Ok(frame)),
                Step::Consumed(None) => {}
            }
        }

        if let Some(err) = self.enforce_limit() {
            out.push(Err(err));
        }
        out
    }

    fn step_awaiting(&mut self) -> Step {
        let start_len = self.markers.image_start().len();
        let image_at = find(&self.backlog, self.markers.image_start(), self.scan_from);
        let text_end = self
            .backlog
            .get(self.scan_from..)
            .and_then(|tail| tail.iter().position(|&b| b == TEXT_DELIMITER))
            .map(|pos| pos + self.scan_from);

        // A delimiter ahead of the image marker ends a text line first.
        let image_at = image_at.filter(|&i| text_end.map_or(true, |j| i < j));
        if let Some(i) = image_at {
            let mut prefix = self.consume(i + start_len);
            prefix.truncate(i);
            self.state = DecoderState::InImage;
            // Only the prefix before an image marker is suppressed when empty.
            let frame = (!prefix.is_empty()).then(|| Frame::Text(prefix));
            return Step::Consumed(self.admit(frame));
        }

        match text_end {
            Some(j) => {
                let mut line = self.consume(j + 1);
                line.truncate(j);
                Step::Consumed(self.admit(Some(Frame::Text(line))))
            }
            None => {
                self.scan_from = self.backlog.len().saturating_sub(start_len - 1);
                Step::Stalled
            }
        }
    }

    fn step_image(&mut self) -> Step {
        let end_len = self.markers.image_end().len();
        match find(&self.backlog, self.markers.image_end(), self.scan_from) {
            Some(k) => {
                let mut payload = self.consume(k + end_len);
                payload.truncate(k);
                self.state = DecoderState::AwaitingFrame;
                Step::Consumed(self.admit(Some(Frame::Image(payload))))
            }
            None => {
                self.scan_from = self.backlog.len().saturating_sub(end_len - 1);
                Step::Stalled
            }
        }
    }

    /// Remove and return the first `n` backlog bytes.
    fn consume(&mut self, n: usize) -> Vec<u8> {
        let rest = self.backlog.split_off(n);
        self.scan_from = 0;
        std::mem::replace(&mut self.backlog, rest)
    }

    fn admit(&mut self, frame: Option<Frame>) -> Option<Frame> {
        if self.discarding {
            self.discarding = false;
            log::debug!("dropped remainder of overflowed frame");
            return None;
        }
        frame
    }

    fn enforce_limit(&mut self) -> Option<DecodeError> {
        let limit = self.max_backlog?;
        let pending = self.backlog.len();
        if pending <= limit {
            return None;
        }

        // Keep a tail long enough to hold a marker split across chunks.
        let marker_len = match self.state {
            DecoderState::AwaitingFrame => self.markers.image_start().len(),
            DecoderState::InImage => self.markers.image_end().len(),
        };
        let keep = (marker_len - 1).min(pending);
        self.backlog.drain(..pending - keep);
        self.scan_from = 0;

        if self.discarding {
            log::trace!("discarded {} bytes of overflowed frame", pending - keep);
            return None;
        }
        self.discarding = true;
        log::warn!("backlog overflow while {}: {pending} bytes, limit {limit}", self.state);
        Some(DecodeError::BacklogOverflow {
            state: self.state,
            pending,
            limit,
        })
    }
}
