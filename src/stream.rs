//! MJPEG stream sessions.
//!
//! An `MjpegStream` is one viewer's pull-based view of a shared `FrameSource`.
//! Each pacing cycle it either emits one multipart part, idles (paused, or no
//! frame available), or ends for good once the source is stopped.
//!
//! Part layout, as expected by `multipart/x-mixed-replace; boundary=frame`:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <jpeg bytes>\r\n
//! ```
//!
//! Pacing sleeps are the only places a session blocks besides capture and
//! encode. After an emitted part the sleep happens at the start of the next
//! pull, so the time spent writing the part to the client is not added to
//! the frame interval twice.

use std::iter::FusedIterator;
use std::sync::Arc;
use std::thread;

use crate::encode::{FrameEncoder, JpegFrameEncoder};
use crate::overlay::overlay_timestamp;
use crate::source::FrameSource;

pub const BOUNDARY: &str = "frame";
/// Response content type matching the part framing.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Outcome of one pacing cycle.
#[derive(Debug, PartialEq, Eq)]
pub enum Cycle {
    /// One framed part, ready to write.
    Part(Vec<u8>),
    /// Nothing emitted this cycle; the stream is still open.
    Idle,
    /// The stream is over and stays over.
    Ended,
}

/// Wrap one encoded image in multipart framing.
pub fn frame_part(content_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{boundary}\r\nContent-Type: {content_type}\r\n\r\n",
        boundary = BOUNDARY,
        content_type = content_type
    );
    let mut part = Vec::with_capacity(header.len() + payload.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(payload);
    part.extend_from_slice(b"\r\n");
    part
}

/// Open a stream session on `source` with the default JPEG encoder.
///
/// `None` yields an empty stream, so a handler can still answer with a
/// well-formed multipart response when no source could be opened.
pub fn open_stream(source: Option<Arc<FrameSource>>) -> MjpegStream {
    MjpegStream::new(source, Arc::new(JpegFrameEncoder::default()))
}

/// Capture, stamp and encode one frame outside of any stream session.
pub fn fetch_one_frame(source: &FrameSource) -> Option<Vec<u8>> {
    fetch_one_frame_with(source, &JpegFrameEncoder::default())
}

pub fn fetch_one_frame_with(source: &FrameSource, encoder: &dyn FrameEncoder) -> Option<Vec<u8>> {
    match capture_encoded(source, encoder) {
        Captured::Encoded(bytes) => Some(bytes),
        Captured::Missing => {
            log::warn!("no {} frame available for snapshot", source.kind());
            None
        }
        Captured::EncodeFailed => None,
    }
}

enum Captured {
    Encoded(Vec<u8>),
    Missing,
    EncodeFailed,
}

fn capture_encoded(source: &FrameSource, encoder: &dyn FrameEncoder) -> Captured {
    let Some(mut frame) = source.get_one_frame() else {
        return Captured::Missing;
    };
    if source.controls().show_timestamp() {
        overlay_timestamp(&mut frame);
    }
    match encoder.encode(&frame) {
        Ok(bytes) => Captured::Encoded(bytes),
        Err(err) => {
            log::warn!("dropping {}x{} frame: {:#}", frame.width(), frame.height(), err);
            Captured::EncodeFailed
        }
    }
}

pub struct MjpegStream {
    source: Option<Arc<FrameSource>>,
    encoder: Arc<dyn FrameEncoder>,
    pace_pending: bool,
    ended: bool,
    missing_streak: u64,
    parts_sent: u64,
}

impl MjpegStream {
    pub fn new(source: Option<Arc<FrameSource>>, encoder: Arc<dyn FrameEncoder>) -> Self {
        Self {
            ended: source.is_none(),
            source,
            encoder,
            pace_pending: false,
            missing_streak: 0,
            parts_sent: 0,
        }
    }

    pub fn parts_sent(&self) -> u64 {
        self.parts_sent
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Run one pacing cycle. Blocks for at most one frame interval plus the
    /// time capture and encoding take.
    pub fn poll_cycle(&mut self) -> Cycle {
        if self.ended {
            return Cycle::Ended;
        }
        let Some(source) = self.source.clone() else {
            self.ended = true;
            return Cycle::Ended;
        };
        let controls = source.controls();

        if self.pace_pending {
            self.pace_pending = false;
            thread::sleep(controls.frame_interval());
        }
        if controls.is_terminated() {
            log::debug!(
                "{} stream ended after {} parts",
                source.kind(),
                self.parts_sent
            );
            self.finish();
            return Cycle::Ended;
        }
        if !controls.capture_enabled() {
            thread::sleep(controls.frame_interval());
            return Cycle::Idle;
        }

        match capture_encoded(&source, self.encoder.as_ref()) {
            Captured::Encoded(bytes) => {
                if self.missing_streak > 0 {
                    log::info!(
                        "{} frames back after {} empty cycles",
                        source.kind(),
                        self.missing_streak
                    );
                    self.missing_streak = 0;
                }
                self.parts_sent += 1;
                self.pace_pending = true;
                Cycle::Part(frame_part(self.encoder.content_type(), &bytes))
            }
            Captured::Missing => {
                if self.missing_streak == 0 {
                    log::warn!("no {} frame available, retrying", source.kind());
                }
                self.missing_streak += 1;
                thread::sleep(controls.frame_interval());
                Cycle::Idle
            }
            Captured::EncodeFailed => {
                thread::sleep(controls.frame_interval());
                Cycle::Idle
            }
        }
    }

    fn finish(&mut self) {
        self.ended = true;
        self.source = None;
    }
}

impl Iterator for MjpegStream {
    type Item = Vec<u8>;

    /// Block until the next part is ready, or return `None` once the source
    /// is stopped. A paused source keeps this call blocked.
    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.poll_cycle() {
                Cycle::Part(part) => return Some(part),
                Cycle::Idle => continue,
                Cycle::Ended => return None,
            }
        }
    }
}

impl FusedIterator for MjpegStream {}
