//! Incremental frame demuxer
//!
//! Reassembles discrete image frames from an unbounded byte stream, such as
//! MJPEG written to a pipe by an encoder. A frame is everything from a start
//! marker through the next end marker, inclusive:
//!
//! ```text
//!  chunk 1        chunk 2
//! ┌──────────┐┌────────────────────────┐
//!  .. FF D8 A  B FF D9 FF D8 C FF D9 ..
//!     └──── frame ───┘└─ frame ──┘
//! ```
//!
//! Markers may be split across chunks. Bytes before a start marker are
//! dropped together with the frame that follows them.

use bytes::{Bytes, BytesMut};

/// JPEG start-of-image marker
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Default buffer cap (1 MiB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Demuxer configuration
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    /// Marker that opens a frame
    pub start_marker: Bytes,

    /// Marker that closes a frame
    pub end_marker: Bytes,

    /// Buffered bytes allowed without a complete frame before the buffer is discarded
    pub max_buffer_size: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            start_marker: Bytes::from_static(&JPEG_SOI),
            end_marker: Bytes::from_static(&JPEG_EOI),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl DemuxConfig {
    /// Set custom frame markers
    ///
    /// An empty marker can never match, so it leaves the current markers in place.
    pub fn markers(mut self, start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        let (start, end) = (start.into(), end.into());
        if start.is_empty() || end.is_empty() {
            tracing::warn!(
                start_len = start.len(),
                end_len = end.len(),
                "Empty frame marker ignored, keeping current markers"
            );
            return self;
        }
        self.start_marker = start;
        self.end_marker = end;
        self
    }

    /// Set the buffer cap
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }
}

/// Demuxer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    /// Frames emitted
    pub frames: u64,
    /// Bytes pushed
    pub bytes_in: u64,
    /// Times the buffer was discarded for exceeding the cap
    pub overflows: u64,
    /// Bytes thrown away by overflows
    pub discarded_bytes: u64,
}

/// Stateful scanner over an appended byte buffer
#[derive(Debug)]
pub struct FrameDemuxer {
    config: DemuxConfig,
    buffer: BytesMut,

    /// Offset of the start marker of the frame being assembled
    frame_start: Option<usize>,

    /// Offset where the next marker search resumes
    cursor: usize,

    stats: DemuxStats,
}

impl FrameDemuxer {
    /// Create a demuxer for JPEG frames
    pub fn new() -> Self {
        Self::with_config(DemuxConfig::default())
    }

    /// Create a demuxer with custom markers or cap
    pub fn with_config(config: DemuxConfig) -> Self {
        Self {
            config,
            buffer: BytesMut::new(),
            frame_start: None,
            cursor: 0,
            stats: DemuxStats::default(),
        }
    }

    /// Append a chunk and iterate over the frames it completes
    pub fn push(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk);
        self.stats.bytes_in += chunk.len() as u64;
        Frames { demuxer: self }
    }

    /// Extract the next complete frame from the buffer, if any
    ///
    /// When no complete frame remains and the buffer exceeds the cap, the
    /// whole buffer is discarded, including any partial frame.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let start_len = self.config.start_marker.len();
        let end_len = self.config.end_marker.len();

        if self.frame_start.is_none() {
            match find(&self.buffer[self.cursor..], &self.config.start_marker) {
                Some(offset) => {
                    let start = self.cursor + offset;
                    self.frame_start = Some(start);
                    self.cursor = start + start_len;
                }
                None => {
                    // Keep the tail in case a marker is split across chunks
                    self.cursor = self
                        .buffer
                        .len()
                        .saturating_sub(start_len.saturating_sub(1))
                        .max(self.cursor);
                    self.check_overflow();
                    return None;
                }
            }
        }

        let start = self.frame_start?;

        match find(&self.buffer[self.cursor..], &self.config.end_marker) {
            Some(offset) => {
                let end = self.cursor + offset + end_len;
                let mut consumed = self.buffer.split_to(end);
                let frame = consumed.split_off(start).freeze();

                self.frame_start = None;
                self.cursor = 0;
                self.stats.frames += 1;

                Some(frame)
            }
            None => {
                self.cursor = self
                    .buffer
                    .len()
                    .saturating_sub(end_len.saturating_sub(1))
                    .max(self.cursor);
                self.check_overflow();
                None
            }
        }
    }

    /// Discard all buffered data
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.frame_start = None;
        self.cursor = 0;
    }

    /// Number of buffered bytes
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a frame has started but not finished
    pub fn in_frame(&self) -> bool {
        self.frame_start.is_some()
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    fn check_overflow(&mut self) {
        let size = self.buffer.len();
        if size <= self.config.max_buffer_size {
            return;
        }

        tracing::warn!(
            buffered = size,
            max = self.config.max_buffer_size,
            in_frame = self.frame_start.is_some(),
            "Frame buffer overflow, discarding"
        );

        self.stats.overflows += 1;
        self.stats.discarded_bytes += size as u64;
        self.reset();
    }
}

impl Default for FrameDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames completed by one `push`
pub struct Frames<'a> {
    demuxer: &'a mut FrameDemuxer,
}

impl Iterator for Frames<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.demuxer.next_frame()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
