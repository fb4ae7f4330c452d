//! Local media plumbing
//!
//! This module provides:
//! - Incremental frame demuxing of an encoder's byte stream
//! - Fan-out of raw PCM audio to local subscribers
//! - Encoder subprocess lifecycle (spawn, pump, polite stop)

pub mod audio;
pub mod capture;
pub mod demux;

pub use audio::{AudioRelay, AudioRelayConfig, SubscriberState, Subscription};
pub use capture::{CaptureConfig, CaptureSession};
pub use demux::{DemuxConfig, DemuxStats, FrameDemuxer, JPEG_EOI, JPEG_SOI};
