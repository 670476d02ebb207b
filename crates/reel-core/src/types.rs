//! Common types for the Reel track engine
//!
//! Small enums and descriptors shared by every part of the engine: track
//! states and operation kinds, PCM format descriptors, and the direction
//! used when resolving a codec module from a file extension.

/// Identifier of a worker execution context supplied by a [`WorkerPool`].
///
/// [`WorkerPool`]: crate::workers::WorkerPool
pub type WorkerId = usize;

/// Lifecycle state of a track.
///
/// `Stopped → Active` on start, `Active ⇄ Paused` on pause/unpause, any
/// state `→ Error` on a stage failure. The discriminants are stable so the
/// state can live in an `AtomicU8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackState {
    Stopped = 0,
    Active = 1,
    Paused = 2,
    Error = 3,
}

impl TrackState {
    /// Convert from the raw atomic representation
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => TrackState::Active,
            2 => TrackState::Paused,
            3 => TrackState::Error,
            _ => TrackState::Stopped,
        }
    }

    /// Get the name of this state for logging
    pub fn name(&self) -> &'static str {
        match self {
            TrackState::Stopped => "stopped",
            TrackState::Active => "active",
            TrackState::Paused => "paused",
            TrackState::Error => "error",
        }
    }
}

/// The kind of media job a track performs
///
/// The kind selects the initial filter chain (see `track/build.rs`).
/// Directory and playlist expansion is part of `Playback`: a directory
/// source routes to the playlist-expansion module instead of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    /// Decode a source and feed the configured output
    Playback,
    /// Decode a source and re-encode into the "output" target
    Convert,
    /// Capture from an input device into the "output" target
    Record,
    /// Feed decoded audio into the mixer
    MixIn,
    /// Drain mixed audio out of the mixer
    MixOut,
    /// Decode a source and report PCM peaks, producing no output
    PeakScan,
}

impl TrackType {
    /// Get the name of this track type for logging
    pub fn name(&self) -> &'static str {
        match self {
            TrackType::Playback => "playback",
            TrackType::Convert => "convert",
            TrackType::Record => "record",
            TrackType::MixIn => "mix-in",
            TrackType::MixOut => "mix-out",
            TrackType::PeakScan => "peak-scan",
        }
    }
}

/// Direction of an extension→module lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Resolve a demuxer/decoder for reading this extension
    Input,
    /// Resolve a muxer/encoder for writing this extension
    Output,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// PCM sample representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    I16,
    I24,
    I32,
    F32,
    F64,
}

impl SampleFormat {
    /// Size of one sample in bytes
    pub fn width(&self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::I24 => 3,
            SampleFormat::I32 | SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }
}

/// PCM stream format shared between stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u8,
    /// Whether samples are interleaved (LRLR…) or planar
    pub interleaved: bool,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            format: SampleFormat::I16,
            sample_rate: 44100,
            channels: 2,
            interleaved: true,
        }
    }
}

impl AudioFormat {
    /// Size of one frame (one sample for every channel) in bytes
    pub fn frame_size(&self) -> usize {
        self.format.width() * self.channels as usize
    }
}
