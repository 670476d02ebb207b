//! Per-track shared record and control parameters
//!
//! [`TrackInfo`] is the one record every stage of a track sees: the
//! control parameters, both key/value stores, the data being handed
//! between stages, and the direction/edge flags the scheduler computes
//! before each call. Stages receive `&mut TrackInfo` and nothing else;
//! requests that touch the chain itself (inserting filters) are queued
//! here and applied by the scheduler when the call returns.

use std::sync::Arc;

use crate::error::StoreCollision;
use crate::filter::InsertPos;
use crate::queue::{MetaFetch, QueueProvider};
use crate::store::{Value, ValueStore};
use crate::types::{AudioFormat, TrackType};

/// Audio-stream parameters shared along the chain
#[derive(Debug, Clone, Default)]
pub struct AudioParams {
    /// Format of the data currently flowing (set by the decoder/capture)
    pub fmt: AudioFormat,
    /// Format the auto-converter should produce, when a stage requests one
    pub conv_fmt: Option<AudioFormat>,
    /// Seek target, milliseconds from track start
    pub seek_msec: Option<u64>,
    /// Stop-playback position, milliseconds from track start
    pub until_msec: Option<u64>,
    /// Total length in samples, when known
    pub total_samples: Option<u64>,
    /// Current position in samples, maintained by the decoder
    pub pos_samples: u64,
    /// Gain adjustment in dB applied by the gain stage
    pub gain_db: Option<f32>,
    /// Name of the active decoder, for diagnostics and metadata
    pub decoder: Option<String>,
}

/// Per-codec quality knobs carried for the encoder stage
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecParams {
    pub ogg_quality: Option<f32>,
    pub mpeg_quality: Option<u32>,
    pub aac_quality: Option<u32>,
    pub flac_complevel: Option<u8>,
}

/// Control parameters of one track
#[derive(Debug, Clone)]
pub struct TrackParams {
    pub ty: TrackType,
    pub audio: AudioParams,
    pub quality: CodecParams,
    /// Copy the compressed stream without decoding
    pub stream_copy: bool,
    /// Whether the output sink supports seeking (set at chain assembly)
    pub out_seekable: bool,
    /// Capture prebuffer length, milliseconds
    pub prebuffer_msec: Option<u64>,
    /// Skip input until this signal level is reached, dB
    pub start_level_db: Option<f32>,
    /// Stop once the signal stays below this level, dB
    pub stop_level_db: Option<f32>,
    /// How long the signal must stay below `stop_level_db`, milliseconds
    pub stop_level_time_msec: Option<u64>,
    /// Insert the dynamic normalizer stage
    pub use_auto_norm: bool,
}

impl TrackParams {
    pub fn new(ty: TrackType) -> Self {
        Self {
            ty,
            audio: AudioParams::default(),
            quality: CodecParams::default(),
            stream_copy: false,
            out_seekable: false,
            prebuffer_msec: None,
            start_level_db: None,
            stop_level_db: None,
            stop_level_time_msec: None,
            use_auto_norm: false,
        }
    }

    /// Copy the stream-shaping parameters from another track's record.
    ///
    /// Used when one track spawns a follow-up (queue advance, splitting a
    /// recording): format, seek/until window, levels and codec quality
    /// carry over; the operation kind and chain-assembly flags do not.
    pub fn inherit(&mut self, src: &TrackParams) {
        self.audio = src.audio.clone();
        self.quality = src.quality;
        self.prebuffer_msec = src.prebuffer_msec;
        self.start_level_db = src.start_level_db;
        self.stop_level_db = src.stop_level_db;
        self.stop_level_time_msec = src.stop_level_time_msec;
    }
}

/// Flags for [`TrackInfo::set_value`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SetFlags {
    /// Keep an existing entry instead of replacing it
    pub no_overwrite: bool,
    /// Address the metadata store instead of the control store
    pub meta: bool,
}

/// The shared record every stage of a track operates on
pub struct TrackInfo {
    /// Track identifier, `"*N"`
    pub id: Arc<str>,
    pub params: TrackParams,
    /// Transient control values
    pub dict: ValueStore,
    /// Metadata exposed to the application
    pub meta: ValueStore,
    /// Pending input for the stage being invoked
    pub input: Vec<u8>,
    /// Data the stage produced during this invocation
    pub output: Vec<u8>,
    /// True when the pending input is fresh from the upstream stage,
    /// false when the stage is re-entered on a backward step
    pub forward: bool,
    /// True when every stage before this one has finished: no more input
    /// will ever arrive and the stage should flush
    pub first_in_chain: bool,
    /// A stop was requested for this track
    pub stop_requested: bool,
    pub(crate) chain_ops: Vec<(InsertPos, String)>,
    pub(crate) queue: Option<Arc<dyn QueueProvider>>,
}

impl TrackInfo {
    pub(crate) fn new(
        id: Arc<str>,
        ty: TrackType,
        queue: Option<Arc<dyn QueueProvider>>,
    ) -> Self {
        Self {
            id,
            params: TrackParams::new(ty),
            dict: ValueStore::new(),
            meta: ValueStore::new(),
            input: Vec::new(),
            output: Vec::new(),
            forward: false,
            first_in_chain: false,
            stop_requested: false,
            chain_ops: Vec::new(),
            queue,
        }
    }

    /// Request insertion of a filter stage into this track's chain.
    ///
    /// Takes effect when the current `process` call returns, before the
    /// scheduler interprets its result; an unresolvable name fails the
    /// track.
    pub fn insert_filter(&mut self, pos: InsertPos, name: &str) {
        self.chain_ops.push((pos, name.to_string()));
    }

    /// Store a value in the control or metadata store
    pub fn set_value(
        &mut self,
        name: &str,
        value: Value,
        flags: SetFlags,
    ) -> Result<(), StoreCollision> {
        log::debug!(
            "{}: {}: {} = {:?}",
            self.id,
            if flags.meta { "set meta" } else { "setval" },
            name,
            value
        );
        let store = if flags.meta { &mut self.meta } else { &mut self.dict };
        store.set(name, value, flags.no_overwrite)
    }

    /// Look up a metadata value, falling through to the backing queue
    /// item when the local store has no entry
    pub fn meta_get(&self, name: &str) -> Option<String> {
        if let Some(v) = self.meta.get(name) {
            return Some(match v {
                Value::Int(i) => i.to_string(),
                Value::Str(s) => s.as_str().to_string(),
            });
        }
        let (queue, item) = (self.queue.as_deref()?, self.queue_item()?);
        queue.find(item, name)
    }

    /// The queue item this track was spawned from, if any.
    ///
    /// A capability back-reference stored under the `"queue_item"`
    /// control value, not an ownership link.
    pub fn queue_item(&self) -> Option<i64> {
        self.dict.get_int("queue_item")
    }

    /// Forward a metadata entry to the queue item backing this track
    pub fn queue_meta_set(&self, name: &str, value: &str) {
        let (Some(queue), Some(item)) = (self.queue.as_deref(), self.queue_item()) else {
            return;
        };
        log::debug!("{}: set meta: {} = {}", self.id, name, value);
        queue.set_meta(item, name, value);
    }

    /// Whether any user-supplied metadata exists for this track, locally
    /// or on the backing queue item
    pub fn have_user_meta(&self) -> bool {
        if !self.meta.is_empty() {
            return true;
        }
        match (self.queue.as_deref(), self.queue_item()) {
            (Some(queue), Some(item)) => queue.have_user_meta(item),
            _ => false,
        }
    }
}

/// Stateful cursor over a track's metadata.
///
/// Yields local entries in hash order first, then falls through to the
/// external queue provider reached via the `"queue_item"` control value.
#[derive(Debug, Default)]
pub struct MetaCursor {
    last_hash: Option<u32>,
    local_done: bool,
    queue_idx: usize,
    /// Skip duplicate keys on the queue side
    pub unique: bool,
}

impl MetaCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor that skips duplicate keys (used by metadata copy)
    pub fn unique() -> Self {
        Self {
            unique: true,
            ..Self::default()
        }
    }

    /// Advance and return the next `(name, value)` pair, or `None` when
    /// both the local store and the queue item are exhausted.
    pub fn next(&mut self, ti: &TrackInfo) -> Option<(String, String)> {
        if !self.local_done {
            if let Some((hash, name, value)) = ti.meta.next_after(self.last_hash) {
                self.last_hash = Some(hash);
                let rendered = match value {
                    Value::Int(v) => v.to_string(),
                    Value::Str(s) => s.as_str().to_string(),
                };
                return Some((name.to_string(), rendered));
            }
            self.local_done = true;
        }

        let (queue, item) = (ti.queue.as_deref()?, ti.queue_item()?);
        loop {
            match queue.meta_at(item, self.queue_idx, self.unique) {
                MetaFetch::Entry(name, value) => {
                    self.queue_idx += 1;
                    return Some((name, value));
                }
                MetaFetch::Skip => {
                    self.queue_idx += 1;
                }
                MetaFetch::End => return None,
            }
        }
    }
}
