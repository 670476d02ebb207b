//! Engine error types

use thiserror::Error;

use crate::types::Direction;

/// Errors reported by the engine's control surface
#[derive(Error, Debug)]
pub enum EngineError {
    /// A filter module name could not be resolved
    #[error("no such filter module: {0}")]
    UnknownModule(String),

    /// No codec module is registered for a file extension
    #[error("no {} module for file extension \"{ext}\"", .direction.name())]
    UnknownExtension { ext: String, direction: Direction },

    /// A source URL has no usable file extension
    #[error("cannot detect format of \"{0}\": no file extension")]
    NoExtension(String),

    /// The operation kind requires a source URL and none was given
    #[error("no source URL given")]
    NoSource,

    /// A record track was requested but no capture module is configured
    #[error("no capture input module configured")]
    NoCaptureModule,

    /// A convert track has nowhere to write to
    #[error("no output target set for this track")]
    NoOutput,

    /// The track handle is stale or the track has already been destroyed
    #[error("track is gone")]
    TrackGone,

    /// The per-track limit on chain stages was reached
    #[error("can't add more filters")]
    TooManyFilters,

    /// The operation requires a state the track is not in
    #[error("operation not applicable: track is {0}")]
    BadState(&'static str),

    /// A store write collided; the owning track has been aborted
    #[error(transparent)]
    Store(#[from] StoreCollision),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// A key hashed to the same value as an existing, different key.
///
/// The store's name hash is not collision-free; a genuine collision is
/// fatal to the owning track and is never corrected (the colliding value
/// is not stored).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("setval: hash collision: {hash}, key: {key}, with key: {existing}")]
pub struct StoreCollision {
    /// The CRC-32 both names hash to
    pub hash: u32,
    /// The key being inserted
    pub key: String,
    /// The distinct key already stored under the same hash
    pub existing: String,
}
