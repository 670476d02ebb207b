//! Track monitor interface
//!
//! An external observer (UI, playlist advance logic) attached to the
//! engine. Callbacks run on whichever thread finalizes the track.

use crate::info::TrackInfo;

/// Observer of track lifecycle events
pub trait Monitor: Send {
    /// A track finished and was removed from the live set. The record
    /// still carries its final control values (`"stopped"`, `"error"`)
    /// and metadata.
    fn on_track_closed(&self, info: &TrackInfo);

    /// The queue reported that its last track has been reached
    fn on_last_track_closed(&self) {}
}
