//! Filter capability - the contract every chain stage implements
//!
//! A stage is resolved by name to a [`FilterFactory`]. The factory's
//! `open` runs lazily, exactly once, the first time the scheduler reaches
//! the stage; it may decline with [`Open::Skip`], which passes the pending
//! input straight through and removes the stage without a close. The
//! returned [`Filter`] is then invoked repeatedly; dropping it is the
//! close operation.

use crate::info::TrackInfo;

/// Status a stage returns from one `process` call.
///
/// The scheduler reacts to each variant as documented; anything a stage
/// produced is in [`TrackInfo::output`] when it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResult {
    /// Input consumed, output ready; call again when there is more input
    Ok,
    /// Output ready, call again; the stage is not finished with its input
    Data,
    /// More input is needed than is buffered; nothing was produced
    More,
    /// Output is ready, but it is meant for the previous stage
    Back,
    /// Finished; already-produced data may still be in flight downstream
    Done,
    /// Same as `Done`, but the track is marked as having had an error
    DoneWithError,
    /// The produced buffer is the final one; this stage and its immediate
    /// predecessor are both finished
    LastOutput,
    /// Split the chain after this stage; the produced buffer seeds the
    /// detached suffix, and this stage is re-entered once the suffix drains
    NextDone,
    /// An asynchronous operation is pending; the stage will wake the track
    Async,
    /// Terminate the whole track cleanly right now
    Fin,
    /// Unrecoverable stage failure
    Error,
    /// Unrecoverable failure caused by the operating system
    SystemError,
}

impl StageResult {
    /// Get the name of this result for logging
    pub fn name(&self) -> &'static str {
        match self {
            StageResult::Ok => "ok",
            StageResult::Data => "data",
            StageResult::More => "more",
            StageResult::Back => "back",
            StageResult::Done => "done",
            StageResult::DoneWithError => "done-err",
            StageResult::LastOutput => "last-out",
            StageResult::NextDone => "next-done",
            StageResult::Async => "async",
            StageResult::Fin => "fin",
            StageResult::Error => "err",
            StageResult::SystemError => "syserr",
        }
    }
}

/// Outcome of opening a stage
pub enum Open {
    /// The stage is ready to process data
    Ready(Box<dyn Filter>),
    /// The stage declines to take part in this chain; pending input passes
    /// through and close is never called
    Skip,
}

/// An opened stage instance. Dropping it closes the stage.
pub trait Filter: Send {
    /// Process the pending input in `ti.input`, leaving any produced data
    /// in `ti.output` and any unconsumed input in `ti.input`.
    fn process(&mut self, ti: &mut TrackInfo) -> StageResult;
}

/// Named constructor for stage instances, registered with the module
/// resolver the engine is built with.
pub trait FilterFactory: Send + Sync {
    /// Open a fresh instance for one track. Runs on the track's worker,
    /// once, on the stage's first invocation.
    fn open(&self, ti: &mut TrackInfo) -> Result<Open, String>;
}

/// Where to insert a stage into a track's chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPos {
    /// Before every existing stage
    First,
    /// After every existing stage
    Last,
    /// Immediately before the stage being scheduled
    BeforeCursor,
    /// Immediately after the stage being scheduled
    AfterCursor,
}
