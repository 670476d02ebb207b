//! Track - one media job and its execution state
//!
//! A track owns its filter chain, its shared [`TrackInfo`] record, and a
//! small atomic state cell. The state cell is the only part other threads
//! touch while the track is running: the scheduler reads it once per loop
//! iteration, and control operations (pause, stop, error) flip it.

mod build;
mod process;
#[cfg(test)]
pub(crate) mod testutil;

pub(crate) use process::Outcome;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::chain::Chain;
use crate::info::TrackInfo;
use crate::queue::QueueProvider;
use crate::types::{TrackState, TrackType, WorkerId};

/// Lock-free state cell shared between the track, the registry, and the
/// control thread
pub(crate) struct TrackCtl {
    state: AtomicU8,
}

impl TrackCtl {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TrackState::Stopped as u8),
        }
    }

    pub fn state(&self) -> TrackState {
        TrackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, st: TrackState) {
        self.state.store(st as u8, Ordering::Release);
    }

    /// Compare-and-swap transition; returns whether it applied
    pub fn transition(&self, from: TrackState, to: TrackState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// One live media job
pub(crate) struct Track {
    /// Monotonic serial, also the task key on the worker pool
    pub serial: u64,
    pub info: TrackInfo,
    pub chain: Chain,
    pub ctl: Arc<TrackCtl>,
    /// Worker context this track is pinned to once started
    pub worker: Option<WorkerId>,
    /// A stage reported `DoneWithError`: the track completed, but not cleanly
    pub had_error: bool,
    created: Instant,
}

impl Track {
    pub fn new(serial: u64, ty: TrackType, queue: Option<Arc<dyn QueueProvider>>) -> Self {
        let id: Arc<str> = Arc::from(format!("*{serial}").as_str());
        Self {
            serial,
            info: TrackInfo::new(id, ty, queue),
            chain: Chain::new(),
            ctl: Arc::new(TrackCtl::new()),
            worker: None,
            had_error: false,
            created: Instant::now(),
        }
    }

    pub fn id(&self) -> &Arc<str> {
        &self.info.id
    }

    /// Name of the stage at the cursor, for log context
    pub fn current_module(&self) -> Option<Arc<str>> {
        if self.chain.is_empty() || self.chain.cur >= self.chain.len() {
            return None;
        }
        Some(Arc::clone(&self.chain.stage(self.chain.cur).name))
    }

    /// Close every remaining stage, tail of the allocation order first
    pub fn close_all(&mut self) {
        log::debug!("{}: closing...", self.info.id);
        for stage in self.chain.drain_reverse() {
            if stage.ctx.is_some() {
                log::debug!("{}: {}: closing filter", self.info.id, stage.name);
            }
            drop(stage);
        }
        log::debug!("{}: closed", self.info.id);
    }

    /// Log the processing-time report: total wall time plus the share
    /// spent inside each stage
    pub fn report_busy_time(&self) {
        let total = self.created.elapsed();
        let total_us = total.as_micros().max(1);

        let mut line = format!(
            "busy time: {}.{:06}.  ",
            total.as_secs(),
            total.subsec_micros()
        );
        for (name, busy) in self.chain.busy_times() {
            if busy.is_zero() {
                continue;
            }
            let percent = busy.as_micros() * 100 / total_us;
            line.push_str(&format!(
                "{}: {}.{:06} ({}%), ",
                name,
                busy.as_secs(),
                busy.subsec_micros(),
                percent
            ));
        }
        let line = line.trim_end_matches(", ");
        log::info!("{}: {}", self.info.id, line);
    }
}
