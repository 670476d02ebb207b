//! Engine - the track registry and control surface
//!
//! The engine owns the set of live tracks behind generation-checked
//! handles and exposes the command interface: create/start/stop/pause,
//! dynamic filter insertion, control values, metadata access, and the
//! monitor hook.
//!
//! Threading: operations that mutate the live-track set (create, start,
//! the stop-all family) belong to one control thread. `wake` and
//! individual per-track calls may come from a track's own worker. A
//! scheduling step owns its track's body for the whole run-to-yield
//! slice; stop requests are posted to the track's worker so the state
//! transition and finalization happen on the thread that owns the chain.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::Sender;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::filter::InsertPos;
use crate::info::{MetaCursor, SetFlags, TrackParams};
use crate::modules::ModuleResolver;
use crate::monitor::Monitor;
use crate::queue::QueueProvider;
use crate::store::Value;
use crate::track::{Outcome, Track, TrackCtl};
use crate::types::{TrackState, TrackType, WorkerId};
use crate::workers::WorkerPool;

/// Stop reason recorded under the `"stopped"` control value
const STOP_ONE: i64 = 1;
const STOP_ALL: i64 = 2;
const STOP_EXIT: i64 = 3;

/// Opaque, generation-checked reference to a live track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    index: u32,
    gen: u32,
}

struct TrackCell {
    ctl: Arc<TrackCtl>,
    body: Mutex<Option<Track>>,
}

struct Slot {
    gen: u32,
    cell: Option<Arc<TrackCell>>,
}

#[derive(Default)]
struct Registry {
    slots: Vec<Slot>,
}

impl Registry {
    fn alloc(&mut self, cell: Arc<TrackCell>) -> TrackHandle {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.cell.is_none() {
                slot.cell = Some(cell);
                return TrackHandle {
                    index: index as u32,
                    gen: slot.gen,
                };
            }
        }
        self.slots.push(Slot { gen: 0, cell: Some(cell) });
        TrackHandle {
            index: (self.slots.len() - 1) as u32,
            gen: 0,
        }
    }

    fn get(&self, h: TrackHandle) -> Option<Arc<TrackCell>> {
        let slot = self.slots.get(h.index as usize)?;
        if slot.gen != h.gen {
            return None;
        }
        slot.cell.clone()
    }

    fn free(&mut self, h: TrackHandle) {
        if let Some(slot) = self.slots.get_mut(h.index as usize) {
            if slot.gen == h.gen && slot.cell.is_some() {
                slot.cell = None;
                slot.gen += 1;
            }
        }
    }

    fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.cell.is_some()).count()
    }

    fn handles(&self) -> Vec<TrackHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.cell.is_some())
            .map(|(index, s)| TrackHandle {
                index: index as u32,
                gen: s.gen,
            })
            .collect()
    }
}

struct Shared {
    config: EngineConfig,
    resolver: Arc<dyn ModuleResolver>,
    workers: Arc<dyn WorkerPool>,
    queue: Mutex<Option<Arc<dyn QueueProvider>>>,
    monitor: Mutex<Option<Box<dyn Monitor>>>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    registry: Mutex<Registry>,
    serial: AtomicU64,
    draining: AtomicBool,
}

/// The track engine. Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        resolver: Arc<dyn ModuleResolver>,
        workers: Arc<dyn WorkerPool>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                resolver,
                workers,
                queue: Mutex::new(None),
                monitor: Mutex::new(None),
                shutdown_tx: Mutex::new(None),
                registry: Mutex::new(Registry::default()),
                serial: AtomicU64::new(0),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Attach the queue/playlist collaborator tracks reach through their
    /// `"queue_item"` control value
    pub fn set_queue(&self, queue: Arc<dyn QueueProvider>) {
        *self.shared.queue.lock().unwrap() = Some(queue);
    }

    /// Attach the lifecycle monitor
    pub fn set_monitor(&self, monitor: Box<dyn Monitor>) {
        *self.shared.monitor.lock().unwrap() = Some(monitor);
    }

    /// Register the channel the process-stop signal is sent on when a
    /// stop-all-and-exit drain completes
    pub fn set_shutdown_notify(&self, tx: Sender<()>) {
        *self.shared.shutdown_tx.lock().unwrap() = Some(tx);
    }

    /// Number of tracks currently registered
    pub fn live_tracks(&self) -> usize {
        self.shared.registry.lock().unwrap().live()
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Create a track of the given kind. The input half of its chain is
    /// assembled here; an unresolvable source format fails the call and
    /// no track is registered.
    pub fn create(&self, ty: TrackType, url: Option<&str>) -> EngineResult<TrackHandle> {
        let serial = self.shared.serial.fetch_add(1, Ordering::Relaxed) + 1;
        let queue = self.shared.queue.lock().unwrap().clone();
        let mut track = Track::new(serial, ty, queue);
        track.build_input(self.shared.resolver.as_ref(), &self.shared.config, url)?;

        let ctl = Arc::clone(&track.ctl);
        let cell = Arc::new(TrackCell {
            ctl,
            body: Mutex::new(Some(track)),
        });
        let handle = self.shared.registry.lock().unwrap().alloc(cell);
        log::debug!("*{}: created {} track", serial, ty.name());
        Ok(handle)
    }

    /// Assemble the output half of the chain, pin the track to a worker
    /// and post its first scheduling step
    pub fn start(&self, h: TrackHandle) -> EngineResult<()> {
        let cell = self.lookup(h)?;
        let mut body = cell.body.lock().unwrap();
        let build_err = {
            let track = body.as_mut().ok_or(EngineError::TrackGone)?;
            if track.worker.is_some() {
                return Err(EngineError::BadState("already started"));
            }
            track
                .build_output(self.shared.resolver.as_ref(), &self.shared.config)
                .err()
        };

        if let Some(e) = build_err {
            // construction-time failure: the track never becomes live
            cell.ctl.set_state(TrackState::Error);
            let track = body.take().expect("present above");
            drop(body);
            Shared::finalize(&self.shared, track, h);
            return Err(e);
        }

        let track = body.as_mut().expect("present above");
        let parallel = track.info.params.ty == TrackType::Convert;
        let worker = self.shared.workers.assign(parallel);
        track.worker = Some(worker);
        let serial = track.serial;
        track.ctl.set_state(TrackState::Active);
        log::debug!("{}: starting on worker {}", track.info.id, worker);
        drop(body);

        Shared::post_process(&self.shared, h, worker, serial);
        Ok(())
    }

    /// Request a stop. Posted to the track's own worker so the state
    /// transition happens on the thread that owns the chain; a track that
    /// was never started is finalized right here.
    pub fn stop(&self, h: TrackHandle) -> EngineResult<()> {
        self.stop_with(h, STOP_ONE)
    }

    /// Stop every live track. Record tracks keep capturing, as in a
    /// plain stop-all they are skipped.
    pub fn stop_all(&self) {
        let handles = self.shared.registry.lock().unwrap().handles();
        for h in handles {
            if self.track_type(h) == Some(TrackType::Record) {
                continue;
            }
            let _ = self.stop_with(h, STOP_ALL);
        }
    }

    /// Stop every track (record ones included) and fire the process-stop
    /// signal once the last finalization completes. With nothing live, or
    /// when already draining, the signal fires immediately.
    pub fn stop_all_and_exit(&self) {
        let handles = self.shared.registry.lock().unwrap().handles();
        if handles.is_empty() || self.shared.draining.swap(true, Ordering::AcqRel) {
            Shared::signal_shutdown(&self.shared);
            return;
        }
        for h in handles {
            let _ = self.stop_with(h, STOP_EXIT);
        }
    }

    /// Pause an active track. Takes effect at the next scheduling step.
    pub fn pause(&self, h: TrackHandle) -> EngineResult<()> {
        let cell = self.lookup(h)?;
        if cell.ctl.transition(TrackState::Active, TrackState::Paused) {
            Ok(())
        } else {
            Err(EngineError::BadState(cell.ctl.state().name()))
        }
    }

    /// Resume a paused track and re-enter the scheduler where it left off
    pub fn unpause(&self, h: TrackHandle) -> EngineResult<()> {
        let cell = self.lookup(h)?;
        if !cell.ctl.transition(TrackState::Paused, TrackState::Active) {
            return Err(EngineError::BadState(cell.ctl.state().name()));
        }
        self.wake(h)
    }

    /// Re-enter the scheduler, e.g. after a stage's async operation
    /// completed. Callable from any thread.
    pub fn wake(&self, h: TrackHandle) -> EngineResult<()> {
        let cell = self.lookup(h)?;
        let body = cell.body.lock().unwrap();
        let track = body.as_ref().ok_or(EngineError::TrackGone)?;
        let worker = track.worker.ok_or(EngineError::BadState("not started"))?;
        let serial = track.serial;
        drop(body);
        Shared::post_process(&self.shared, h, worker, serial);
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self, h: TrackHandle) -> EngineResult<TrackState> {
        Ok(self.lookup(h)?.ctl.state())
    }

    /// Worker context the track is pinned to, once started
    pub fn worker_of(&self, h: TrackHandle) -> EngineResult<Option<WorkerId>> {
        let cell = self.lookup(h)?;
        let body = cell.body.lock().unwrap();
        Ok(body.as_ref().ok_or(EngineError::TrackGone)?.worker)
    }

    /// Track id and the module at the cursor, for log context
    pub fn log_context(&self, h: TrackHandle) -> EngineResult<(Arc<str>, Option<Arc<str>>)> {
        let cell = self.lookup(h)?;
        let body = cell.body.lock().unwrap();
        let track = body.as_ref().ok_or(EngineError::TrackGone)?;
        Ok((Arc::clone(track.id()), track.current_module()))
    }

    /// Relay the queue's "last track reached" notification to the monitor
    pub fn notify_last_track(&self) {
        if let Some(mon) = self.shared.monitor.lock().unwrap().as_ref() {
            mon.on_last_track_closed();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Chain manipulation
    // ─────────────────────────────────────────────────────────────

    /// Insert a filter stage into a track's chain
    pub fn insert_filter(&self, h: TrackHandle, pos: InsertPos, name: &str) -> EngineResult<()> {
        let factory = self
            .shared
            .resolver
            .by_name(name)
            .ok_or_else(|| EngineError::UnknownModule(name.to_string()))?;
        let cell = self.lookup(h)?;
        let mut body = cell.body.lock().unwrap();
        let track = body.as_mut().ok_or(EngineError::TrackGone)?;
        let at = track.chain.insert(pos, Arc::from(name), factory)?;
        log::debug!(
            "{}: added {} to chain [{}]",
            track.info.id,
            name,
            track.chain.print(Some(at))
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Control values & metadata
    // ─────────────────────────────────────────────────────────────

    /// Store a control or metadata value. A hash collision aborts the
    /// track, exactly as it would had a stage triggered it.
    pub fn set_value(
        &self,
        h: TrackHandle,
        name: &str,
        value: Value,
        flags: SetFlags,
    ) -> EngineResult<()> {
        let cell = self.lookup(h)?;
        let mut body = cell.body.lock().unwrap();
        let track = body.as_mut().ok_or(EngineError::TrackGone)?;
        match track.info.set_value(name, value, flags) {
            Ok(()) => Ok(()),
            Err(collision) => {
                track.ctl.set_state(TrackState::Error);
                let worker = track.worker;
                let serial = track.serial;
                drop(body);
                if let Some(worker) = worker {
                    // let the owning worker unwind the chain
                    Shared::post_process(&self.shared, h, worker, serial);
                }
                Err(EngineError::Store(collision))
            }
        }
    }

    /// Read a control (or metadata) value
    pub fn get_value(&self, h: TrackHandle, name: &str, meta: bool) -> EngineResult<Option<Value>> {
        let cell = self.lookup(h)?;
        let body = cell.body.lock().unwrap();
        let track = body.as_ref().ok_or(EngineError::TrackGone)?;
        let store = if meta { &track.info.meta } else { &track.info.dict };
        Ok(store.get(name).cloned())
    }

    /// Read and remove a control value
    pub fn pop_value(&self, h: TrackHandle, name: &str) -> EngineResult<Option<Value>> {
        let cell = self.lookup(h)?;
        let mut body = cell.body.lock().unwrap();
        let track = body.as_mut().ok_or(EngineError::TrackGone)?;
        Ok(track.info.dict.pop(name))
    }

    /// Look up a metadata value, falling through to the queue item
    pub fn meta_get(&self, h: TrackHandle, name: &str) -> EngineResult<Option<String>> {
        let cell = self.lookup(h)?;
        let body = cell.body.lock().unwrap();
        let track = body.as_ref().ok_or(EngineError::TrackGone)?;
        Ok(track.info.meta_get(name))
    }

    /// Advance a metadata cursor (local entries first, then the queue)
    pub fn meta_next(
        &self,
        h: TrackHandle,
        cursor: &mut MetaCursor,
    ) -> EngineResult<Option<(String, String)>> {
        let cell = self.lookup(h)?;
        let body = cell.body.lock().unwrap();
        let track = body.as_ref().ok_or(EngineError::TrackGone)?;
        Ok(cursor.next(&track.info))
    }

    /// Copy every metadata entry of `src` (duplicates skipped) into the
    /// local metadata store of `dst`
    pub fn meta_copy(&self, dst: TrackHandle, src: TrackHandle) -> EngineResult<()> {
        if dst == src {
            return Ok(());
        }
        let entries = {
            let cell = self.lookup(src)?;
            let body = cell.body.lock().unwrap();
            let track = body.as_ref().ok_or(EngineError::TrackGone)?;
            let mut cursor = MetaCursor::unique();
            let mut entries = Vec::new();
            while let Some(pair) = cursor.next(&track.info) {
                entries.push(pair);
            }
            entries
        };

        let cell = self.lookup(dst)?;
        let mut body = cell.body.lock().unwrap();
        let track = body.as_mut().ok_or(EngineError::TrackGone)?;
        for (name, value) in entries {
            track
                .info
                .set_value(&name, Value::str(value), SetFlags { meta: true, no_overwrite: false })
                .map_err(EngineError::Store)?;
        }
        Ok(())
    }

    /// Whether user-supplied metadata exists, locally or on the queue item
    pub fn have_user_meta(&self, h: TrackHandle) -> EngineResult<bool> {
        let cell = self.lookup(h)?;
        let body = cell.body.lock().unwrap();
        Ok(body.as_ref().ok_or(EngineError::TrackGone)?.info.have_user_meta())
    }

    /// Forward a metadata entry to the queue item backing the track
    pub fn queue_meta_set(&self, h: TrackHandle, name: &str, value: &str) -> EngineResult<()> {
        let cell = self.lookup(h)?;
        let body = cell.body.lock().unwrap();
        body.as_ref()
            .ok_or(EngineError::TrackGone)?
            .info
            .queue_meta_set(name, value);
        Ok(())
    }

    /// Copy the stream-shaping parameters of `src` onto `dst`
    pub fn copy_params(&self, dst: TrackHandle, src: TrackHandle) -> EngineResult<()> {
        if dst == src {
            return Ok(());
        }
        let params: TrackParams = {
            let cell = self.lookup(src)?;
            let body = cell.body.lock().unwrap();
            body.as_ref().ok_or(EngineError::TrackGone)?.info.params.clone()
        };
        let cell = self.lookup(dst)?;
        let mut body = cell.body.lock().unwrap();
        let track = body.as_mut().ok_or(EngineError::TrackGone)?;
        track.info.params.inherit(&params);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────

    fn lookup(&self, h: TrackHandle) -> EngineResult<Arc<TrackCell>> {
        self.shared
            .registry
            .lock()
            .unwrap()
            .get(h)
            .ok_or(EngineError::TrackGone)
    }

    fn track_type(&self, h: TrackHandle) -> Option<TrackType> {
        let cell = self.lookup(h).ok()?;
        let body = cell.body.lock().unwrap();
        body.as_ref().map(|t| t.info.params.ty)
    }

    fn stop_with(&self, h: TrackHandle, reason: i64) -> EngineResult<()> {
        let cell = self.lookup(h)?;
        let worker = {
            let body = cell.body.lock().unwrap();
            match body.as_ref() {
                Some(track) => track.worker,
                None => return Ok(()), // already being finalized
            }
        };

        match worker {
            Some(worker) => {
                let shared = Arc::clone(&self.shared);
                // key 0: a stop must run even after the track's own
                // queued steps are cancelled
                self.shared.workers.post(
                    worker,
                    0,
                    Box::new(move || Shared::stop_task(&shared, h, reason)),
                );
            }
            None => {
                // never started: finalize on the calling thread
                Shared::stop_task(&self.shared, h, reason);
            }
        }
        Ok(())
    }
}

impl Shared {
    fn post_process(shared: &Arc<Shared>, h: TrackHandle, worker: WorkerId, serial: u64) {
        let cloned = Arc::clone(shared);
        shared.workers.post(
            worker,
            serial,
            Box::new(move || Shared::process_task(&cloned, h)),
        );
    }

    /// One scheduling slice of a track, run on its worker
    fn process_task(shared: &Arc<Shared>, h: TrackHandle) {
        let Some(cell) = shared.registry.lock().unwrap().get(h) else {
            return;
        };
        let mut body = cell.body.lock().unwrap();
        let Some(track) = body.as_mut() else {
            return;
        };

        let outcome = track.process(shared.workers.as_ref(), shared.resolver.as_ref());
        match outcome {
            Outcome::Reposted => {
                let worker = track.worker.unwrap_or(0);
                let serial = track.serial;
                drop(body);
                Shared::post_process(shared, h, worker, serial);
            }
            Outcome::Async | Outcome::Idle => {}
            Outcome::Finished => {
                let track = body.take().expect("checked above");
                drop(body);
                Shared::finalize(shared, track, h);
            }
        }
    }

    /// Posted stop: transition on the owning thread, then finalize
    fn stop_task(shared: &Arc<Shared>, h: TrackHandle, reason: i64) {
        let Some(cell) = shared.registry.lock().unwrap().get(h) else {
            return;
        };
        let mut body = cell.body.lock().unwrap();
        let Some(track) = body.as_mut() else {
            return;
        };

        track.info.stop_requested = true;
        let _ = track.info.dict.set("stopped", Value::Int(reason), false);
        if track.ctl.state() != TrackState::Error {
            track.ctl.set_state(TrackState::Stopped);
        }
        let track = body.take().expect("checked above");
        drop(body);
        Shared::finalize(shared, track, h);
    }

    /// Close the chain, release the worker, drop the registry entry and
    /// notify the monitor. The last finalization of a draining registry
    /// fires the process-stop signal.
    fn finalize(shared: &Arc<Shared>, mut track: Track, h: TrackHandle) {
        if track.ctl.state() == TrackState::Error || track.had_error {
            let _ = track.info.dict.set("error", Value::Int(1), false);
        }

        if shared.config.print_time {
            track.report_busy_time();
        }
        track.close_all();

        if let Some(worker) = track.worker {
            shared.workers.cancel(worker, track.serial);
            shared.workers.release(worker);
        }

        let remaining = {
            let mut reg = shared.registry.lock().unwrap();
            reg.free(h);
            reg.live()
        };

        if let Some(mon) = shared.monitor.lock().unwrap().as_ref() {
            mon.on_track_closed(&track.info);
        }

        if remaining == 0 && shared.draining.load(Ordering::Acquire) {
            Shared::signal_shutdown(shared);
        }
    }

    fn signal_shutdown(shared: &Arc<Shared>) {
        log::debug!("registry drained, signalling stop");
        if let Some(tx) = shared.shutdown_tx.lock().unwrap().as_ref() {
            let _ = tx.send(());
        }
    }
}
