//! Closure-driven mock filters for scheduler and engine tests

use std::sync::{Arc, Mutex};

use crate::filter::{Filter, FilterFactory, Open, StageResult};
use crate::info::TrackInfo;

/// Shared event log: "open:x", "close:x", plus whatever a mock records
pub(crate) type Events = Arc<Mutex<Vec<String>>>;

pub(crate) fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn push(events: &Events, ev: impl Into<String>) {
    events.lock().unwrap().push(ev.into());
}

/// Boxed per-open process closure
type ProcessFn = Box<dyn FnMut(&mut TrackInfo) -> StageResult + Send>;

/// A filter driven by a closure; drop is recorded in the event log
struct FnFilter {
    name: &'static str,
    events: Option<Events>,
    f: ProcessFn,
}

impl Filter for FnFilter {
    fn process(&mut self, ti: &mut TrackInfo) -> StageResult {
        (self.f)(ti)
    }
}

impl Drop for FnFilter {
    fn drop(&mut self) {
        if let Some(ev) = &self.events {
            push(ev, format!("close:{}", self.name));
        }
    }
}

/// A factory driven by a closure building the per-open process closure
pub(crate) struct FnFactory {
    name: &'static str,
    events: Option<Events>,
    make: Box<dyn Fn() -> ProcessFn + Send + Sync>,
}

impl FilterFactory for FnFactory {
    fn open(&self, _ti: &mut TrackInfo) -> Result<Open, String> {
        if let Some(ev) = &self.events {
            push(ev, format!("open:{}", self.name));
        }
        Ok(Open::Ready(Box::new(FnFilter {
            name: self.name,
            events: self.events.clone(),
            f: (self.make)(),
        })))
    }
}

/// Factory for a closure-driven filter, with open/close event tracking
pub(crate) fn factory<F, P>(name: &'static str, events: Option<Events>, make: F) -> Arc<FnFactory>
where
    F: Fn() -> P + Send + Sync + 'static,
    P: FnMut(&mut TrackInfo) -> StageResult + Send + 'static,
{
    Arc::new(FnFactory {
        name,
        events,
        make: Box::new(move || -> ProcessFn { Box::new(make()) }),
    })
}

/// Factory whose open declines with `Skip`
pub(crate) struct SkipFactory;

impl FilterFactory for SkipFactory {
    fn open(&self, _ti: &mut TrackInfo) -> Result<Open, String> {
        Ok(Open::Skip)
    }
}

/// Factory whose open fails
pub(crate) struct FailFactory;

impl FilterFactory for FailFactory {
    fn open(&self, _ti: &mut TrackInfo) -> Result<Open, String> {
        Err("no device".to_string())
    }
}

/// Source: emits each chunk with `Data`, then reports `Done`
pub(crate) fn source(
    name: &'static str,
    events: Option<Events>,
    chunks: Vec<Vec<u8>>,
) -> Arc<FnFactory> {
    factory(name, events, move || {
        let mut pending: std::collections::VecDeque<Vec<u8>> = chunks.clone().into();
        move |ti: &mut TrackInfo| match pending.pop_front() {
            Some(chunk) => {
                ti.output = chunk;
                StageResult::Data
            }
            None => StageResult::Done,
        }
    })
}

/// Pass-through transform: hands its input on, asks upstream when idle,
/// finishes once it is first in chain with nothing buffered
pub(crate) fn passthrough(name: &'static str, events: Option<Events>) -> Arc<FnFactory> {
    factory(name, events, || {
        |ti: &mut TrackInfo| {
            if !ti.input.is_empty() {
                ti.output = std::mem::take(&mut ti.input);
                return StageResult::Ok;
            }
            if ti.first_in_chain {
                return StageResult::Done;
            }
            StageResult::More
        }
    })
}

/// Terminal sink: consumes everything into `bin`, asks for more until the
/// upstream is finished
pub(crate) fn sink(
    name: &'static str,
    events: Option<Events>,
    bin: Arc<Mutex<Vec<u8>>>,
) -> Arc<FnFactory> {
    factory(name, events, move || {
        let bin = Arc::clone(&bin);
        move |ti: &mut TrackInfo| {
            bin.lock().unwrap().extend_from_slice(&ti.input);
            ti.input.clear();
            if ti.first_in_chain {
                return StageResult::Done;
            }
            StageResult::More
        }
    })
}

pub(crate) fn byte_bin() -> Arc<Mutex<Vec<u8>>> {
    Arc::new(Mutex::new(Vec::new()))
}
