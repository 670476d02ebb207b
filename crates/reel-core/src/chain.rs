//! Filter chain - stage arena with an ordered cursor
//!
//! The chain is an index-addressed arena: stage slots keep their
//! allocation order (final close runs over them in reverse), while the
//! processing order lives in a separate vector of slot ids. A split
//! detaches the suffix after the cursor into a fresh processing order and
//! parks the prefix as the "parent" until the suffix drains.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::filter::{Filter, FilterFactory, InsertPos};

/// Stages that may be added to one chain over a track's lifetime
pub const MAX_STAGES: usize = 32;

/// One element of a track's chain
pub(crate) struct Stage {
    pub name: Arc<str>,
    pub factory: Arc<dyn FilterFactory>,
    /// Opened instance; `None` before the first invocation, and for a
    /// stage that opened with `Skip`
    pub ctx: Option<Box<dyn Filter>>,
    pub opened: bool,
    /// The stage is finished and will never be invoked again; it stays in
    /// the chain until the cursor touches it, then it is closed
    pub done: bool,
    /// Set when the stage reported `Ok`: it consumed its input and wants
    /// more. A backward step over it with nothing buffered skips it.
    pub wants_input: bool,
    /// Pending input arrived from upstream since the last invocation
    pub fresh: bool,
    /// Input buffered for the next invocation
    pub input: Vec<u8>,
    /// Accumulated time spent inside open/process
    pub busy: Duration,
}

impl Stage {
    fn new(name: Arc<str>, factory: Arc<dyn FilterFactory>) -> Self {
        Self {
            name,
            factory,
            ctx: None,
            opened: false,
            done: false,
            wants_input: false,
            fresh: false,
            input: Vec::new(),
            busy: Duration::ZERO,
        }
    }
}

/// Ordered chain of stages with a cursor, supporting one active split
pub(crate) struct Chain {
    slots: Vec<Option<Stage>>,
    /// Processing order: indices into `slots`
    active: Vec<usize>,
    /// Prefix parked by a split, restored when `active` drains
    parent: Option<Vec<usize>>,
    /// Position in `active` currently being scheduled
    pub cur: usize,
    added: usize,
}

impl Chain {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            active: Vec::new(),
            parent: None,
            cur: 0,
            added: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn has_split(&self) -> bool {
        self.parent.is_some()
    }

    pub fn stage(&self, pos: usize) -> &Stage {
        self.slots[self.active[pos]].as_ref().expect("live stage")
    }

    pub fn stage_mut(&mut self, pos: usize) -> &mut Stage {
        self.slots[self.active[pos]].as_mut().expect("live stage")
    }

    /// True when every stage before `pos` is done: the stage at `pos` is
    /// effectively first in the chain and should flush
    pub fn first_live(&self, pos: usize) -> bool {
        self.active[..pos]
            .iter()
            .all(|&sid| self.slots[sid].as_ref().map_or(true, |s| s.done))
    }

    /// Add a stage at the given position, fixing the cursor up so it keeps
    /// pointing at the same stage. Returns the new stage's position.
    pub fn insert(
        &mut self,
        pos: InsertPos,
        name: Arc<str>,
        factory: Arc<dyn FilterFactory>,
    ) -> EngineResult<usize> {
        if self.added == MAX_STAGES {
            return Err(EngineError::TooManyFilters);
        }
        self.added += 1;

        let sid = self.slots.len();
        self.slots.push(Some(Stage::new(name, factory)));

        let was_empty = self.active.is_empty();
        let at = match pos {
            InsertPos::First => {
                self.active.insert(0, sid);
                if !was_empty {
                    self.cur += 1;
                }
                0
            }
            InsertPos::Last => {
                self.active.push(sid);
                self.active.len() - 1
            }
            InsertPos::BeforeCursor => {
                let at = self.cur.min(self.active.len());
                self.active.insert(at, sid);
                if !was_empty {
                    self.cur += 1;
                }
                at
            }
            InsertPos::AfterCursor => {
                let at = (self.cur + 1).min(self.active.len());
                self.active.insert(at, sid);
                at
            }
        };
        if was_empty {
            self.cur = 0;
        }
        Ok(at)
    }

    /// Unlink and return the stage at `pos`; its slot is freed so the
    /// final reverse walk won't see it again. Does not touch the cursor.
    pub fn remove_at(&mut self, pos: usize) -> Stage {
        let sid = self.active.remove(pos);
        self.slots[sid].take().expect("live stage")
    }

    /// Detach everything after the cursor into a fresh processing order,
    /// parking the prefix (including the cursor stage) as the parent.
    /// The caller guarantees no split is active and a suffix exists.
    pub fn split_after_cursor(&mut self) {
        debug_assert!(self.parent.is_none());
        debug_assert!(self.cur + 1 < self.active.len());
        let suffix = self.active.split_off(self.cur + 1);
        let prefix = std::mem::replace(&mut self.active, suffix);
        self.parent = Some(prefix);
        self.cur = 0;
    }

    /// Reinstate the parked parent as the active chain, cursor on its last
    /// stage. Returns false when no split is active.
    pub fn restore_parent(&mut self) -> bool {
        match self.parent.take() {
            Some(parent) => {
                debug_assert!(self.active.is_empty());
                self.active = parent;
                self.cur = self.active.len().saturating_sub(1);
                true
            }
            None => false,
        }
    }

    /// Take every remaining stage, in reverse allocation order, for the
    /// final close walk
    pub fn drain_reverse(&mut self) -> Vec<Stage> {
        self.active.clear();
        self.parent = None;
        let mut out = Vec::new();
        for slot in self.slots.iter_mut().rev() {
            if let Some(stage) = slot.take() {
                out.push(stage);
            }
        }
        out
    }

    /// Per-stage busy times in allocation order, for the processing-time
    /// report
    pub fn busy_times(&self) -> Vec<(Arc<str>, Duration)> {
        self.slots
            .iter()
            .flatten()
            .map(|s| (Arc::clone(&s.name), s.busy))
            .collect()
    }

    /// Render the processing order, starring the stage at `mark`
    pub fn print(&self, mark: Option<usize>) -> String {
        let mut s = String::new();
        for (pos, &sid) in self.active.iter().enumerate() {
            if !s.is_empty() {
                s.push_str(" -> ");
            }
            if mark == Some(pos) {
                s.push('*');
            }
            if let Some(stage) = self.slots[sid].as_ref() {
                s.push_str(&stage.name);
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Open;
    use crate::info::TrackInfo;

    struct NullFactory;
    impl FilterFactory for NullFactory {
        fn open(&self, _ti: &mut TrackInfo) -> Result<Open, String> {
            Ok(Open::Skip)
        }
    }

    fn chain_of(names: &[&str]) -> Chain {
        let mut chain = Chain::new();
        for n in names {
            chain
                .insert(InsertPos::Last, Arc::from(*n), Arc::new(NullFactory))
                .unwrap();
        }
        chain
    }

    #[test]
    fn test_insert_positions() {
        let mut chain = chain_of(&["b", "d"]);
        chain.cur = 1; // on "d"
        chain
            .insert(InsertPos::First, Arc::from("a"), Arc::new(NullFactory))
            .unwrap();
        assert_eq!(chain.cur, 2);
        chain
            .insert(InsertPos::BeforeCursor, Arc::from("c"), Arc::new(NullFactory))
            .unwrap();
        assert_eq!(chain.cur, 3);
        chain
            .insert(InsertPos::AfterCursor, Arc::from("e"), Arc::new(NullFactory))
            .unwrap();

        assert_eq!(chain.print(Some(chain.cur)), "a -> b -> c -> *d -> e");
    }

    #[test]
    fn test_insert_limit() {
        let mut chain = Chain::new();
        for i in 0..MAX_STAGES {
            chain
                .insert(
                    InsertPos::Last,
                    Arc::from(format!("f{i}").as_str()),
                    Arc::new(NullFactory),
                )
                .unwrap();
        }
        let err = chain
            .insert(InsertPos::Last, Arc::from("extra"), Arc::new(NullFactory))
            .unwrap_err();
        assert!(matches!(err, EngineError::TooManyFilters));
    }

    #[test]
    fn test_split_and_restore() {
        let mut chain = chain_of(&["src", "split", "enc", "out"]);
        chain.cur = 1;
        chain.split_after_cursor();
        assert!(chain.has_split());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.cur, 0);
        assert_eq!(chain.print(Some(chain.cur)), "*enc -> out");

        chain.remove_at(0);
        chain.remove_at(0);
        assert!(chain.is_empty());
        assert!(chain.restore_parent());
        assert!(!chain.has_split());
        assert_eq!(chain.print(Some(chain.cur)), "src -> *split");
    }

    #[test]
    fn test_first_live_ignores_done() {
        let mut chain = chain_of(&["a", "b", "c"]);
        assert!(chain.first_live(0));
        assert!(!chain.first_live(2));
        chain.stage_mut(0).done = true;
        chain.stage_mut(1).done = true;
        assert!(chain.first_live(2));
    }
}
