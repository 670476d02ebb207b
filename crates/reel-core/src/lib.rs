//! Reel Core - track pipeline engine
//!
//! Executes media jobs ("tracks") as chains of independently-implemented
//! processing stages ("filters"): a per-track state machine, a
//! cooperative cursor-based scheduler that drives data through the chain
//! (including splitting a chain into two cooperating halves), and a
//! per-track key/value store for control values and metadata.
//!
//! Concrete filters, module registration, the worker-thread runtime and
//! the playlist/queue subsystem are external collaborators, injected
//! through the traits in [`modules`], [`workers`], [`queue`] and
//! [`monitor`].

mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod info;
pub mod modules;
pub mod monitor;
pub mod queue;
pub mod store;
mod track;
pub mod types;
pub mod workers;

pub use chain::MAX_STAGES;
pub use config::EngineConfig;
pub use engine::{Engine, TrackHandle};
pub use error::{EngineError, EngineResult, StoreCollision};
pub use filter::{Filter, FilterFactory, InsertPos, Open, StageResult};
pub use info::{MetaCursor, SetFlags, TrackInfo, TrackParams};
pub use modules::{ModuleMap, ModuleResolver};
pub use monitor::Monitor;
pub use queue::{MetaFetch, QueueProvider};
pub use store::{Value, ValueStore};
pub use types::{AudioFormat, Direction, SampleFormat, TrackState, TrackType, WorkerId};
pub use workers::{SerialWorkers, ThreadWorkers, WorkerPool};
