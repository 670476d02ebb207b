//! Filter module resolution
//!
//! Filter registration and lookup live outside the engine; the engine
//! only asks an injected resolver to turn a capability name, or a file
//! extension plus direction, into a filter factory.

use std::collections::HashMap;
use std::sync::Arc;

use crate::filter::FilterFactory;
use crate::types::Direction;

/// Resolves filter names and file extensions to factories
pub trait ModuleResolver: Send + Sync {
    /// Resolve a capability name (e.g. `"sound.gain"`)
    fn by_name(&self, name: &str) -> Option<Arc<dyn FilterFactory>>;

    /// Resolve a file extension (without the dot) to the codec module for
    /// the given direction. Returns the module's full name and factory.
    fn by_extension(&self, ext: &str, dir: Direction)
        -> Option<(Arc<str>, Arc<dyn FilterFactory>)>;
}

/// Plain table-backed resolver.
///
/// Suitable for applications that register everything up front; also the
/// resolver the engine's own tests are built on.
#[derive(Default)]
pub struct ModuleMap {
    by_name: HashMap<String, Arc<dyn FilterFactory>>,
    by_ext_in: HashMap<String, String>,
    by_ext_out: HashMap<String, String>,
}

impl ModuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter factory under a capability name
    pub fn register(&mut self, name: &str, factory: Arc<dyn FilterFactory>) -> &mut Self {
        self.by_name.insert(name.to_string(), factory);
        self
    }

    /// Map a file extension to an already-registered module name
    pub fn register_ext(&mut self, ext: &str, dir: Direction, module: &str) -> &mut Self {
        let map = match dir {
            Direction::Input => &mut self.by_ext_in,
            Direction::Output => &mut self.by_ext_out,
        };
        map.insert(ext.to_ascii_lowercase(), module.to_string());
        self
    }
}

impl ModuleResolver for ModuleMap {
    fn by_name(&self, name: &str) -> Option<Arc<dyn FilterFactory>> {
        self.by_name.get(name).cloned()
    }

    fn by_extension(
        &self,
        ext: &str,
        dir: Direction,
    ) -> Option<(Arc<str>, Arc<dyn FilterFactory>)> {
        let map = match dir {
            Direction::Input => &self.by_ext_in,
            Direction::Output => &self.by_ext_out,
        };
        let name = map.get(&ext.to_ascii_lowercase())?;
        let factory = self.by_name.get(name)?;
        Some((Arc::from(name.as_str()), Arc::clone(factory)))
    }
}
