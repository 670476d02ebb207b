//! Per-track key/value store
//!
//! Each track owns two of these: one for transient control values and one
//! for metadata exposed to the rest of the application. Keys are hashed
//! with CRC-32 and verified with a full string compare; two distinct keys
//! hashing to the same value is a fatal error for the owning track: the
//! store records the collision and the scheduler aborts the track. This is
//! legacy behavior and is kept deliberately: nothing is allowed to chain
//! past a collision.
//!
//! Values are 64-bit integers or strings. A string is either owned by the
//! store or borrowed (`&'static str`); replacing an entry drops an owned
//! string, a borrowed one is never freed here.

use std::collections::BTreeMap;

use crate::error::StoreCollision;

const CRC32_POLY: u32 = 0x04C1_1DB7;

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ CRC32_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Hash a key name. Not collision-free; see the module docs.
pub fn key_hash(name: &str) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in name.as_bytes() {
        let index = ((crc >> 24) ^ (byte as u32)) as usize;
        crc = (crc << 8) ^ CRC32_TABLE[index];
    }
    crc
}

/// A string value, owned by the store or borrowed for the program's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrValue {
    Owned(String),
    Borrowed(&'static str),
}

impl StrValue {
    pub fn as_str(&self) -> &str {
        match self {
            StrValue::Owned(s) => s,
            StrValue::Borrowed(s) => s,
        }
    }
}

/// A stored value: a 64-bit integer or a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Str(StrValue),
}

impl Value {
    /// Build an owned string value
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(StrValue::Owned(s.into()))
    }

    /// Build a borrowed string value; the store will never free it
    pub fn borrowed(s: &'static str) -> Self {
        Value::Str(StrValue::Borrowed(s))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Int(_) => None,
            Value::Str(s) => Some(s.as_str()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

struct Entry {
    name: String,
    value: Value,
}

/// Associative storage for one track (control values or metadata)
///
/// Entries are kept ordered by key hash, which fixes the enumeration
/// order used by metadata consumers.
#[derive(Default)]
pub struct ValueStore {
    entries: BTreeMap<u32, Entry>,
    collision: Option<StoreCollision>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        let ent = self.entries.get(&key_hash(name))?;
        if ent.name != name {
            return None;
        }
        Some(&ent.value)
    }

    /// Look up an integer value by name
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Look up a string value by name
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Get and remove a value
    pub fn pop(&mut self, name: &str) -> Option<Value> {
        let hash = key_hash(name);
        let ent = self.entries.get(&hash)?;
        if ent.name != name {
            return None;
        }
        self.entries.remove(&hash).map(|e| e.value)
    }

    /// Store a value under `name`, replacing any previous value.
    ///
    /// With `no_overwrite` set, an existing entry is kept and the call
    /// succeeds without touching it. A hash collision with a distinct
    /// existing key is recorded and returned; the owning track must treat
    /// it as fatal.
    pub fn set(
        &mut self,
        name: &str,
        value: Value,
        no_overwrite: bool,
    ) -> Result<(), StoreCollision> {
        let hash = key_hash(name);
        if let Some(ent) = self.entries.get_mut(&hash) {
            if ent.name != name {
                let err = StoreCollision {
                    hash,
                    key: name.to_string(),
                    existing: ent.name.clone(),
                };
                log::error!("{}", err);
                self.collision = Some(err.clone());
                return Err(err);
            }
            if !no_overwrite {
                // dropping the old value frees an owned string; a
                // borrowed one is just forgotten
                ent.value = value;
            }
            return Ok(());
        }
        self.entries.insert(
            hash,
            Entry {
                name: name.to_string(),
                value,
            },
        );
        Ok(())
    }

    /// The collision that poisoned this store, if any
    pub fn collision(&self) -> Option<&StoreCollision> {
        self.collision.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walk entries in hash order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.values().map(|e| (e.name.as_str(), &e.value))
    }

    /// Plant an entry under an arbitrary hash, bypassing the name hash.
    /// Test-only: lets collision handling be exercised without hunting
    /// for real CRC-32 collisions.
    #[cfg(test)]
    pub(crate) fn inject_raw(&mut self, hash: u32, name: &str, value: Value) {
        self.entries.insert(
            hash,
            Entry {
                name: name.to_string(),
                value,
            },
        );
    }

    /// First entry whose hash is strictly greater than `after`.
    ///
    /// Drives stateful metadata enumeration: the cursor remembers the last
    /// hash yielded and asks for the successor, so entries inserted while
    /// enumerating don't repeat already-yielded keys.
    pub(crate) fn next_after(&self, after: Option<u32>) -> Option<(u32, &str, &Value)> {
        use std::ops::Bound;
        let lower = match after {
            Some(h) => Bound::Excluded(h),
            None => Bound::Unbounded,
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(h, e)| (*h, e.name.as_str(), &e.value))
    }
}
