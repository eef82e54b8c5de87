//! Path-keyed status cache
//!
//! One `RwLock` guards the whole map. It is only held for map operations,
//! never while a status is being computed.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use super::record::{StatusRecord, status_text};
use crate::utils;

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A fresh record is cached
    Hit(StatusRecord),
    /// A request for this path is already running
    InFlight,
    /// Nothing usable; a request may be dispatched
    Miss,
}

/// Effect of a completed request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completion {
    /// The record was written to the cache
    pub stored: bool,
    /// The badge text for the path differs from before
    pub changed: bool,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u64,
    record: Option<StatusRecord>,
    is_dir: bool,
    pending: bool,
    fresh: bool,
}

impl Slot {
    fn text(&self, path: &str) -> String {
        self.record
            .as_ref()
            .map(|r| status_text(r, path, self.is_dir))
            .unwrap_or_default()
    }
}

/// Status records by absolute path.
///
/// Writes are monotonic per path: a completion tagged with generation `G`
/// is ignored once the slot has moved to a newer generation.
#[derive(Debug, Default)]
pub struct StatusCache {
    slots: RwLock<HashMap<String, Slot>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, path: &str) -> Lookup {
        let Ok(slots) = self.slots.read() else {
            return Lookup::Miss;
        };
        match slots.get(path) {
            Some(slot) if slot.pending => Lookup::InFlight,
            Some(Slot {
                record: Some(record),
                fresh: true,
                ..
            }) => Lookup::Hit(record.clone()),
            _ => Lookup::Miss,
        }
    }

    /// Claim `path` for a new request. Returns `true` when the caller should
    /// dispatch; `false` when a request is already pending, a fresh record
    /// exists, or the slot belongs to a newer generation.
    pub fn begin(&self, path: &str, is_dir: bool, generation: u64) -> bool {
        let Ok(mut slots) = self.slots.write() else {
            return false;
        };
        let slot = slots.entry(path.to_string()).or_insert_with(|| Slot {
            generation,
            record: None,
            is_dir,
            pending: false,
            fresh: false,
        });
        if slot.pending || (slot.fresh && slot.record.is_some()) || slot.generation > generation {
            return false;
        }
        slot.generation = generation;
        slot.is_dir = is_dir;
        slot.pending = true;
        true
    }

    /// Record the result of a request started with [`StatusCache::begin`].
    ///
    /// `None` leaves any previous record in place but marks it stale.
    pub fn complete(
        &self,
        path: &str,
        generation: u64,
        record: Option<StatusRecord>,
    ) -> Completion {
        let Ok(mut slots) = self.slots.write() else {
            return Completion::default();
        };
        let Some(slot) = slots.get_mut(path) else {
            return Completion::default();
        };
        if generation < slot.generation {
            debug!(path, generation, current = slot.generation, "rejecting older status");
            return Completion::default();
        }

        let before = slot.text(path);
        slot.pending = false;
        slot.generation = generation;
        let stored = match record {
            Some(record) => {
                slot.record = Some(record);
                slot.fresh = true;
                true
            }
            None => {
                slot.fresh = false;
                false
            }
        };
        Completion {
            stored,
            changed: slot.text(path) != before,
        }
    }

    /// Mark everything at or below `prefix` stale and move those slots to
    /// `generation`, so results of earlier requests are dropped.
    pub fn invalidate_under(&self, prefix: &str, generation: u64) {
        let Ok(mut slots) = self.slots.write() else {
            return;
        };
        let prefix = utils::normalize_path(prefix);
        for (path, slot) in slots.iter_mut() {
            if utils::relative_to(&prefix, path).is_some() {
                slot.fresh = false;
                slot.pending = false;
                slot.generation = slot.generation.max(generation);
            }
        }
    }

    /// Badge text currently cached for `path`
    pub fn text_for(&self, path: &str) -> String {
        self.slots
            .read()
            .ok()
            .and_then(|slots| slots.get(path).map(|s| s.text(path)))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.slots.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
