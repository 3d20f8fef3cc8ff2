//! The per-process context table.
//!
//! Entries are addressed by their position index, which is handed to the
//! daemon at registration as `log_level_pos` and used by it to target
//! subsequent log-level updates and injections. Positions grow
//! monotonically and are never reused, so a stale daemon frame can at
//! worst address an unregistered slot, never the wrong context.

use std::sync::atomic::{AtomicI8, Ordering};
use std::sync::Arc;

use mct_core::{Id4, LogLevel, TraceStatus};

use crate::config::CONTEXT_ALLOC_CHUNK;

/// The externally-visible log-level cache of one context.
///
/// The builder reads it on every log call without taking the registry
/// lock; the housekeeper stores into it under the lock. The two bytes are
/// updated independently, so a reader can observe a transient mix of old
/// and new values; the window is one store wide and heals on the next
/// read.
#[derive(Debug)]
pub(crate) struct LevelCell {
    level: AtomicI8,
    trace: AtomicI8,
}

impl LevelCell {
    pub(crate) fn new(level: LogLevel, trace: TraceStatus) -> LevelCell {
        LevelCell {
            level: AtomicI8::new(level.as_raw()),
            trace: AtomicI8::new(trace.as_raw()),
        }
    }

    pub(crate) fn level(&self) -> LogLevel {
        LogLevel::from_raw(self.level.load(Ordering::Relaxed)).unwrap_or(LogLevel::Off)
    }

    pub(crate) fn trace(&self) -> TraceStatus {
        TraceStatus::from_raw(self.trace.load(Ordering::Relaxed)).unwrap_or(TraceStatus::Off)
    }

    pub(crate) fn store(&self, level: LogLevel, trace: TraceStatus) {
        self.level.store(level.as_raw(), Ordering::Relaxed);
        self.trace.store(trace.as_raw(), Ordering::Relaxed);
    }
}

/// Callback invoked when the daemon changes a context's level.
pub(crate) type LevelChangedCallback = Arc<dyn Fn(Id4, LogLevel, TraceStatus) + Send + Sync>;

/// Callback invoked for an injection addressed to (context, service id).
pub(crate) type InjectionCallback = Arc<dyn Fn(u32, &[u8]) + Send + Sync>;

/// One slot of the context table.
pub(crate) struct ContextEntry {
    /// Context id; empty marks an unregistered slot.
    pub(crate) ctid: Id4,
    /// Human-readable description sent to the daemon.
    pub(crate) description: String,
    /// The shared level/trace cache cell.
    pub(crate) cell: Arc<LevelCell>,
    /// Injection callbacks keyed by service id.
    pub(crate) injections: Vec<(u32, InjectionCallback)>,
    /// Optional level-changed callback.
    pub(crate) level_changed: Option<LevelChangedCallback>,
}

/// The table of all contexts registered by this process.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<ContextEntry>,
}

impl Registry {
    pub(crate) fn new() -> Registry {
        Registry::default()
    }

    /// Number of slots ever allocated (the next `log_level_pos`).
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Allocates a slot for a new context and returns its position.
    pub(crate) fn allocate(
        &mut self,
        ctid: Id4,
        description: String,
        level: LogLevel,
        trace: TraceStatus,
    ) -> (u32, Arc<LevelCell>) {
        if self.entries.len() % CONTEXT_ALLOC_CHUNK == 0 {
            self.entries.reserve(CONTEXT_ALLOC_CHUNK);
        }
        let cell = Arc::new(LevelCell::new(level, trace));
        self.entries.push(ContextEntry {
            ctid,
            description,
            cell: cell.clone(),
            injections: Vec::new(),
            level_changed: None,
        });
        ((self.entries.len() - 1) as u32, cell)
    }

    pub(crate) fn entry(&self, pos: u32) -> Option<&ContextEntry> {
        self.entries.get(pos as usize)
    }

    pub(crate) fn entry_mut(&mut self, pos: u32) -> Option<&mut ContextEntry> {
        self.entries.get_mut(pos as usize)
    }

    /// Marks a slot unregistered. The position is not reused.
    pub(crate) fn release(&mut self, pos: u32) {
        if let Some(entry) = self.entries.get_mut(pos as usize) {
            entry.ctid = Id4::EMPTY;
            entry.description.clear();
            entry.injections.clear();
            entry.level_changed = None;
        }
    }

    /// Iterates the registered slots with their positions.
    pub(crate) fn iter_active(&self) -> impl Iterator<Item = (u32, &ContextEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.ctid.is_empty())
            .map(|(pos, entry)| (pos as u32, entry))
    }

    /// Clears all slots, for application teardown.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_unique_and_monotonic() {
        let mut registry = Registry::new();
        let (a, _) = registry.allocate(
            Id4::new("A"),
            String::new(),
            LogLevel::Info,
            TraceStatus::Off,
        );
        let (b, _) = registry.allocate(
            Id4::new("B"),
            String::new(),
            LogLevel::Info,
            TraceStatus::Off,
        );
        registry.release(a);
        let (c, _) = registry.allocate(
            Id4::new("C"),
            String::new(),
            LogLevel::Info,
            TraceStatus::Off,
        );
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(registry.iter_active().count(), 2);
    }

    #[test]
    fn cell_updates_are_visible_without_the_registry() {
        let mut registry = Registry::new();
        let (pos, cell) = registry.allocate(
            Id4::new("MAIN"),
            String::new(),
            LogLevel::Info,
            TraceStatus::Off,
        );
        registry
            .entry(pos)
            .unwrap()
            .cell
            .store(LogLevel::Warn, TraceStatus::On);
        assert_eq!(cell.level(), LogLevel::Warn);
        assert_eq!(cell.trace(), TraceStatus::On);
    }

    #[test]
    fn released_slot_is_skipped_on_replay() {
        let mut registry = Registry::new();
        let (pos, _) = registry.allocate(
            Id4::new("TMP"),
            "temp".into(),
            LogLevel::Debug,
            TraceStatus::Off,
        );
        registry.release(pos);
        assert!(registry.entry(pos).unwrap().ctid.is_empty());
        assert_eq!(registry.iter_active().count(), 0);
    }
}
