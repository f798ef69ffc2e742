//! Software model of the translation lookaside buffer.
//!
//! A cached translation is used even after its directory or table entry has
//! changed, until the cache is flushed. Reloading CR3 drops every
//! translation except the global ones, so the kernel page survives address
//! space switches.

use crate::memory::PhysAddr;

pub const TLB_ENTRIES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    /// Virtual page number (address >> 12).
    pub page: u32,
    pub frame: PhysAddr,
    pub user: bool,
    pub writable: bool,
    pub global: bool,
}

#[derive(Debug, Clone)]
pub struct TranslationCache {
    slots: [Option<Translation>; TLB_ENTRIES],
    next: usize,
}

impl TranslationCache {
    pub const fn new() -> Self {
        Self {
            slots: [None; TLB_ENTRIES],
            next: 0,
        }
    }

    pub fn lookup(&self, page: u32) -> Option<Translation> {
        self.slots.iter().flatten().find(|t| t.page == page).copied()
    }

    /// Cache a translation, evicting slots in FIFO order once full.
    pub fn insert(&mut self, translation: Translation) {
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(t) if t.page == translation.page))
        {
            *slot = Some(translation);
            return;
        }
        self.slots[self.next] = Some(translation);
        self.next = (self.next + 1) % TLB_ENTRIES;
    }

    /// CR3 reload: drop everything but global translations.
    pub fn flush(&mut self) {
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(t) if !t.global) {
                *slot = None;
            }
        }
    }

    pub fn flush_all(&mut self) {
        self.slots = [None; TLB_ENTRIES];
        self.next = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}
