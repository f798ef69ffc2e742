use core::fmt;
use core::ops::{Index, IndexMut};

use bitflags::bitflags;

use crate::config::ENTRIES_PER_TABLE;
use crate::memory::PhysAddr;

bitflags! {
    /// Low bits of an i386 page directory or page table entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        /// 4 MiB page (directory entries only, needs CR4.PSE).
        const LARGE         = 1 << 7;
        /// Survives a CR3 reload (needs CR4.PGE).
        const GLOBAL        = 1 << 8;
    }
}

/// One 32-bit directory or table entry: frame address in bits 31..12,
/// flags below.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageEntry(u32);

impl PageEntry {
    pub const ADDRESS_MASK: u32 = 0xFFFF_F000;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn new(addr: PhysAddr, flags: PageFlags) -> Self {
        Self((addr.as_u32() & Self::ADDRESS_MASK) | flags.bits())
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn address(self) -> PhysAddr {
        PhysAddr::new(self.0 & Self::ADDRESS_MASK)
    }

    pub const fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }

    pub const fn is_present(self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    pub const fn is_large(self) -> bool {
        self.0 & PageFlags::LARGE.bits() != 0
    }

    pub fn set_address(&mut self, addr: PhysAddr) {
        self.0 = (addr.as_u32() & Self::ADDRESS_MASK) | (self.0 & !Self::ADDRESS_MASK);
    }

    pub fn insert(&mut self, flags: PageFlags) {
        self.0 |= flags.bits();
    }
}

impl fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageEntry")
            .field("address", &self.address())
            .field("flags", &self.flags())
            .finish()
    }
}

/// A page directory or page table: 1024 entries in one 4 KiB frame.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; ENTRIES_PER_TABLE],
}

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [PageEntry::empty(); ENTRIES_PER_TABLE],
        }
    }

    pub fn fill(&mut self, entry: PageEntry) {
        self.entries.fill(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PageEntry> {
        self.entries.iter_mut()
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for PageTable {
    type Output = PageEntry;

    fn index(&self, index: usize) -> &PageEntry {
        &self.entries[index]
    }
}

impl IndexMut<usize> for PageTable {
    fn index_mut(&mut self, index: usize) -> &mut PageEntry {
        &mut self.entries[index]
    }
}
