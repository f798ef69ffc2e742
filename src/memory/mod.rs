//! # Memory
//!
//! 32-bit address types, the physical memory boundary, the paging model and
//! the terminal video buffers.
//!
//! ## Submodules
//!
//! - `paging`: page directory, page tables, translation cache
//! - `video`: display memory and per-terminal off-screen buffers

pub mod paging;
pub mod video;

use core::fmt;

pub use paging::{AccessMode, AddressSpace, PageFault, PageFaultReason, TableLocations};

/// A physical address on a 32-bit machine.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u32);

impl PhysAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn offset(self, by: u32) -> Self {
        Self(self.0.wrapping_add(by))
    }

    pub const fn is_aligned(self, align: u32) -> bool {
        self.0 % align == 0
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#010x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A linear address, split by the two-level i386 walk into a directory
/// index, a table index and a page offset.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(u32);

impl VirtAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn checked_add(self, by: u32) -> Option<Self> {
        match self.0.checked_add(by) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    pub const fn directory_index(self) -> usize {
        (self.0 >> 22) as usize
    }

    pub const fn table_index(self) -> usize {
        ((self.0 >> 12) & 0x3FF) as usize
    }

    /// Virtual page number of the 4 KiB page holding this address.
    pub const fn page_number(self) -> u32 {
        self.0 >> 12
    }

    pub const fn page_offset(self) -> u32 {
        self.0 & 0xFFF
    }

    pub const fn large_page_offset(self) -> u32 {
        self.0 & 0x3F_FFFF
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Byte access to physical memory.
///
/// Implementations may assume the kernel only touches frames that are
/// reachable on the running machine: low memory, the kernel page and the
/// program image of the process being served.
pub trait PhysicalMemory {
    fn read(&self, addr: PhysAddr, buf: &mut [u8]);

    fn write(&mut self, addr: PhysAddr, data: &[u8]);

    fn copy(&mut self, src: PhysAddr, dst: PhysAddr, len: usize) {
        let mut chunk = [0u8; 256];
        let mut done = 0;
        while done < len {
            let n = (len - done).min(chunk.len());
            self.read(src.offset(done as u32), &mut chunk[..n]);
            self.write(dst.offset(done as u32), &chunk[..n]);
            done += n;
        }
    }

    fn read_u32(&self, addr: PhysAddr) -> u32 {
        let mut bytes = [0u8; 4];
        self.read(addr, &mut bytes);
        u32::from_le_bytes(bytes)
    }
}
