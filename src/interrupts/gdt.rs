//! Flat protected-mode segments and the task state segment.
//!
//! The table is fixed: two null slots, kernel code and data, user code and
//! data, then the TSS. Only `esp0`/`ss0` of the TSS matter; the CPU loads
//! them when an interrupt arrives from ring 3.

use core::mem::size_of;

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

pub const GDT_ENTRIES: usize = 7;

pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
pub const KERNEL_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring0);
pub const USER_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3);
pub const USER_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(5, PrivilegeLevel::Ring3);
pub const TSS_SELECTOR: SegmentSelector = SegmentSelector::new(6, PrivilegeLevel::Ring0);

const PRESENT: u8 = 0x80;
const CODE_OR_DATA: u8 = 0x10;
const EXECUTABLE: u8 = 0x08;
const READ_WRITE: u8 = 0x02;
const TSS_AVAILABLE: u8 = 0x09;

/// 4 KiB granularity, 32-bit operands.
const FLAT_FLAGS: u8 = 0xC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SegmentDescriptor(u64);

impl SegmentDescriptor {
    pub const NULL: Self = Self(0);

    pub const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        let base = base as u64;
        let limit = limit as u64;
        Self(
            (limit & 0xFFFF)
                | (base & 0xFF_FFFF) << 16
                | (access as u64) << 40
                | ((limit >> 16) & 0xF) << 48
                | ((flags as u64) & 0xF) << 52
                | ((base >> 24) & 0xFF) << 56,
        )
    }

    pub const fn flat_code(dpl: PrivilegeLevel) -> Self {
        let access = PRESENT | (dpl as u8) << 5 | CODE_OR_DATA | EXECUTABLE | READ_WRITE;
        Self::new(0, 0xF_FFFF, access, FLAT_FLAGS)
    }

    pub const fn flat_data(dpl: PrivilegeLevel) -> Self {
        let access = PRESENT | (dpl as u8) << 5 | CODE_OR_DATA | READ_WRITE;
        Self::new(0, 0xF_FFFF, access, FLAT_FLAGS)
    }

    pub const fn tss(base: u32) -> Self {
        Self::new(base, (size_of::<TaskStateSegment>() - 1) as u32, PRESENT | TSS_AVAILABLE, 0)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

pub fn flat_table(tss_base: u32) -> [SegmentDescriptor; GDT_ENTRIES] {
    [
        SegmentDescriptor::NULL,
        SegmentDescriptor::NULL,
        SegmentDescriptor::flat_code(PrivilegeLevel::Ring0),
        SegmentDescriptor::flat_data(PrivilegeLevel::Ring0),
        SegmentDescriptor::flat_code(PrivilegeLevel::Ring3),
        SegmentDescriptor::flat_data(PrivilegeLevel::Ring3),
        SegmentDescriptor::tss(tss_base),
    ]
}

/// i386 hardware task state segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TaskStateSegment {
    pub previous_task: u32,
    pub esp0: u32,
    pub ss0: u32,
    pub esp1: u32,
    pub ss1: u32,
    pub esp2: u32,
    pub ss2: u32,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub registers: [u32; 8],
    pub segments: [u32; 6],
    pub ldt: u32,
    pub trap: u16,
    pub iomap_base: u16,
}

impl TaskStateSegment {
    pub const fn new() -> Self {
        Self {
            previous_task: 0,
            esp0: 0,
            ss0: KERNEL_DATA_SELECTOR.0 as u32,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            registers: [0; 8],
            segments: [0; 6],
            ldt: 0,
            trap: 0,
            // No I/O permission bitmap.
            iomap_base: size_of::<Self>() as u16,
        }
    }
}

impl Default for TaskStateSegment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors() {
        assert_eq!(KERNEL_CODE_SELECTOR.0, 0x10);
        assert_eq!(KERNEL_DATA_SELECTOR.0, 0x18);
        assert_eq!(USER_CODE_SELECTOR.0, 0x23);
        assert_eq!(USER_DATA_SELECTOR.0, 0x2B);
        assert_eq!(TSS_SELECTOR.0, 0x30);
    }

    #[test]
    fn flat_segments() {
        let table = flat_table(0);
        assert_eq!(table[2].raw(), 0x00CF_9A00_0000_FFFF);
        assert_eq!(table[3].raw(), 0x00CF_9200_0000_FFFF);
        assert_eq!(table[4].raw(), 0x00CF_FA00_0000_FFFF);
        assert_eq!(table[5].raw(), 0x00CF_F200_0000_FFFF);
    }

    #[test]
    fn tss_descriptor_splits_base() {
        assert_eq!(size_of::<TaskStateSegment>(), 104);
        let descriptor = SegmentDescriptor::tss(0x1234_5678);
        assert_eq!(descriptor.raw(), 0x1200_8934_5678_0067);
    }
}
