//! # i386 PC Backend
//!
//! The [`Platform`] a real machine boots with.
//!
//! | Piece       | Hardware                                       |
//! |-------------|------------------------------------------------|
//! | [`PcCpu`]   | `cli`/`sti`/`hlt`, port I/O, CR0/CR2/CR3/CR4   |
//! | pic         | cascaded 8259 on ports 0x20/0x21 and 0xA0/0xA1 |
//! | [`PcMemory`]| raw pointers through the kernel's own mappings |
//! | console     | VGA text mode and the PS/2 keyboard            |
//! | rtc         | MC146818 on ports 0x70/0x71                    |
//! | serial      | COM1, kernel log output                        |
//!
//! ## Submodules
//!
//! - `descriptors`: GDT and TSS, loaded once before the kernel starts
//! - `entry`: the 256 interrupt stubs and the Rust side of the trap path

pub mod console;
pub mod descriptors;
pub mod entry;
pub mod rtc;
pub mod serial;

use core::arch::asm;

use crate::arch::{Cpu, Platform};
use crate::config::{LARGE_PAGE_SIZE, PROGRAM_PHYSICAL_BASE, PROGRAM_VIRTUAL_BASE};
use crate::drivers::bootfs::BootFs;
use crate::interrupts::idt::DescriptorTablePointer;
use crate::interrupts::pic::{ChainedPics, PortIo};
use crate::memory::paging::PageTable;
use crate::memory::{AddressSpace, PhysAddr, PhysicalMemory, TableLocations, VirtAddr};

pub use console::VgaConsole;
pub use rtc::CmosRtc;

const CR0_PROTECTED: u32 = 1 << 0;
const CR0_PAGING: u32 = 1 << 31;
const CR4_LARGE_PAGES: u32 = 1 << 4;
const CR4_GLOBAL_PAGES: u32 = 1 << 7;

/// # Safety
///
/// Port I/O has whatever side effect the device on `port` gives it.
pub unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
    value
}

/// # Safety
///
/// See [`inb`].
pub unsafe fn outb(port: u16, value: u8) {
    asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
}

pub struct PcPlatform;

impl Platform for PcPlatform {
    type Cpu = PcCpu;
    type Pic = ChainedPics<PcPorts>;
    type Memory = PcMemory;
    type Fs = BootFs<&'static [u8]>;
    type Console = VgaConsole;
    type Rtc = CmosRtc;

    /// Below 8 MiB the kernel runs identity mapped, so the tables sit at
    /// their own addresses.
    fn locate_tables(space: &AddressSpace) -> TableLocations {
        let at = |table: &PageTable| PhysAddr::new(table as *const PageTable as u32);
        TableLocations {
            directory: at(space.directory()),
            low_table: at(space.low_table()),
            user_video_table: at(space.user_video_table()),
        }
    }
}

#[derive(Debug, Default)]
pub struct PcCpu {
    lock_held: bool,
}

impl PcCpu {
    pub const fn new() -> Self {
        Self { lock_held: false }
    }

    /// Set while the kernel lock is held. `sti` is deferred until it is
    /// released: a trap taken meanwhile could never acquire it.
    pub fn set_lock_held(&mut self, held: bool) {
        self.lock_held = held;
    }
}

/// `sti` for the boot path, once the kernel lock is released.
pub fn enable_interrupts() {
    unsafe { asm!("sti", options(nomem, nostack)) };
}

impl Cpu for PcCpu {
    fn disable_interrupts(&mut self) {
        unsafe { asm!("cli", options(nomem, nostack)) };
    }

    fn enable_interrupts(&mut self) {
        if !self.lock_held {
            unsafe { asm!("sti", options(nomem, nostack)) };
        }
    }

    fn halt(&mut self) {
        unsafe { asm!("hlt", options(nomem, nostack)) };
    }

    fn read_port(&mut self, port: u16) -> u8 {
        unsafe { inb(port) }
    }

    fn write_port(&mut self, port: u16, value: u8) {
        unsafe { outb(port, value) }
    }

    fn load_descriptor_table(&mut self, pointer: DescriptorTablePointer) {
        let mut operand = [0u8; 6];
        operand[..2].copy_from_slice(&pointer.limit.to_le_bytes());
        operand[2..].copy_from_slice(&pointer.base.to_le_bytes());
        unsafe { asm!("lidt [{}]", in(reg) operand.as_ptr(), options(readonly, nostack, preserves_flags)) };
    }

    fn load_page_directory(&mut self, root: PhysAddr) {
        unsafe { asm!("mov cr3, {}", in(reg) root.as_u32(), options(nostack, preserves_flags)) };
    }

    fn enable_paging(&mut self) {
        unsafe {
            let mut cr4: u32;
            asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
            cr4 |= CR4_LARGE_PAGES | CR4_GLOBAL_PAGES;
            asm!("mov cr4, {}", in(reg) cr4, options(nostack, preserves_flags));

            let mut cr0: u32;
            asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
            cr0 |= CR0_PROTECTED | CR0_PAGING;
            asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
        }
    }

    fn flush_tlb(&mut self) {
        unsafe {
            asm!(
                "mov {tmp}, cr3",
                "mov cr3, {tmp}",
                tmp = out(reg) _,
                options(nostack, preserves_flags)
            )
        };
    }

    fn fault_address(&self) -> VirtAddr {
        let cr2: u32;
        unsafe { asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags)) };
        VirtAddr::new(cr2)
    }

    fn set_kernel_stack(&mut self, top: u32) {
        descriptors::set_kernel_stack(top);
    }
}

/// Port access for the 8259 driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcPorts;

impl PortIo for PcPorts {
    fn read(&mut self, port: u16) -> u8 {
        unsafe { inb(port) }
    }

    fn write(&mut self, port: u16, value: u8) {
        unsafe { outb(port, value) }
    }
}

/// Physical memory as the kernel can reach it once paging is on.
///
/// Frames below 8 MiB are identity mapped (video memory and the kernel
/// page). Program frames are reached through the program page, so only the
/// image that is currently mapped there is accessible.
#[derive(Debug, Default)]
pub struct PcMemory;

impl PcMemory {
    fn pointer(addr: PhysAddr) -> *mut u8 {
        let phys = addr.as_u32();
        if phys < PROGRAM_PHYSICAL_BASE {
            return phys as *mut u8;
        }
        let within = (phys - PROGRAM_PHYSICAL_BASE) % LARGE_PAGE_SIZE;
        (PROGRAM_VIRTUAL_BASE + within) as *mut u8
    }
}

impl PhysicalMemory for PcMemory {
    fn read(&self, addr: PhysAddr, buf: &mut [u8]) {
        let src = Self::pointer(addr);
        // SAFETY: the kernel only passes addresses it translated itself.
        unsafe { core::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len()) };
    }

    fn write(&mut self, addr: PhysAddr, data: &[u8]) {
        let dst = Self::pointer(addr);
        // SAFETY: see `read`.
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
    }
}
