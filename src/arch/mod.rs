//! # Hardware Boundary
//!
//! Everything the kernel needs from the machine, expressed as traits so the
//! same policy code runs on an i386 PC and against the host mock.
//!
//! | Trait                   | PC backend                  | Host mock           |
//! |-------------------------|-----------------------------|---------------------|
//! | [`Cpu`]                 | `cli`/`sti`, ports, CR0-CR4 | recording CPU       |
//! | [`InterruptController`] | cascaded 8259 pair          | recording PIC       |
//! | [`PhysicalMemory`]      | raw pointers                | sparse frame map    |
//! | [`FileSystem`]          | boot module image           | built image         |
//! | [`Console`]             | VGA text + PS/2 keyboard    | scripted console    |
//! | [`RtcDevice`]           | MC146818 on ports 0x70/0x71 | counting RTC        |

#[cfg(any(test, feature = "std"))]
pub mod mock;

#[cfg(all(feature = "bare-metal", target_arch = "x86"))]
pub mod pc;

use crate::drivers::{Console, FileSystem, RtcDevice};
use crate::interrupts::idt::{DescriptorTablePointer, VECTOR_COUNT};
use crate::memory::{AddressSpace, PhysAddr, PhysicalMemory, TableLocations, VirtAddr};

pub trait Cpu {
    fn disable_interrupts(&mut self);

    fn enable_interrupts(&mut self);

    fn halt(&mut self);

    fn read_port(&mut self, port: u16) -> u8;

    fn write_port(&mut self, port: u16, value: u8);

    /// `lidt`
    fn load_descriptor_table(&mut self, pointer: DescriptorTablePointer);

    /// Write the directory's physical address to CR3.
    fn load_page_directory(&mut self, root: PhysAddr);

    /// Set CR4.PSE, then CR0.PG.
    fn enable_paging(&mut self);

    /// Reload CR3 with its current value.
    fn flush_tlb(&mut self);

    /// CR2
    fn fault_address(&self) -> VirtAddr;

    /// Stack loaded on a ring 3 to ring 0 transition (TSS esp0).
    fn set_kernel_stack(&mut self, top: u32);
}

pub trait InterruptController {
    /// Remap both controllers to their vector offsets and mask every line
    /// except the cascade.
    fn initialize(&mut self);

    fn enable_irq(&mut self, line: u8);

    fn disable_irq(&mut self, line: u8);

    /// End of interrupt for `line`. Lines 8 to 15 also acknowledge the
    /// cascade line on the primary controller.
    fn acknowledge(&mut self, line: u8);
}

pub trait Platform {
    type Cpu: Cpu;
    type Pic: InterruptController;
    type Memory: PhysicalMemory;
    type Fs: FileSystem;
    type Console: Console;
    type Rtc: RtcDevice;

    /// Physical addresses of the paging structures inside `space`.
    fn locate_tables(space: &AddressSpace) -> TableLocations;
}

/// Address of the entry stub for every vector. Each stub records its
/// vector number before entering the common dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoints {
    pub vectors: [u32; VECTOR_COUNT],
}

impl EntryPoints {
    /// Stubs laid out back to back, `stride` bytes apart.
    pub fn uniform(base: u32, stride: u32) -> Self {
        let mut vectors = [0u32; VECTOR_COUNT];
        for (vector, entry) in vectors.iter_mut().enumerate() {
            *entry = base + vector as u32 * stride;
        }
        Self { vectors }
    }

    pub fn get(&self, vector: u8) -> u32 {
        self.vectors[vector as usize]
    }
}

/// One machine: the devices the kernel drives and where its stubs live.
pub struct Machine<P: Platform> {
    pub cpu: P::Cpu,
    pub pic: P::Pic,
    pub memory: P::Memory,
    pub fs: P::Fs,
    pub console: P::Console,
    pub rtc: P::Rtc,
    pub entry_points: EntryPoints,
}
