//! # Kernel Configuration
//!
//! Fixed memory layout and sizing constants, plus the few runtime knobs
//! gathered in [`KernelConfig`].
//!
//! ## Physical / Virtual Layout
//!
//! | Region                  | Address                         |
//! |-------------------------|---------------------------------|
//! | Display memory          | `0x000B_8000`                   |
//! | Terminal buffers 1..=3  | `0x000B_9000` .. `0x000B_B000`  |
//! | Kernel (4 MiB page)     | `0x0040_0000`                   |
//! | Kernel stacks           | below `0x0080_0000`, 8 KiB each |
//! | Program images          | `0x0080_0000 + pid * 4 MiB`     |
//! | User program (virtual)  | `0x0800_0000`                   |
//! | User video (virtual)    | `0x0840_0000`                   |

pub const PAGE_SIZE: u32 = 0x1000;
pub const LARGE_PAGE_SIZE: u32 = 0x40_0000;
pub const ENTRIES_PER_TABLE: usize = 1024;

pub const KERNEL_BASE: u32 = 0x40_0000;
pub const KERNEL_DIRECTORY_SLOT: usize = 1;
pub const LOW_TABLE_DIRECTORY_SLOT: usize = 0;

pub const VIDEO_MEMORY: u32 = 0xB8000;
pub const VIDEO_PAGE_INDEX: usize = (VIDEO_MEMORY / PAGE_SIZE) as usize;
pub const SCREEN_COLUMNS: usize = 80;
pub const SCREEN_ROWS: usize = 25;
pub const VIDEO_BYTES: usize = SCREEN_COLUMNS * SCREEN_ROWS * 2;

pub const PROGRAM_DIRECTORY_SLOT: usize = 32;
pub const PROGRAM_VIRTUAL_BASE: u32 = (PROGRAM_DIRECTORY_SLOT as u32) * LARGE_PAGE_SIZE;
pub const PROGRAM_PHYSICAL_BASE: u32 = 0x80_0000;
pub const PROGRAM_IMAGE_OFFSET: u32 = 0x48000;
pub const USER_STACK_TOP: u32 = PROGRAM_VIRTUAL_BASE + LARGE_PAGE_SIZE - 4;

pub const USER_VIDEO_DIRECTORY_SLOT: usize = 33;
pub const USER_VIDEO_VIRTUAL: u32 = (USER_VIDEO_DIRECTORY_SLOT as u32) * LARGE_PAGE_SIZE;

pub const KERNEL_STACK_BASE: u32 = 0x80_0000;
pub const KERNEL_STACK_SIZE: u32 = 0x2000;

pub const MAX_PROCESSES: usize = 6;
pub const NUM_TERMINALS: usize = 3;
pub const MAX_FILE_DESCRIPTORS: usize = 8;
pub const ARG_BUFFER_SIZE: usize = 1024;
pub const MAX_FILE_NAME: usize = 32;

pub const PIT_BASE_FREQUENCY: u32 = 1_193_180;

/// Runtime knobs handed to [`crate::kernel::Kernel::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Programmed PIT frequency in Hz.
    pub timer_hz: u32,
    /// The scheduler acts on every `schedule_divisor`-th timer tick.
    pub schedule_divisor: u64,
    /// Program launched once per terminal at bootstrap and after a
    /// top-level process halts.
    pub initial_program: &'static [u8],
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            timer_hz: 100,
            schedule_divisor: 2,
            initial_program: b"shell",
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
