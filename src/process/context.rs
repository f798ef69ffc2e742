use crate::config::USER_STACK_TOP;
use crate::interrupts::TrapFrame;

/// Where a suspended process resumes.
///
/// `esp` is the address of the process's trap frame on its own kernel
/// stack; `eip` and `eflags` are copies of what that frame holds and are
/// kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavedContext {
    pub esp: u32,
    pub ebp: u32,
    pub eip: u32,
    pub eflags: u32,
}

impl SavedContext {
    pub fn capture(frame: &TrapFrame, frame_address: u32) -> Self {
        Self {
            esp: frame_address,
            ebp: frame.ebp,
            eip: frame.eip,
            eflags: frame.eflags,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.esp == 0
    }
}

/// First entry into ring 3 for a freshly loaded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserEntry {
    pub eip: u32,
    pub esp: u32,
    /// Kernel stack the entry frame is built on.
    pub kernel_stack_top: u32,
}

impl UserEntry {
    pub const fn new(eip: u32, kernel_stack_top: u32) -> Self {
        Self {
            eip,
            esp: USER_STACK_TOP,
            kernel_stack_top,
        }
    }
}
