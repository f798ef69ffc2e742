//! # Kernel State
//!
//! One [`Kernel`] value owns every piece of mutable kernel state. Each
//! trap borrows it once, through [`Kernel::handle_interrupt`], so nothing
//! is shared behind the scheduler's back.
//!
//! ## Submodules
//!
//! - `init`: boot phases, in order
//! - `lifecycle`: starting and stopping programs
//! - `status`: per-phase progress board

pub mod init;
pub mod lifecycle;
pub mod status;

use crate::arch::{Machine, Platform};
use crate::config::KernelConfig;
use crate::interrupts::{Fault, FaultState, InterruptDescriptorTable};
use crate::memory::AddressSpace;
use crate::process::{ProcessTable, SavedContext, UserEntry};
use crate::sched::Scheduler;
use crate::terminal::Terminals;

pub use status::{ComponentStatus, InitStatus, StatusBoard};

/// What the entry stub does after [`Kernel::handle_interrupt`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Restore the frame that was interrupted.
    Continue,
    /// Restore the frame saved at `context.esp` on another kernel stack.
    Switch(SavedContext),
    /// Restore a parent suspended in `execute`, with `value` in its eax.
    ReturnTo { context: SavedContext, value: i32 },
    /// Enter ring 3 at a freshly loaded program.
    EnterUser(UserEntry),
    /// Mask interrupts and halt for good.
    Halt,
}

pub struct Kernel<P: Platform> {
    pub(crate) machine: Machine<P>,
    pub(crate) config: KernelConfig,
    pub(crate) idt: InterruptDescriptorTable,
    pub(crate) address_space: AddressSpace,
    pub(crate) processes: ProcessTable,
    pub(crate) scheduler: Scheduler,
    pub(crate) terminals: Terminals,
    pub(crate) fault: FaultState,
    pub(crate) status: StatusBoard,
}

impl<P: Platform> Kernel<P> {
    pub fn new(machine: Machine<P>, config: KernelConfig) -> Self {
        Self {
            machine,
            config,
            idt: InterruptDescriptorTable::new(),
            address_space: AddressSpace::new(),
            processes: ProcessTable::new(),
            scheduler: Scheduler::new(config.schedule_divisor),
            terminals: Terminals::new(),
            fault: FaultState::default(),
            status: StatusBoard::new(),
        }
    }

    pub fn machine(&self) -> &Machine<P> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine<P> {
        &mut self.machine
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn idt(&self) -> &InterruptDescriptorTable {
        &self.idt
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.address_space
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// The fault the machine stopped on, if any.
    pub fn fault(&self) -> Option<Fault> {
        self.fault.fault()
    }
}
