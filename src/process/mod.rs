//! # Process Control Blocks
//!
//! A fixed table of [`MAX_PROCESSES`] slots; the slot index is the pid.
//! Each pid owns a fixed 8 KiB kernel stack and a fixed 4 MiB physical
//! program image:
//!
//! | pid | Kernel stack top | Program image |
//! |-----|------------------|---------------|
//! | 0   | 0x0080_0000      | 0x0080_0000   |
//! | 1   | 0x007F_E000      | 0x00C0_0000   |
//! | *n* | 8 MiB − n·8 KiB  | 8 MiB + n·4 MiB |
//!
//! Parent and child links are kept symmetric: `parent.child == Some(c)`
//! exactly when `c.parent == Some(parent)` and `c` is live. A process with
//! a child is not schedulable.

pub mod context;
pub mod fd;
pub mod loader;

use core::fmt;

use crate::config::{
    ARG_BUFFER_SIZE, KERNEL_STACK_BASE, KERNEL_STACK_SIZE, LARGE_PAGE_SIZE, MAX_PROCESSES,
    PROGRAM_PHYSICAL_BASE,
};
use crate::memory::PhysAddr;
use crate::terminal::TerminalId;

pub use context::{SavedContext, UserEntry};
pub use fd::{FdError, FdTable, FileDescriptor, FileKind};
pub use loader::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u8);

impl Pid {
    pub const fn new(index: usize) -> Option<Self> {
        if index < MAX_PROCESSES {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Stacks sit back to back with no guard page: overflowing this one
    /// runs into the stack of the next pid.
    pub const fn kernel_stack_top(self) -> u32 {
        KERNEL_STACK_BASE - self.0 as u32 * KERNEL_STACK_SIZE
    }

    pub const fn program_base(self) -> PhysAddr {
        PhysAddr::new(PROGRAM_PHYSICAL_BASE + self.0 as u32 * LARGE_PAGE_SIZE)
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..MAX_PROCESSES).filter_map(Self::new)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

/// The pid whose kernel stack contains `esp`.
pub fn pid_for_stack_pointer(esp: u32) -> Option<Pid> {
    let block = esp & !(KERNEL_STACK_SIZE - 1);
    if block >= KERNEL_STACK_BASE {
        return None;
    }
    let depth = (KERNEL_STACK_BASE - block) / KERNEL_STACK_SIZE;
    Pid::new(depth as usize - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    NoFreeSlot,
    NoSuchProcess(Pid),
    NoCurrentProcess,
    Load(LoadError),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::NoFreeSlot => write!(f, "all {} process slots in use", MAX_PROCESSES),
            ProcessError::NoSuchProcess(pid) => write!(f, "{} is not running", pid),
            ProcessError::NoCurrentProcess => write!(f, "no process is running"),
            ProcessError::Load(err) => write!(f, "{}", err),
        }
    }
}

impl From<LoadError> for ProcessError {
    fn from(err: LoadError) -> Self {
        ProcessError::Load(err)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessControlBlock {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub child: Option<Pid>,
    /// Terminal the process draws to and reads from.
    pub terminal: TerminalId,
    /// Where the scheduler resumes this process.
    pub context: SavedContext,
    /// Where the parent resumes when this process halts.
    pub halt_context: SavedContext,
    pub fds: FdTable,
    args: [u8; ARG_BUFFER_SIZE],
    args_len: usize,
}

impl ProcessControlBlock {
    pub fn new(pid: Pid, parent: Option<Pid>, terminal: TerminalId) -> Self {
        Self {
            pid,
            parent,
            child: None,
            terminal,
            context: SavedContext::default(),
            halt_context: SavedContext::default(),
            fds: FdTable::with_standard_streams(),
            args: [0; ARG_BUFFER_SIZE],
            args_len: 0,
        }
    }

    /// Round-robin eligibility: a parent waits out its child's lifetime.
    pub fn is_schedulable(&self) -> bool {
        self.child.is_none()
    }

    pub fn set_args(&mut self, args: &[u8]) -> Result<(), LoadError> {
        if args.len() > ARG_BUFFER_SIZE {
            return Err(LoadError::ArgumentsTooLong);
        }
        self.args[..args.len()].copy_from_slice(args);
        self.args_len = args.len();
        Ok(())
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }
}

pub struct ProcessTable {
    slots: [Option<ProcessControlBlock>; MAX_PROCESSES],
    current: Option<Pid>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            current: None,
        }
    }

    /// Claim the lowest free slot.
    pub fn allocate_slot(&mut self, parent: Option<Pid>, terminal: TerminalId) -> Result<Pid, ProcessError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(ProcessError::NoFreeSlot)?;
        let pid = Pid::new(index).ok_or(ProcessError::NoFreeSlot)?;
        self.slots[index] = Some(ProcessControlBlock::new(pid, parent, terminal));
        log::trace!("allocated {} on {}", pid, terminal);
        Ok(pid)
    }

    /// Free `pid`'s slot and hand back its last state. The caller is
    /// responsible for unlinking it from its parent first.
    pub fn release_slot(&mut self, pid: Pid) -> Option<ProcessControlBlock> {
        let released = self.slots[pid.index()].take();
        if self.current == Some(pid) {
            self.current = None;
        }
        released
    }

    pub fn is_used(&self, pid: Pid) -> bool {
        self.slots[pid.index()].is_some()
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessControlBlock> {
        self.slots[pid.index()].as_ref()
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut ProcessControlBlock> {
        self.slots[pid.index()].as_mut()
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn set_current(&mut self, pid: Option<Pid>) {
        self.current = pid;
    }

    /// The running process.
    pub fn lookup_current(&self) -> Option<&ProcessControlBlock> {
        self.current.and_then(|pid| self.get(pid))
    }

    pub fn lookup_current_mut(&mut self) -> Option<&mut ProcessControlBlock> {
        let pid = self.current?;
        self.get_mut(pid)
    }

    /// The process whose kernel stack holds `esp`, if that slot is live.
    pub fn lookup_by_stack(&self, esp: u32) -> Option<&ProcessControlBlock> {
        pid_for_stack_pointer(esp).and_then(|pid| self.get(pid))
    }

    pub fn link_child(&mut self, parent: Pid, child: Pid) -> Result<(), ProcessError> {
        self.get_mut(parent)
            .ok_or(ProcessError::NoSuchProcess(parent))?
            .child = Some(child);
        Ok(())
    }

    pub fn unlink_child(&mut self, parent: Pid) {
        if let Some(pcb) = self.get_mut(parent) {
            pcb.child = None;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessControlBlock> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(index: usize) -> Pid {
        Pid::new(index).unwrap()
    }

    #[test]
    fn fixed_regions() {
        assert_eq!(pid(0).kernel_stack_top(), 0x0080_0000);
        assert_eq!(pid(2).kernel_stack_top(), 0x007F_C000);
        assert_eq!(pid(0).program_base(), PhysAddr::new(0x0080_0000));
        assert_eq!(pid(5).program_base(), PhysAddr::new(0x01C0_0000));
        assert_eq!(Pid::new(MAX_PROCESSES), None);
    }

    #[test]
    fn stack_pointer_identifies_owner() {
        assert_eq!(pid_for_stack_pointer(0x007F_FFF0), Some(pid(0)));
        assert_eq!(pid_for_stack_pointer(0x007F_E000), Some(pid(0)));
        assert_eq!(pid_for_stack_pointer(0x007F_DFFC), Some(pid(1)));
        assert_eq!(pid_for_stack_pointer(0x0080_0000), None);
        assert_eq!(pid_for_stack_pointer(0x0010_0000), None);
    }

    #[test]
    fn slots_are_reused_lowest_first() {
        let mut table = ProcessTable::new();
        let t0 = TerminalId::FIRST;
        for expected in 0..MAX_PROCESSES {
            assert_eq!(table.allocate_slot(None, t0), Ok(pid(expected)));
        }
        assert_eq!(table.allocate_slot(None, t0), Err(ProcessError::NoFreeSlot));
        assert!(table.release_slot(pid(3)).is_some());
        assert!(!table.is_used(pid(3)));
        assert_eq!(table.allocate_slot(None, t0), Ok(pid(3)));
    }

    #[test]
    fn current_is_cleared_with_its_slot() {
        let mut table = ProcessTable::new();
        let p = table.allocate_slot(None, TerminalId::FIRST).unwrap();
        table.set_current(Some(p));
        assert_eq!(table.lookup_current().map(|pcb| pcb.pid), Some(p));
        table.release_slot(p);
        assert_eq!(table.current(), None);
        assert!(table.lookup_current().is_none());
    }

    #[test]
    fn children_block_scheduling() {
        let mut table = ProcessTable::new();
        let parent = table.allocate_slot(None, TerminalId::FIRST).unwrap();
        let child = table.allocate_slot(Some(parent), TerminalId::FIRST).unwrap();
        table.link_child(parent, child).unwrap();
        assert!(!table.get(parent).unwrap().is_schedulable());
        table.unlink_child(parent);
        assert!(table.get(parent).unwrap().is_schedulable());
        assert_eq!(table.get(child).unwrap().parent, Some(parent));
    }

    #[test]
    fn arguments_are_bounded() {
        let mut pcb = ProcessControlBlock::new(pid(0), None, TerminalId::FIRST);
        pcb.set_args(b"frame0.txt").unwrap();
        assert_eq!(pcb.args(), b"frame0.txt");
        pcb.set_args(&[b'a'; ARG_BUFFER_SIZE]).unwrap();
        assert_eq!(pcb.args().len(), ARG_BUFFER_SIZE);
        assert_eq!(pcb.set_args(&[b'a'; ARG_BUFFER_SIZE + 1]), Err(LoadError::ArgumentsTooLong));
    }
}
