use core::fmt;

use crate::arch::Platform;
use crate::interrupts::TrapFrame;
use crate::kernel::{Kernel, Resume};
use crate::memory::{AccessMode, VirtAddr};
use crate::process::{FdError, ProcessControlBlock, ProcessError};
use crate::syscalls::handlers;
use crate::syscalls::numbers::SyscallNumber;

/// Length of `int 0x80`; a retried call rewinds eip by this much.
pub const SYSCALL_INSTRUCTION_LEN: u32 = 2;

/// How a system call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Store the value in the caller's eax and return to it.
    Return(i32),
    /// Nothing to hand out yet: re-issue the same call when the process
    /// next runs.
    Retry,
    /// The call does not return to the caller.
    Resume(Resume),
}

pub type SyscallResult = Result<Completion, SyscallError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall,
    InvalidArgument,
    BadFileDescriptor,
    TooManyOpenFiles,
    BadAddress,
    NotFound,
    ReadOnly,
    NotImplemented,
    Process(ProcessError),
}

impl SyscallError {
    /// User programs see every failure as -1.
    pub fn as_errno(self) -> i32 {
        -1
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSyscall => write!(f, "unknown system call"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::BadFileDescriptor => write!(f, "bad file descriptor"),
            Self::TooManyOpenFiles => write!(f, "too many open files"),
            Self::BadAddress => write!(f, "bad user address"),
            Self::NotFound => write!(f, "no such file"),
            Self::ReadOnly => write!(f, "read-only file"),
            Self::NotImplemented => write!(f, "not implemented"),
            Self::Process(err) => write!(f, "{}", err),
        }
    }
}

impl From<FdError> for SyscallError {
    fn from(err: FdError) -> Self {
        match err {
            FdError::TableFull => Self::TooManyOpenFiles,
            FdError::OutOfRange | FdError::NotOpen | FdError::Reserved => Self::BadFileDescriptor,
        }
    }
}

impl From<ProcessError> for SyscallError {
    fn from(err: ProcessError) -> Self {
        Self::Process(err)
    }
}

/// Registers of an `int 0x80`.
///
/// i386 convention:
///   eax = number
///   ebx = arg0
///   ecx = arg1
///   edx = arg2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallContext {
    pub number: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub arg2: u32,
}

impl SyscallContext {
    pub fn from_frame(frame: &TrapFrame) -> Self {
        Self {
            number: frame.eax,
            arg0: frame.ebx,
            arg1: frame.ecx,
            arg2: frame.edx,
        }
    }
}

impl<P: Platform> Kernel<P> {
    pub(crate) fn on_syscall(&mut self, frame: &mut TrapFrame, frame_address: u32) -> Resume {
        let ctx = SyscallContext::from_frame(frame);
        let completion = self.dispatch_syscall(ctx, frame, frame_address).unwrap_or_else(|err| {
            log::debug!("syscall {} failed: {}", ctx.number, err);
            Completion::Return(err.as_errno())
        });

        match completion {
            Completion::Return(value) => {
                frame.eax = value as u32;
                Resume::Continue
            }
            Completion::Retry => {
                frame.eip = frame.eip.wrapping_sub(SYSCALL_INSTRUCTION_LEN);
                Resume::Continue
            }
            Completion::Resume(resume) => resume,
        }
    }

    fn dispatch_syscall(&mut self, ctx: SyscallContext, frame: &TrapFrame, frame_address: u32) -> SyscallResult {
        let syscall = SyscallNumber::from(ctx.number);
        log::trace!("SYSCALL: {:?}({:#x}, {:#x}, {:#x})", syscall, ctx.arg0, ctx.arg1, ctx.arg2);

        match syscall {
            // Process Management
            SyscallNumber::Halt => handlers::process::sys_halt(self, ctx.arg0 as u8),
            SyscallNumber::Execute => handlers::process::sys_execute(self, ctx.arg0, frame, frame_address),
            SyscallNumber::GetArgs => handlers::process::sys_getargs(self, ctx.arg0, ctx.arg1 as i32),

            // I/O Operations
            SyscallNumber::Read => handlers::io::sys_read(self, ctx.arg0 as i32, ctx.arg1, ctx.arg2 as i32),
            SyscallNumber::Write => handlers::io::sys_write(self, ctx.arg0 as i32, ctx.arg1, ctx.arg2 as i32),
            SyscallNumber::Open => handlers::io::sys_open(self, ctx.arg0),
            SyscallNumber::Close => handlers::io::sys_close(self, ctx.arg0 as i32),

            // Memory Management
            SyscallNumber::VidMap => handlers::memory::sys_vidmap(self, ctx.arg0),

            // Signals are not delivered
            SyscallNumber::SetHandler | SyscallNumber::SigReturn => Err(SyscallError::NotImplemented),

            SyscallNumber::Unknown => Err(SyscallError::InvalidSyscall),
        }
    }

    pub(crate) fn caller(&self) -> Result<&ProcessControlBlock, SyscallError> {
        self.processes
            .lookup_current()
            .ok_or(SyscallError::Process(ProcessError::NoCurrentProcess))
    }

    pub(crate) fn caller_mut(&mut self) -> Result<&mut ProcessControlBlock, SyscallError> {
        self.processes
            .lookup_current_mut()
            .ok_or(SyscallError::Process(ProcessError::NoCurrentProcess))
    }

    pub(crate) fn copy_from_user(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), SyscallError> {
        self.address_space
            .read_virtual(&self.machine.memory, VirtAddr::new(addr), buf, AccessMode::UserRead)
            .map_err(|_| SyscallError::BadAddress)
    }

    pub(crate) fn copy_to_user(&mut self, addr: u32, data: &[u8]) -> Result<(), SyscallError> {
        self.address_space
            .write_virtual(&mut self.machine.memory, VirtAddr::new(addr), data, AccessMode::UserWrite)
            .map_err(|_| SyscallError::BadAddress)
    }

    /// Copy a NUL-terminated string into `buf`. Strings that fill `buf`
    /// without a NUL are cut at `buf.len()`.
    pub(crate) fn copy_string_from_user(&mut self, addr: u32, buf: &mut [u8]) -> Result<usize, SyscallError> {
        for (i, slot) in buf.iter_mut().enumerate() {
            let at = addr.checked_add(i as u32).ok_or(SyscallError::BadAddress)?;
            let mut byte = [0u8; 1];
            self.copy_from_user(at, &mut byte)?;
            if byte[0] == 0 {
                return Ok(i);
            }
            *slot = byte[0];
        }
        Ok(buf.len())
    }
}
