//! Process Management System Calls
//!
//! - halt: end the caller, resume its parent
//! - execute: run a program as a child of the caller
//! - getargs: copy the caller's argument string

use crate::arch::Platform;
use crate::config::{ARG_BUFFER_SIZE, MAX_FILE_NAME};
use crate::interrupts::TrapFrame;
use crate::kernel::{Kernel, Resume};
use crate::process::SavedContext;
use crate::syscalls::{Completion, SyscallError, SyscallResult};

/// Longest command `execute` accepts (name, separator, arguments) plus one
/// byte, so an overlong command is rejected instead of cut short.
const COMMAND_CAPACITY: usize = MAX_FILE_NAME + 1 + ARG_BUFFER_SIZE + 1;

pub fn sys_halt<P: Platform>(kernel: &mut Kernel<P>, status: u8) -> SyscallResult {
    let resume = kernel.halt(status)?;
    Ok(Completion::Resume(resume))
}

/// The caller sleeps until the child halts; its `execute` then returns
/// the child's status through the saved frame.
pub fn sys_execute<P: Platform>(
    kernel: &mut Kernel<P>,
    command: u32,
    frame: &TrapFrame,
    frame_address: u32,
) -> SyscallResult {
    if command == 0 {
        return Err(SyscallError::InvalidArgument);
    }
    let (parent, terminal) = {
        let caller = kernel.caller()?;
        (caller.pid, caller.terminal)
    };

    let mut buf = [0u8; COMMAND_CAPACITY];
    let len = kernel.copy_string_from_user(command, &mut buf)?;

    // The caller keeps running until the child exists.
    let caller = SavedContext::capture(frame, frame_address);
    if let Some(pcb) = kernel.processes.get_mut(parent) {
        pcb.context = caller;
    }

    let entry = kernel.spawn(&buf[..len], Some(parent), terminal, caller)?;
    Ok(Completion::Resume(Resume::EnterUser(entry)))
}

pub fn sys_getargs<P: Platform>(kernel: &mut Kernel<P>, buf: u32, nbytes: i32) -> SyscallResult {
    let nbytes = usize::try_from(nbytes).map_err(|_| SyscallError::InvalidArgument)?;
    let mut args = [0u8; ARG_BUFFER_SIZE + 1];
    let len = {
        let caller = kernel.caller()?;
        let stored = caller.args();
        args[..stored.len()].copy_from_slice(stored);
        stored.len()
    };

    if len == 0 || len + 1 > nbytes {
        return Err(SyscallError::InvalidArgument);
    }
    // NUL terminator goes out with the string.
    kernel.copy_to_user(buf, &args[..len + 1])?;
    Ok(Completion::Return(0))
}
