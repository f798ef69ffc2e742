//! I/O System Calls
//!
//! A descriptor's kind picks the implementation:
//!
//! | Kind      | read                          | write                  |
//! |-----------|-------------------------------|------------------------|
//! | stdin     | one line from the terminal    | -1                     |
//! | stdout    | -1                            | text to the terminal   |
//! | rtc       | next interrupt, returns 0     | 4-byte frequency       |
//! | directory | next file name                | -1                     |
//! | regular   | file bytes from the position  | -1                     |
//!
//! stdin and the RTC never block inside the kernel; when nothing is ready
//! the call is retried the next time the process runs.

use crate::arch::Platform;
use crate::config::MAX_FILE_NAME;
use crate::drivers::line::LINE_CAPACITY;
use crate::drivers::{Console, DriverError, FileSystem, FileType, RtcDevice};
use crate::kernel::Kernel;
use crate::process::{FileDescriptor, FileKind};
use crate::syscalls::{Completion, SyscallError, SyscallResult};

/// Bounce buffer between user memory and the filesystem or console.
const CHUNK_SIZE: usize = 1024;

fn byte_count(nbytes: i32) -> Result<usize, SyscallError> {
    usize::try_from(nbytes).map_err(|_| SyscallError::InvalidArgument)
}

fn lookup<P: Platform>(kernel: &Kernel<P>, fd: i32) -> Result<FileDescriptor, SyscallError> {
    Ok(*kernel.caller()?.fds.get(fd)?)
}

fn advance<P: Platform>(kernel: &mut Kernel<P>, fd: i32, by: u32) -> Result<(), SyscallError> {
    let desc = kernel.caller_mut()?.fds.get_mut(fd)?;
    desc.position = desc.position.saturating_add(by);
    Ok(())
}

fn returned(count: usize) -> SyscallResult {
    i32::try_from(count)
        .map(Completion::Return)
        .map_err(|_| SyscallError::InvalidArgument)
}

pub fn sys_read<P: Platform>(kernel: &mut Kernel<P>, fd: i32, buf: u32, nbytes: i32) -> SyscallResult {
    let desc = lookup(kernel, fd)?;
    let nbytes = byte_count(nbytes)?;
    if buf == 0 {
        return Err(SyscallError::BadAddress);
    }

    match desc.kind {
        FileKind::Stdin => read_terminal(kernel, buf, nbytes),
        FileKind::Stdout => Err(SyscallError::BadFileDescriptor),
        FileKind::Rtc => wait_rtc(kernel, fd),
        FileKind::Directory => read_directory(kernel, fd, desc, buf, nbytes),
        FileKind::Regular => read_file(kernel, fd, desc, buf, nbytes),
    }
}

fn read_terminal<P: Platform>(kernel: &mut Kernel<P>, buf: u32, nbytes: usize) -> SyscallResult {
    let terminal = kernel.caller()?.terminal;
    let mut line = [0u8; LINE_CAPACITY];
    let want = nbytes.min(LINE_CAPACITY);
    let Some(len) = kernel.machine.console.read_line(terminal, &mut line[..want]) else {
        return Ok(Completion::Retry);
    };
    kernel.copy_to_user(buf, &line[..len])?;
    returned(len)
}

/// The first read on a descriptor records the interrupt count and is
/// retried; it completes once the count has moved on.
fn wait_rtc<P: Platform>(kernel: &mut Kernel<P>, fd: i32) -> SyscallResult {
    let now = kernel.machine.rtc.interrupts();
    let desc = kernel.caller_mut()?.fds.get_mut(fd)?;
    match desc.rtc_wait {
        Some(since) if since != now => {
            desc.rtc_wait = None;
            Ok(Completion::Return(0))
        }
        Some(_) => Ok(Completion::Retry),
        None => {
            desc.rtc_wait = Some(now);
            Ok(Completion::Retry)
        }
    }
}

/// One file name per call, padded to 32 bytes; 0 once the listing is done.
fn read_directory<P: Platform>(
    kernel: &mut Kernel<P>,
    fd: i32,
    desc: FileDescriptor,
    buf: u32,
    nbytes: usize,
) -> SyscallResult {
    let dentry = match kernel.machine.fs.read_directory_entry(desc.position) {
        Ok(dentry) => dentry,
        Err(DriverError::NotFound) => return Ok(Completion::Return(0)),
        Err(err) => {
            log::warn!("directory read failed: {}", err);
            return Err(SyscallError::NotFound);
        }
    };

    let mut name = [0u8; MAX_FILE_NAME];
    name[..dentry.name().len()].copy_from_slice(dentry.name());
    let len = nbytes.min(MAX_FILE_NAME);
    kernel.copy_to_user(buf, &name[..len])?;
    advance(kernel, fd, 1)?;
    returned(len)
}

fn read_file<P: Platform>(
    kernel: &mut Kernel<P>,
    fd: i32,
    desc: FileDescriptor,
    buf: u32,
    nbytes: usize,
) -> SyscallResult {
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut done = 0usize;
    while done < nbytes {
        let want = (nbytes - done).min(CHUNK_SIZE);
        let offset = desc.position.saturating_add(done as u32);
        let got = kernel
            .machine
            .fs
            .read_bytes_at_offset(desc.inode, offset, &mut chunk[..want])
            .map_err(|_| SyscallError::NotFound)?;
        if got == 0 {
            break;
        }
        let at = buf.checked_add(done as u32).ok_or(SyscallError::BadAddress)?;
        kernel.copy_to_user(at, &chunk[..got])?;
        done += got;
    }
    advance(kernel, fd, done as u32)?;
    returned(done)
}

pub fn sys_write<P: Platform>(kernel: &mut Kernel<P>, fd: i32, buf: u32, nbytes: i32) -> SyscallResult {
    let desc = lookup(kernel, fd)?;
    let nbytes = byte_count(nbytes)?;
    if buf == 0 {
        return Err(SyscallError::BadAddress);
    }

    match desc.kind {
        FileKind::Stdout => write_terminal(kernel, buf, nbytes),
        FileKind::Rtc => {
            if nbytes != 4 {
                return Err(SyscallError::InvalidArgument);
            }
            let mut raw = [0u8; 4];
            kernel.copy_from_user(buf, &mut raw)?;
            kernel
                .machine
                .rtc
                .set_frequency(u32::from_le_bytes(raw))
                .map_err(|_| SyscallError::InvalidArgument)?;
            Ok(Completion::Return(0))
        }
        FileKind::Stdin | FileKind::Directory | FileKind::Regular => Err(SyscallError::ReadOnly),
    }
}

fn write_terminal<P: Platform>(kernel: &mut Kernel<P>, buf: u32, nbytes: usize) -> SyscallResult {
    let terminal = kernel.caller()?.terminal;
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut done = 0usize;
    while done < nbytes {
        let len = (nbytes - done).min(CHUNK_SIZE);
        let at = buf.checked_add(done as u32).ok_or(SyscallError::BadAddress)?;
        kernel.copy_from_user(at, &mut chunk[..len])?;
        kernel.machine.console.write(terminal, &chunk[..len]);
        done += len;
    }
    returned(done)
}

pub fn sys_open<P: Platform>(kernel: &mut Kernel<P>, filename: u32) -> SyscallResult {
    if filename == 0 {
        return Err(SyscallError::BadAddress);
    }
    let mut name = [0u8; MAX_FILE_NAME + 1];
    let len = kernel.copy_string_from_user(filename, &mut name)?;
    if len == 0 || len > MAX_FILE_NAME {
        return Err(SyscallError::NotFound);
    }

    let dentry = kernel
        .machine
        .fs
        .open_by_name(&name[..len])
        .map_err(|_| SyscallError::NotFound)?;
    let inode = match dentry.file_type {
        FileType::Regular => dentry.inode,
        FileType::Rtc | FileType::Directory => 0,
    };

    let fd = kernel
        .caller_mut()?
        .fds
        .open(FileKind::from(dentry.file_type), inode)?;
    if dentry.file_type == FileType::Rtc {
        kernel.machine.rtc.open();
    }
    log::debug!("opened {:?} as fd {}", dentry, fd);
    Ok(Completion::Return(fd))
}

pub fn sys_close<P: Platform>(kernel: &mut Kernel<P>, fd: i32) -> SyscallResult {
    kernel.caller_mut()?.fds.close(fd)?;
    Ok(Completion::Return(0))
}
