//! Command parsing and program loading.
//!
//! Programs are flat ELF files: the whole file is copied to
//! `0x0804_8000` and execution starts at the 32-bit entry point stored at
//! byte 24 of the header.

use core::fmt;

use crate::config::{ARG_BUFFER_SIZE, LARGE_PAGE_SIZE, MAX_FILE_NAME, PROGRAM_IMAGE_OFFSET, PROGRAM_VIRTUAL_BASE};
use crate::drivers::{DriverError, FileSystem};
use crate::memory::{AccessMode, AddressSpace, PageFault, PhysicalMemory, VirtAddr};

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ENTRY_POINT_OFFSET: usize = 24;
const HEADER_LEN: usize = ENTRY_POINT_OFFSET + 4;
const CHUNK: usize = 1024;

pub const IMAGE_BASE: u32 = PROGRAM_VIRTUAL_BASE + PROGRAM_IMAGE_OFFSET;
pub const MAX_IMAGE_SIZE: usize = (LARGE_PAGE_SIZE - PROGRAM_IMAGE_OFFSET) as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    EmptyCommand,
    NameTooLong,
    ArgumentsTooLong,
    NotFound,
    NotExecutable,
    ImageTooLarge,
    Read(DriverError),
    Fault(PageFault),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::EmptyCommand => write!(f, "empty command"),
            LoadError::NameTooLong => write!(f, "program name longer than {} bytes", MAX_FILE_NAME),
            LoadError::ArgumentsTooLong => write!(f, "arguments longer than {} bytes", ARG_BUFFER_SIZE),
            LoadError::NotFound => write!(f, "no such program"),
            LoadError::NotExecutable => write!(f, "not an executable"),
            LoadError::ImageTooLarge => write!(f, "image does not fit the program page"),
            LoadError::Read(err) => write!(f, "read failed: {}", err),
            LoadError::Fault(fault) => write!(f, "copy failed: {}", fault),
        }
    }
}

impl From<PageFault> for LoadError {
    fn from(fault: PageFault) -> Self {
        LoadError::Fault(fault)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: &'a [u8],
    pub args: &'a [u8],
}

/// Split `name [args]`. The command ends at the first NUL or newline;
/// spaces around the name and trailing spaces after the arguments are
/// dropped.
pub fn parse_command(command: &[u8]) -> Result<Command<'_>, LoadError> {
    let end = command
        .iter()
        .position(|&b| b == 0 || b == b'\n')
        .unwrap_or(command.len());
    let line = trim_start(&command[..end]);

    let name_len = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
    let (name, rest) = line.split_at(name_len);
    if name.is_empty() {
        return Err(LoadError::EmptyCommand);
    }
    if name.len() > MAX_FILE_NAME {
        return Err(LoadError::NameTooLong);
    }

    let args = trim_end(trim_start(rest));
    if args.len() > ARG_BUFFER_SIZE {
        return Err(LoadError::ArgumentsTooLong);
    }
    Ok(Command { name, args })
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    &bytes[start..]
}

fn trim_end(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Check the ELF magic of `inode` and return its entry point.
pub fn entry_point<F: FileSystem>(fs: &F, inode: u32) -> Result<u32, LoadError> {
    let mut header = [0u8; HEADER_LEN];
    let n = fs
        .read_bytes_at_offset(inode, 0, &mut header)
        .map_err(LoadError::Read)?;
    if n < HEADER_LEN || header[..4] != ELF_MAGIC {
        return Err(LoadError::NotExecutable);
    }
    let mut entry = [0u8; 4];
    entry.copy_from_slice(&header[ENTRY_POINT_OFFSET..HEADER_LEN]);
    Ok(u32::from_le_bytes(entry))
}

/// Copy the whole file to the image address of the currently mapped
/// program page. Returns the number of bytes copied.
pub fn load_image<F: FileSystem, M: PhysicalMemory>(
    fs: &F,
    inode: u32,
    space: &mut AddressSpace,
    memory: &mut M,
) -> Result<usize, LoadError> {
    let mut chunk = [0u8; CHUNK];
    let mut copied = 0usize;
    loop {
        let n = fs
            .read_bytes_at_offset(inode, copied as u32, &mut chunk)
            .map_err(LoadError::Read)?;
        if n == 0 {
            return Ok(copied);
        }
        if copied + n > MAX_IMAGE_SIZE {
            return Err(LoadError::ImageTooLarge);
        }
        let at = VirtAddr::new(IMAGE_BASE + copied as u32);
        space.write_virtual(memory, at, &chunk[..n], AccessMode::KernelWrite)?;
        copied += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_arguments() {
        let command = parse_command(b"  cat   frame0.txt  \0junk").unwrap();
        assert_eq!(command.name, b"cat");
        assert_eq!(command.args, b"frame0.txt");
    }

    #[test]
    fn newline_ends_the_command() {
        let command = parse_command(b"ls\n").unwrap();
        assert_eq!(command.name, b"ls");
        assert!(command.args.is_empty());
    }

    #[test]
    fn rejects_bad_commands() {
        assert_eq!(parse_command(b"   "), Err(LoadError::EmptyCommand));
        assert_eq!(parse_command(&[b'x'; 33]), Err(LoadError::NameTooLong));
        let mut long = b"cat ".to_vec();
        long.extend(core::iter::repeat(b'a').take(ARG_BUFFER_SIZE));
        assert_eq!(parse_command(&long).map(|c| c.args.len()), Ok(ARG_BUFFER_SIZE));
        long.push(b'a');
        assert_eq!(parse_command(&long), Err(LoadError::ArgumentsTooLong));
    }

    #[test]
    fn image_region() {
        assert_eq!(IMAGE_BASE, 0x0804_8000);
        assert_eq!(MAX_IMAGE_SIZE, 0x3B_8000);
    }
}
