//! # Drivers
//!
//! Interfaces of the devices the kernel core talks to but does not own,
//! plus the small drivers shared by every backend.
//!
//! | Interface        | Used for                                         |
//! |------------------|--------------------------------------------------|
//! | [`FileSystem`]   | program images, `open`/`read` on files and dirs  |
//! | [`Console`]      | keyboard decoding, terminal input and output     |
//! | [`RtcDevice`]    | the `rtc` device file                            |
//!
//! ## Submodules
//!
//! - `bootfs`: reader for the read-only boot filesystem image
//! - `keyboard`: scancode set 1 decoder
//! - `line`: per-terminal line editing

pub mod bootfs;
pub mod keyboard;
pub mod line;

use core::fmt;

use crate::config::MAX_FILE_NAME;
use crate::terminal::TerminalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    NotFound,
    InvalidOffset,
    InvalidImage,
    Unsupported,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::NotFound => write!(f, "no such entry"),
            DriverError::InvalidOffset => write!(f, "offset out of range"),
            DriverError::InvalidImage => write!(f, "malformed filesystem image"),
            DriverError::Unsupported => write!(f, "unsupported operation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Rtc,
    Directory,
    Regular,
}

impl FileType {
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Rtc),
            1 => Some(Self::Directory),
            2 => Some(Self::Regular),
            _ => None,
        }
    }

    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Rtc => 0,
            Self::Directory => 1,
            Self::Regular => 2,
        }
    }
}

/// A directory entry: name (up to 32 bytes, not NUL terminated when full),
/// type and inode.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Dentry {
    name: [u8; MAX_FILE_NAME],
    pub file_type: FileType,
    pub inode: u32,
}

impl Dentry {
    /// Names longer than 32 bytes are truncated.
    pub fn new(name: &[u8], file_type: FileType, inode: u32) -> Self {
        let mut stored = [0u8; MAX_FILE_NAME];
        let len = name.len().min(MAX_FILE_NAME);
        stored[..len].copy_from_slice(&name[..len]);
        Self {
            name: stored,
            file_type,
            inode,
        }
    }

    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_FILE_NAME);
        &self.name[..len]
    }
}

impl fmt::Debug for Dentry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dentry")
            .field("name", &core::str::from_utf8(self.name()).unwrap_or("<binary>"))
            .field("file_type", &self.file_type)
            .field("inode", &self.inode)
            .finish()
    }
}

pub trait FileSystem {
    fn open_by_name(&self, name: &[u8]) -> Result<Dentry, DriverError>;

    /// Read from `offset` into `buf`; returns the byte count, 0 at end of file.
    fn read_bytes_at_offset(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize, DriverError>;

    /// Entry `index` of the (single, flat) directory.
    fn read_directory_entry(&self, index: u32) -> Result<Dentry, DriverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleEvent {
    None,
    SwitchTerminal(TerminalId),
}

pub trait Console {
    /// Feed one keyboard scancode, typed into `foreground`.
    fn process_scancode(&mut self, scancode: u8, foreground: TerminalId) -> ConsoleEvent;

    /// Take a completed input line of `terminal`, `None` until Enter was
    /// pressed there.
    fn read_line(&mut self, terminal: TerminalId, buf: &mut [u8]) -> Option<usize>;

    fn write(&mut self, terminal: TerminalId, data: &[u8]) -> usize;

    /// The kernel moved `terminal` to the front.
    fn focus(&mut self, terminal: TerminalId);
}

pub trait RtcDevice {
    /// Start periodic interrupts at 2 Hz.
    fn open(&mut self);

    fn handle_interrupt(&mut self);

    /// Periodic interrupts seen so far. Wraps; readers compare for
    /// inequality only.
    fn interrupts(&self) -> u32;

    fn set_frequency(&mut self, hz: u32) -> Result<(), DriverError>;
}

/// Rate selector for RTC register A: `hz = 32768 >> (rate - 1)`.
///
/// Only powers of two from 2 to 1024 Hz are accepted.
pub fn rtc_rate(hz: u32) -> Option<u8> {
    if !(2..=1024).contains(&hz) || !hz.is_power_of_two() {
        return None;
    }
    Some(16 - hz.trailing_zeros() as u8)
}
