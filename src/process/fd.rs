//! Per-process open file table.
//!
//! Descriptors 0 and 1 are stdin and stdout for the whole life of a
//! process; `open` hands out the lowest free index from 2 up.

use core::fmt;

use crate::config::MAX_FILE_DESCRIPTORS;
use crate::drivers::FileType;

pub const STDIN: usize = 0;
pub const STDOUT: usize = 1;
pub const FIRST_USER_FD: usize = 2;

/// Selects which read/write implementation a descriptor routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Stdin,
    Stdout,
    Rtc,
    Directory,
    Regular,
}

impl From<FileType> for FileKind {
    fn from(file_type: FileType) -> Self {
        match file_type {
            FileType::Rtc => FileKind::Rtc,
            FileType::Directory => FileKind::Directory,
            FileType::Regular => FileKind::Regular,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    pub kind: FileKind,
    /// Zero for devices and the directory.
    pub inode: u32,
    /// Byte offset for regular files, entry index for the directory.
    pub position: u32,
    /// RTC interrupt count when a pending `read` on this descriptor began.
    pub rtc_wait: Option<u32>,
}

impl FileDescriptor {
    pub const fn new(kind: FileKind, inode: u32) -> Self {
        Self {
            kind,
            inode,
            position: 0,
            rtc_wait: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    OutOfRange,
    NotOpen,
    /// stdin and stdout cannot be closed.
    Reserved,
    TableFull,
}

impl fmt::Display for FdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdError::OutOfRange => write!(f, "descriptor out of range"),
            FdError::NotOpen => write!(f, "descriptor not open"),
            FdError::Reserved => write!(f, "descriptor is reserved"),
            FdError::TableFull => write!(f, "no free descriptor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdTable {
    entries: [Option<FileDescriptor>; MAX_FILE_DESCRIPTORS],
}

impl FdTable {
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_FILE_DESCRIPTORS],
        }
    }

    pub fn with_standard_streams() -> Self {
        let mut table = Self::new();
        table.entries[STDIN] = Some(FileDescriptor::new(FileKind::Stdin, 0));
        table.entries[STDOUT] = Some(FileDescriptor::new(FileKind::Stdout, 0));
        table
    }

    fn index(fd: i32) -> Result<usize, FdError> {
        usize::try_from(fd)
            .ok()
            .filter(|&index| index < MAX_FILE_DESCRIPTORS)
            .ok_or(FdError::OutOfRange)
    }

    pub fn open(&mut self, kind: FileKind, inode: u32) -> Result<i32, FdError> {
        let (index, slot) = self
            .entries
            .iter_mut()
            .enumerate()
            .skip(FIRST_USER_FD)
            .find(|(_, slot)| slot.is_none())
            .ok_or(FdError::TableFull)?;
        *slot = Some(FileDescriptor::new(kind, inode));
        Ok(index as i32)
    }

    pub fn get(&self, fd: i32) -> Result<&FileDescriptor, FdError> {
        self.entries[Self::index(fd)?].as_ref().ok_or(FdError::NotOpen)
    }

    pub fn get_mut(&mut self, fd: i32) -> Result<&mut FileDescriptor, FdError> {
        self.entries[Self::index(fd)?].as_mut().ok_or(FdError::NotOpen)
    }

    pub fn close(&mut self, fd: i32) -> Result<FileDescriptor, FdError> {
        let index = Self::index(fd)?;
        if index < FIRST_USER_FD {
            return Err(FdError::Reserved);
        }
        self.entries[index].take().ok_or(FdError::NotOpen)
    }

    pub fn close_all(&mut self) {
        self.entries = [None; MAX_FILE_DESCRIPTORS];
    }

    pub fn open_count(&self) -> usize {
        self.entries.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_free_index_from_two() {
        let mut table = FdTable::with_standard_streams();
        assert_eq!(table.open(FileKind::Regular, 5), Ok(2));
        assert_eq!(table.open(FileKind::Directory, 0), Ok(3));
        table.close(2).unwrap();
        assert_eq!(table.open(FileKind::Rtc, 0), Ok(2));
    }

    #[test]
    fn full_table() {
        let mut table = FdTable::with_standard_streams();
        for expected in 2..MAX_FILE_DESCRIPTORS as i32 {
            assert_eq!(table.open(FileKind::Regular, 1), Ok(expected));
        }
        assert_eq!(table.open(FileKind::Regular, 1), Err(FdError::TableFull));
        assert_eq!(table.open_count(), MAX_FILE_DESCRIPTORS);
    }

    #[test]
    fn standard_streams_stay_open() {
        let mut table = FdTable::with_standard_streams();
        assert_eq!(table.close(0), Err(FdError::Reserved));
        assert_eq!(table.close(1), Err(FdError::Reserved));
        assert_eq!(table.get(0).map(|fd| fd.kind), Ok(FileKind::Stdin));
    }

    #[test]
    fn bad_indices() {
        let mut table = FdTable::with_standard_streams();
        assert_eq!(table.get(-1), Err(FdError::OutOfRange));
        assert_eq!(table.get(8), Err(FdError::OutOfRange));
        assert_eq!(table.get(5), Err(FdError::NotOpen));
        assert_eq!(table.close(5), Err(FdError::NotOpen));
    }
}
