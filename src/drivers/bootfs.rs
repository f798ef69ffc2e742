//! Read-only boot filesystem.
//!
//! The image is a sequence of 4 KiB blocks:
//!
//! | Block            | Contents                                            |
//! |------------------|-----------------------------------------------------|
//! | 0                | counts (dentries, inodes, data blocks), 63 dentries |
//! | 1 ..= N          | inodes: byte length, then 1023 data block numbers   |
//! | N + 1 ..         | data blocks                                         |
//!
//! A dentry is 64 bytes: a 32-byte name, the file type and the inode
//! number. Directories and the RTC carry inode 0.

use crate::config::MAX_FILE_NAME;
use crate::drivers::{Dentry, DriverError, FileSystem, FileType};

pub const BLOCK_SIZE: usize = 4096;
pub const MAX_DENTRIES: usize = 63;

const DENTRY_BASE: usize = 64;
const DENTRY_SIZE: usize = 64;
const DATA_REFS: usize = BLOCK_SIZE / 4 - 1;

pub struct BootFs<B> {
    image: B,
    dentries: u32,
    inodes: u32,
    data_blocks: u32,
}

impl<B: AsRef<[u8]>> BootFs<B> {
    pub fn new(image: B) -> Result<Self, DriverError> {
        let bytes = image.as_ref();
        let word = |at: usize| -> Result<u32, DriverError> {
            bytes
                .get(at..at + 4)
                .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
                .ok_or(DriverError::InvalidImage)
        };
        let dentries = word(0)?;
        let inodes = word(4)?;
        let data_blocks = word(8)?;

        let blocks = 1 + inodes as usize + data_blocks as usize;
        if dentries as usize > MAX_DENTRIES || bytes.len() < blocks * BLOCK_SIZE {
            return Err(DriverError::InvalidImage);
        }

        Ok(Self {
            image,
            dentries,
            inodes,
            data_blocks,
        })
    }

    pub fn dentry_count(&self) -> u32 {
        self.dentries
    }

    fn word(&self, at: usize) -> Result<u32, DriverError> {
        self.image
            .as_ref()
            .get(at..at + 4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .ok_or(DriverError::InvalidImage)
    }

    fn dentry(&self, index: u32) -> Result<Dentry, DriverError> {
        if index >= self.dentries {
            return Err(DriverError::NotFound);
        }
        let base = DENTRY_BASE + index as usize * DENTRY_SIZE;
        let name = self
            .image
            .as_ref()
            .get(base..base + MAX_FILE_NAME)
            .ok_or(DriverError::InvalidImage)?;
        let file_type =
            FileType::from_raw(self.word(base + MAX_FILE_NAME)?).ok_or(DriverError::InvalidImage)?;
        let inode = self.word(base + MAX_FILE_NAME + 4)?;
        Ok(Dentry::new(name, file_type, inode))
    }

    fn inode_base(&self, inode: u32) -> Result<usize, DriverError> {
        if inode >= self.inodes {
            return Err(DriverError::NotFound);
        }
        Ok((1 + inode as usize) * BLOCK_SIZE)
    }

    fn data_base(&self) -> usize {
        (1 + self.inodes as usize) * BLOCK_SIZE
    }

    pub fn file_length(&self, inode: u32) -> Result<u32, DriverError> {
        self.word(self.inode_base(inode)?)
    }
}

impl<B: AsRef<[u8]>> FileSystem for BootFs<B> {
    fn open_by_name(&self, name: &[u8]) -> Result<Dentry, DriverError> {
        if name.is_empty() || name.len() > MAX_FILE_NAME {
            return Err(DriverError::NotFound);
        }
        (0..self.dentries)
            .filter_map(|index| self.dentry(index).ok())
            .find(|dentry| dentry.name() == name)
            .ok_or(DriverError::NotFound)
    }

    fn read_bytes_at_offset(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize, DriverError> {
        let inode_base = self.inode_base(inode)?;
        let length = self.word(inode_base)?;
        if offset >= length {
            return Ok(0);
        }

        let wanted = buf.len().min((length - offset) as usize);
        let bytes = self.image.as_ref();
        let mut done = 0;
        while done < wanted {
            let position = offset as usize + done;
            let slot = position / BLOCK_SIZE;
            if slot >= DATA_REFS {
                return Err(DriverError::InvalidOffset);
            }
            let block = self.word(inode_base + 4 + slot * 4)?;
            if block >= self.data_blocks {
                return Err(DriverError::InvalidImage);
            }
            let within = position % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - within).min(wanted - done);
            let start = self.data_base() + block as usize * BLOCK_SIZE + within;
            let source = bytes.get(start..start + chunk).ok_or(DriverError::InvalidImage)?;
            buf[done..done + chunk].copy_from_slice(source);
            done += chunk;
        }
        Ok(done)
    }

    fn read_directory_entry(&self, index: u32) -> Result<Dentry, DriverError> {
        self.dentry(index)
    }
}

/// Builds boot filesystem images for hosted tests and tooling.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Default, Clone)]
pub struct ImageBuilder {
    entries: Vec<(Vec<u8>, FileType, Vec<u8>)>,
}

#[cfg(any(test, feature = "std"))]
impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.entries.push((name.as_bytes().to_vec(), FileType::Directory, Vec::new()));
        self
    }

    pub fn rtc(mut self, name: &str) -> Self {
        self.entries.push((name.as_bytes().to_vec(), FileType::Rtc, Vec::new()));
        self
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push((name.as_bytes().to_vec(), FileType::Regular, data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        assert!(self.entries.len() <= MAX_DENTRIES, "too many directory entries");
        let files: Vec<&Vec<u8>> = self
            .entries
            .iter()
            .filter(|(_, kind, _)| *kind == FileType::Regular)
            .map(|(_, _, data)| data)
            .collect();
        let data_blocks: usize = files.iter().map(|d| d.len().div_ceil(BLOCK_SIZE)).sum();
        let inodes = files.len();

        let mut image = vec![0u8; (1 + inodes + data_blocks) * BLOCK_SIZE];
        put(&mut image, 0, self.entries.len() as u32);
        put(&mut image, 4, inodes as u32);
        put(&mut image, 8, data_blocks as u32);

        let mut next_inode = 0u32;
        let mut next_block = 0usize;
        let data_base = (1 + inodes) * BLOCK_SIZE;
        for (index, (name, kind, data)) in self.entries.iter().enumerate() {
            let base = DENTRY_BASE + index * DENTRY_SIZE;
            let len = name.len().min(MAX_FILE_NAME);
            image[base..base + len].copy_from_slice(&name[..len]);
            put(&mut image, base + MAX_FILE_NAME, kind.as_raw());
            if *kind != FileType::Regular {
                continue;
            }

            put(&mut image, base + MAX_FILE_NAME + 4, next_inode);
            let inode_base = (1 + next_inode as usize) * BLOCK_SIZE;
            put(&mut image, inode_base, data.len() as u32);
            for (slot, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
                put(&mut image, inode_base + 4 + slot * 4, next_block as u32);
                let start = data_base + next_block * BLOCK_SIZE;
                image[start..start + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
            next_inode += 1;
        }
        image
    }
}

#[cfg(any(test, feature = "std"))]
fn put(image: &mut [u8], at: usize, value: u32) {
    image[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BootFs<Vec<u8>> {
        let big: Vec<u8> = (0..6000u32).map(|i| (i % 251) as u8).collect();
        let image = ImageBuilder::new()
            .directory(".")
            .rtc("rtc")
            .file("frame0.txt", b"fish")
            .file("big", &big)
            .build();
        BootFs::new(image).unwrap()
    }

    #[test]
    fn lookup_by_exact_name() {
        let fs = sample();
        let dentry = fs.open_by_name(b"frame0.txt").unwrap();
        assert_eq!(dentry.file_type, FileType::Regular);
        assert_eq!(dentry.inode, 0);
        assert_eq!(fs.open_by_name(b"frame0").unwrap_err(), DriverError::NotFound);
        assert_eq!(fs.open_by_name(b"rtc").unwrap().file_type, FileType::Rtc);
    }

    #[test]
    fn reads_span_data_blocks() {
        let fs = sample();
        let inode = fs.open_by_name(b"big").unwrap().inode;
        assert_eq!(fs.file_length(inode), Ok(6000));

        let mut buf = [0u8; 200];
        let n = fs.read_bytes_at_offset(inode, 4000, &mut buf).unwrap();
        assert_eq!(n, 200);
        assert!(buf.iter().enumerate().all(|(i, &b)| b == ((4000 + i as u32) % 251) as u8));
    }

    #[test]
    fn reads_stop_at_end_of_file() {
        let fs = sample();
        let inode = fs.open_by_name(b"frame0.txt").unwrap().inode;
        let mut buf = [0u8; 16];
        assert_eq!(fs.read_bytes_at_offset(inode, 2, &mut buf), Ok(2));
        assert_eq!(&buf[..2], b"sh");
        assert_eq!(fs.read_bytes_at_offset(inode, 4, &mut buf), Ok(0));
    }

    #[test]
    fn directory_listing_is_in_image_order() {
        let fs = sample();
        let names: Vec<Vec<u8>> = (0..fs.dentry_count())
            .map(|i| fs.read_directory_entry(i).unwrap().name().to_vec())
            .collect();
        assert_eq!(names, vec![b".".to_vec(), b"rtc".to_vec(), b"frame0.txt".to_vec(), b"big".to_vec()]);
        assert!(fs.read_directory_entry(4).is_err());
    }

    #[test]
    fn truncated_images_are_rejected() {
        let mut image = ImageBuilder::new().file("a", &[1u8; 10]).build();
        image.truncate(BLOCK_SIZE);
        assert_eq!(BootFs::new(image).err(), Some(DriverError::InvalidImage));
    }
}
