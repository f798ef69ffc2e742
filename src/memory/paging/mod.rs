//! # Paging
//!
//! The kernel's only address space: one page directory, the low-memory page
//! table and the user video page table, plus a model of the translation
//! cache so remapping without a flush is observable.
//!
//! ## Directory Layout
//!
//! | Slot | Virtual        | Maps                                            |
//! |------|----------------|-------------------------------------------------|
//! | 0    | `0x0000_0000`  | low table; display and terminal buffers present |
//! | 1    | `0x0040_0000`  | kernel, 4 MiB, supervisor, global, uncached     |
//! | 32   | `0x0800_0000`  | current program, 4 MiB, user, rw                |
//! | 33   | `0x0840_0000`  | user video table, entry 0 only                  |
//!
//! Every other entry is zero apart from the read/write bit.

pub mod entry;
pub mod tlb;

use core::fmt;

pub use entry::{PageEntry, PageFlags, PageTable};
pub use tlb::{Translation, TranslationCache};

use crate::arch::Cpu;
use crate::config::{
    KERNEL_BASE, KERNEL_DIRECTORY_SLOT, LOW_TABLE_DIRECTORY_SLOT, NUM_TERMINALS, PAGE_SIZE,
    PROGRAM_DIRECTORY_SLOT, USER_VIDEO_DIRECTORY_SLOT, VIDEO_PAGE_INDEX,
};
use crate::memory::{PhysAddr, PhysicalMemory, VirtAddr};

/// Physical addresses of the three paging structures, as seen by the MMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableLocations {
    pub directory: PhysAddr,
    pub low_table: PhysAddr,
    pub user_video_table: PhysAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    KernelRead,
    KernelWrite,
    UserRead,
    UserWrite,
}

impl AccessMode {
    pub const fn is_user(self) -> bool {
        matches!(self, Self::UserRead | Self::UserWrite)
    }

    pub const fn is_write(self) -> bool {
        matches!(self, Self::KernelWrite | Self::UserWrite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultReason {
    NotPresent,
    Protection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    pub address: VirtAddr,
    pub reason: PageFaultReason,
}

impl PageFault {
    const fn not_present(address: VirtAddr) -> Self {
        Self {
            address,
            reason: PageFaultReason::NotPresent,
        }
    }
}

impl fmt::Display for PageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            PageFaultReason::NotPresent => write!(f, "page not present at {}", self.address),
            PageFaultReason::Protection => write!(f, "protection violation at {}", self.address),
        }
    }
}

pub struct AddressSpace {
    directory: PageTable,
    low_table: PageTable,
    user_video_table: PageTable,
    tlb: TranslationCache,
    locations: TableLocations,
}

impl AddressSpace {
    pub const fn new() -> Self {
        Self {
            directory: PageTable::new(),
            low_table: PageTable::new(),
            user_video_table: PageTable::new(),
            tlb: TranslationCache::new(),
            locations: TableLocations {
                directory: PhysAddr::zero(),
                low_table: PhysAddr::zero(),
                user_video_table: PhysAddr::zero(),
            },
        }
    }

    /// Build the boot-time mappings. Does not touch the CPU; see
    /// [`AddressSpace::activate`].
    pub fn init(&mut self, locations: TableLocations) {
        self.locations = locations;

        let blank = PageEntry::new(PhysAddr::zero(), PageFlags::WRITABLE);
        self.directory.fill(blank);
        self.user_video_table.fill(blank);

        for (frame, entry) in self.low_table.iter_mut().enumerate() {
            *entry = PageEntry::new(PhysAddr::new(frame as u32 * PAGE_SIZE), PageFlags::WRITABLE);
        }
        // Display memory plus one off-screen buffer per terminal.
        for page in VIDEO_PAGE_INDEX..=VIDEO_PAGE_INDEX + NUM_TERMINALS {
            self.low_table[page].insert(PageFlags::PRESENT);
        }

        self.directory[LOW_TABLE_DIRECTORY_SLOT] =
            PageEntry::new(locations.low_table, PageFlags::PRESENT | PageFlags::WRITABLE);
        self.directory[KERNEL_DIRECTORY_SLOT] = PageEntry::new(
            PhysAddr::new(KERNEL_BASE),
            PageFlags::PRESENT
                | PageFlags::WRITABLE
                | PageFlags::LARGE
                | PageFlags::CACHE_DISABLE
                | PageFlags::GLOBAL,
        );

        self.tlb.flush_all();
    }

    /// Load CR3 with the directory, then turn on PSE and PG.
    pub fn activate<C: Cpu>(&self, cpu: &mut C) {
        cpu.load_page_directory(self.locations.directory);
        cpu.enable_paging();
    }

    /// Point the program slot at `base` without flushing. Translations
    /// cached for the old image stay live until [`AddressSpace::flush`].
    pub fn set_program_entry(&mut self, base: PhysAddr) {
        self.directory[PROGRAM_DIRECTORY_SLOT] = PageEntry::new(
            base,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER | PageFlags::LARGE,
        );
    }

    /// Make the 4 MiB image at `base` the visible user program.
    pub fn map_program<C: Cpu>(&mut self, cpu: &mut C, base: PhysAddr) {
        self.set_program_entry(base);
        self.flush(cpu);
    }

    pub fn program_base(&self) -> Option<PhysAddr> {
        let entry = self.directory[PROGRAM_DIRECTORY_SLOT];
        entry.is_present().then(|| entry.address())
    }

    /// Expose `target` at the user video page and flush.
    pub fn map_user_video<C: Cpu>(&mut self, cpu: &mut C, target: PhysAddr) {
        self.user_video_table[0] = PageEntry::new(
            target,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
        );
        self.directory[USER_VIDEO_DIRECTORY_SLOT] = PageEntry::new(
            self.locations.user_video_table,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
        );
        self.flush(cpu);
    }

    /// Change which frame backs the user video page, leaving its flags
    /// alone. Takes effect at the next flush.
    pub fn retarget_user_video(&mut self, target: PhysAddr) {
        self.user_video_table[0].set_address(target);
    }

    pub fn user_video_target(&self) -> Option<PhysAddr> {
        let dir = self.directory[USER_VIDEO_DIRECTORY_SLOT];
        let entry = self.user_video_table[0];
        (dir.is_present() && entry.is_present()).then(|| entry.address())
    }

    /// Reload CR3: the software cache loses all non-global translations.
    pub fn flush<C: Cpu>(&mut self, cpu: &mut C) {
        self.tlb.flush();
        cpu.flush_tlb();
    }

    /// Translate `addr`, consulting the translation cache first.
    pub fn translate(&mut self, addr: VirtAddr, access: AccessMode) -> Result<PhysAddr, PageFault> {
        let translation = match self.tlb.lookup(addr.page_number()) {
            Some(hit) => hit,
            None => {
                let walked = self.walk(addr)?;
                self.tlb.insert(walked);
                walked
            }
        };

        if access.is_user() && !translation.user {
            return Err(PageFault {
                address: addr,
                reason: PageFaultReason::Protection,
            });
        }
        // Supervisor writes ignore R/W while CR0.WP is clear.
        if access.is_user() && access.is_write() && !translation.writable {
            return Err(PageFault {
                address: addr,
                reason: PageFaultReason::Protection,
            });
        }
        Ok(translation.frame.offset(addr.page_offset()))
    }

    fn walk(&self, addr: VirtAddr) -> Result<Translation, PageFault> {
        let pde = self.directory[addr.directory_index()];
        if !pde.is_present() {
            return Err(PageFault::not_present(addr));
        }
        let dir_flags = pde.flags();

        if pde.is_large() {
            let within = addr.large_page_offset() & !(PAGE_SIZE - 1);
            return Ok(Translation {
                page: addr.page_number(),
                frame: pde.address().offset(within),
                user: dir_flags.contains(PageFlags::USER),
                writable: dir_flags.contains(PageFlags::WRITABLE),
                global: dir_flags.contains(PageFlags::GLOBAL),
            });
        }

        let table = self
            .table_at(pde.address())
            .ok_or(PageFault::not_present(addr))?;
        let pte = table[addr.table_index()];
        if !pte.is_present() {
            return Err(PageFault::not_present(addr));
        }
        let flags = pte.flags();
        Ok(Translation {
            page: addr.page_number(),
            frame: pte.address(),
            user: dir_flags.contains(PageFlags::USER) && flags.contains(PageFlags::USER),
            writable: dir_flags.contains(PageFlags::WRITABLE) && flags.contains(PageFlags::WRITABLE),
            global: flags.contains(PageFlags::GLOBAL),
        })
    }

    fn table_at(&self, addr: PhysAddr) -> Option<&PageTable> {
        if addr == self.locations.low_table {
            Some(&self.low_table)
        } else if addr == self.locations.user_video_table {
            Some(&self.user_video_table)
        } else {
            None
        }
    }

    /// Copy bytes out of virtual memory, one page at a time.
    pub fn read_virtual<M: PhysicalMemory>(
        &mut self,
        memory: &M,
        addr: VirtAddr,
        buf: &mut [u8],
        access: AccessMode,
    ) -> Result<(), PageFault> {
        let mut done = 0;
        while done < buf.len() {
            let at = addr
                .checked_add(done as u32)
                .ok_or(PageFault::not_present(addr))?;
            let chunk = ((PAGE_SIZE - at.page_offset()) as usize).min(buf.len() - done);
            let phys = self.translate(at, access)?;
            memory.read(phys, &mut buf[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    pub fn write_virtual<M: PhysicalMemory>(
        &mut self,
        memory: &mut M,
        addr: VirtAddr,
        data: &[u8],
        access: AccessMode,
    ) -> Result<(), PageFault> {
        let mut done = 0;
        while done < data.len() {
            let at = addr
                .checked_add(done as u32)
                .ok_or(PageFault::not_present(addr))?;
            let chunk = ((PAGE_SIZE - at.page_offset()) as usize).min(data.len() - done);
            let phys = self.translate(at, access)?;
            memory.write(phys, &data[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    pub fn directory(&self) -> &PageTable {
        &self.directory
    }

    pub fn low_table(&self) -> &PageTable {
        &self.low_table
    }

    pub fn user_video_table(&self) -> &PageTable {
        &self.user_video_table
    }

    pub fn tlb(&self) -> &TranslationCache {
        &self.tlb
    }

    pub fn locations(&self) -> TableLocations {
        self.locations
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
