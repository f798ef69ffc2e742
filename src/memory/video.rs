//! Display memory and the off-screen terminal buffers.
//!
//! Terminal *t* owns buffer id *t + 1*, stored one page above the previous
//! one starting right after the display page. The foreground terminal draws
//! straight into display memory.

use crate::config::{NUM_TERMINALS, PAGE_SIZE, VIDEO_BYTES, VIDEO_MEMORY};
use crate::memory::{PhysAddr, PhysicalMemory};
use crate::terminal::TerminalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Display memory into the buffer.
    Save,
    /// Buffer into display memory.
    Restore,
}

pub const fn display() -> PhysAddr {
    PhysAddr::new(VIDEO_MEMORY)
}

/// Physical address of buffer `id`, valid for ids `1..=3`.
pub fn terminal_buffer(id: u32) -> Option<PhysAddr> {
    (1..=NUM_TERMINALS as u32)
        .contains(&id)
        .then(|| PhysAddr::new(VIDEO_MEMORY + id * PAGE_SIZE))
}

/// Copy one screen between display memory and buffer `id`.
///
/// Out-of-range ids are ignored and reported as `false`.
pub fn swap_terminal_buffer<M: PhysicalMemory>(
    memory: &mut M,
    id: u32,
    direction: SwapDirection,
) -> bool {
    let Some(buffer) = terminal_buffer(id) else {
        log::debug!("ignoring swap for terminal buffer {}", id);
        return false;
    };
    match direction {
        SwapDirection::Save => memory.copy(display(), buffer, VIDEO_BYTES),
        SwapDirection::Restore => memory.copy(buffer, display(), VIDEO_BYTES),
    }
    true
}

/// Frame a process owned by `owner` should see at the user video page.
pub fn user_video_frame(owner: TerminalId, foreground: TerminalId) -> PhysAddr {
    if owner == foreground {
        display()
    } else {
        PhysAddr::new(VIDEO_MEMORY + owner.buffer_id() * PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::SparseMemory;

    fn screen(fill: u8) -> Vec<u8> {
        vec![fill; VIDEO_BYTES]
    }

    fn read_screen(memory: &SparseMemory, at: PhysAddr) -> Vec<u8> {
        let mut buf = vec![0u8; VIDEO_BYTES];
        memory.read(at, &mut buf);
        buf
    }

    #[test]
    fn restore_copies_buffer_onto_display() {
        let mut memory = SparseMemory::new();
        memory.write(PhysAddr::new(0xBA000), &screen(b'x'));
        assert!(swap_terminal_buffer(&mut memory, 2, SwapDirection::Restore));
        assert_eq!(read_screen(&memory, display()), screen(b'x'));
    }

    #[test]
    fn save_copies_display_into_buffer() {
        let mut memory = SparseMemory::new();
        memory.write(display(), &screen(b'd'));
        assert!(swap_terminal_buffer(&mut memory, 3, SwapDirection::Save));
        assert_eq!(read_screen(&memory, PhysAddr::new(0xBB000)), screen(b'd'));
    }

    #[test]
    fn out_of_range_ids_leave_display_untouched() {
        let mut memory = SparseMemory::new();
        memory.write(display(), &screen(b'a'));
        memory.write(PhysAddr::new(0xBC000), &screen(b'z'));
        for id in [0, 4, u32::MAX] {
            assert!(!swap_terminal_buffer(&mut memory, id, SwapDirection::Restore));
        }
        assert_eq!(read_screen(&memory, display()), screen(b'a'));
    }

    #[test]
    fn background_terminals_draw_into_their_buffer() {
        let t0 = TerminalId::FIRST;
        let t2 = TerminalId::new(2).unwrap();
        assert_eq!(user_video_frame(t0, t0), PhysAddr::new(0xB8000));
        assert_eq!(user_video_frame(t2, t0), PhysAddr::new(0xBB000));
        assert_eq!(user_video_frame(t0, t2), PhysAddr::new(0xB9000));
    }
}
