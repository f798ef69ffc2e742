//! Virtual terminals and the foreground selection.

use core::fmt;

use crate::config::NUM_TERMINALS;
use crate::memory::video::{swap_terminal_buffer, SwapDirection};
use crate::memory::PhysicalMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TerminalId(u8);

impl TerminalId {
    pub const FIRST: Self = Self(0);

    pub const fn new(index: usize) -> Option<Self> {
        if index < NUM_TERMINALS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Id of this terminal's off-screen video buffer (1-based).
    pub const fn buffer_id(self) -> u32 {
        self.0 as u32 + 1
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..NUM_TERMINALS as u8).map(Self)
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tty{}", self.0)
    }
}

/// Tracks which terminal owns the display and the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminals {
    foreground: TerminalId,
}

impl Terminals {
    pub const fn new() -> Self {
        Self {
            foreground: TerminalId::FIRST,
        }
    }

    pub fn foreground(&self) -> TerminalId {
        self.foreground
    }

    pub fn is_foreground(&self, terminal: TerminalId) -> bool {
        self.foreground == terminal
    }

    /// Bring `target` to the front: park the display in the outgoing
    /// terminal's buffer and restore the incoming one.
    ///
    /// Returns `false` when `target` already is the foreground.
    pub fn switch_to<M: PhysicalMemory>(&mut self, memory: &mut M, target: TerminalId) -> bool {
        if target == self.foreground {
            return false;
        }
        swap_terminal_buffer(memory, self.foreground.buffer_id(), SwapDirection::Save);
        swap_terminal_buffer(memory, target.buffer_id(), SwapDirection::Restore);
        log::info!("foreground terminal {} -> {}", self.foreground, target);
        self.foreground = target;
        true
    }
}

impl Default for Terminals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::SparseMemory;
    use crate::config::VIDEO_BYTES;
    use crate::memory::video;
    use crate::memory::PhysAddr;

    #[test]
    fn ids_are_bounded() {
        assert_eq!(TerminalId::all().count(), NUM_TERMINALS);
        assert!(TerminalId::new(NUM_TERMINALS).is_none());
        assert_eq!(TerminalId::new(1).map(TerminalId::buffer_id), Some(2));
    }

    #[test]
    fn switching_parks_and_restores_screens() {
        let mut memory = SparseMemory::new();
        let mut terminals = Terminals::new();
        memory.write(video::display(), &[b'0'; VIDEO_BYTES]);
        memory.write(PhysAddr::new(0xBA000), &[b'1'; VIDEO_BYTES]);

        let t1 = TerminalId::new(1).unwrap();
        assert!(terminals.switch_to(&mut memory, t1));
        assert_eq!(terminals.foreground(), t1);

        let mut shown = [0u8; VIDEO_BYTES];
        memory.read(video::display(), &mut shown);
        assert!(shown.iter().all(|&b| b == b'1'));
        let mut parked = [0u8; VIDEO_BYTES];
        memory.read(PhysAddr::new(0xB9000), &mut parked);
        assert!(parked.iter().all(|&b| b == b'0'));
    }

    #[test]
    fn switching_to_foreground_is_a_no_op() {
        let mut memory = SparseMemory::new();
        let mut terminals = Terminals::new();
        assert!(!terminals.switch_to(&mut memory, TerminalId::FIRST));
    }
}
