//! Per-terminal line editing.
//!
//! Typed characters collect until Enter; the finished line, newline
//! included, is then handed to the next `read` on that terminal.

use crate::config::NUM_TERMINALS;
use crate::drivers::keyboard::{Key, ScancodeDecoder};
use crate::terminal::TerminalId;

pub const LINE_CAPACITY: usize = 128;

/// What the screen should do in response to a keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    None,
    Byte(u8),
    Erase,
    Newline,
    Clear,
    Switch(TerminalId),
}

/// Keyboard decoding plus one line buffer per terminal. Keystrokes always
/// go to the foreground terminal.
pub struct LineDiscipline {
    decoder: ScancodeDecoder,
    lines: [LineBuffer; NUM_TERMINALS],
}

impl LineDiscipline {
    pub const fn new() -> Self {
        Self {
            decoder: ScancodeDecoder::new(),
            lines: [LineBuffer::new(); NUM_TERMINALS],
        }
    }

    pub fn feed(&mut self, scancode: u8, foreground: TerminalId) -> Echo {
        let line = &mut self.lines[foreground.index()];
        match self.decoder.process_scancode(scancode) {
            None => Echo::None,
            Some(Key::Char(byte)) if line.push(byte) => Echo::Byte(byte),
            Some(Key::Char(_)) => Echo::None,
            Some(Key::Backspace) if line.backspace() => Echo::Erase,
            Some(Key::Backspace) => Echo::None,
            Some(Key::Enter) => {
                line.finish();
                Echo::Newline
            }
            Some(Key::ClearScreen) => Echo::Clear,
            Some(Key::SwitchTerminal(target)) => Echo::Switch(target),
        }
    }

    /// Queue a whole line for `terminal` as if it had been typed.
    pub fn submit(&mut self, terminal: TerminalId, text: &[u8]) {
        let line = &mut self.lines[terminal.index()];
        for &byte in text {
            line.push(byte);
        }
        line.finish();
    }

    pub fn read_line(&mut self, terminal: TerminalId, buf: &mut [u8]) -> Option<usize> {
        self.lines[terminal.index()].take(buf)
    }
}

impl Default for LineDiscipline {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LineBuffer {
    bytes: [u8; LINE_CAPACITY],
    len: usize,
    ready: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; LINE_CAPACITY],
            len: 0,
            ready: false,
        }
    }

    /// Append a typed byte. One slot is held back for the newline.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.ready || self.len + 1 >= LINE_CAPACITY {
            return false;
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        true
    }

    pub fn backspace(&mut self) -> bool {
        if self.ready || self.len == 0 {
            return false;
        }
        self.len -= 1;
        true
    }

    pub fn finish(&mut self) {
        if self.ready {
            return;
        }
        self.bytes[self.len] = b'\n';
        self.len += 1;
        self.ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Move a finished line into `buf`; anything past `buf.len()` is
    /// dropped with the rest of the line.
    pub fn take(&mut self, buf: &mut [u8]) -> Option<usize> {
        if !self.ready {
            return None;
        }
        let n = self.len.min(buf.len());
        buf[..n].copy_from_slice(&self.bytes[..n]);
        self.len = 0;
        self.ready = false;
        Some(n)
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_is_available_after_enter() {
        let mut line = LineBuffer::new();
        for &b in b"ls" {
            line.push(b);
        }
        let mut buf = [0u8; 16];
        assert_eq!(line.take(&mut buf), None);
        line.finish();
        assert_eq!(line.take(&mut buf), Some(3));
        assert_eq!(&buf[..3], b"ls\n");
        assert_eq!(line.take(&mut buf), None);
    }

    #[test]
    fn backspace_and_capacity() {
        let mut line = LineBuffer::new();
        assert!(!line.backspace());
        for _ in 0..200 {
            line.push(b'x');
        }
        assert!(line.backspace());
        line.finish();
        let mut buf = [0u8; LINE_CAPACITY];
        assert_eq!(line.take(&mut buf), Some(LINE_CAPACITY - 1));
        assert_eq!(buf[LINE_CAPACITY - 2], b'\n');
    }

    #[test]
    fn keystrokes_land_in_the_foreground_line() {
        let mut input = LineDiscipline::new();
        let t0 = TerminalId::FIRST;
        let t1 = TerminalId::new(1).unwrap();
        assert_eq!(input.feed(0x23, t1), Echo::Byte(b'h'));
        assert_eq!(input.feed(0x17, t1), Echo::Byte(b'i'));
        assert_eq!(input.feed(0x1C, t1), Echo::Newline);

        let mut buf = [0u8; 8];
        assert_eq!(input.read_line(t0, &mut buf), None);
        assert_eq!(input.read_line(t1, &mut buf), Some(3));
        assert_eq!(&buf[..3], b"hi\n");
    }
}
