//! VGA text console with three virtual terminals.
//!
//! Every terminal keeps its own cursor. Output for the foreground terminal
//! goes straight to display memory, output for the others into their
//! off-screen buffer, so a terminal switch only has to copy pages.

use core::fmt;

use crate::config::{NUM_TERMINALS, SCREEN_COLUMNS, SCREEN_ROWS};
use crate::drivers::line::{Echo, LineDiscipline};
use crate::drivers::{Console, ConsoleEvent};
use crate::memory::video::user_video_frame;
use crate::terminal::TerminalId;

use super::outb;

const ATTRIBUTE: u8 = 0x07;
const CRTC_INDEX: u16 = 0x3D4;
const CRTC_DATA: u16 = 0x3D5;
const CURSOR_HIGH: u8 = 0x0E;
const CURSOR_LOW: u8 = 0x0F;

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    row: usize,
    column: usize,
}

pub struct VgaConsole {
    input: LineDiscipline,
    cursors: [Cursor; NUM_TERMINALS],
    focused: TerminalId,
}

impl VgaConsole {
    pub const fn new() -> Self {
        Self {
            input: LineDiscipline::new(),
            cursors: [Cursor { row: 0, column: 0 }; NUM_TERMINALS],
            focused: TerminalId::FIRST,
        }
    }

    fn cell(&self, terminal: TerminalId, row: usize, column: usize) -> *mut u16 {
        let base = user_video_frame(terminal, self.focused).as_u32() as usize;
        (base + (row * SCREEN_COLUMNS + column) * 2) as *mut u16
    }

    fn put_cell(&mut self, terminal: TerminalId, row: usize, column: usize, byte: u8) {
        let value = u16::from(byte) | u16::from(ATTRIBUTE) << 8;
        // SAFETY: display memory and the terminal buffers are identity
        // mapped and the cell lies inside one screen.
        unsafe { self.cell(terminal, row, column).write_volatile(value) };
    }

    fn scroll(&mut self, terminal: TerminalId) {
        for row in 1..SCREEN_ROWS {
            for column in 0..SCREEN_COLUMNS {
                // SAFETY: see `put_cell`.
                let value = unsafe { self.cell(terminal, row, column).read_volatile() };
                unsafe { self.cell(terminal, row - 1, column).write_volatile(value) };
            }
        }
        for column in 0..SCREEN_COLUMNS {
            self.put_cell(terminal, SCREEN_ROWS - 1, column, b' ');
        }
    }

    fn newline(&mut self, terminal: TerminalId) {
        let cursor = &mut self.cursors[terminal.index()];
        cursor.column = 0;
        if cursor.row + 1 < SCREEN_ROWS {
            cursor.row += 1;
        } else {
            self.scroll(terminal);
        }
    }

    fn put_byte(&mut self, terminal: TerminalId, byte: u8) {
        match byte {
            b'\n' | b'\r' => self.newline(terminal),
            0 => {}
            _ => {
                let Cursor { row, column } = self.cursors[terminal.index()];
                self.put_cell(terminal, row, column, byte);
                self.cursors[terminal.index()].column += 1;
                if column + 1 == SCREEN_COLUMNS {
                    self.newline(terminal);
                }
            }
        }
    }

    /// Step back one cell, across a line break if needed.
    fn erase(&mut self, terminal: TerminalId) {
        let cursor = &mut self.cursors[terminal.index()];
        if cursor.column > 0 {
            cursor.column -= 1;
        } else if cursor.row > 0 {
            cursor.row -= 1;
            cursor.column = SCREEN_COLUMNS - 1;
        }
        let Cursor { row, column } = *cursor;
        self.put_cell(terminal, row, column, b' ');
    }

    fn clear(&mut self, terminal: TerminalId) {
        for row in 0..SCREEN_ROWS {
            for column in 0..SCREEN_COLUMNS {
                self.put_cell(terminal, row, column, b' ');
            }
        }
        self.cursors[terminal.index()] = Cursor::default();
    }

    fn sync_hardware_cursor(&self) {
        let Cursor { row, column } = self.cursors[self.focused.index()];
        let position = (row * SCREEN_COLUMNS + column) as u16;
        // SAFETY: CRT controller registers only move the blinking cursor.
        unsafe {
            outb(CRTC_INDEX, CURSOR_LOW);
            outb(CRTC_DATA, position as u8);
            outb(CRTC_INDEX, CURSOR_HIGH);
            outb(CRTC_DATA, (position >> 8) as u8);
        }
    }

    /// Print on the foreground terminal outside of any process.
    pub fn report(&mut self, args: fmt::Arguments) {
        let terminal = self.focused;
        let _ = fmt::write(&mut Writer { console: self, terminal }, args);
        self.sync_hardware_cursor();
    }
}

impl Default for VgaConsole {
    fn default() -> Self {
        Self::new()
    }
}

struct Writer<'a> {
    console: &'a mut VgaConsole,
    terminal: TerminalId,
}

impl fmt::Write for Writer<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.console.put_byte(self.terminal, byte);
        }
        Ok(())
    }
}

impl Console for VgaConsole {
    fn process_scancode(&mut self, scancode: u8, foreground: TerminalId) -> ConsoleEvent {
        match self.input.feed(scancode, foreground) {
            Echo::None => {}
            Echo::Byte(byte) => self.put_byte(foreground, byte),
            Echo::Newline => self.newline(foreground),
            Echo::Erase => self.erase(foreground),
            Echo::Clear => self.clear(foreground),
            Echo::Switch(target) => return ConsoleEvent::SwitchTerminal(target),
        }
        self.sync_hardware_cursor();
        ConsoleEvent::None
    }

    fn read_line(&mut self, terminal: TerminalId, buf: &mut [u8]) -> Option<usize> {
        self.input.read_line(terminal, buf)
    }

    fn write(&mut self, terminal: TerminalId, data: &[u8]) -> usize {
        for &byte in data {
            self.put_byte(terminal, byte);
        }
        if terminal == self.focused {
            self.sync_hardware_cursor();
        }
        data.len()
    }

    fn focus(&mut self, terminal: TerminalId) {
        self.focused = terminal;
        self.sync_hardware_cursor();
    }
}
