//! COM1 output for the kernel log.

use core::fmt::{self, Write};

use spin::Mutex;

use super::{inb, outb};

const COM1: u16 = 0x3F8;
const LINE_STATUS: u16 = COM1 + 5;
const TRANSMIT_EMPTY: u8 = 0x20;

pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        Self { base }
    }

    /// 38400 baud, 8N1, FIFOs on.
    pub fn init(&mut self) {
        // SAFETY: standard 16550 programming sequence.
        unsafe {
            outb(self.base + 1, 0x00);
            outb(self.base + 3, 0x80);
            outb(self.base, 0x03);
            outb(self.base + 1, 0x00);
            outb(self.base + 3, 0x03);
            outb(self.base + 2, 0xC7);
            outb(self.base + 4, 0x0B);
        }
    }

    fn send(&mut self, byte: u8) {
        // SAFETY: polling the line status register before writing.
        unsafe {
            while inb(LINE_STATUS) & TRANSMIT_EMPTY == 0 {}
            outb(self.base, byte);
        }
    }
}

impl Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.send(b'\r');
            }
            self.send(byte);
        }
        Ok(())
    }
}

pub static SERIAL: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

/// Logger sink.
pub fn write(args: fmt::Arguments) {
    let _ = SERIAL.lock().write_fmt(args);
}
