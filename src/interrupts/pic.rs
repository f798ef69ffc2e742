//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │◀────│   PIC 2     │
//! │  (primary)  │ IRQ2│ (secondary) │
//! │ IRQ 0-7     │     │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! ## Vector Remapping
//!
//! - PIC 1: vectors 0x20-0x27 (IRQ 0-7)
//! - PIC 2: vectors 0x28-0x2F (IRQ 8-15)
//!
//! | IRQ | Vector | Device    |
//! |-----|--------|-----------|
//! | 0   | 0x20   | Timer     |
//! | 1   | 0x21   | Keyboard  |
//! | 2   | 0x22   | Cascade   |
//! | 8   | 0x28   | RTC       |

use crate::arch::InterruptController;

pub const PRIMARY_OFFSET: u8 = 0x20;
pub const SECONDARY_OFFSET: u8 = 0x28;

const PRIMARY_COMMAND: u16 = 0x20;
const PRIMARY_DATA: u16 = 0x21;
const SECONDARY_COMMAND: u16 = 0xA0;
const SECONDARY_DATA: u16 = 0xA1;

const ICW1: u8 = 0x11;
const ICW3_PRIMARY: u8 = 0x04;
const ICW3_SECONDARY: u8 = 0x02;
const ICW4: u8 = 0x01;
const SPECIFIC_EOI: u8 = 0x60;
const MASK_ALL: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Irq {
    Timer = 0,
    Keyboard = 1,
    Cascade = 2,
    Rtc = 8,
}

impl Irq {
    pub const fn line(self) -> u8 {
        self as u8
    }

    pub const fn vector(self) -> u8 {
        PRIMARY_OFFSET + self as u8
    }

    pub const fn on_secondary(self) -> bool {
        self.line() >= 8
    }
}

/// Byte-wide port access the controller driver is written against.
pub trait PortIo {
    fn read(&mut self, port: u16) -> u8;

    fn write(&mut self, port: u16, value: u8);
}

/// The cascaded 8259 pair. Masks are cached so enabling one line never has
/// to read the data port back.
pub struct ChainedPics<IO> {
    io: IO,
    primary_mask: u8,
    secondary_mask: u8,
}

impl<IO: PortIo> ChainedPics<IO> {
    pub const fn new(io: IO) -> Self {
        Self {
            io,
            primary_mask: MASK_ALL,
            secondary_mask: MASK_ALL,
        }
    }

    pub fn masks(&self) -> (u8, u8) {
        (self.primary_mask, self.secondary_mask)
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    fn write_masks(&mut self) {
        self.io.write(PRIMARY_DATA, self.primary_mask);
        self.io.write(SECONDARY_DATA, self.secondary_mask);
    }
}

impl<IO: PortIo> InterruptController for ChainedPics<IO> {
    fn initialize(&mut self) {
        self.primary_mask = MASK_ALL;
        self.secondary_mask = MASK_ALL;
        self.write_masks();

        self.io.write(PRIMARY_COMMAND, ICW1);
        self.io.write(PRIMARY_DATA, PRIMARY_OFFSET);
        self.io.write(PRIMARY_DATA, ICW3_PRIMARY);
        self.io.write(PRIMARY_DATA, ICW4);

        self.io.write(SECONDARY_COMMAND, ICW1);
        self.io.write(SECONDARY_DATA, SECONDARY_OFFSET);
        self.io.write(SECONDARY_DATA, ICW3_SECONDARY);
        self.io.write(SECONDARY_DATA, ICW4);

        self.write_masks();
        self.enable_irq(Irq::Cascade.line());
    }

    fn enable_irq(&mut self, line: u8) {
        match line {
            0..=7 => {
                self.primary_mask &= !(1 << line);
                self.io.write(PRIMARY_DATA, self.primary_mask);
            }
            8..=15 => {
                self.secondary_mask &= !(1 << (line - 8));
                self.io.write(SECONDARY_DATA, self.secondary_mask);
            }
            _ => log::debug!("enable_irq: no line {}", line),
        }
    }

    fn disable_irq(&mut self, line: u8) {
        match line {
            0..=7 => {
                self.primary_mask |= 1 << line;
                self.io.write(PRIMARY_DATA, self.primary_mask);
            }
            8..=15 => {
                self.secondary_mask |= 1 << (line - 8);
                self.io.write(SECONDARY_DATA, self.secondary_mask);
            }
            _ => log::debug!("disable_irq: no line {}", line),
        }
    }

    fn acknowledge(&mut self, line: u8) {
        match line {
            0..=7 => self.io.write(PRIMARY_COMMAND, SPECIFIC_EOI | line),
            8..=15 => {
                self.io.write(SECONDARY_COMMAND, SPECIFIC_EOI | (line - 8));
                self.io.write(PRIMARY_COMMAND, SPECIFIC_EOI | Irq::Cascade.line());
            }
            _ => log::debug!("acknowledge: no line {}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingPorts {
        writes: Vec<(u16, u8)>,
    }

    impl PortIo for RecordingPorts {
        fn read(&mut self, _port: u16) -> u8 {
            0
        }

        fn write(&mut self, port: u16, value: u8) {
            self.writes.push((port, value));
        }
    }

    fn pics() -> ChainedPics<RecordingPorts> {
        ChainedPics::new(RecordingPorts::default())
    }

    #[test]
    fn irq_vectors() {
        assert_eq!(Irq::Timer.vector(), 0x20);
        assert_eq!(Irq::Keyboard.vector(), 0x21);
        assert_eq!(Irq::Rtc.vector(), 0x28);
        assert!(Irq::Rtc.on_secondary());
        assert!(!Irq::Keyboard.on_secondary());
    }

    #[test]
    fn initialization_sequence() {
        let mut pics = pics();
        pics.initialize();
        assert_eq!(
            pics.io().writes,
            vec![
                (0x21, 0xFF),
                (0xA1, 0xFF),
                (0x20, 0x11),
                (0x21, 0x20),
                (0x21, 0x04),
                (0x21, 0x01),
                (0xA0, 0x11),
                (0xA1, 0x28),
                (0xA1, 0x02),
                (0xA1, 0x01),
                (0x21, 0xFF),
                (0xA1, 0xFF),
                (0x21, 0xFB),
            ]
        );
        assert_eq!(pics.masks(), (0xFB, 0xFF));
    }

    #[test]
    fn masks_track_enable_and_disable() {
        let mut pics = pics();
        pics.initialize();
        pics.enable_irq(Irq::Timer.line());
        pics.enable_irq(Irq::Rtc.line());
        assert_eq!(pics.masks(), (0xFA, 0xFE));
        pics.disable_irq(Irq::Timer.line());
        assert_eq!(pics.masks(), (0xFB, 0xFE));
    }

    #[test]
    fn secondary_lines_also_acknowledge_the_cascade() {
        let mut pics = pics();
        pics.acknowledge(Irq::Keyboard.line());
        pics.acknowledge(Irq::Rtc.line());
        assert_eq!(pics.io().writes, vec![(0x20, 0x61), (0xA0, 0x60), (0x20, 0x62)]);
    }

    #[test]
    fn out_of_range_lines_are_ignored() {
        let mut pics = pics();
        pics.enable_irq(16);
        pics.acknowledge(200);
        assert!(pics.io().writes.is_empty());
    }
}
