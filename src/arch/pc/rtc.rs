//! MC146818 real-time clock, periodic interrupt only.

use crate::drivers::{rtc_rate, DriverError, RtcDevice};

use super::{inb, outb};

const INDEX_PORT: u16 = 0x70;
const DATA_PORT: u16 = 0x71;
/// Bit 7 of the index keeps NMI disabled while a register is selected.
const NMI_OFF: u8 = 0x80;
const REGISTER_A: u8 = 0x0A;
const REGISTER_B: u8 = 0x0B;
const REGISTER_C: u8 = 0x0C;
const PERIODIC_ENABLE: u8 = 0x40;
const OPEN_FREQUENCY: u32 = 2;

#[derive(Debug, Default)]
pub struct CmosRtc {
    interrupts: u32,
}

impl CmosRtc {
    pub const fn new() -> Self {
        Self { interrupts: 0 }
    }

    fn read_register(register: u8) -> u8 {
        // SAFETY: CMOS index/data pair.
        unsafe {
            outb(INDEX_PORT, NMI_OFF | register);
            inb(DATA_PORT)
        }
    }

    fn write_register(register: u8, value: u8) {
        // SAFETY: CMOS index/data pair.
        unsafe {
            outb(INDEX_PORT, NMI_OFF | register);
            outb(DATA_PORT, value);
        }
    }

    fn program_rate(rate: u8) {
        let previous = Self::read_register(REGISTER_A);
        Self::write_register(REGISTER_A, (previous & 0xF0) | (rate & 0x0F));
    }
}

impl RtcDevice for CmosRtc {
    fn open(&mut self) {
        let previous = Self::read_register(REGISTER_B);
        Self::write_register(REGISTER_B, previous | PERIODIC_ENABLE);
        if let Some(rate) = rtc_rate(OPEN_FREQUENCY) {
            Self::program_rate(rate);
        }
    }

    fn handle_interrupt(&mut self) {
        // Register C must be read or the chip raises no further interrupts.
        Self::read_register(REGISTER_C);
        self.interrupts = self.interrupts.wrapping_add(1);
    }

    fn interrupts(&self) -> u32 {
        self.interrupts
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), DriverError> {
        let rate = rtc_rate(hz).ok_or(DriverError::Unsupported)?;
        Self::program_rate(rate);
        Ok(())
    }
}
