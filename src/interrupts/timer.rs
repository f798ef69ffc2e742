//! 8253/8254 programmable interval timer, channel 0 in square-wave mode.

use crate::arch::Cpu;
use crate::config::PIT_BASE_FREQUENCY;

const CHANNEL0_DATA: u16 = 0x40;
const COMMAND: u16 = 0x43;
/// Channel 0, low then high byte, mode 3, binary.
const SQUARE_WAVE: u8 = 0x36;

/// Reload value for `hz`. The counter is 16 bits wide, so frequencies
/// below about 19 Hz or above the base clock cannot be programmed.
pub fn divisor(hz: u32) -> Result<u16, &'static str> {
    if hz == 0 || hz > PIT_BASE_FREQUENCY {
        return Err("timer frequency out of range");
    }
    u16::try_from(PIT_BASE_FREQUENCY / hz).map_err(|_| "timer frequency too low")
}

pub fn program<C: Cpu>(cpu: &mut C, hz: u32) -> Result<u16, &'static str> {
    let divisor = divisor(hz)?;
    let [low, high] = divisor.to_le_bytes();
    cpu.write_port(COMMAND, SQUARE_WAVE);
    cpu.write_port(CHANNEL0_DATA, low);
    cpu.write_port(CHANNEL0_DATA, high);
    Ok(divisor)
}
