//! PS/2 scancode set 1 decoder.
//!
//! Tracks the modifier keys and turns make codes into [`Key`]s. Alt+F1,
//! Alt+F2 and Alt+F3 select terminals 0 to 2; Ctrl+L clears the screen.

use crate::terminal::TerminalId;

pub const DATA_PORT: u16 = 0x60;

const EXTENDED_PREFIX: u8 = 0xE0;
const RELEASE_BIT: u8 = 0x80;
const F1: u8 = 0x3B;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(u8),
    Enter,
    Backspace,
    ClearScreen,
    SwitchTerminal(TerminalId),
}

pub struct ScancodeDecoder {
    is_extended: bool,
    shift_pressed: bool,
    ctrl_pressed: bool,
    alt_pressed: bool,
    caps_lock: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            is_extended: false,
            shift_pressed: false,
            ctrl_pressed: false,
            alt_pressed: false,
            caps_lock: false,
        }
    }

    pub fn process_scancode(&mut self, scancode: u8) -> Option<Key> {
        if scancode == EXTENDED_PREFIX {
            self.is_extended = true;
            return None;
        }

        let is_release = scancode & RELEASE_BIT != 0;
        let key_code = scancode & !RELEASE_BIT;
        let extended = core::mem::replace(&mut self.is_extended, false);

        match key_code {
            0x2A | 0x36 => {
                self.shift_pressed = !is_release;
                return None;
            }
            0x1D => {
                self.ctrl_pressed = !is_release;
                return None;
            }
            0x38 => {
                self.alt_pressed = !is_release;
                return None;
            }
            _ => {}
        }

        if is_release || extended {
            return None;
        }

        match key_code {
            0x3A => {
                self.caps_lock = !self.caps_lock;
                None
            }
            0x1C => Some(Key::Enter),
            0x0E => Some(Key::Backspace),
            F1..=0x3D if self.alt_pressed => {
                TerminalId::new((key_code - F1) as usize).map(Key::SwitchTerminal)
            }
            0x26 if self.ctrl_pressed => Some(Key::ClearScreen),
            _ if self.ctrl_pressed || self.alt_pressed => None,
            _ => self.scancode_to_char(key_code).map(Key::Char),
        }
    }

    fn scancode_to_char(&self, scancode: u8) -> Option<u8> {
        const LETTERS: &[(u8, u8)] = &[
            (0x10, b'q'), (0x11, b'w'), (0x12, b'e'), (0x13, b'r'), (0x14, b't'),
            (0x15, b'y'), (0x16, b'u'), (0x17, b'i'), (0x18, b'o'), (0x19, b'p'),
            (0x1E, b'a'), (0x1F, b's'), (0x20, b'd'), (0x21, b'f'), (0x22, b'g'),
            (0x23, b'h'), (0x24, b'j'), (0x25, b'k'), (0x26, b'l'), (0x2C, b'z'),
            (0x2D, b'x'), (0x2E, b'c'), (0x2F, b'v'), (0x30, b'b'), (0x31, b'n'),
            (0x32, b'm'),
        ];

        if let Some(&(_, letter)) = LETTERS.iter().find(|(code, _)| *code == scancode) {
            let upper = self.shift_pressed != self.caps_lock;
            return Some(if upper { letter.to_ascii_uppercase() } else { letter });
        }

        let shift = self.shift_pressed;
        let ch = match scancode {
            0x02..=0x0B => {
                const PLAIN: &[u8; 10] = b"1234567890";
                const SHIFTED: &[u8; 10] = b"!@#$%^&*()";
                let index = (scancode - 0x02) as usize;
                if shift { SHIFTED[index] } else { PLAIN[index] }
            }
            0x39 => b' ',
            0x0F => b'\t',
            0x1A => if shift { b'{' } else { b'[' },
            0x1B => if shift { b'}' } else { b']' },
            0x27 => if shift { b':' } else { b';' },
            0x28 => if shift { b'"' } else { b'\'' },
            0x29 => if shift { b'~' } else { b'`' },
            0x2B => if shift { b'|' } else { b'\\' },
            0x33 => if shift { b'<' } else { b',' },
            0x34 => if shift { b'>' } else { b'.' },
            0x35 => if shift { b'?' } else { b'/' },
            0x0C => if shift { b'_' } else { b'-' },
            0x0D => if shift { b'+' } else { b'=' },
            _ => return None,
        };
        Some(ch)
    }
}

impl Default for ScancodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut ScancodeDecoder, codes: &[u8]) -> Vec<Key> {
        codes.iter().filter_map(|&c| decoder.process_scancode(c)).collect()
    }

    #[test]
    fn shift_and_caps_lock_cancel_out() {
        let mut decoder = ScancodeDecoder::new();
        assert_eq!(feed(&mut decoder, &[0x1E, 0x9E]), vec![Key::Char(b'a')]);
        assert_eq!(feed(&mut decoder, &[0x2A, 0x1E, 0xAA]), vec![Key::Char(b'A')]);
        assert_eq!(feed(&mut decoder, &[0x3A, 0x1E]), vec![Key::Char(b'A')]);
        assert_eq!(feed(&mut decoder, &[0x2A, 0x1E]), vec![Key::Char(b'a')]);
    }

    #[test]
    fn alt_function_keys_switch_terminals() {
        let mut decoder = ScancodeDecoder::new();
        let keys = feed(&mut decoder, &[0x38, 0x3C, 0xBC, 0xB8, 0x3C]);
        assert_eq!(keys, vec![Key::SwitchTerminal(TerminalId::new(1).unwrap())]);
    }

    #[test]
    fn ctrl_l_clears_and_extended_codes_are_ignored() {
        let mut decoder = ScancodeDecoder::new();
        assert_eq!(feed(&mut decoder, &[0x1D, 0x26, 0x9D]), vec![Key::ClearScreen]);
        assert!(feed(&mut decoder, &[0xE0, 0x1C]).is_empty());
        assert_eq!(feed(&mut decoder, &[0x1C, 0x0E]), vec![Key::Enter, Key::Backspace]);
    }
}
