//! # Interrupt Descriptor Table
//!
//! 256 i386 gate descriptors plus, for each vector, the [`Handler`] the
//! dispatcher routes it to. Vectors nobody claimed route to
//! [`Handler::Ignored`], which is fatal.
//!
//! ## Gate Layout
//!
//! | Bytes | Field                                   |
//! |-------|-----------------------------------------|
//! | 0-1   | handler offset 15..0                    |
//! | 2-3   | code segment selector                   |
//! | 4     | zero                                    |
//! | 5     | P, DPL (2 bits), 0, type (0xE / 0xF)    |
//! | 6-7   | handler offset 31..16                   |

use core::fmt;

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::arch::EntryPoints;
use crate::interrupts::exceptions::Exception;
use crate::interrupts::gdt::KERNEL_CODE_SELECTOR;
use crate::interrupts::pic::Irq;
use crate::interrupts::SYSCALL_VECTOR;

pub const VECTOR_COUNT: usize = 256;

const PRESENT: u8 = 1 << 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    /// Clears IF on entry.
    Interrupt,
    /// Leaves IF alone.
    Trap,
}

impl GateKind {
    const fn type_bits(self) -> u8 {
        match self {
            GateKind::Interrupt => 0xE,
            GateKind::Trap => 0xF,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    zero: u8,
    attributes: u8,
    offset_high: u16,
}

impl GateDescriptor {
    pub const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            attributes: 0,
            offset_high: 0,
        }
    }

    pub fn new(offset: u32, selector: SegmentSelector, kind: GateKind, dpl: PrivilegeLevel) -> Self {
        Self {
            offset_low: offset as u16,
            selector: selector.0,
            zero: 0,
            attributes: PRESENT | ((dpl as u8) << 5) | kind.type_bits(),
            offset_high: (offset >> 16) as u16,
        }
    }

    pub fn offset(&self) -> u32 {
        u32::from(self.offset_high) << 16 | u32::from(self.offset_low)
    }

    pub fn selector(&self) -> SegmentSelector {
        SegmentSelector(self.selector)
    }

    pub fn is_present(&self) -> bool {
        self.attributes & PRESENT != 0
    }

    pub fn privilege_level(&self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16(u16::from((self.attributes >> 5) & 0b11))
    }

    pub fn kind(&self) -> Option<GateKind> {
        match self.attributes & 0xF {
            0xE => Some(GateKind::Interrupt),
            0xF => Some(GateKind::Trap),
            _ => None,
        }
    }

    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// The 8 bytes the CPU reads.
    pub fn to_bytes(&self) -> [u8; 8] {
        let low = self.offset_low.to_le_bytes();
        let selector = self.selector.to_le_bytes();
        let high = self.offset_high.to_le_bytes();
        [low[0], low[1], selector[0], selector[1], self.zero, self.attributes, high[0], high[1]]
    }
}

impl fmt::Debug for GateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateDescriptor")
            .field("offset", &format_args!("{:#010x}", self.offset()))
            .field("selector", &format_args!("{:#06x}", self.selector))
            .field("attributes", &format_args!("{:#04x}", self.attributes))
            .finish()
    }
}

/// What the dispatcher does with a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Catch-all: report "Unknown interrupt" and stop.
    Ignored,
    Exception(Exception),
    Irq(Irq),
    Syscall,
}

/// Operand of `lidt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u32,
}

#[repr(C, align(8))]
pub struct InterruptDescriptorTable {
    gates: [GateDescriptor; VECTOR_COUNT],
    routes: [Handler; VECTOR_COUNT],
}

impl InterruptDescriptorTable {
    pub const fn new() -> Self {
        Self {
            gates: [GateDescriptor::missing(); VECTOR_COUNT],
            routes: [Handler::Ignored; VECTOR_COUNT],
        }
    }

    /// Write one gate. The system call vector becomes a trap gate, every
    /// other vector an interrupt gate.
    pub fn install_gate(&mut self, vector: u8, handler: Handler, entry: u32, dpl: PrivilegeLevel) {
        let kind = if vector == SYSCALL_VECTOR {
            GateKind::Trap
        } else {
            GateKind::Interrupt
        };
        self.gates[vector as usize] = GateDescriptor::new(entry, KERNEL_CODE_SELECTOR, kind, dpl);
        self.routes[vector as usize] = handler;
    }

    /// Point every vector at its stub with the catch-all route.
    pub fn install_all_ignored(&mut self, entries: &EntryPoints) {
        for vector in 0..=u8::MAX {
            self.install_gate(vector, Handler::Ignored, entries.get(vector), PrivilegeLevel::Ring0);
        }
    }

    pub fn install_exception_handlers(&mut self, entries: &EntryPoints) {
        for exception in Exception::ALL {
            let vector = exception.vector();
            self.install_gate(
                vector,
                Handler::Exception(exception),
                entries.get(vector),
                PrivilegeLevel::Ring0,
            );
        }
    }

    /// Timer, keyboard and RTC interrupt gates, and the user-callable
    /// system call gate.
    pub fn install_device_handlers(&mut self, entries: &EntryPoints) {
        for irq in [Irq::Timer, Irq::Keyboard, Irq::Rtc] {
            let vector = irq.vector();
            self.install_gate(vector, Handler::Irq(irq), entries.get(vector), PrivilegeLevel::Ring0);
        }
        self.install_gate(
            SYSCALL_VECTOR,
            Handler::Syscall,
            entries.get(SYSCALL_VECTOR),
            PrivilegeLevel::Ring3,
        );
    }

    pub fn gate(&self, vector: u8) -> &GateDescriptor {
        &self.gates[vector as usize]
    }

    pub fn route(&self, vector: u8) -> Handler {
        self.routes[vector as usize]
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (VECTOR_COUNT * core::mem::size_of::<GateDescriptor>() - 1) as u16,
            base: self.gates.as_ptr() as usize as u32,
        }
    }
}

impl Default for InterruptDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed() -> InterruptDescriptorTable {
        let entries = EntryPoints::uniform(0x0040_1000, 16);
        let mut idt = InterruptDescriptorTable::new();
        idt.install_all_ignored(&entries);
        idt.install_exception_handlers(&entries);
        idt.install_device_handlers(&entries);
        idt
    }

    #[test]
    fn gate_encoding() {
        let gate = GateDescriptor::new(
            0x0040_2345,
            KERNEL_CODE_SELECTOR,
            GateKind::Trap,
            PrivilegeLevel::Ring3,
        );
        assert_eq!(gate.to_bytes(), [0x45, 0x23, 0x10, 0x00, 0x00, 0xEF, 0x40, 0x00]);
        assert_eq!(gate.offset(), 0x0040_2345);
        assert_eq!(core::mem::size_of::<GateDescriptor>(), 8);
    }

    #[test]
    fn empty_table_has_no_present_gates() {
        let idt = InterruptDescriptorTable::new();
        assert!((0..=u8::MAX).all(|v| !idt.gate(v).is_present()));
    }

    #[test]
    fn routes_follow_installation_order() {
        let idt = installed();
        assert_eq!(idt.route(0x0E), Handler::Exception(Exception::PageFault));
        assert_eq!(idt.route(0x20), Handler::Irq(Irq::Timer));
        assert_eq!(idt.route(0x21), Handler::Irq(Irq::Keyboard));
        assert_eq!(idt.route(0x28), Handler::Irq(Irq::Rtc));
        assert_eq!(idt.route(0x80), Handler::Syscall);
        assert_eq!(idt.route(0x16), Handler::Ignored);
        assert_eq!(idt.route(0xFF), Handler::Ignored);
    }

    #[test]
    fn only_the_syscall_gate_is_a_trap() {
        let idt = installed();
        for vector in 0..=u8::MAX {
            let expected = if vector == SYSCALL_VECTOR {
                GateKind::Trap
            } else {
                GateKind::Interrupt
            };
            assert_eq!(idt.gate(vector).kind(), Some(expected), "vector {:#x}", vector);
            assert_eq!(idt.gate(vector).selector(), KERNEL_CODE_SELECTOR);
        }
    }

    #[test]
    fn pointer_covers_256_gates() {
        assert_eq!(installed().pointer().limit, 2047);
    }
}
