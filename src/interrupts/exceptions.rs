//! CPU exceptions and the fatal-fault state machine.
//!
//! Every exception is fatal: the kernel prints one diagnostic line, masks
//! interrupts and stops. [`FaultState::Faulted`] never transitions back.

use core::fmt;

use crate::memory::VirtAddr;

pub const EXCEPTION_COUNT: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exception {
    DivideError = 0x00,
    Debug = 0x01,
    NonMaskableInterrupt = 0x02,
    Breakpoint = 0x03,
    Overflow = 0x04,
    BoundRangeExceeded = 0x05,
    InvalidOpcode = 0x06,
    DeviceNotAvailable = 0x07,
    DoubleFault = 0x08,
    CoprocessorSegmentOverrun = 0x09,
    InvalidTss = 0x0A,
    SegmentNotPresent = 0x0B,
    StackSegmentFault = 0x0C,
    GeneralProtectionFault = 0x0D,
    PageFault = 0x0E,
    Reserved = 0x0F,
    X87FloatingPoint = 0x10,
    AlignmentCheck = 0x11,
    MachineCheck = 0x12,
    SimdFloatingPoint = 0x13,
    Virtualization = 0x14,
    ControlProtection = 0x15,
}

impl Exception {
    pub const ALL: [Exception; EXCEPTION_COUNT] = [
        Self::DivideError,
        Self::Debug,
        Self::NonMaskableInterrupt,
        Self::Breakpoint,
        Self::Overflow,
        Self::BoundRangeExceeded,
        Self::InvalidOpcode,
        Self::DeviceNotAvailable,
        Self::DoubleFault,
        Self::CoprocessorSegmentOverrun,
        Self::InvalidTss,
        Self::SegmentNotPresent,
        Self::StackSegmentFault,
        Self::GeneralProtectionFault,
        Self::PageFault,
        Self::Reserved,
        Self::X87FloatingPoint,
        Self::AlignmentCheck,
        Self::MachineCheck,
        Self::SimdFloatingPoint,
        Self::Virtualization,
        Self::ControlProtection,
    ];

    pub fn from_vector(vector: u8) -> Option<Self> {
        Self::ALL.get(vector as usize).copied()
    }

    pub const fn vector(self) -> u8 {
        self as u8
    }

    /// Whether the CPU pushes an error code for this exception.
    pub const fn has_error_code(self) -> bool {
        matches!(
            self,
            Self::DoubleFault
                | Self::InvalidTss
                | Self::SegmentNotPresent
                | Self::StackSegmentFault
                | Self::GeneralProtectionFault
                | Self::PageFault
                | Self::AlignmentCheck
                | Self::ControlProtection
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::DivideError => "Division by zero",
            Self::Debug => "Debugger",
            Self::NonMaskableInterrupt => "NMI",
            Self::Breakpoint => "Breakpoint",
            Self::Overflow => "Overflow",
            Self::BoundRangeExceeded => "Bounds",
            Self::InvalidOpcode => "Invalid Opcode",
            Self::DeviceNotAvailable => "Coprocessor not available",
            Self::DoubleFault => "Double fault",
            Self::CoprocessorSegmentOverrun => "Coprocessor Segment Overrun",
            Self::InvalidTss => "Invalid Task State Segment",
            Self::SegmentNotPresent => "Segment not present",
            Self::StackSegmentFault => "Stack Fault",
            Self::GeneralProtectionFault => "General protection fault",
            Self::PageFault => "Page fault",
            Self::Reserved => "reserved",
            Self::X87FloatingPoint => "Math Fault",
            Self::AlignmentCheck => "Alignment Check",
            Self::MachineCheck => "Machine Check",
            Self::SimdFloatingPoint => "SIMD Floating-Point Exception",
            Self::Virtualization => "Virtualization Exception",
            Self::ControlProtection => "Control Protection Exception",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `address` is CR2, only recorded for page faults.
    Exception {
        exception: Exception,
        address: Option<VirtAddr>,
    },
    Unrecognized(u8),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Exception {
                exception,
                address: Some(address),
            } => write!(f, "{} at {}", exception.name(), address),
            Fault::Exception { exception, .. } => f.write_str(exception.name()),
            Fault::Unrecognized(vector) => write!(f, "Unknown interrupt (vector {:#04x})", vector),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultState {
    #[default]
    Running,
    Faulted(Fault),
}

impl FaultState {
    /// Enter the faulted state. Only the first fault is kept; the result is
    /// the fault the machine is stopped on.
    pub fn record(&mut self, fault: Fault) -> Fault {
        match *self {
            FaultState::Running => {
                *self = FaultState::Faulted(fault);
                fault
            }
            FaultState::Faulted(first) => first,
        }
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, FaultState::Faulted(_))
    }

    pub fn fault(&self) -> Option<Fault> {
        match self {
            FaultState::Running => None,
            FaultState::Faulted(fault) => Some(*fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_match_table_order() {
        for (vector, exception) in Exception::ALL.iter().enumerate() {
            assert_eq!(exception.vector() as usize, vector);
            assert_eq!(Exception::from_vector(vector as u8), Some(*exception));
        }
        assert_eq!(Exception::from_vector(EXCEPTION_COUNT as u8), None);
    }

    #[test]
    fn diagnostics() {
        let page_fault = Fault::Exception {
            exception: Exception::PageFault,
            address: Some(VirtAddr::new(0xDEAD_B000)),
        };
        assert_eq!(page_fault.to_string(), "Page fault at 0xdeadb000");
        let divide = Fault::Exception {
            exception: Exception::DivideError,
            address: None,
        };
        assert_eq!(divide.to_string(), "Division by zero");
        assert_eq!(Fault::Unrecognized(0x30).to_string(), "Unknown interrupt (vector 0x30)");
    }

    #[test]
    fn faulted_is_terminal() {
        let mut state = FaultState::default();
        let first = Fault::Unrecognized(0x30);
        assert_eq!(state.record(first), first);
        assert_eq!(state.record(Fault::Unrecognized(0x31)), first);
        assert_eq!(state.fault(), Some(first));
        assert!(state.is_faulted());
    }
}
