//! # Interrupts
//!
//! Descriptor tables and the single entry point every trap goes through.
//!
//! ## Submodules
//!
//! - `idt`: gate descriptors, the 256-entry table and its routing
//! - `exceptions`: CPU exception names and the fatal-fault state machine
//! - `pic`: IRQ lines and the cascaded 8259 driver
//! - `timer`: 8253/8254 PIT programming
//! - `gdt`: flat segments, selectors and the task state segment
//! - `dispatch`: trap frame layout and [`crate::Kernel::handle_interrupt`]
//!
//! ## Vector Layout
//!
//! | Vector      | Source                      | Gate      | DPL |
//! |-------------|-----------------------------|-----------|-----|
//! | 0x00-0x15   | CPU exceptions              | interrupt | 0   |
//! | 0x20        | PIT, IRQ0                   | interrupt | 0   |
//! | 0x21        | keyboard, IRQ1              | interrupt | 0   |
//! | 0x28        | RTC, IRQ8                   | interrupt | 0   |
//! | 0x80        | system call                 | trap      | 3   |
//! | others      | "Unknown interrupt", fatal  | interrupt | 0   |

pub mod dispatch;
pub mod exceptions;
pub mod gdt;
pub mod idt;
pub mod pic;
pub mod timer;

pub use dispatch::TrapFrame;
pub use exceptions::{Exception, Fault, FaultState};
pub use idt::{GateDescriptor, GateKind, Handler, InterruptDescriptorTable};
pub use pic::Irq;

pub const SYSCALL_VECTOR: u8 = 0x80;
