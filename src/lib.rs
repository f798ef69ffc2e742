//! # vterm-kernel
//!
//! Core of a single-CPU i386 kernel that multiplexes three virtual terminals
//! over a fixed pool of processes.
//!
//! ## Layout
//!
//! | Module       | Responsibility                                              |
//! |--------------|-------------------------------------------------------------|
//! | `interrupts` | IDT, gate descriptors, PIC, PIT, GDT/TSS, trap dispatch     |
//! | `memory`     | Page directory and tables, translation cache, video buffers |
//! | `process`    | Process control blocks, file descriptors, program loader    |
//! | `sched`      | Timer-driven round-robin decisions                          |
//! | `syscalls`   | `int 0x80` numbers, dispatcher and handlers                 |
//! | `kernel`     | The [`Kernel`] state value, init phases, status board       |
//! | `drivers`    | Collaborator interfaces (filesystem, console, RTC)          |
//! | `arch`       | Hardware boundary traits, host mock, bare-metal PC backend  |
//!
//! All mutable kernel state lives in one [`Kernel`] value. Hardware access
//! goes through [`arch::Platform`], so every policy in this crate runs on the
//! host against [`arch::mock::MockPlatform`].

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
pub mod logger;

pub mod arch;
pub mod config;
pub mod drivers;
pub mod interrupts;
pub mod kernel;
pub mod memory;
pub mod process;
pub mod sched;
pub mod syscalls;
pub mod terminal;

pub use config::KernelConfig;
pub use kernel::{Kernel, Resume};
