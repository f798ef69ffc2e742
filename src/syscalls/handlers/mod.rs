//! # System Call Handlers
//!
//! ## Modules
//!
//! - `process`: halt, execute, getargs
//! - `io`: read, write, open, close
//! - `memory`: vidmap
//!
//! ## Handler Signature
//!
//! Each handler borrows the kernel and takes its arguments from registers:
//! ```ignore
//! fn sys_write<P: Platform>(kernel: &mut Kernel<P>, fd: i32, buf: u32, nbytes: i32) -> SyscallResult
//! ```

pub mod io;
pub mod memory;
pub mod process;
