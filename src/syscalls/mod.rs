//! # System Calls
//!
//! `int 0x80` from ring 3. The number is in eax, up to three arguments in
//! ebx, ecx and edx; the result goes back in eax, -1 on any error.
//!
//! | eax | Call       | Arguments                   |
//! |-----|------------|-----------------------------|
//! | 1   | halt       | status                      |
//! | 2   | execute    | command                     |
//! | 3   | read       | fd, buf, nbytes             |
//! | 4   | write      | fd, buf, nbytes             |
//! | 5   | open       | filename                    |
//! | 6   | close      | fd                          |
//! | 7   | getargs    | buf, nbytes                 |
//! | 8   | vidmap     | screen_start                |
//! | 9   | set_handler| always -1                   |
//! | 10  | sigreturn  | always -1                   |
//!
//! Every pointer is checked by translating it through the caller's page
//! tables with user privileges; a bad pointer fails the call, never the
//! kernel.

pub mod dispatcher;
pub mod handlers;
pub mod numbers;

pub use dispatcher::{Completion, SyscallContext, SyscallError, SyscallResult};
pub use numbers::SyscallNumber;
