//! System call numbers, passed in eax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyscallNumber {
    // Process Management
    Halt = 1,
    Execute = 2,

    // I/O Operations
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,

    // Process Management
    GetArgs = 7,

    // Memory Management
    VidMap = 8,

    // Signals
    SetHandler = 9,
    SigReturn = 10,

    // Unknown
    Unknown = u32::MAX,
}

impl From<u32> for SyscallNumber {
    fn from(num: u32) -> Self {
        match num {
            1 => Self::Halt,
            2 => Self::Execute,
            3 => Self::Read,
            4 => Self::Write,
            5 => Self::Open,
            6 => Self::Close,
            7 => Self::GetArgs,
            8 => Self::VidMap,
            9 => Self::SetHandler,
            10 => Self::SigReturn,
            _ => Self::Unknown,
        }
    }
}
