//! Memory Management System Calls

use crate::arch::Platform;
use crate::config::{LARGE_PAGE_SIZE, PROGRAM_VIRTUAL_BASE, USER_VIDEO_VIRTUAL};
use crate::kernel::Kernel;
use crate::memory::video::user_video_frame;
use crate::syscalls::{Completion, SyscallError, SyscallResult};

/// Map text-mode video memory into the caller and store its user address
/// at `screen_start`, which must lie inside the program page.
///
/// A process on a background terminal gets its terminal's buffer instead
/// of the display.
pub fn sys_vidmap<P: Platform>(kernel: &mut Kernel<P>, screen_start: u32) -> SyscallResult {
    let last = PROGRAM_VIRTUAL_BASE + LARGE_PAGE_SIZE - 4;
    if !(PROGRAM_VIRTUAL_BASE..=last).contains(&screen_start) {
        return Err(SyscallError::BadAddress);
    }

    let terminal = kernel.caller()?.terminal;
    let frame = user_video_frame(terminal, kernel.terminals.foreground());
    kernel
        .address_space
        .map_user_video(&mut kernel.machine.cpu, frame);
    kernel.copy_to_user(screen_start, &USER_VIDEO_VIRTUAL.to_le_bytes())?;
    Ok(Completion::Return(0))
}

#[cfg(test)]
mod tests {
    use crate::arch::mock;
    use crate::config::{PROGRAM_VIRTUAL_BASE, USER_VIDEO_VIRTUAL, VIDEO_MEMORY};
    use crate::syscalls::SyscallNumber;

    #[test]
    fn maps_video_and_reports_address() {
        let mut kernel = mock::booted_kernel();
        mock::run_decisions(&mut kernel, 1);
        let slot = PROGRAM_VIRTUAL_BASE + 0x0010_0000;

        let trap = mock::syscall(&mut kernel, SyscallNumber::VidMap as u32, slot, 0, 0);
        assert_eq!(trap.result(), 0);
        assert_eq!(
            mock::read_user(&mut kernel, slot, 4).unwrap(),
            USER_VIDEO_VIRTUAL.to_le_bytes()
        );
        assert_eq!(
            kernel.address_space().user_video_target().map(|t| t.as_u32()),
            Some(VIDEO_MEMORY)
        );

        mock::write_user(&mut kernel, USER_VIDEO_VIRTUAL, b"A\x07").unwrap();
        assert_eq!(mock::read_physical(&kernel, VIDEO_MEMORY, 2), b"A\x07");
    }

    #[test]
    fn pointer_outside_program_page_fails() {
        let mut kernel = mock::booted_kernel();
        mock::run_decisions(&mut kernel, 1);
        for bad in [0, 0x0040_0000, PROGRAM_VIRTUAL_BASE - 4, PROGRAM_VIRTUAL_BASE + 0x0040_0000 - 3] {
            let trap = mock::syscall(&mut kernel, SyscallNumber::VidMap as u32, bad, 0, 0);
            assert_eq!(trap.result(), -1, "pointer {:#x}", bad);
        }
        assert_eq!(kernel.address_space().user_video_target(), None);
    }
}
