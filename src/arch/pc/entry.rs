//! Interrupt stubs and the Rust half of the trap path.
//!
//! Each of the 256 stubs is 16 bytes: `cli`, a dummy error code when the
//! CPU pushes none, the vector number, then a jump to the common path. The
//! common path saves the general registers, calls [`interrupt_entry`] with
//! the frame address and switches `esp` to whatever frame it returns
//! before `popad; iretd`. A return value of zero parks the CPU.

use core::arch::global_asm;
use core::mem::size_of;
use core::ptr::addr_of;

use spin::Mutex;

use crate::arch::EntryPoints;
use crate::interrupts::dispatch::{EFLAGS_RESERVED, INTERRUPT_FLAG};
use crate::interrupts::gdt::{USER_CODE_SELECTOR, USER_DATA_SELECTOR};
use crate::interrupts::TrapFrame;
use crate::kernel::{Kernel, Resume};
use crate::process::UserEntry;

use super::PcPlatform;

/// The one kernel. Locked by the boot path until init is done, then only
/// by the trap path.
pub static KERNEL: Mutex<Option<Kernel<PcPlatform>>> = Mutex::new(None);

const STUB_STRIDE: u32 = 16;

global_asm!(
    ".section .text",
    ".macro VTERM_STUB vector",
    "    .balign 16",
    "    cli",
    "    .if (\\vector == 8) || ((\\vector >= 10) && (\\vector <= 14)) || (\\vector == 17) || (\\vector == 21)",
    "    .else",
    "    push 0",
    "    .endif",
    "    push \\vector",
    "    jmp vterm_interrupt_common",
    ".endm",
    "",
    ".balign 16",
    ".global vterm_interrupt_stubs",
    "vterm_interrupt_stubs:",
    ".set vterm_vector, 0",
    ".rept 256",
    "    VTERM_STUB vterm_vector",
    "    .set vterm_vector, vterm_vector + 1",
    ".endr",
    "",
    "vterm_interrupt_common:",
    "    pushad",
    "    cld",
    "    mov ax, {kernel_data}",
    "    mov ds, ax",
    "    mov es, ax",
    "    push esp",
    "    call {entry}",
    "    add esp, 4",
    "    test eax, eax",
    "    jz 3f",
    "    mov esp, eax",
    // cs of the frame being resumed: ring 3 gets the user data segment.
    "    mov ax, {kernel_data}",
    "    test dword ptr [esp + 44], 3",
    "    jz 2f",
    "    mov ax, {user_data}",
    "2:",
    "    mov ds, ax",
    "    mov es, ax",
    "    popad",
    "    add esp, 8",
    "    iretd",
    "3:",
    "    cli",
    "    hlt",
    "    jmp 3b",
    kernel_data = const 0x18,
    user_data = const 0x2B,
    entry = sym interrupt_entry,
);

extern "C" {
    static vterm_interrupt_stubs: u8;
}

pub fn entry_points() -> EntryPoints {
    // SAFETY: only the address of the symbol is taken.
    let base = unsafe { addr_of!(vterm_interrupt_stubs) } as u32;
    EntryPoints::uniform(base, STUB_STRIDE)
}

/// Ring-3 entry frame: a trap frame plus the user stack the CPU pops on
/// a privilege change.
#[repr(C)]
struct UserFrame {
    trap: TrapFrame,
    user_esp: u32,
    user_ss: u32,
}

extern "C" fn interrupt_entry(frame: *mut TrapFrame) -> u32 {
    let frame_address = frame as u32;
    let mut guard = KERNEL.lock();
    let Some(kernel) = guard.as_mut() else {
        return frame_address;
    };

    // SAFETY: the stub passes the frame it just pushed on this stack.
    let trap = unsafe { &mut *frame };
    kernel.machine_mut().cpu.set_lock_held(true);
    let resume = kernel.handle_interrupt(trap, frame_address);
    kernel.machine_mut().cpu.set_lock_held(false);

    match resume {
        Resume::Continue => frame_address,
        Resume::Switch(context) => context.esp,
        Resume::ReturnTo { context, value } => {
            // SAFETY: `context.esp` is a frame saved on a live kernel stack.
            unsafe { (*(context.esp as *mut TrapFrame)).eax = value as u32 };
            context.esp
        }
        Resume::EnterUser(entry) => build_user_frame(entry),
        Resume::Halt => {
            if let Some(fault) = kernel.fault() {
                kernel.machine_mut().console.report(format_args!("\n{}\n", fault));
            }
            0
        }
    }
}

fn build_user_frame(entry: UserEntry) -> u32 {
    let at = entry.kernel_stack_top - size_of::<UserFrame>() as u32;
    let frame = UserFrame {
        trap: TrapFrame {
            eip: entry.eip,
            cs: u32::from(USER_CODE_SELECTOR.0),
            eflags: EFLAGS_RESERVED | INTERRUPT_FLAG,
            ..TrapFrame::default()
        },
        user_esp: entry.esp,
        user_ss: u32::from(USER_DATA_SELECTOR.0),
    };
    // SAFETY: the top of the process's own kernel stack, which nothing
    // else uses while it is being entered.
    unsafe { (at as *mut UserFrame).write(frame) };
    at
}
