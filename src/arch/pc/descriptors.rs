//! GDT and TSS for the running machine.

use core::arch::asm;
use core::mem::size_of;
use core::ptr::{addr_of, addr_of_mut};

use crate::interrupts::gdt::{
    flat_table, SegmentDescriptor, TaskStateSegment, GDT_ENTRIES, KERNEL_CODE_SELECTOR,
    KERNEL_DATA_SELECTOR, TSS_SELECTOR,
};

static mut TSS: TaskStateSegment = TaskStateSegment::new();
static mut GDT: [SegmentDescriptor; GDT_ENTRIES] = [SegmentDescriptor::NULL; GDT_ENTRIES];

/// Install the flat segments and the TSS, then reload every segment
/// register. Runs once, with interrupts off, before the kernel starts.
pub fn load(boot_stack_top: u32) {
    // SAFETY: single CPU, interrupts masked, nothing else has seen the
    // tables yet.
    unsafe {
        (*addr_of_mut!(TSS)).esp0 = boot_stack_top;
        let tss_base = addr_of!(TSS) as u32;
        *addr_of_mut!(GDT) = flat_table(tss_base);

        let mut operand = [0u8; 6];
        let limit = (size_of::<[SegmentDescriptor; GDT_ENTRIES]>() - 1) as u16;
        operand[..2].copy_from_slice(&limit.to_le_bytes());
        operand[2..].copy_from_slice(&(addr_of!(GDT) as u32).to_le_bytes());

        asm!(
            "lgdt [{gdtr}]",
            "push {code}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "mov ds, {data:x}",
            "mov es, {data:x}",
            "mov fs, {data:x}",
            "mov gs, {data:x}",
            "mov ss, {data:x}",
            "ltr {tss:x}",
            gdtr = in(reg) operand.as_ptr(),
            code = const KERNEL_CODE_SELECTOR.0,
            data = in(reg) u32::from(KERNEL_DATA_SELECTOR.0),
            tss = in(reg) u32::from(TSS_SELECTOR.0),
            tmp = out(reg) _,
        );
    }
}

/// Stack the CPU switches to on a trap from ring 3.
pub fn set_kernel_stack(top: u32) {
    // SAFETY: only written from the trap path, which runs with interrupts
    // masked on the single CPU.
    unsafe { (*addr_of_mut!(TSS)).esp0 = top };
}
