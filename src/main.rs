//! Multiboot entry for the i386 PC.
//!
//! The bootloader drops us in 32-bit protected mode with paging off, the
//! magic in eax and the multiboot information pointer in ebx. The first
//! boot module is the read-only filesystem image.

#![no_std]
#![no_main]

use core::arch::{asm, global_asm};
use core::panic::PanicInfo;
use core::ptr::{addr_of, addr_of_mut};

use log::LevelFilter;
use vterm_kernel::arch::pc::{self, descriptors, entry, serial, CmosRtc, PcCpu, PcMemory, PcPorts, VgaConsole};
use vterm_kernel::arch::Machine;
use vterm_kernel::drivers::bootfs::BootFs;
use vterm_kernel::interrupts::pic::ChainedPics;
use vterm_kernel::{kprintln, Kernel, KernelConfig};

const MULTIBOOT_MAGIC: u32 = 0x2BAD_B002;
/// `flags` bit 3: `mods_count` and `mods_addr` are valid.
const MULTIBOOT_MODULES: u32 = 1 << 3;
const BOOT_STACK_SIZE: usize = 128 * 1024;
const BOOT_IMAGE_CAPACITY: usize = 2 * 1024 * 1024;

global_asm!(
    ".section .multiboot, \"a\"",
    ".balign 4",
    ".long 0x1BADB002",
    ".long 0x00000003",
    ".long -(0x1BADB002 + 0x00000003)",
    "",
    ".section .text",
    ".global _start",
    "_start:",
    "    cli",
    "    lea esp, [{stack} + {stack_size}]",
    "    push ebx",
    "    push eax",
    "    call {main}",
    "2:",
    "    hlt",
    "    jmp 2b",
    stack = sym BOOT_STACK,
    stack_size = const BOOT_STACK_SIZE,
    main = sym kernel_main,
);

#[repr(C, align(16))]
struct BootStack([u8; BOOT_STACK_SIZE]);

static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

/// The filesystem image, copied out of low memory before paging hides it.
static mut BOOT_IMAGE: [u8; BOOT_IMAGE_CAPACITY] = [0; BOOT_IMAGE_CAPACITY];

#[repr(C)]
struct MultibootInfo {
    flags: u32,
    mem_lower: u32,
    mem_upper: u32,
    boot_device: u32,
    cmdline: u32,
    mods_count: u32,
    mods_addr: u32,
}

#[repr(C)]
struct MultibootModule {
    start: u32,
    end: u32,
    string: u32,
    reserved: u32,
}

/// Copy the first boot module into [`BOOT_IMAGE`].
///
/// # Safety
///
/// `info` must be the pointer the bootloader passed, with paging still off.
unsafe fn load_boot_image(info: *const MultibootInfo) -> Result<&'static [u8], &'static str> {
    let info = &*info;
    if info.flags & MULTIBOOT_MODULES == 0 || info.mods_count == 0 {
        return Err("no boot module");
    }
    let module = &*(info.mods_addr as *const MultibootModule);
    let len = module.end.saturating_sub(module.start) as usize;
    if len > BOOT_IMAGE_CAPACITY {
        return Err("boot module too large");
    }
    let image = &mut *addr_of_mut!(BOOT_IMAGE);
    core::ptr::copy_nonoverlapping(module.start as *const u8, image.as_mut_ptr(), len);
    Ok(&image[..len])
}

extern "C" fn kernel_main(magic: u32, info: *const MultibootInfo) -> ! {
    serial::SERIAL.lock().init();
    if vterm_kernel::logger::init(serial::write, LevelFilter::Info).is_err() {
        kprintln!("logger already registered");
    }

    let stack_top = unsafe { addr_of!(BOOT_STACK) } as u32 + BOOT_STACK_SIZE as u32;
    descriptors::load(stack_top);

    if magic != MULTIBOOT_MAGIC {
        stop(format_args!("not started by a multiboot loader ({:#x})", magic));
    }
    // SAFETY: straight from the bootloader, paging is still off.
    let image = match unsafe { load_boot_image(info) } {
        Ok(image) => image,
        Err(err) => stop(format_args!("{}", err)),
    };
    let fs = match BootFs::new(image) {
        Ok(fs) => fs,
        Err(err) => stop(format_args!("bad filesystem image: {}", err)),
    };

    let machine = Machine {
        cpu: PcCpu::new(),
        pic: ChainedPics::new(PcPorts),
        memory: PcMemory,
        fs,
        console: VgaConsole::new(),
        rtc: CmosRtc::new(),
        entry_points: entry::entry_points(),
    };

    let booted = {
        let mut guard = entry::KERNEL.lock();
        let kernel = guard.insert(Kernel::new(machine, KernelConfig::default()));
        kernel.machine_mut().cpu.set_lock_held(true);
        let booted = kernel.init();
        kernel.machine_mut().cpu.set_lock_held(false);
        booted
    };
    if let Err(err) = booted {
        stop(format_args!("boot failed: {}", err));
    }

    // From here on the kernel only runs inside traps.
    pc::enable_interrupts();
    loop {
        unsafe { asm!("hlt", options(nomem, nostack)) };
    }
}

fn stop(args: core::fmt::Arguments) -> ! {
    kprintln!("{}", args);
    loop {
        unsafe { asm!("cli", "hlt", options(nomem, nostack)) };
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    stop(format_args!("KERNEL PANIC: {}", info))
}
