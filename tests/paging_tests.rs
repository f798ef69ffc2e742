use vterm_kernel::arch::mock::{self, Event, MockCpu};
use vterm_kernel::config::{PROGRAM_PHYSICAL_BASE, PROGRAM_VIRTUAL_BASE, LARGE_PAGE_SIZE};
use vterm_kernel::memory::{AccessMode, AddressSpace, PhysAddr, VirtAddr};

fn space() -> AddressSpace {
    let mut space = AddressSpace::new();
    space.init(mock::TABLE_LOCATIONS);
    space
}

#[test]
fn remapping_without_flush_serves_stale_translation() {
    let mut space = space();
    let mut cpu = MockCpu::new();
    let first = PhysAddr::new(PROGRAM_PHYSICAL_BASE);
    let second = PhysAddr::new(PROGRAM_PHYSICAL_BASE + LARGE_PAGE_SIZE);
    let addr = VirtAddr::new(PROGRAM_VIRTUAL_BASE + 0x48000);

    space.map_program(&mut cpu, first);
    assert_eq!(space.translate(addr, AccessMode::UserRead), Ok(first.offset(0x48000)));

    space.set_program_entry(second);
    assert_eq!(space.translate(addr, AccessMode::UserRead), Ok(first.offset(0x48000)));

    space.flush(&mut cpu);
    assert_eq!(space.translate(addr, AccessMode::UserRead), Ok(second.offset(0x48000)));
    assert!(cpu.events().contains(&Event::FlushTlb));
}

#[test]
fn boot_enables_paging_on_the_kernel_directory() {
    let kernel = mock::booted_kernel();
    let events = kernel.machine().cpu.events();
    let load = events
        .iter()
        .position(|e| *e == Event::LoadPageDirectory(mock::TABLE_LOCATIONS.directory))
        .unwrap();
    let enable = events.iter().position(|e| *e == Event::EnablePaging).unwrap();
    assert!(load < enable);
}

#[test]
fn each_process_gets_its_own_program_frame() {
    let mut kernel = mock::booted_kernel();
    mock::run_decisions(&mut kernel, 1);
    mock::write_user(&mut kernel, PROGRAM_VIRTUAL_BASE + 0x0020_0000, b"zero").unwrap();
    mock::run_decisions(&mut kernel, 1);
    mock::write_user(&mut kernel, PROGRAM_VIRTUAL_BASE + 0x0020_0000, b"one!").unwrap();

    assert_eq!(mock::read_physical(&kernel, PROGRAM_PHYSICAL_BASE + 0x0020_0000, 4), b"zero");
    assert_eq!(
        mock::read_physical(&kernel, PROGRAM_PHYSICAL_BASE + LARGE_PAGE_SIZE + 0x0020_0000, 4),
        b"one!"
    );
}

#[test]
fn loaded_image_sits_at_the_link_address() {
    let mut kernel = mock::booted_kernel();
    mock::run_decisions(&mut kernel, 1);
    let header = mock::read_user(&mut kernel, 0x0804_8000, 4).unwrap();
    assert_eq!(header, [0x7F, b'E', b'L', b'F']);
}
