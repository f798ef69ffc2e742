use vterm_kernel::arch::mock::{self, Event};
use vterm_kernel::interrupts::gdt::KERNEL_CODE_SELECTOR;
use vterm_kernel::interrupts::{GateKind, Irq, TrapFrame, SYSCALL_VECTOR};
use vterm_kernel::terminal::TerminalId;
use vterm_kernel::Resume;
use x86_64::PrivilegeLevel;

#[test]
fn every_vector_has_a_present_kernel_gate() {
    let kernel = mock::booted_kernel();
    for vector in 0..=255u8 {
        let gate = kernel.idt().gate(vector);
        assert!(gate.is_present(), "vector {:#04x}", vector);
        assert_eq!(gate.selector(), KERNEL_CODE_SELECTOR);
        assert_eq!(gate.offset(), mock::STUB_BASE + u32::from(vector) * mock::STUB_STRIDE);
    }
}

#[test]
fn only_the_system_call_is_reachable_from_ring_three() {
    let kernel = mock::booted_kernel();
    for vector in 0..=255u8 {
        let gate = kernel.idt().gate(vector);
        if vector == SYSCALL_VECTOR {
            assert_eq!(gate.privilege_level(), PrivilegeLevel::Ring3);
            assert_eq!(gate.kind(), Some(GateKind::Trap));
        } else {
            assert_eq!(gate.privilege_level(), PrivilegeLevel::Ring0, "vector {:#04x}", vector);
            assert_eq!(gate.kind(), Some(GateKind::Interrupt));
        }
    }
}

#[test]
fn each_device_interrupt_is_acknowledged_once() {
    let mut kernel = mock::booted_kernel();
    for irq in [Irq::Timer, Irq::Keyboard, Irq::Rtc] {
        kernel.machine_mut().cpu.queue_port_input(0x60, &[0x1E]);
        mock::raise(&mut kernel, irq.vector());
        assert_eq!(kernel.machine().pic.acknowledgements(irq.line()), 1, "{:?}", irq);
    }
}

#[test]
fn acknowledgment_comes_after_the_handler_body() {
    let mut kernel = mock::booted_kernel();
    kernel.machine_mut().cpu.clear_events();
    mock::raise(&mut kernel, Irq::Rtc.vector());
    let events = kernel.machine().cpu.events();
    let enabled = events.iter().position(|e| *e == Event::EnableInterrupts).unwrap();
    let acked = events
        .iter()
        .position(|e| *e == Event::Acknowledge(Irq::Rtc.line()))
        .unwrap();
    assert!(events[0] == Event::DisableInterrupts);
    assert!(enabled < acked);
}

#[test]
fn unknown_vector_stops_the_machine() {
    let mut kernel = mock::booted_kernel();
    assert_eq!(mock::raise(&mut kernel, 0x30), Resume::Halt);
    assert!(kernel.fault().is_some());
    assert!(!kernel.machine().cpu.interrupts_enabled());

    // Nothing runs after a fault.
    assert_eq!(mock::raise(&mut kernel, Irq::Timer.vector()), Resume::Halt);
    assert_eq!(kernel.scheduler().ticks(), 0);
}

#[test]
fn page_fault_reports_the_faulting_address() {
    let mut kernel = mock::booted_kernel();
    kernel.machine_mut().cpu.set_fault_address(0xDEAD_B000);
    let frame = TrapFrame::for_vector(14, false);
    let trap = mock::trap(&mut kernel, frame);
    assert_eq!(trap.resume, Resume::Halt);
    let report = format!("{}", kernel.fault().unwrap());
    assert!(report.contains("0xdeadb000"), "{}", report);
}

#[test]
fn alt_function_keys_switch_terminals() {
    let mut kernel = mock::booted_kernel();
    // Alt down, F2, F2 up, Alt up.
    for scancode in [0x38, 0x3C, 0xBC, 0xB8] {
        kernel.machine_mut().cpu.queue_port_input(0x60, &[scancode]);
        mock::raise(&mut kernel, Irq::Keyboard.vector());
    }
    let second = TerminalId::new(1).unwrap();
    assert_eq!(kernel.terminals().foreground(), second);
    assert_eq!(kernel.machine().console.focused(), second);
}
