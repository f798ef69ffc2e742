use vterm_kernel::arch::mock::{self, MockPlatform};
use vterm_kernel::config::{PROGRAM_VIRTUAL_BASE, USER_VIDEO_VIRTUAL, VIDEO_MEMORY};
use vterm_kernel::interrupts::Irq;
use vterm_kernel::process::Pid;
use vterm_kernel::syscalls::SyscallNumber;
use vterm_kernel::terminal::TerminalId;
use vterm_kernel::{Kernel, Resume};

const SCRATCH: u32 = PROGRAM_VIRTUAL_BASE + 0x0030_0000;
const BUF: u32 = PROGRAM_VIRTUAL_BASE + 0x0030_1000;

fn shell() -> Kernel<MockPlatform> {
    let mut kernel = mock::booted_kernel();
    mock::run_decisions(&mut kernel, 1);
    kernel
}

fn call(kernel: &mut Kernel<MockPlatform>, number: SyscallNumber, a: u32, b: u32, c: u32) -> i32 {
    mock::syscall(kernel, number as u32, a, b, c).result()
}

#[test]
fn shell_session_reads_a_command_and_runs_it() {
    let mut kernel = shell();
    let terminal = TerminalId::FIRST;

    mock::write_user(&mut kernel, BUF, b"391OS> ").unwrap();
    assert_eq!(call(&mut kernel, SyscallNumber::Write, 1, BUF, 7), 7);

    kernel.machine_mut().console.submit(terminal, b"cat frame0.txt");
    let n = call(&mut kernel, SyscallNumber::Read, 0, BUF, 128);
    assert_eq!(n, 15);
    let mut line = mock::read_user(&mut kernel, BUF, n as usize).unwrap();
    line.pop();
    line.push(0);
    mock::write_user(&mut kernel, SCRATCH, &line).unwrap();

    // "cat" is not in the image.
    assert_eq!(call(&mut kernel, SyscallNumber::Execute, SCRATCH, 0, 0), -1);

    mock::write_user(&mut kernel, SCRATCH, b"ls frame0.txt\0").unwrap();
    let trap = mock::syscall(&mut kernel, SyscallNumber::Execute as u32, SCRATCH, 0, 0);
    assert!(matches!(trap.resume, Resume::EnterUser(_)));

    // The child sees its argument and opens it.
    assert_eq!(call(&mut kernel, SyscallNumber::GetArgs, SCRATCH, 32, 0), 0);
    let fd = call(&mut kernel, SyscallNumber::Open, SCRATCH, 0, 0);
    assert_eq!(fd, 2);
    let n = call(&mut kernel, SyscallNumber::Read, fd as u32, BUF, 64);
    assert!(n > 0);
    assert_eq!(call(&mut kernel, SyscallNumber::Write, 1, BUF, n as u32), n);
    assert_eq!(call(&mut kernel, SyscallNumber::Close, fd as u32, 0, 0), 0);

    let trap = mock::syscall(&mut kernel, SyscallNumber::Halt as u32, 3, 0, 0);
    assert!(matches!(trap.resume, Resume::ReturnTo { value: 3, .. }));
    let output = kernel.machine().console.output(terminal);
    assert!(output.starts_with(b"391OS> "));
    assert!(output.ends_with(b"fish /\\/\\/\\\n"));
}

#[test]
fn unknown_and_signal_calls_return_minus_one() {
    let mut kernel = shell();
    for number in [0, 9, 10, 11, 0xFFFF] {
        let trap = mock::syscall(&mut kernel, number, 0, 0, 0);
        assert_eq!(trap.resume, Resume::Continue);
        assert_eq!(trap.result(), -1, "call {}", number);
    }
}

#[test]
fn blocked_read_is_reissued_after_preemption() {
    let mut kernel = mock::booted_kernel();
    mock::run_decisions(&mut kernel, 3);
    mock::run_decisions(&mut kernel, 2);
    assert_eq!(kernel.processes().current(), Some(Pid::new(2).unwrap()));

    let trap = mock::syscall(&mut kernel, SyscallNumber::Read as u32, 0, BUF, 128);
    assert_eq!(trap.frame.eip, mock::USER_EIP - 2);
    assert_eq!(trap.resume, Resume::Continue);

    // The timer still moves on to the next shell.
    let next = mock::run_decisions(&mut kernel, 1).remove(0);
    assert!(matches!(next, Resume::Switch(_)));
    assert_eq!(kernel.processes().current(), Some(Pid::new(0).unwrap()));
}

#[test]
fn background_vidmap_targets_the_terminal_buffer() {
    let mut kernel = mock::booted_kernel();
    mock::run_decisions(&mut kernel, 2);
    assert_eq!(kernel.processes().current(), Some(Pid::new(1).unwrap()));

    assert_eq!(call(&mut kernel, SyscallNumber::VidMap, SCRATCH, 0, 0), 0);
    mock::write_user(&mut kernel, USER_VIDEO_VIRTUAL, b"B\x07").unwrap();
    assert_eq!(mock::read_physical(&kernel, VIDEO_MEMORY + 0x2000, 2), b"B\x07");
    assert_ne!(mock::read_physical(&kernel, VIDEO_MEMORY, 2), b"B\x07");
}

fn open_rtc(kernel: &mut Kernel<MockPlatform>) -> u32 {
    mock::write_user(kernel, SCRATCH, b"rtc\0").unwrap();
    call(kernel, SyscallNumber::Open, SCRATCH, 0, 0) as u32
}

/// Result of one RTC read, or `None` when the call will be reissued.
fn read_rtc(kernel: &mut Kernel<MockPlatform>, fd: u32) -> Option<i32> {
    let trap = mock::syscall(kernel, SyscallNumber::Read as u32, fd, BUF, 4);
    if trap.frame.eip == mock::USER_EIP - 2 {
        None
    } else {
        Some(trap.result())
    }
}

#[test]
fn rtc_waits_are_tracked_per_process() {
    let mut kernel = mock::booted_kernel();
    mock::run_decisions(&mut kernel, 5);
    let (first, second) = (Pid::new(2).unwrap(), Pid::new(0).unwrap());
    assert_eq!(kernel.processes().current(), Some(first));

    let first_fd = open_rtc(&mut kernel);
    assert_eq!(read_rtc(&mut kernel, first_fd), None);
    mock::raise(&mut kernel, Irq::Rtc.vector());

    // The tick belongs to the first waiter only.
    mock::run_decisions(&mut kernel, 1);
    assert_eq!(kernel.processes().current(), Some(second));
    let second_fd = open_rtc(&mut kernel);
    assert_eq!(read_rtc(&mut kernel, second_fd), None);

    mock::run_decisions(&mut kernel, 2);
    assert_eq!(kernel.processes().current(), Some(first));
    assert_eq!(read_rtc(&mut kernel, first_fd), Some(0));

    mock::run_decisions(&mut kernel, 1);
    assert_eq!(kernel.processes().current(), Some(second));
    assert_eq!(read_rtc(&mut kernel, second_fd), None);
    mock::raise(&mut kernel, Irq::Rtc.vector());
    assert_eq!(read_rtc(&mut kernel, second_fd), Some(0));

    // A completed read starts a fresh wait.
    assert_eq!(read_rtc(&mut kernel, second_fd), None);
}
