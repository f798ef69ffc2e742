use vterm_kernel::arch::mock::{self, MockPlatform};
use vterm_kernel::config::{PROGRAM_VIRTUAL_BASE, USER_VIDEO_VIRTUAL, VIDEO_MEMORY};
use vterm_kernel::process::Pid;
use vterm_kernel::syscalls::SyscallNumber;
use vterm_kernel::terminal::TerminalId;
use vterm_kernel::{Kernel, KernelConfig, Resume};

fn pid(index: usize) -> Pid {
    Pid::new(index).unwrap()
}

fn bootstrapped() -> Kernel<MockPlatform> {
    let mut kernel = mock::booted_kernel();
    mock::run_decisions(&mut kernel, 3);
    kernel
}

fn switched_to(resume: Resume) -> u32 {
    match resume {
        Resume::Switch(context) => context.esp,
        other => panic!("expected a switch, got {:?}", other),
    }
}

fn frame_of(pid: Pid) -> u32 {
    pid.kernel_stack_top() - mock::FRAME_DEPTH
}

#[test]
fn bootstrap_launches_one_shell_per_terminal() {
    let mut kernel = mock::booted_kernel();
    let decisions = mock::run_decisions(&mut kernel, 3);

    for (index, resume) in decisions.into_iter().enumerate() {
        match resume {
            Resume::EnterUser(entry) => {
                assert_eq!(entry.kernel_stack_top, pid(index).kernel_stack_top());
                assert_eq!(entry.eip, mock::PROGRAM_ENTRY);
            }
            other => panic!("decision {} was {:?}", index, other),
        }
        let pcb = kernel.processes().get(pid(index)).unwrap();
        assert_eq!(pcb.terminal, TerminalId::new(index).unwrap());
        assert_eq!(pcb.parent, None);
    }
    assert!(kernel.scheduler().is_bootstrapped());
    assert_eq!(kernel.processes().current(), Some(pid(2)));
    assert_eq!(kernel.terminals().foreground(), TerminalId::FIRST);
}

#[test]
fn fourth_decision_resumes_slot_one() {
    let mut kernel = bootstrapped();
    let resume = mock::run_decisions(&mut kernel, 1).remove(0);
    assert_eq!(switched_to(resume), frame_of(pid(1)));
    assert_eq!(kernel.processes().current(), Some(pid(1)));
    assert_eq!(kernel.machine().cpu.kernel_stack(), pid(1).kernel_stack_top());
}

#[test]
fn round_robin_visits_every_shell() {
    let mut kernel = bootstrapped();
    let order: Vec<u32> = mock::run_decisions(&mut kernel, 6)
        .into_iter()
        .map(switched_to)
        .collect();
    let expected: Vec<u32> = [1, 2, 0, 1, 2, 0].iter().map(|&i| frame_of(pid(i))).collect();
    assert_eq!(order, expected);
}

#[test]
fn only_scheduling_ticks_switch() {
    let config = KernelConfig {
        schedule_divisor: 5,
        ..KernelConfig::default()
    };
    let mut kernel = mock::kernel_with(config);
    kernel.init().unwrap();
    for _ in 0..4 {
        assert_eq!(mock::raise(&mut kernel, 0x20), Resume::Continue);
    }
    assert!(matches!(mock::raise(&mut kernel, 0x20), Resume::EnterUser(_)));
}

#[test]
fn parent_waits_while_its_child_runs() {
    let mut kernel = bootstrapped();
    mock::run_decisions(&mut kernel, 1);
    assert_eq!(kernel.processes().current(), Some(pid(1)));

    let command = PROGRAM_VIRTUAL_BASE + 0x0030_0000;
    mock::write_user(&mut kernel, command, b"ls\0").unwrap();
    let trap = mock::syscall(&mut kernel, SyscallNumber::Execute as u32, command, 0, 0);
    assert!(matches!(trap.resume, Resume::EnterUser(_)));
    assert_eq!(kernel.processes().current(), Some(pid(3)));

    // Slot 1 has a child, so it is skipped until the child halts.
    let order: Vec<u32> = mock::run_decisions(&mut kernel, 4)
        .into_iter()
        .map(switched_to)
        .collect();
    let expected: Vec<u32> = [2, 3, 0, 2].iter().map(|&i| frame_of(pid(i))).collect();
    assert_eq!(order, expected);

    // Run the child again and let it halt.
    mock::run_decisions(&mut kernel, 1);
    assert_eq!(kernel.processes().current(), Some(pid(3)));
    let trap = mock::syscall(&mut kernel, SyscallNumber::Halt as u32, 0, 0, 0);
    assert!(matches!(trap.resume, Resume::ReturnTo { .. }));
    assert_eq!(kernel.processes().current(), Some(pid(1)));
    assert!(kernel.processes().get(pid(1)).unwrap().is_schedulable());
}

fn video_target(kernel: &Kernel<MockPlatform>) -> Option<u32> {
    kernel.address_space().user_video_target().map(|addr| addr.as_u32())
}

#[test]
fn user_video_follows_the_running_process_and_the_foreground() {
    let mut kernel = bootstrapped();
    let pointer = PROGRAM_VIRTUAL_BASE + 0x0030_0000;
    let trap = mock::syscall(&mut kernel, SyscallNumber::VidMap as u32, pointer, 0, 0);
    assert_eq!(trap.result(), 0);
    assert_eq!(video_target(&kernel), Some(VIDEO_MEMORY + 0x3000));

    // Terminal 0 stays in front while the shells rotate.
    let expected = [(1, VIDEO_MEMORY + 0x2000), (2, VIDEO_MEMORY + 0x3000), (0, VIDEO_MEMORY)];
    for (index, target) in expected {
        mock::run_decisions(&mut kernel, 1);
        assert_eq!(kernel.processes().current(), Some(pid(index)));
        assert_eq!(video_target(&kernel), Some(target), "pid {}", index);
    }

    // Bringing terminal 1 forward sends pid 0 to its own buffer.
    kernel.switch_terminal(TerminalId::new(1).unwrap());
    assert_eq!(video_target(&kernel), Some(VIDEO_MEMORY + 0x1000));
    mock::write_user(&mut kernel, USER_VIDEO_VIRTUAL, b"0\x07").unwrap();
    assert_eq!(mock::read_physical(&kernel, VIDEO_MEMORY + 0x1000, 2), b"0\x07");

    mock::run_decisions(&mut kernel, 1);
    assert_eq!(kernel.processes().current(), Some(pid(1)));
    assert_eq!(video_target(&kernel), Some(VIDEO_MEMORY));
}
