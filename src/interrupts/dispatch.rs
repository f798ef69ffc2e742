//! # Trap Dispatch
//!
//! Every vector enters through a stub that pushes a dummy error code when
//! the CPU does not, the vector number, then all general registers. The
//! stub hands the resulting [`TrapFrame`] to [`Kernel::handle_interrupt`]
//! and acts on the returned [`Resume`].
//!
//! ```text
//!  higher addresses
//!  ┌──────────────┐
//!  │ user ss, esp │  only when the trap came from ring 3
//!  │ eflags       │
//!  │ cs           │
//!  │ eip          │
//!  │ error code   │  real or dummy
//!  │ vector       │
//!  │ eax .. edi   │  pushal
//!  └──────────────┘ ◀── frame address
//! ```

use crate::arch::{Cpu, InterruptController, Platform};
use crate::drivers::keyboard::DATA_PORT;
use crate::drivers::{Console, ConsoleEvent, RtcDevice};
use crate::interrupts::exceptions::{Exception, Fault};
use crate::interrupts::gdt::{KERNEL_CODE_SELECTOR, USER_CODE_SELECTOR};
use crate::interrupts::idt::Handler;
use crate::interrupts::pic::Irq;
use crate::kernel::{Kernel, Resume};
use crate::memory::video::user_video_frame;
use crate::process::{Pid, SavedContext};
use crate::sched::Decision;
use crate::terminal::TerminalId;

/// IF in EFLAGS.
pub const INTERRUPT_FLAG: u32 = 1 << 9;
/// Bit 1 of EFLAGS always reads as one.
pub const EFLAGS_RESERVED: u32 = 1 << 1;

/// Register image pushed by the entry stubs, lowest address first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct TrapFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Kernel esp before `pushal`; ignored by `popal`.
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

impl TrapFrame {
    /// A frame as a stub would build it for `vector`, interrupting either
    /// user or kernel code.
    pub fn for_vector(vector: u8, from_user: bool) -> Self {
        let cs = if from_user {
            USER_CODE_SELECTOR
        } else {
            KERNEL_CODE_SELECTOR
        };
        Self {
            vector: u32::from(vector),
            cs: u32::from(cs.0),
            eflags: EFLAGS_RESERVED | INTERRUPT_FLAG,
            ..Self::default()
        }
    }

    pub fn from_user(&self) -> bool {
        self.cs & 0b11 == 3
    }
}

impl<P: Platform> Kernel<P> {
    /// Route one trap. `frame_address` is where `frame` lives on the
    /// interrupted process's kernel stack.
    pub fn handle_interrupt(&mut self, frame: &mut TrapFrame, frame_address: u32) -> Resume {
        if self.fault.is_faulted() {
            return Resume::Halt;
        }
        let vector = frame.vector as u8;
        match self.idt.route(vector) {
            Handler::Ignored => self.fatal(Fault::Unrecognized(vector)),
            Handler::Exception(exception) => {
                let address = (exception == Exception::PageFault)
                    .then(|| self.machine.cpu.fault_address());
                self.fatal(Fault::Exception { exception, address })
            }
            Handler::Irq(Irq::Timer) => {
                self.service_irq(Irq::Timer, |kernel| kernel.on_timer(frame, frame_address))
            }
            Handler::Irq(Irq::Keyboard) => self.service_irq(Irq::Keyboard, Self::on_keyboard),
            Handler::Irq(Irq::Rtc) => self.service_irq(Irq::Rtc, |kernel| {
                kernel.machine.rtc.handle_interrupt();
                Resume::Continue
            }),
            Handler::Irq(irq) => self.service_irq(irq, |_| Resume::Continue),
            Handler::Syscall => self.on_syscall(frame, frame_address),
        }
    }

    /// Hardware interrupt contract: body with interrupts masked, then one
    /// acknowledgment after the body.
    pub(crate) fn service_irq<F>(&mut self, irq: Irq, body: F) -> Resume
    where
        F: FnOnce(&mut Self) -> Resume,
    {
        self.machine.cpu.disable_interrupts();
        let resume = body(self);
        self.machine.cpu.enable_interrupts();
        self.machine.pic.acknowledge(irq.line());
        resume
    }

    /// Terminal state: mask interrupts and report the first fault.
    pub(crate) fn fatal(&mut self, fault: Fault) -> Resume {
        self.machine.cpu.disable_interrupts();
        let fault = self.fault.record(fault);
        log::error!("{}", fault);
        Resume::Halt
    }

    fn on_timer(&mut self, frame: &TrapFrame, frame_address: u32) -> Resume {
        match self.scheduler.tick(&self.processes) {
            Decision::Idle | Decision::Stay => Resume::Continue,
            Decision::Launch(terminal) => self.launch(terminal, frame, frame_address),
            Decision::Switch(pid) => self.switch_to(pid, frame, frame_address),
        }
    }

    fn launch(&mut self, terminal: TerminalId, frame: &TrapFrame, frame_address: u32) -> Resume {
        self.save_current(frame, frame_address);
        let program = self.config.initial_program;
        match self.spawn(program, None, terminal, SavedContext::default()) {
            Ok(entry) => Resume::EnterUser(entry),
            Err(err) => {
                log::warn!("cannot start the program on {}: {}", terminal, err);
                Resume::Continue
            }
        }
    }

    pub(crate) fn save_current(&mut self, frame: &TrapFrame, frame_address: u32) {
        if let Some(pcb) = self.processes.lookup_current_mut() {
            pcb.context = SavedContext::capture(frame, frame_address);
        }
    }

    /// Suspend the running process and resume `next`.
    fn switch_to(&mut self, next: Pid, frame: &TrapFrame, frame_address: u32) -> Resume {
        let Some(incoming) = self.processes.get(next) else {
            return Resume::Continue;
        };
        let (terminal, context) = (incoming.terminal, incoming.context);
        if context.is_empty() {
            log::warn!("{} has no saved context", next);
            return Resume::Continue;
        }

        self.save_current(frame, frame_address);
        self.enter(next, terminal);
        log::trace!("switch to {} at {:#010x}", next, context.esp);
        Resume::Switch(context)
    }

    /// Make `pid` the running process: video, program image, kernel stack.
    pub(crate) fn enter(&mut self, pid: Pid, terminal: TerminalId) {
        let foreground = self.terminals.foreground();
        self.address_space
            .retarget_user_video(user_video_frame(terminal, foreground));
        self.address_space
            .map_program(&mut self.machine.cpu, pid.program_base());
        self.machine.cpu.set_kernel_stack(pid.kernel_stack_top());
        self.processes.set_current(Some(pid));
    }

    fn on_keyboard(&mut self) -> Resume {
        let scancode = self.machine.cpu.read_port(DATA_PORT);
        let foreground = self.terminals.foreground();
        if let ConsoleEvent::SwitchTerminal(target) =
            self.machine.console.process_scancode(scancode, foreground)
        {
            self.switch_terminal(target);
        }
        Resume::Continue
    }

    /// Bring `target` to the front and re-aim the running process's video
    /// page.
    pub fn switch_terminal(&mut self, target: TerminalId) {
        if !self.terminals.switch_to(&mut self.machine.memory, target) {
            return;
        }
        self.machine.console.focus(target);
        log::debug!("foreground is now {}", target);
        if let Some(owner) = self.processes.lookup_current().map(|pcb| pcb.terminal) {
            self.address_space
                .retarget_user_video(user_video_frame(owner, target));
            self.address_space.flush(&mut self.machine.cpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::{self, Event};
    use crate::config::PROGRAM_PHYSICAL_BASE;

    #[test]
    fn trap_frame_layout() {
        assert_eq!(core::mem::size_of::<TrapFrame>(), 13 * 4);
        assert!(TrapFrame::for_vector(0x80, true).from_user());
        assert!(!TrapFrame::for_vector(0x20, false).from_user());
    }

    #[test]
    fn unclaimed_vector_is_fatal() {
        let mut kernel = mock::booted_kernel();
        assert_eq!(mock::raise(&mut kernel, 0x30), Resume::Halt);
        assert_eq!(kernel.fault(), Some(Fault::Unrecognized(0x30)));
        assert!(!kernel.machine().cpu.interrupts_enabled());
    }

    #[test]
    fn page_fault_records_cr2() {
        let mut kernel = mock::booted_kernel();
        kernel.machine_mut().cpu.set_fault_address(0xDEAD_0000);
        assert_eq!(mock::raise(&mut kernel, 0x0E), Resume::Halt);
        assert_eq!(
            kernel.fault().map(|fault| fault.to_string()),
            Some("Page fault at 0xdead0000".into())
        );
    }

    #[test]
    fn faulted_kernel_ignores_later_interrupts() {
        let mut kernel = mock::booted_kernel();
        mock::raise(&mut kernel, 0x00);
        kernel.machine_mut().cpu.clear_events();
        assert_eq!(mock::raise(&mut kernel, 0x20), Resume::Halt);
        assert!(kernel.machine().cpu.events().is_empty());
        assert_eq!(kernel.scheduler().ticks(), 0);
    }

    #[test]
    fn irq_is_acknowledged_once_after_the_body() {
        let mut kernel = mock::booted_kernel();
        kernel.machine_mut().cpu.clear_events();
        mock::raise(&mut kernel, Irq::Rtc.vector());
        assert_eq!(
            kernel.machine().cpu.events(),
            vec![
                Event::DisableInterrupts,
                Event::EnableInterrupts,
                Event::Acknowledge(Irq::Rtc.line()),
            ]
        );
        assert_eq!(kernel.machine().rtc.interrupts(), 1);
    }

    #[test]
    fn launch_enters_user_mode_on_its_own_stack() {
        let mut kernel = mock::booted_kernel();
        mock::raise(&mut kernel, Irq::Timer.vector());
        let resume = mock::raise(&mut kernel, Irq::Timer.vector());
        let pid0 = Pid::new(0).unwrap();
        match resume {
            Resume::EnterUser(entry) => {
                assert_eq!(entry.kernel_stack_top, pid0.kernel_stack_top());
                assert_eq!(entry.eip, mock::PROGRAM_ENTRY);
            }
            other => panic!("expected user entry, got {:?}", other),
        }
        assert_eq!(kernel.processes().current(), Some(pid0));
        assert_eq!(kernel.machine().cpu.kernel_stack(), 0x0080_0000);
        assert_eq!(
            kernel.address_space().program_base().map(|b| b.as_u32()),
            Some(PROGRAM_PHYSICAL_BASE)
        );
    }
}
