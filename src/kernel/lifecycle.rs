//! Starting and stopping programs.
//!
//! `spawn` either returns a fully set up process that is already current,
//! or leaves the process table, the program mapping and the current
//! process exactly as they were.

use crate::arch::Platform;
use crate::drivers::{FileSystem, FileType};
use crate::kernel::{Kernel, Resume};
use crate::process::loader::{self, LoadError};
use crate::process::{Pid, ProcessError, SavedContext, UserEntry};
use crate::terminal::TerminalId;

fn display_name(name: &[u8]) -> &str {
    core::str::from_utf8(name).unwrap_or("<non-utf8>")
}

impl<P: Platform> Kernel<P> {
    /// Load `command` into a fresh slot and make it current.
    ///
    /// `caller` is where `parent` resumes once the new process halts.
    pub(crate) fn spawn(
        &mut self,
        command: &[u8],
        parent: Option<Pid>,
        terminal: TerminalId,
        caller: SavedContext,
    ) -> Result<UserEntry, ProcessError> {
        let command = loader::parse_command(command)?;
        let dentry = self
            .machine
            .fs
            .open_by_name(command.name)
            .map_err(|_| LoadError::NotFound)?;
        if dentry.file_type != FileType::Regular {
            return Err(LoadError::NotExecutable.into());
        }
        let entry = loader::entry_point(&self.machine.fs, dentry.inode)?;

        let pid = self.processes.allocate_slot(parent, terminal)?;
        if let Some(parent) = parent {
            if let Err(err) = self.processes.link_child(parent, pid) {
                self.processes.release_slot(pid);
                return Err(err);
            }
        }

        self.address_space
            .map_program(&mut self.machine.cpu, pid.program_base());
        if let Err(err) = loader::load_image(
            &self.machine.fs,
            dentry.inode,
            &mut self.address_space,
            &mut self.machine.memory,
        ) {
            self.abandon(pid, parent);
            return Err(err.into());
        }

        if let Some(pcb) = self.processes.get_mut(pid) {
            pcb.halt_context = caller;
            if let Err(err) = pcb.set_args(command.args) {
                self.abandon(pid, parent);
                return Err(err.into());
            }
        }

        self.enter(pid, terminal);
        log::info!(
            "{} runs {} on {}",
            pid,
            display_name(command.name),
            terminal
        );
        Ok(UserEntry::new(entry, pid.kernel_stack_top()))
    }

    /// Undo a half-built process and put the running program back.
    fn abandon(&mut self, pid: Pid, parent: Option<Pid>) {
        self.processes.release_slot(pid);
        if let Some(parent) = parent {
            self.processes.unlink_child(parent);
        }
        match self.processes.current() {
            Some(current) => self
                .address_space
                .map_program(&mut self.machine.cpu, current.program_base()),
            None => self.address_space.flush(&mut self.machine.cpu),
        }
    }

    /// End the running process. Its parent resumes in `execute` with
    /// `status`; a top-level process is replaced by a fresh one on the
    /// same terminal.
    pub(crate) fn halt(&mut self, status: u8) -> Result<Resume, ProcessError> {
        let pid = self.processes.current().ok_or(ProcessError::NoCurrentProcess)?;
        let mut pcb = self
            .processes
            .release_slot(pid)
            .ok_or(ProcessError::NoSuchProcess(pid))?;
        pcb.fds.close_all();
        log::info!("{} halted with status {}", pid, status);

        if let Some(parent) = pcb.parent.filter(|&parent| self.processes.is_used(parent)) {
            self.processes.unlink_child(parent);
            let terminal = self
                .processes
                .get(parent)
                .map_or(pcb.terminal, |p| p.terminal);
            self.enter(parent, terminal);
            return Ok(Resume::ReturnTo {
                context: pcb.halt_context,
                value: i32::from(status),
            });
        }

        let program = self.config.initial_program;
        match self.spawn(program, None, pcb.terminal, SavedContext::default()) {
            Ok(entry) => Ok(Resume::EnterUser(entry)),
            Err(err) => {
                log::error!("cannot restart {}: {}", pcb.terminal, err);
                Ok(self.resume_any())
            }
        }
    }

    /// Resume some runnable process when the running one is gone.
    fn resume_any(&mut self) -> Resume {
        let next = self.scheduler.next_eligible(&self.processes);
        let Some((pid, pcb)) = next.and_then(|pid| self.processes.get(pid).map(|pcb| (pid, pcb))) else {
            log::error!("no process left to run");
            return Resume::Halt;
        };
        let (terminal, context) = (pcb.terminal, pcb.context);
        if context.is_empty() {
            return Resume::Halt;
        }
        self.enter(pid, terminal);
        Resume::Switch(context)
    }
}
