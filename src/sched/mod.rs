//! # Round-Robin Scheduler
//!
//! Driven only by the timer interrupt. Every `divisor`-th tick is a
//! scheduling decision:
//!
//! 1. The first three decisions launch one top-level program per
//!    terminal, in terminal order.
//! 2. After that, slots are scanned cyclically starting after the cursor.
//!    The first used slot without a child runs next; finding only the
//!    slot already running means no switch.
//!
//! The scheduler only decides. [`crate::Kernel`] carries the decision
//! out, since that needs the address space and the CPU.

use crate::config::{MAX_PROCESSES, NUM_TERMINALS};
use crate::process::{Pid, ProcessTable};
use crate::terminal::TerminalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Not a scheduling tick.
    Idle,
    /// Start the top-level program on this terminal.
    Launch(TerminalId),
    Switch(Pid),
    /// Nothing else is runnable.
    Stay,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    ticks: u64,
    divisor: u64,
    launched: usize,
    cursor: usize,
}

impl Scheduler {
    pub const fn new(divisor: u64) -> Self {
        Self {
            ticks: 0,
            // A zero divisor would never schedule.
            divisor: if divisor == 0 { 1 } else { divisor },
            launched: 0,
            cursor: 0,
        }
    }

    pub fn tick(&mut self, table: &ProcessTable) -> Decision {
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % self.divisor != 0 {
            return Decision::Idle;
        }

        if self.launched < NUM_TERMINALS {
            let terminal = TerminalId::new(self.launched);
            self.launched += 1;
            if let Some(terminal) = terminal {
                return Decision::Launch(terminal);
            }
        }

        match self.next_eligible(table) {
            Some(next) => {
                self.cursor = next.index();
                if table.current() == Some(next) {
                    Decision::Stay
                } else {
                    Decision::Switch(next)
                }
            }
            None => Decision::Stay,
        }
    }

    /// First used, childless slot after the cursor, wrapping once.
    pub fn next_eligible(&self, table: &ProcessTable) -> Option<Pid> {
        (1..=MAX_PROCESSES)
            .map(|step| (self.cursor + step) % MAX_PROCESSES)
            .filter_map(Pid::new)
            .find(|&pid| table.get(pid).is_some_and(|pcb| pcb.is_schedulable()))
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn launched(&self) -> usize {
        self.launched
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.launched >= NUM_TERMINALS
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
