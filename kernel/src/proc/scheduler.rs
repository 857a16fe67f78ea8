//! Timer-driven preemption over the registry.

use crate::proc::context::CpuState;
use crate::proc::quantum::{self, Verdict};
use crate::proc::registry::Registry;
use crate::proc::switch::{self, InterruptedState};

pub struct Scheduler {
    registry: Registry,
    switches: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            switches: 0,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Context switches performed so far
    pub fn switches(&self) -> u64 {
        self.switches
    }

    /// One timer tick. Must run with interrupts disabled.
    ///
    /// Never touches the heap: a thread that exited is released by the next `create`, `kill` or
    /// `exit`, which run outside the interrupt handler.
    ///
    /// Returns the register file to resume when the running thread's quantum has expired; its
    /// own state has then already been saved and its successor made current. `None` means keep
    /// running the interrupted thread untouched.
    pub fn tick(&mut self, state: &InterruptedState, now: u64) -> Option<CpuState> {
        let quantum = quantum::fair_quantum(self.registry.count());
        let current = self.registry.current_context_mut();

        if quantum::check_deadline(current, quantum, now) == Verdict::Stay {
            return None;
        }

        switch::save(current, state);
        let from = current.pid;

        let next = self.registry.advance();
        self.switches += 1;

        let target = self.registry.context(next);
        log::trace!(
            "Switching pid {} -> pid {} ('{}') at tick {}",
            from,
            target.pid,
            target.name,
            now
        );

        Some(target.cpu)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
