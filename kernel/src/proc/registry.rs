//! The set of live thread contexts.
//!
//! Records sit in an arena and are chained in creation order through `ThreadContext::next`. The
//! base context is installed in slot 0 when the registry is built, is always the head of the
//! chain and is never removed. Exactly one record is current.

use crate::arch::Eflags;
use crate::proc::context::{Pid, Stack, ThreadContext, ThreadId};
use crate::proc::error::ThreadError;

use alloc::vec::Vec;
use core::fmt;

/// What `kill` took out of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Killed {
    /// Some other thread; it is gone and its memory released.
    Other,
    /// The running thread itself. The caller has to resume the new current thread without
    /// saving anything, exactly as after `exit`.
    Current(ThreadId),
}

pub struct Registry {
    slots: Vec<Option<ThreadContext>>,
    current: ThreadId,

    /// A thread that removed itself. Its stack is still the one executing until the CPU is
    /// handed to another thread, so it is released by the next `create`, `exit` or `kill` instead.
    retired: Option<ThreadContext>,
}

impl Registry {
    /// Install the base context as head and current.
    pub fn new() -> Self {
        let mut slots = Vec::new();
        slots.push(Some(ThreadContext::base()));

        log::trace!("Thread registry initialised with the base context");

        Self {
            slots,
            current: ThreadId::BASE,
            retired: None,
        }
    }

    pub fn head(&self) -> ThreadId {
        ThreadId::BASE
    }

    pub fn current(&self) -> ThreadId {
        self.current
    }

    pub fn get(&self, id: ThreadId) -> Option<&ThreadContext> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut ThreadContext> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// A record that the chain says exists. A miss means the chain is corrupt.
    pub fn context(&self, id: ThreadId) -> &ThreadContext {
        match self.get(id) {
            Some(ctx) => ctx,
            None => panic!("thread chain references vacant slot {}", id.0),
        }
    }

    fn context_mut(&mut self, id: ThreadId) -> &mut ThreadContext {
        match self.get_mut(id) {
            Some(ctx) => ctx,
            None => panic!("thread chain references vacant slot {}", id.0),
        }
    }

    pub fn current_context(&self) -> &ThreadContext {
        self.context(self.current)
    }

    pub fn current_context_mut(&mut self) -> &mut ThreadContext {
        self.context_mut(self.current)
    }

    /// Walk the chain from the head in creation order. Panics on a corrupt chain, like `context`.
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, &ThreadContext)> + '_ {
        core::iter::successors(Some(self.head()), |&id| self.context(id).next)
            .map(|id| (id, self.context(id)))
    }

    /// Number of records that have a successor.
    ///
    /// The terminator is not counted, so with the base context always present this equals the
    /// number of threads created on top of it. The quantum policy depends on exactly this figure.
    pub fn count(&self) -> usize {
        let mut threads = 0;
        let mut search = self.context(self.head());

        while let Some(next) = search.next {
            threads += 1;
            search = self.context(next);
        }

        threads
    }

    /// Arena slots holding a live record, base included.
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Register a new thread at the tail of the chain.
    ///
    /// The pid is the live count plus one, so after removals two threads can share a pid.
    pub fn create(
        &mut self,
        stack: Stack,
        entry: u32,
        arg: u32,
        name: &str,
        eflags: Eflags,
    ) -> ThreadId {
        self.reap();

        let pid = self.count() as Pid + 1;
        let child_of = self.current_context().pid;
        let context = ThreadContext::new(pid, child_of, name, stack, entry, arg, eflags);

        let id = self.store(context);

        let mut tail = self.head();
        while let Some(next) = self.context(tail).next {
            tail = next;
        }
        self.context_mut(tail).next = Some(id);

        log::info!(
            "Created thread '{}' (pid {}, child of {}) at {:#x}",
            self.context(id).name,
            pid,
            child_of,
            entry
        );

        id
    }

    fn store(&mut self, context: ThreadContext) -> ThreadId {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(context);
                ThreadId(index)
            }
            None => {
                self.slots.push(Some(context));
                ThreadId(self.slots.len() - 1)
            }
        }
    }

    /// First record in chain order carrying `pid`.
    pub fn find(&self, pid: Pid) -> Option<ThreadId> {
        self.iter().find(|(_, ctx)| ctx.pid == pid).map(|(id, _)| id)
    }

    fn predecessor(&self, id: ThreadId) -> Option<ThreadId> {
        self.iter()
            .find(|(_, ctx)| ctx.next == Some(id))
            .map(|(prev, _)| prev)
    }

    /// Splice `id` out of the chain and hand back its record.
    fn unlink(&mut self, id: ThreadId) -> ThreadContext {
        let Some(prev) = self.predecessor(id) else {
            panic!("thread {} has no predecessor in the chain", id.0);
        };

        let successor = self.context(id).next;
        self.context_mut(prev).next = successor;

        match self.slots[id.0].take() {
            Some(context) => context,
            None => panic!("thread chain references vacant slot {}", id.0),
        }
    }

    /// The thread that runs after `id` in round-robin order.
    pub fn successor(&self, id: ThreadId) -> ThreadId {
        self.context(id).next.unwrap_or(self.head())
    }

    /// Make the round-robin successor of the current thread current.
    pub fn advance(&mut self) -> ThreadId {
        self.current = self.successor(self.current);
        self.current
    }

    /// Take the current thread out of the chain.
    ///
    /// Returns the thread that is current afterwards; the caller must resume it straight away
    /// and never return into the removed thread. The base context cannot exit.
    pub fn exit(&mut self) -> Result<ThreadId, ThreadError> {
        let current = self.current;
        if current == self.head() {
            return Err(ThreadError::BaseContext);
        }

        Ok(self.retire(current))
    }

    fn retire(&mut self, id: ThreadId) -> ThreadId {
        self.reap();

        let resume = self.successor(id);
        let context = self.unlink(id);
        self.retired = Some(context);
        self.current = resume;

        resume
    }

    /// Remove the first thread with `pid`.
    pub fn kill(&mut self, pid: Pid) -> Result<Killed, ThreadError> {
        self.reap();

        let id = self.find(pid).ok_or(ThreadError::NotFound(pid))?;
        if id == self.head() {
            return Err(ThreadError::BaseContext);
        }

        if id == self.current {
            return Ok(Killed::Current(self.retire(id)));
        }

        let context = self.unlink(id);
        log::info!("Killed thread '{}' (pid {})", context.name, context.pid);
        drop(context);

        Ok(Killed::Other)
    }

    /// Release a thread that removed itself, once execution has left its stack.
    ///
    /// This frees heap memory, so it only runs from `create`, `exit` and `kill`, never from the
    /// timer tick.
    pub fn reap(&mut self) {
        if let Some(context) = self.retired.take() {
            log::trace!(
                "Releasing stack of exited thread '{}' (pid {})",
                context.name,
                context.pid
            );
        }
    }

    pub fn has_retired(&self) -> bool {
        self.retired.is_some()
    }

    pub fn set_priority(&mut self, pid: Pid, priority: i32) -> Result<(), ThreadError> {
        let id = self.find(pid).ok_or(ThreadError::NotFound(pid))?;
        self.context_mut(id).priority = priority;

        log::debug!("Priority of pid {} set to {}", pid, priority);
        Ok(())
    }

    pub fn own_pid(&self) -> Pid {
        self.current_context().pid
    }

    /// Print every record once, then the total, and return the total.
    ///
    /// The chain carries no length, so the pass ends one record after the terminator has been
    /// spotted.
    pub fn enumerate<W: fmt::Write + ?Sized>(&self, out: &mut W) -> Result<usize, fmt::Error> {
        let mut threads = 0;
        let mut terminator_seen = false;
        let mut search = self.head();

        loop {
            let ctx = self.context(search);
            writeln!(
                out,
                "thread: '{}' pid: {}, priority: {}, child of: {}",
                ctx.name, ctx.pid, ctx.priority, ctx.child_of
            )?;
            threads += 1;

            if terminator_seen {
                break;
            }

            match ctx.next {
                Some(next) => {
                    search = next;
                    if self.context(next).next.is_none() {
                        terminator_seen = true;
                    }
                }
                // the base context on its own is both head and terminator
                None => break,
            }
        }

        writeln!(out, "total threads running: {}", threads)?;
        Ok(threads)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arch::selectors::KERNEL_CODE_SELECTOR;
    use alloc::string::String;
    use alloc::vec::Vec;

    pub(crate) const STACK: usize = 8192;

    pub(crate) fn spawn(registry: &mut Registry, name: &str) -> ThreadId {
        registry.create(
            Stack::new(STACK),
            0x0010_0000,
            0,
            name,
            Eflags::for_new_thread(Eflags::empty()),
        )
    }

    fn names(registry: &Registry) -> Vec<String> {
        registry
            .iter()
            .map(|(_, ctx)| String::from(ctx.name.as_str()))
            .collect()
    }

    #[test]
    fn starts_with_only_the_base_context() {
        let registry = Registry::new();
        assert_eq!(registry.current(), registry.head());
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.iter().count(), 1);
        assert_eq!(registry.own_pid(), 0);
    }

    #[test]
    fn count_excludes_the_terminator() {
        let mut registry = Registry::new();
        for expected in 1..=5 {
            spawn(&mut registry, "worker");
            assert_eq!(registry.count(), expected);
            assert_eq!(registry.iter().count(), expected + 1);
        }
    }

    #[test]
    fn create_appends_in_order_with_live_count_pids() {
        let mut registry = Registry::new();
        let a = spawn(&mut registry, "A");
        let b = spawn(&mut registry, "B");

        assert_eq!(names(&registry), ["", "A", "B"]);
        assert_eq!(registry.context(a).pid, 1);
        assert_eq!(registry.context(b).pid, 2);
        assert_eq!(registry.context(a).child_of, 0);
        assert_eq!(registry.context(a).cpu.cs, KERNEL_CODE_SELECTOR as u32);
        assert!(registry.context(b).next().is_none());
    }

    #[test]
    fn child_of_is_the_creating_thread() {
        let mut registry = Registry::new();
        let a = spawn(&mut registry, "A");
        registry.advance();
        assert_eq!(registry.current(), a);

        let b = spawn(&mut registry, "B");
        assert_eq!(registry.context(b).child_of, 1);
    }

    #[test]
    fn create_then_kill_restores_the_chain() {
        let mut registry = Registry::new();
        spawn(&mut registry, "A");
        let before: Vec<ThreadId> = registry.iter().map(|(id, _)| id).collect();
        let slots = registry.live_slots();

        let b = spawn(&mut registry, "B");
        let pid = registry.context(b).pid;
        assert_eq!(registry.kill(pid), Ok(Killed::Other));

        let after: Vec<ThreadId> = registry.iter().map(|(id, _)| id).collect();
        assert_eq!(before, after);
        assert_eq!(registry.live_slots(), slots);
        assert!(registry.get(b).is_none());
        assert_eq!(registry.head(), ThreadId::BASE);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut registry = Registry::new();
        let a = spawn(&mut registry, "A");
        spawn(&mut registry, "B");
        registry.kill(1).unwrap();

        let c = spawn(&mut registry, "C");
        assert_eq!(c, a);
        assert_eq!(names(&registry), ["", "B", "C"]);
    }

    #[test]
    fn kill_unknown_pid_leaves_the_chain_alone() {
        let mut registry = Registry::new();
        spawn(&mut registry, "A");

        assert_eq!(registry.kill(9), Err(ThreadError::NotFound(9)));
        assert_eq!(registry.count(), 1);
        assert_eq!(names(&registry), ["", "A"]);
    }

    #[test]
    fn kill_reaches_the_tail() {
        let mut registry = Registry::new();
        spawn(&mut registry, "A");
        spawn(&mut registry, "B");

        assert_eq!(registry.kill(2), Ok(Killed::Other));
        assert_eq!(names(&registry), ["", "A"]);
    }

    #[test]
    fn base_context_cannot_be_killed() {
        let mut registry = Registry::new();
        spawn(&mut registry, "A");

        assert_eq!(registry.kill(0), Err(ThreadError::BaseContext));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn pids_collide_after_removal() {
        let mut registry = Registry::new();
        spawn(&mut registry, "A");
        let b = spawn(&mut registry, "B");
        registry.kill(1).unwrap();

        let c = spawn(&mut registry, "C");
        assert_eq!(registry.context(b).pid, 2);
        assert_eq!(registry.context(c).pid, 2);

        // the first match in chain order wins
        assert_eq!(registry.find(2), Some(b));
    }

    #[test]
    fn exit_from_base_is_refused() {
        let mut registry = Registry::new();
        assert_eq!(registry.exit(), Err(ThreadError::BaseContext));
        assert_eq!(registry.current(), registry.head());
        assert_eq!(registry.iter().count(), 1);

        spawn(&mut registry, "A");
        assert_eq!(registry.exit(), Err(ThreadError::BaseContext));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.own_pid(), 0);
    }

    #[test]
    fn exit_hands_over_to_the_successor_and_defers_release() {
        let mut registry = Registry::new();
        let a = spawn(&mut registry, "A");
        let b = spawn(&mut registry, "B");
        registry.advance();
        assert_eq!(registry.current(), a);

        assert_eq!(registry.exit(), Ok(b));
        assert_eq!(registry.current(), b);
        assert_eq!(names(&registry), ["", "B"]);
        assert!(registry.has_retired());

        registry.reap();
        assert!(!registry.has_retired());
        assert_eq!(registry.live_slots(), 2);
    }

    #[test]
    fn exit_of_the_tail_wraps_to_head() {
        let mut registry = Registry::new();
        spawn(&mut registry, "A");
        registry.advance();

        assert_eq!(registry.exit(), Ok(registry.head()));
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.current(), registry.head());
    }

    #[test]
    fn killing_the_running_thread_behaves_like_exit() {
        let mut registry = Registry::new();
        spawn(&mut registry, "A");
        let b = spawn(&mut registry, "B");
        registry.advance();

        assert_eq!(registry.kill(1), Ok(Killed::Current(b)));
        assert_eq!(registry.current(), b);
        assert!(registry.has_retired());

        // the next operation runs on another stack and releases it
        spawn(&mut registry, "C");
        assert!(!registry.has_retired());
    }

    #[test]
    fn set_priority_by_pid() {
        let mut registry = Registry::new();
        let a = spawn(&mut registry, "A");

        registry.set_priority(1, -1).unwrap();
        assert_eq!(registry.context(a).priority, -1);
        assert_eq!(registry.set_priority(5, 3), Err(ThreadError::NotFound(5)));
    }

    #[test]
    fn advance_is_round_robin() {
        let mut registry = Registry::new();
        let a = spawn(&mut registry, "A");
        let b = spawn(&mut registry, "B");

        assert_eq!(registry.advance(), a);
        assert_eq!(registry.advance(), b);
        assert_eq!(registry.advance(), registry.head());
    }

    #[test]
    fn enumerate_scenario() {
        let mut registry = Registry::new();
        spawn(&mut registry, "A");
        spawn(&mut registry, "B");
        assert_eq!(registry.count(), 2);

        let mut out = String::new();
        assert_eq!(registry.enumerate(&mut out), Ok(3));
        assert_eq!(
            out,
            "thread: '' pid: 0, priority: 0, child of: 0\n\
             thread: 'A' pid: 1, priority: 1, child of: 0\n\
             thread: 'B' pid: 2, priority: 1, child of: 0\n\
             total threads running: 3\n"
        );

        assert_eq!(registry.kill(1), Ok(Killed::Other));
        let head = registry.context(registry.head());
        let one_hop = registry.context(head.next().unwrap());
        assert_eq!(one_hop.name.as_str(), "B");
    }

    #[test]
    fn enumerate_with_only_the_base_context() {
        let registry = Registry::new();
        let mut out = String::new();

        assert_eq!(registry.enumerate(&mut out), Ok(1));
        assert!(out.ends_with("total threads running: 1\n"));
    }

    #[test]
    #[should_panic(expected = "vacant slot")]
    fn iter_panics_on_a_corrupt_chain() {
        let mut registry = Registry::new();
        let a = spawn(&mut registry, "A");
        registry.slots[a.0] = None;
        registry.iter().for_each(drop);
    }
}
