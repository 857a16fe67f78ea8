//! Quantum policy: how long the current thread may run before it is preempted.

use crate::proc::context::ThreadContext;

/// Timer ticks per second; the PIT is programmed to this rate
pub const TICKS_PER_SECOND: u32 = 100;

/// Outcome of the per-tick deadline check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Stay,
    Switch,
}

/// Ticks per second divided evenly between `threads`.
///
/// Past `TICKS_PER_SECOND` threads nobody gets a whole tick; that is reported as one tick rather
/// than zero so the follow-up division stays defined.
pub fn fair_share(threads: usize) -> u64 {
    if threads == 0 {
        return 0;
    }

    (TICKS_PER_SECOND as u64 / threads as u64).max(1)
}

/// The quantum unit for `threads` live threads (as counted by `Registry::count`). Zero disables
/// preemption.
///
/// The share is divided back into the tick rate. Under integer truncation this is not simply
/// `threads`: e.g. 30 threads get a share of 3 and a quantum of 33.
pub fn fair_quantum(threads: usize) -> u64 {
    let share = fair_share(threads);
    if share == 0 {
        return 0;
    }

    TICKS_PER_SECOND as u64 / share
}

/// Arm, expire or leave alone the deadline of the running thread.
pub fn check_deadline(ctx: &mut ThreadContext, quantum: u64, now: u64) -> Verdict {
    if quantum == 0 {
        return Verdict::Stay;
    }

    if ctx.next_switch == 0 {
        if ctx.priority >= 0 {
            ctx.next_switch = now + quantum * ctx.priority as u64;
        } else {
            // the inner fallback can never be taken; it is kept as the policy reads
            if ctx.priority < 0 {
                ctx.next_switch = now + 1;
            } else {
                ctx.next_switch = now + quantum;
            }
        }

        return Verdict::Stay;
    }

    if ctx.next_switch <= now {
        ctx.next_switch = 0;
        return Verdict::Switch;
    }

    Verdict::Stay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::context::{PRIORITY_NORMAL, PRIORITY_URGENT};

    #[test]
    fn no_threads_means_no_preemption() {
        assert_eq!(fair_quantum(0), 0);

        let mut base = ThreadContext::base();
        assert_eq!(check_deadline(&mut base, 0, 500), Verdict::Stay);
        assert_eq!(base.next_switch, 0);
    }

    #[test]
    fn double_division_truncates() {
        assert_eq!(fair_quantum(1), 1);
        assert_eq!(fair_quantum(2), 2);
        assert_eq!(fair_quantum(3), 3);
        assert_eq!(fair_quantum(7), 7);
        assert_eq!(fair_quantum(30), 33);
        assert_eq!(fair_quantum(40), 50);
        assert_eq!(fair_quantum(60), 100);
    }

    #[test]
    fn more_threads_than_ticks_does_not_divide_by_zero() {
        assert_eq!(fair_share(250), 1);
        assert_eq!(fair_quantum(250), TICKS_PER_SECOND as u64);
    }

    #[test]
    fn share_shrinks_as_threads_grow() {
        let mut previous = fair_share(1);
        for threads in 2..=300 {
            let share = fair_share(threads);
            assert!(share <= previous, "share grew at {threads} threads");
            assert_eq!(fair_quantum(threads), fair_quantum(threads));
            previous = share;
        }
    }

    #[test]
    fn quantum_never_shrinks_as_threads_grow() {
        let mut previous = fair_quantum(1);
        for threads in 2..=300 {
            let quantum = fair_quantum(threads);
            assert!(quantum >= previous, "quantum shrank at {threads} threads");
            previous = quantum;
        }
    }

    #[test]
    fn weight_scales_the_deadline() {
        let mut ctx = ThreadContext::base();
        ctx.priority = 3;

        assert_eq!(check_deadline(&mut ctx, 5, 100), Verdict::Stay);
        assert_eq!(ctx.next_switch, 115);

        assert_eq!(check_deadline(&mut ctx, 5, 114), Verdict::Stay);
        assert_eq!(check_deadline(&mut ctx, 5, 115), Verdict::Switch);
        assert_eq!(ctx.next_switch, 0);
    }

    #[test]
    fn normal_priority_runs_one_quantum() {
        let mut ctx = ThreadContext::base();
        ctx.priority = PRIORITY_NORMAL;

        check_deadline(&mut ctx, 2, 10);
        assert_eq!(ctx.next_switch, 12);
    }

    #[test]
    fn urgent_threads_are_preempted_within_a_tick() {
        let mut ctx = ThreadContext::base();
        ctx.priority = PRIORITY_URGENT;

        assert_eq!(check_deadline(&mut ctx, 50, 20), Verdict::Stay);
        assert_eq!(ctx.next_switch, 21);
        assert_eq!(check_deadline(&mut ctx, 50, 21), Verdict::Switch);
    }

    #[test]
    fn overdue_deadline_switches_immediately() {
        let mut ctx = ThreadContext::base();
        ctx.next_switch = 3;

        assert_eq!(check_deadline(&mut ctx, 1, 40), Verdict::Switch);
        assert_eq!(ctx.next_switch, 0);
    }
}
