//! Architecture support.
//!
//! The selector layout and the EFLAGS bits are plain data shared with the scheduler core, so they
//! build everywhere. Everything that actually touches the CPU lives in `x86` and is only compiled
//! for i386 targets.

#[cfg(target_arch = "x86")]
pub mod x86;

/// Segment selectors, as laid out by `x86::gdt`
pub mod selectors {
    pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
    pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
    pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;
    pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;
    pub const TSS_SELECTOR: u16 = 0x28;

    /// Requested privilege level lives in the bottom two bits of a selector
    pub const RPL_MASK: u32 = 0b11;
    pub const USER_RPL: u32 = 3;

    /// True when the selector was loaded while the CPU ran in ring 3.
    #[inline]
    pub const fn is_user(selector: u32) -> bool {
        selector & RPL_MASK == USER_RPL
    }

    /// `cli`, `sti` and port I/O need CPL 0 while IOPL is 0, so only code running under a kernel
    /// code selector may mask interrupts.
    #[inline]
    pub const fn may_mask_interrupts(code_selector: u32) -> bool {
        !is_user(code_selector)
    }
}

bitflags::bitflags! {
    /// The EFLAGS register
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Eflags: u32 {
        const CARRY = 1 << 0;
        /// Always reads as one
        const RESERVED = 1 << 1;
        const PARITY = 1 << 2;
        const AUXILIARY_CARRY = 1 << 4;
        const ZERO = 1 << 6;
        const SIGN = 1 << 7;
        const TRAP = 1 << 8;
        const INTERRUPT = 1 << 9;
        const DIRECTION = 1 << 10;
        const OVERFLOW = 1 << 11;
        const IOPL = 0b11 << 12;
        const NESTED_TASK = 1 << 14;
    }
}

impl Eflags {
    /// Flags a freshly created thread starts with: whatever the creator had, with interrupts on
    /// so the timer can preempt it.
    pub fn for_new_thread(current: Eflags) -> Self {
        current | Eflags::RESERVED | Eflags::INTERRUPT
    }
}

#[cfg(test)]
mod tests {
    use super::selectors::*;
    use super::Eflags;

    #[test]
    fn user_selectors_carry_ring_three() {
        assert!(is_user(USER_CODE_SELECTOR as u32));
        assert!(is_user(USER_DATA_SELECTOR as u32));
        assert!(!is_user(KERNEL_CODE_SELECTOR as u32));
        assert!(!is_user(KERNEL_DATA_SELECTOR as u32));
        assert_eq!(USER_CODE_SELECTOR, 0x1B);
        assert_eq!(USER_DATA_SELECTOR, 0x23);
    }

    #[test]
    fn only_kernel_code_may_mask_interrupts() {
        assert!(may_mask_interrupts(KERNEL_CODE_SELECTOR as u32));
        assert!(!may_mask_interrupts(USER_CODE_SELECTOR as u32));
        // the RPL bits decide, not the descriptor index
        assert!(!may_mask_interrupts((KERNEL_CODE_SELECTOR as u32) | USER_RPL));
    }

    #[test]
    fn new_threads_run_with_interrupts_enabled() {
        let flags = Eflags::for_new_thread(Eflags::CARRY);
        assert!(flags.contains(Eflags::INTERRUPT | Eflags::RESERVED | Eflags::CARRY));
        assert_eq!(Eflags::for_new_thread(Eflags::empty()).bits(), 0x202);
    }
}
