//! Saving the interrupted register file into the current thread's record.
//!
//! The other half, loading a record back into the CPU, is `arch::x86::context::switch_to`.

use crate::arch::selectors::{self, KERNEL_DATA_SELECTOR};
use crate::proc::context::ThreadContext;

/// Register snapshot built by the timer entry stub, lowest address first.
///
/// ```text
///   gs fs es ds               pushed by the stub
///   edi .. eax                pushad
///   int_no err_code           pushed by the stub
///   eip cs eflags             pushed by the CPU
///   useresp ss                pushed by the CPU only on a ring 3 -> ring 0 entry
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptedState {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,

    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,

    pub int_no: u32,
    pub err_code: u32,

    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub useresp: u32,
    pub ss: u32,
}

/// Bytes between the `esp` saved by pushad and the interrupted thread's own stack pointer when no
/// privilege change happened: int_no, err_code, eip, cs and eflags.
pub const KERNEL_FRAME_SKIP: u32 = 0x14;

/// Copy `state` into `ctx`.
///
/// `ss`/`esp` only appear in the snapshot when the CPU came from ring 3. Otherwise the thread
/// was running on its own kernel stack, right above the words the interrupt pushed.
pub fn save(ctx: &mut ThreadContext, state: &InterruptedState) {
    let cpu = &mut ctx.cpu;

    if selectors::is_user(state.cs) {
        cpu.ss = state.ss;
        cpu.esp = state.useresp;
    } else {
        cpu.ss = KERNEL_DATA_SELECTOR as u32;
        cpu.esp = state.esp + KERNEL_FRAME_SKIP;
    }

    cpu.eip = state.eip;
    cpu.cs = state.cs;
    cpu.eflags = state.eflags;
    cpu.eax = state.eax;
    cpu.ecx = state.ecx;
    cpu.edx = state.edx;
    cpu.ebx = state.ebx;

    cpu.ebp = state.ebp;
    cpu.esi = state.esi;
    cpu.edi = state.edi;
    cpu.ds = state.ds;
    cpu.es = state.es;
    cpu.fs = state.fs;
    cpu.gs = state.gs;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::selectors::*;
    use crate::proc::context::CpuState;

    fn snapshot(cs: u16, data: u16) -> InterruptedState {
        InterruptedState {
            gs: data as u32,
            fs: data as u32,
            es: data as u32,
            ds: data as u32,
            edi: 7,
            esi: 6,
            ebp: 5,
            esp: 0x9000,
            ebx: 4,
            edx: 3,
            ecx: 2,
            eax: 1,
            int_no: 32,
            err_code: 0,
            eip: 0x4000_1234,
            cs: cs as u32,
            eflags: 0x202,
            useresp: 0xBFFF_F000,
            ss: USER_DATA_SELECTOR as u32,
        }
    }

    #[test]
    fn kernel_mode_recovers_stack_above_the_frame() {
        let mut ctx = ThreadContext::base();
        save(&mut ctx, &snapshot(KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR));

        assert_eq!(ctx.cpu.esp, 0x9000 + 0x14);
        assert_eq!(ctx.cpu.ss, KERNEL_DATA_SELECTOR as u32);
        assert_eq!(ctx.cpu.cs, KERNEL_CODE_SELECTOR as u32);
    }

    #[test]
    fn user_mode_takes_the_cpu_pushed_stack() {
        let mut ctx = ThreadContext::base();
        save(&mut ctx, &snapshot(USER_CODE_SELECTOR, USER_DATA_SELECTOR));

        assert_eq!(ctx.cpu.esp, 0xBFFF_F000);
        assert_eq!(ctx.cpu.ss, USER_DATA_SELECTOR as u32);
        assert_eq!(ctx.cpu.ds, USER_DATA_SELECTOR as u32);
    }

    #[test]
    fn everything_else_is_copied_verbatim() {
        let mut ctx = ThreadContext::base();
        save(&mut ctx, &snapshot(KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR));

        let data = KERNEL_DATA_SELECTOR as u32;
        assert_eq!(
            ctx.cpu,
            CpuState {
                eax: 1,
                ecx: 2,
                edx: 3,
                ebx: 4,
                esp: 0x9014,
                ebp: 5,
                esi: 6,
                edi: 7,
                eip: 0x4000_1234,
                eflags: 0x202,
                cs: KERNEL_CODE_SELECTOR as u32,
                ds: data,
                es: data,
                fs: data,
                gs: data,
                ss: data,
            }
        );
    }

    #[test]
    fn snapshot_layout_matches_the_entry_stub() {
        use core::mem::offset_of;

        assert_eq!(offset_of!(InterruptedState, ds), 12);
        assert_eq!(offset_of!(InterruptedState, esp), 28);
        assert_eq!(offset_of!(InterruptedState, eip), 56);
        assert_eq!(size_of::<InterruptedState>(), 19 * 4);
    }
}
