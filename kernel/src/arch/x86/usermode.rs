use crate::arch::Eflags;
use crate::arch::selectors::{USER_CODE_SELECTOR, USER_DATA_SELECTOR};
use crate::arch::x86::gdt;

/// Drop the calling code into ring 3.
///
/// Execution carries on right after the call, on the same stack, with user segments loaded.
/// Interrupts taken from then on land on the static kernel stack, and IF is set in the new flags
/// so the timer keeps preempting.
///
/// After the return the caller runs at CPL 3 with IOPL 0: it must not call the thread API or
/// anything else that masks interrupts, since `cli` raises a general protection fault there.
pub fn switch_to_user_mode() {
    log::trace!("Dropping to ring 3, kernel stack at {:#x}", gdt::kernel_stack_top());
    gdt::set_kernel_stack(gdt::kernel_stack_top());

    // SAFETY: the user segments are flat, so the current stack and code stay valid in ring 3.
    unsafe {
        core::arch::asm!(
            "cli",
            "mov ax, {data}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov eax, esp",
            "push {data}", // ss
            "push eax",    // esp
            "pushfd",
            "or dword ptr [esp], {interrupt}",
            "push {code}",
            "lea eax, [2f]",
            "push eax",
            "iretd",
            "2:",
            data = const USER_DATA_SELECTOR,
            code = const USER_CODE_SELECTOR,
            interrupt = const Eflags::INTERRUPT.bits(),
            out("eax") _,
        );
    }
}
