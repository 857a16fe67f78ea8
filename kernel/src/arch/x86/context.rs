//! Loading a saved register file into the CPU.

use core::mem::offset_of;

use crate::proc::context::CpuState;

/// Staging copy of the state being resumed. The caller's copy may live on a stack that is about
/// to be abandoned or freed, this one stays put.
static mut RESUME: CpuState = CpuState::zeroed();

/// Resume `cpu` with an `iretd`.
///
/// A ring 3 target gets the full frame (ss, esp, eflags, cs, eip) built on the current kernel
/// stack. A ring 0 target has its own stack loaded first and the short frame built on top of it,
/// so after the `iretd` its stack pointer is exactly the saved one.
///
/// # Safety
///
/// Interrupts must be disabled, and `cpu` must describe a resumable thread: valid selectors, an
/// `eip` to run, and for ring 0 a stack with room for three words below `esp`.
pub unsafe fn switch_to(cpu: &CpuState) -> ! {
    let resume = &raw mut RESUME;

    unsafe {
        resume.write(*cpu);

        core::arch::asm!(
            "test dword ptr [eax + {cs}], 3",
            "jz 2f",
            "push dword ptr [eax + {ss}]",
            "push dword ptr [eax + {esp}]",
            "jmp 3f",
            "2:",
            "mov esp, [eax + {esp}]",
            "3:",
            "push dword ptr [eax + {eflags}]",
            "push dword ptr [eax + {cs}]",
            "push dword ptr [eax + {eip}]",
            // flat segments: [eax] stays addressable whichever selector ds ends up with
            "mov ebx, [eax + {es}]",
            "mov es, bx",
            "mov ebx, [eax + {fs}]",
            "mov fs, bx",
            "mov ebx, [eax + {gs}]",
            "mov gs, bx",
            "mov ebx, [eax + {ds}]",
            "mov ds, bx",
            "mov ebx, [eax + {ebx}]",
            "mov ecx, [eax + {ecx}]",
            "mov edx, [eax + {edx}]",
            "mov esi, [eax + {esi}]",
            "mov edi, [eax + {edi}]",
            "mov ebp, [eax + {ebp}]",
            "mov eax, [eax + {eax}]",
            "iretd",
            in("eax") resume,
            eax = const offset_of!(CpuState, eax),
            ecx = const offset_of!(CpuState, ecx),
            edx = const offset_of!(CpuState, edx),
            ebx = const offset_of!(CpuState, ebx),
            esp = const offset_of!(CpuState, esp),
            ebp = const offset_of!(CpuState, ebp),
            esi = const offset_of!(CpuState, esi),
            edi = const offset_of!(CpuState, edi),
            eip = const offset_of!(CpuState, eip),
            eflags = const offset_of!(CpuState, eflags),
            cs = const offset_of!(CpuState, cs),
            ds = const offset_of!(CpuState, ds),
            es = const offset_of!(CpuState, es),
            fs = const offset_of!(CpuState, fs),
            gs = const offset_of!(CpuState, gs),
            ss = const offset_of!(CpuState, ss),
            options(noreturn),
        );
    }
}
