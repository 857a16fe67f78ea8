//! The GDT describes the flat 4 GiB segments the kernel and its threads run in, plus the TSS.
//!
//! Segmentation itself is unused: every code and data segment spans the whole address space and
//! only the privilege level differs. The TSS is needed for one field, `esp0`, the stack the CPU
//! switches to when an interrupt arrives while a thread runs in ring 3.

use core::mem::size_of;

use crate::arch::selectors::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR, TSS_SELECTOR};

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

// 4 KiB granularity, 32-bit operand size
const FLAT_GRANULARITY: u8 = 0xC0;

impl GdtEntry {
    const fn new(base: u32, limit: u32, access: u8, granularity: u8) -> Self {
        GdtEntry {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: ((limit >> 16) & 0x0F) as u8 | (granularity & 0xF0),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    const fn null() -> Self {
        Self::new(0, 0, 0, 0)
    }

    const fn code() -> Self {
        Self::new(0, 0xFFFFF, 0x9A, FLAT_GRANULARITY) // present, ring 0, executable, readable
    }

    const fn data() -> Self {
        Self::new(0, 0xFFFFF, 0x92, FLAT_GRANULARITY) // present, ring 0, writable
    }

    const fn user_code() -> Self {
        Self::new(0, 0xFFFFF, 0xFA, FLAT_GRANULARITY) // present, ring 3, executable, readable
    }

    const fn user_data() -> Self {
        Self::new(0, 0xFFFFF, 0xF2, FLAT_GRANULARITY) // present, ring 3, writable
    }

    fn tss(base: u32, limit: u32) -> Self {
        Self::new(base, limit, 0x89, 0x00) // present, ring 0, available 32-bit TSS
    }
}

/// The 32-bit Task State Segment. Hardware task switching is unused, so only `ss0`/`esp0` and
/// the I/O map base matter.
#[repr(C)]
pub struct TaskStateSegment {
    prev_task: u32,
    esp0: u32,
    ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    general: [u32; 8],
    segments: [u32; 6],
    ldt: u32,
    trap: u16,
    io_map_base: u16,
}

impl TaskStateSegment {
    pub const fn new() -> Self {
        Self {
            prev_task: 0,
            esp0: 0,
            ss0: KERNEL_DATA_SELECTOR as u32,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            general: [0; 8],
            segments: [0; 6],
            ldt: 0,
            trap: 0,
            // past the limit: no I/O permission bitmap
            io_map_base: size_of::<Self>() as u16,
        }
    }
}

#[repr(C, packed)]
struct GdtDescriptor {
    limit: u16,
    base: u32,
}

#[repr(C)]
struct Gdt {
    null: GdtEntry,
    kernel_code: GdtEntry,
    kernel_data: GdtEntry,
    user_code: GdtEntry,
    user_data: GdtEntry,
    tss: GdtEntry,
}

static mut GDT: Gdt = Gdt {
    null: GdtEntry::null(),
    kernel_code: GdtEntry::code(),
    kernel_data: GdtEntry::data(),
    user_code: GdtEntry::user_code(),
    user_data: GdtEntry::user_data(),
    tss: GdtEntry::null(), // filled in by `init` once the TSS address is known
};

static mut TSS: TaskStateSegment = TaskStateSegment::new();

const KERNEL_STACK_SIZE: usize = 16 * 1024;

#[repr(C, align(16))]
struct KernelStack([u8; KERNEL_STACK_SIZE]);

/// Ring 0 stack used for interrupts taken in ring 3
static mut KERNEL_STACK: KernelStack = KernelStack([0; KERNEL_STACK_SIZE]);

pub fn init() {
    // SAFETY: runs once during boot with interrupts disabled, nothing else touches the tables yet.
    unsafe {
        let tss = &raw mut TSS;
        let tss_addr = tss as u32;
        let tss_limit = (size_of::<TaskStateSegment>() - 1) as u32;

        (*tss).esp0 = kernel_stack_top();
        (*(&raw mut GDT)).tss = GdtEntry::tss(tss_addr, tss_limit);

        let descriptor = GdtDescriptor {
            limit: (size_of::<Gdt>() - 1) as u16,
            base: (&raw const GDT) as u32,
        };

        load_gdt(&descriptor);
        reload_segments();
        load_tss(TSS_SELECTOR);

        log::debug!("GDT loaded, TSS at {:#x}", tss_addr);
    }
}

/// Top of the static ring 0 stack
pub fn kernel_stack_top() -> u32 {
    let stack = &raw const KERNEL_STACK;
    stack as u32 + KERNEL_STACK_SIZE as u32
}

/// Set the stack the CPU loads on the next ring 3 -> ring 0 transition.
pub fn set_kernel_stack(esp0: u32) {
    // SAFETY: a single aligned word store; the CPU only reads it on a privilege change.
    unsafe {
        (*(&raw mut TSS)).esp0 = esp0;
    }
}

fn load_gdt(descriptor: &GdtDescriptor) {
    unsafe {
        core::arch::asm!(
            "lgdt [{0}]",
            in(reg) descriptor,
            options(readonly, nostack, preserves_flags)
        );
    }
}

/// Reload every segment register so the CPU picks up the new descriptors.
fn reload_segments() {
    unsafe {
        core::arch::asm!(
            // far return into the new code segment
            "push eax",
            "lea ecx, [2f]",
            "push ecx",
            "retf",
            "2:",
            "mov ds, dx",
            "mov es, dx",
            "mov fs, dx",
            "mov gs, dx",
            "mov ss, dx",
            in("eax") KERNEL_CODE_SELECTOR as u32,
            in("edx") KERNEL_DATA_SELECTOR as u32,
            out("ecx") _,
        );
    }
}

fn load_tss(selector: u16) {
    unsafe {
        core::arch::asm!(
            "ltr {0:x}",
            in(reg) selector,
            options(nostack)
        );
    }
}
