//! The IDT tells the CPU where to jump for each of the 256 interrupt vectors.
//!
//! CPU exceptions are fatal here: their stubs build the same register snapshot the timer stub
//! does and hand it to a handler that reports it and halts. The PIC is remapped so IRQs land on
//! vectors 32-47, and only the timer line is unmasked.

use core::mem::size_of;

use crate::arch::selectors::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};
use crate::arch::x86::{halt, outb, timer};
use crate::proc::switch::InterruptedState;

pub const IRQ_BASE: u8 = 32;

/// 32-bit interrupt gate: IF is cleared on entry
const INTERRUPT_GATE: u8 = 0xE;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn null() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn interrupt(handler: u32) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector: KERNEL_CODE_SELECTOR,
            zero: 0,
            type_attr: (1 << 7) | INTERRUPT_GATE, // present, ring 0
            offset_high: (handler >> 16) as u16,
        }
    }
}

#[repr(C, packed)]
struct IdtDescriptor {
    size: u16,
    offset: u32,
}

#[repr(C, align(8))]
struct Idt {
    entries: [IdtEntry; 256],
}

static mut IDT: Idt = Idt {
    entries: [IdtEntry::null(); 256],
};

const EXCEPTION_NAMES: [&str; 20] = [
    "Divide Error",
    "Debug",
    "NMI",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 FP Exception",
    "Alignment Check",
    "Machine Check",
    "SIMD FP Exception",
];

extern "C" fn exception_handler(state: *const InterruptedState) -> ! {
    // SAFETY: the stub passes a pointer to the snapshot it just pushed.
    let state = unsafe { &*state };
    let name = EXCEPTION_NAMES
        .get(state.int_no as usize)
        .copied()
        .unwrap_or("Unknown");

    log::error!(
        "EXCEPTION: {} (vector {}, error code {:#x}) at {:#x}:{:#010x}, eflags {:#x}",
        name,
        state.int_no,
        state.err_code,
        state.cs,
        state.eip,
        state.eflags
    );
    log::error!(
        "eax={:#010x} ebx={:#010x} ecx={:#010x} edx={:#010x} esi={:#010x} edi={:#010x} ebp={:#010x}",
        state.eax,
        state.ebx,
        state.ecx,
        state.edx,
        state.esi,
        state.edi,
        state.ebp
    );

    loop {
        halt();
    }
}

/// Shared tail of the exception stubs: vector and error code are already on the stack.
#[unsafe(naked)]
extern "C" fn exception_common() {
    core::arch::naked_asm!(
        "pushad",
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "mov ax, {data}",
        "mov ds, ax",
        "mov es, ax",
        "push esp",
        "call {handler}",
        data = const KERNEL_DATA_SELECTOR,
        handler = sym exception_handler,
    );
}

macro_rules! exception {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            core::arch::naked_asm!(
                "push 0", // no error code
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym exception_common,
            );
        }
    };
}

macro_rules! exception_with_error {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            core::arch::naked_asm!(
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym exception_common,
            );
        }
    };
}

exception!(divide_error, 0);
exception!(debug, 1);
exception!(nmi, 2);
exception!(breakpoint, 3);
exception!(overflow, 4);
exception!(bound_range, 5);
exception!(invalid_opcode, 6);
exception!(device_not_available, 7);
exception_with_error!(double_fault, 8);
exception_with_error!(invalid_tss, 10);
exception_with_error!(segment_not_present, 11);
exception_with_error!(stack_segment, 12);
exception_with_error!(general_protection, 13);
exception_with_error!(page_fault, 14);
exception!(x87_fp_exception, 16);
exception_with_error!(alignment_check, 17);
exception!(machine_check, 18);
exception!(simd_fp_exception, 19);

/// IRQ7 also fires spuriously while masked. The master PIC expects no EOI for those.
#[unsafe(naked)]
extern "C" fn spurious_irq() {
    core::arch::naked_asm!("iretd");
}

pub fn init() {
    let handlers: [(usize, extern "C" fn()); 20] = [
        (0, divide_error),
        (1, debug),
        (2, nmi),
        (3, breakpoint),
        (4, overflow),
        (5, bound_range),
        (6, invalid_opcode),
        (7, device_not_available),
        (8, double_fault),
        (10, invalid_tss),
        (11, segment_not_present),
        (12, stack_segment),
        (13, general_protection),
        (14, page_fault),
        (16, x87_fp_exception),
        (17, alignment_check),
        (18, machine_check),
        (19, simd_fp_exception),
        ((IRQ_BASE + timer::IRQ) as usize, timer::irq0_entry),
        ((IRQ_BASE + 7) as usize, spurious_irq),
    ];

    // SAFETY: runs once during boot with interrupts disabled.
    unsafe {
        let idt = &mut *(&raw mut IDT);
        for (vector, handler) in handlers {
            idt.entries[vector] = IdtEntry::interrupt(handler as usize as u32);
        }

        let descriptor = IdtDescriptor {
            size: (size_of::<Idt>() - 1) as u16,
            offset: idt as *const Idt as u32,
        };

        core::arch::asm!(
            "lidt [{}]",
            in(reg) &descriptor,
            options(readonly, nostack, preserves_flags)
        );
    }

    init_pic();
    log::debug!("IDT loaded, PIC remapped to vector {}", IRQ_BASE);
}

const PIC1_CMD: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_CMD: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;
const PIC_EOI: u8 = 0x20;

/// Remap the PIC's IRQs to vectors 32-47, away from the CPU exceptions, and unmask the timer.
fn init_pic() {
    // ICW1: initialize, ICW4 follows
    outb(PIC1_CMD, 0x11);
    outb(PIC2_CMD, 0x11);

    // ICW2: vector offsets
    outb(PIC1_DATA, IRQ_BASE);
    outb(PIC2_DATA, IRQ_BASE + 8);

    // ICW3: slave on IRQ2
    outb(PIC1_DATA, 0x04);
    outb(PIC2_DATA, 0x02);

    // ICW4: 8086 mode
    outb(PIC1_DATA, 0x01);
    outb(PIC2_DATA, 0x01);

    outb(PIC1_DATA, !(1 << timer::IRQ));
    outb(PIC2_DATA, 0xFF);
}

pub fn send_eoi(irq: u8) {
    if irq >= 8 {
        outb(PIC2_CMD, PIC_EOI);
    }
    outb(PIC1_CMD, PIC_EOI);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_are_present_ring_zero_interrupt_gates() {
        let entry = IdtEntry::interrupt(0x0012_3456);
        let (attr, selector) = (entry.type_attr, entry.selector);
        let (low, high) = (entry.offset_low, entry.offset_high);
        assert_eq!(attr, 0x8E);
        assert_eq!(selector, KERNEL_CODE_SELECTOR);
        assert_eq!((low, high), (0x3456, 0x0012));
    }
}
