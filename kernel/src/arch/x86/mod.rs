//! i386 protected mode support.

pub mod context;
pub mod gdt;
pub mod idt;
pub mod serial;
pub mod timer;
pub mod usermode;

use crate::arch::Eflags;
use crate::sync::InterruptControl;

/// Bring up descriptor tables, the interrupt controller and the timer. Interrupts stay disabled.
pub fn init() {
    gdt::init();
    idt::init();
    timer::init();

    log::info!("Architecture initialized");
}

/// Read from port
#[inline]
pub fn inb(port: u16) -> u8 {
    let value: u8;
    unsafe {
        core::arch::asm!(
            "in al, dx",
            out("al") value,
            in("dx") port,
            options(nomem, nostack)
        );
    }
    value
}

/// Write to port
#[inline]
pub fn outb(port: u16, value: u8) {
    unsafe {
        core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") value,
            options(nomem, nostack)
        );
    }
}

#[inline]
pub fn halt() {
    unsafe {
        core::arch::asm!("hlt", options(nomem, nostack));
    }
}

#[inline]
pub fn enable_interrupts() {
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack));
    }
}

#[inline]
pub fn disable_interrupts() {
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }
}

/// Read the EFLAGS register
#[inline]
pub fn read_eflags() -> Eflags {
    let value: u32;
    unsafe {
        core::arch::asm!("pushfd", "pop {}", out(reg) value, options(nomem, preserves_flags));
    }
    Eflags::from_bits_retain(value)
}

/// Read the current code segment selector; its RPL is the privilege level we run at
#[inline]
pub fn read_cs() -> u16 {
    let value: u16;
    unsafe {
        core::arch::asm!("mov {0:x}, cs", out(reg) value, options(nomem, nostack, preserves_flags));
    }
    value
}

/// The processor this kernel runs on
pub struct Cpu;

pub static CPU: Cpu = Cpu;

impl InterruptControl for Cpu {
    fn interrupts_enabled(&self) -> bool {
        read_eflags().contains(Eflags::INTERRUPT)
    }

    fn disable_interrupts(&self) {
        disable_interrupts();
    }

    fn enable_interrupts(&self) {
        enable_interrupts();
    }
}
