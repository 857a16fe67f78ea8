//! The PIT drives preemption: channel 0 fires IRQ0 `TICKS_PER_SECOND` times a second and every
//! tick goes through the scheduler.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::selectors::KERNEL_DATA_SELECTOR;
use crate::arch::x86::{idt, outb};
use crate::proc::manager;
use crate::proc::quantum::TICKS_PER_SECOND;
use crate::proc::switch::InterruptedState;

/// PIC line of PIT channel 0
pub const IRQ: u8 = 0;

const PIT_FREQUENCY: u32 = 1_193_182;
const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
// channel 0, lobyte/hibyte, rate generator
const PIT_MODE_RATE: u8 = 0x34;

static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    let divisor = (PIT_FREQUENCY / TICKS_PER_SECOND) as u16;

    outb(PIT_COMMAND, PIT_MODE_RATE);
    outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
    outb(PIT_CHANNEL0, (divisor >> 8) as u8);

    log::debug!("PIT running at {} Hz (divisor {})", TICKS_PER_SECOND, divisor);
}

/// Ticks since the timer was started
pub fn now() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

extern "C" fn timer_interrupt(state: *const InterruptedState) {
    TICKS.fetch_add(1, Ordering::Relaxed);

    // acknowledge first: the scheduler may not return here
    idt::send_eoi(IRQ);

    // SAFETY: the stub passes a pointer to the snapshot it just pushed.
    manager::schedule(unsafe { &*state });
}

/// IRQ0 entry. Builds an `InterruptedState` on the stack, lets the scheduler look at it and, if
/// the scheduler returns, resumes the interrupted thread from it.
#[unsafe(naked)]
pub extern "C" fn irq0_entry() {
    core::arch::naked_asm!(
        "push 0", // error code
        "push {vector}",
        "pushad",
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "mov ax, {data}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "push esp",
        "call {handler}",
        "add esp, 4",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "popad",
        "add esp, 8", // vector and error code
        "iretd",
        vector = const idt::IRQ_BASE + IRQ,
        data = const KERNEL_DATA_SELECTOR,
        handler = sym timer_interrupt,
    );
}
