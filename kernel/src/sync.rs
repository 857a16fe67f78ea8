//! Interrupt-based mutual exclusion.
//!
//! There is one CPU and the only thing that can preempt kernel code is an interrupt, so shared
//! kernel state is protected by switching interrupts off rather than by a lock. `IrqCell` hands
//! out `&mut T` only inside such a critical section.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// The critical-section primitive provided by the platform.
pub trait InterruptControl {
    fn interrupts_enabled(&self) -> bool;
    fn disable_interrupts(&self);
    fn enable_interrupts(&self);
}

/// Disables interrupts for its lifetime and puts back whatever state it found.
///
/// Restoring the previous state instead of unconditionally enabling keeps nested critical
/// sections (and ones entered from an interrupt handler) correct.
pub struct InterruptGuard<'a, C: InterruptControl + ?Sized> {
    cpu: &'a C,
    was_enabled: bool,
}

impl<'a, C: InterruptControl + ?Sized> InterruptGuard<'a, C> {
    pub fn new(cpu: &'a C) -> Self {
        let was_enabled = cpu.interrupts_enabled();
        cpu.disable_interrupts();

        Self { cpu, was_enabled }
    }

    /// Whether interrupts were on when the guard was taken.
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }
}

impl<C: InterruptControl + ?Sized> Drop for InterruptGuard<'_, C> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.cpu.enable_interrupts();
        }
    }
}

/// Run `f` with interrupts disabled.
pub fn without_interrupts<C, R>(cpu: &C, f: impl FnOnce() -> R) -> R
where
    C: InterruptControl + ?Sized,
{
    let _guard = InterruptGuard::new(cpu);
    f()
}

/// Process-wide state that is only ever touched with interrupts disabled.
pub struct IrqCell<T> {
    value: UnsafeCell<T>,
    borrowed: AtomicBool,
}

// Access is serialised by disabling interrupts on the single CPU; the borrow flag catches a
// critical section that tries to re-enter the same cell.
unsafe impl<T: Send> Sync for IrqCell<T> {}

struct BorrowFlag<'a>(&'a AtomicBool);

impl Drop for BorrowFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> IrqCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            borrowed: AtomicBool::new(false),
        }
    }

    /// Borrow the contents mutably inside an interrupt-free critical section.
    ///
    /// Panics if the cell is already borrowed, which would mean a critical section re-entered
    /// itself.
    pub fn with<C, R>(&self, cpu: &C, f: impl FnOnce(&mut T) -> R) -> R
    where
        C: InterruptControl + ?Sized,
    {
        let _guard = InterruptGuard::new(cpu);

        if self.borrowed.swap(true, Ordering::Acquire) {
            panic!("IrqCell re-entered while already borrowed");
        }
        let _flag = BorrowFlag(&self.borrowed);

        // SAFETY: interrupts are off and the borrow flag is held, so this is the only reference.
        f(unsafe { &mut *self.value.get() })
    }
}
