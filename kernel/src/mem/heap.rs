use core::alloc::{GlobalAlloc, Layout};

use linked_list_allocator::LockedHeap;

use crate::sync::{InterruptControl, without_interrupts};

/// Smallest region worth handing to the allocator
pub const MIN_HEAP_SIZE: usize = 64 * 1024;

/// `LockedHeap` whose spin lock is only ever held with interrupts disabled, so a thread can never
/// be preempted while another one (or the timer handler) waits for the heap.
pub struct IrqSafeHeap<'a, C: InterruptControl + ?Sized> {
    heap: LockedHeap,
    cpu: &'a C,
}

impl<'a, C: InterruptControl + ?Sized> IrqSafeHeap<'a, C> {
    pub const fn empty(cpu: &'a C) -> Self {
        Self {
            heap: LockedHeap::empty(),
            cpu,
        }
    }

    /// # Safety
    ///
    /// See `init`.
    pub unsafe fn init(&self, start: usize, size: usize) {
        without_interrupts(self.cpu, || unsafe {
            self.heap.lock().init(start as *mut u8, size);
        });
    }

    /// Heap statistics: (free, used)
    pub fn stats(&self) -> (usize, usize) {
        without_interrupts(self.cpu, || {
            let heap = self.heap.lock();
            (heap.free(), heap.used())
        })
    }
}

unsafe impl<C: InterruptControl + ?Sized> GlobalAlloc for IrqSafeHeap<'_, C> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        without_interrupts(self.cpu, || unsafe { self.heap.alloc(layout) })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        without_interrupts(self.cpu, || unsafe { self.heap.dealloc(ptr, layout) })
    }
}

#[cfg(target_arch = "x86")]
type KernelHeap = IrqSafeHeap<'static, crate::arch::x86::Cpu>;

// host tests keep the system allocator
#[cfg(target_arch = "x86")]
#[cfg_attr(not(test), global_allocator)]
static ALLOCATOR: KernelHeap = IrqSafeHeap::empty(&crate::arch::x86::CPU);

// other targets only build the scheduler core and never initialise a heap
#[cfg(all(not(target_arch = "x86"), not(test)))]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hand `size` bytes at `start` to the global allocator.
///
/// # Safety
///
/// The region must be unused, writable memory that stays reserved for the heap, and this must be
/// called at most once.
#[cfg(target_arch = "x86")]
pub unsafe fn init(start: usize, size: usize) {
    unsafe { ALLOCATOR.init(start, size) };

    log::info!("Heap initialized at {:#x}, {} KiB", start, size / 1024);
}

/// Get heap statistics: (free, used)
#[cfg(target_arch = "x86")]
pub fn heap_stats() -> (usize, usize) {
    ALLOCATOR.stats()
}
