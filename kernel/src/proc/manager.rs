//! The kernel's one scheduler instance and the thread API built on it.
//!
//! Every access goes through `THREADS`, which only hands out the scheduler with interrupts
//! disabled. Operations that leave the calling thread (exit, killing oneself, a preemption) keep
//! interrupts off all the way into `switch_to`; the resumed thread's `iret` restores its flags.

use crate::arch::Eflags;
use crate::arch::x86::serial::SERIAL;
use crate::arch::x86::{self, CPU, context, timer};
use crate::proc::context::{CpuState, Pid, Stack};
use crate::proc::error::ThreadError;
use crate::proc::loader::{ElfImage, LoadError};
use crate::proc::message::{self, MessageTransport};
use crate::proc::registry::Killed;
use crate::proc::scheduler::Scheduler;
use crate::proc::switch::InterruptedState;
use crate::sync::{InterruptGuard, IrqCell};

static THREADS: IrqCell<Option<Scheduler>> = IrqCell::new(None);

fn with_threads<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    THREADS.with(&CPU, |threads| match threads {
        Some(scheduler) => f(scheduler),
        None => panic!("thread API used before proc::manager::init"),
    })
}

/// Load `cpu` and never come back. Interrupts must already be off.
fn resume(cpu: CpuState) -> ! {
    // SAFETY: `cpu` is either a freshly built thread or one saved by `switch::save`.
    unsafe { context::switch_to(&cpu) }
}

/// Install the base context. Whatever is executing becomes that context.
pub fn init() {
    THREADS.with(&CPU, |threads| {
        if threads.is_some() {
            log::warn!("Threading already initialized, keeping the existing registry");
            return;
        }

        *threads = Some(Scheduler::new());
    });

    log::info!("Initialized threading");
}

pub fn create(entry: u32, arg: u32, name: &str, stack_size: usize) -> Pid {
    let stack = Stack::new(stack_size);
    let eflags = Eflags::for_new_thread(x86::read_eflags());

    with_threads(|scheduler| {
        let registry = scheduler.registry_mut();
        let id = registry.create(stack, entry, arg, name, eflags);
        registry.context(id).pid
    })
}

/// Leave the calling thread for good.
///
/// Only returns when the caller is the base context, which cannot exit.
pub fn exit(code: u32) {
    let _guard = InterruptGuard::new(&CPU);

    let next = with_threads(|scheduler| {
        let pid = scheduler.registry().own_pid();
        let next = scheduler.registry_mut().exit()?;

        log::info!("Thread {} exited with code {}", pid, code);
        Ok::<_, ThreadError>(scheduler.registry().context(next).cpu)
    });

    match next {
        Ok(cpu) => resume(cpu),
        Err(err) => log::warn!("exit({}) refused: {}", code, err),
    }
}

/// Remove the thread with `pid`. Killing the calling thread does not return.
pub fn kill(pid: Pid) -> Result<(), ThreadError> {
    let _guard = InterruptGuard::new(&CPU);

    let killed = with_threads(|scheduler| {
        let killed = scheduler.registry_mut().kill(pid)?;
        Ok::<_, ThreadError>(match killed {
            Killed::Other => None,
            Killed::Current(next) => Some(scheduler.registry().context(next).cpu),
        })
    })
    .inspect_err(|err| log::warn!("kill({}) failed: {}", pid, err))?;

    if let Some(cpu) = killed {
        log::info!("Thread {} killed itself", pid);
        resume(cpu);
    }

    Ok(())
}

pub fn set_priority(pid: Pid, priority: i32) -> Result<(), ThreadError> {
    with_threads(|scheduler| scheduler.registry_mut().set_priority(pid, priority))
}

pub fn own_pid() -> Pid {
    with_threads(|scheduler| scheduler.registry().own_pid())
}

/// Threads created on top of the base context
pub fn count() -> usize {
    with_threads(|scheduler| scheduler.registry().count())
}

/// Print the thread table on the console and return how many records it listed.
pub fn enumerate() -> usize {
    with_threads(|scheduler| {
        let mut console = SERIAL.lock();
        scheduler.registry().enumerate(&mut *console).unwrap_or(0)
    })
}

/// Timer tick entry point, called from the IRQ0 stub with interrupts off.
pub fn schedule(state: &InterruptedState) {
    let now = timer::now();

    // the timer may fire before `init`; there is nothing to schedule yet
    let next = THREADS.with(&CPU, |threads| {
        threads
            .as_mut()
            .and_then(|scheduler| scheduler.tick(state, now))
    });

    if let Some(cpu) = next {
        resume(cpu);
    }
}

/// Read a message for the running thread through `transport`.
pub fn read_message<T>(transport: &mut T, message: &mut [u8]) -> u8
where
    T: MessageTransport + ?Sized,
{
    with_threads(|scheduler| {
        message::read_for_current_thread(scheduler.registry(), transport, message)
    })
}

/// Copy the loadable segments of an ELF image into place and start a thread at its entry.
pub fn spawn_image(image: &[u8], stack_size: usize) -> Result<Pid, LoadError> {
    let elf =
        ElfImage::parse(image).inspect_err(|err| log::warn!("Rejected program image: {}", err))?;

    for segment in elf.segments() {
        // SAFETY: memory is identity mapped and the image owns the range it asks for.
        let dest = unsafe {
            core::slice::from_raw_parts_mut(
                segment.virt_addr as usize as *mut u8,
                segment.mem_size as usize,
            )
        };
        segment.write_to(dest);

        log::debug!(
            "Loaded segment at {:#x} ({} bytes, {} from file)",
            segment.virt_addr,
            segment.mem_size,
            segment.data.len()
        );
    }

    Ok(create(elf.entry(), 0, "task", stack_size))
}
