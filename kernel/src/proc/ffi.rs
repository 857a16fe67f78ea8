//! C ABI entry points for code linked against the kernel.
//!
//! Status results: 0 on success, `ThreadError::status` otherwise.
//!
//! Every entry point takes the scheduler lock with interrupts masked, so callers must run in
//! ring 0. Code dropped to ring 3 by `switch_to_user_mode` faults on the first call.

use crate::arch::x86::usermode;
use crate::proc::context::Pid;
use crate::proc::error::ThreadError;
use crate::proc::manager;
use crate::proc::message::MessageTransport;

unsafe extern "C" {
    /// Message queue primitive provided by the IPC layer
    fn message_read(message: *mut u8, thread: u32) -> u8;
}

/// Forwards to the external `message_read`
struct ExternTransport;

impl MessageTransport for ExternTransport {
    fn read(&mut self, message: &mut [u8], thread: Pid) -> u8 {
        // SAFETY: `message` is a live, writable buffer for the duration of the call.
        unsafe { message_read(message.as_mut_ptr(), thread) }
    }
}

fn status(result: Result<(), ThreadError>) -> u32 {
    match result {
        Ok(()) => 0,
        Err(err) => err.status(),
    }
}

/// # Safety
///
/// `name` must point to `name_len` readable bytes, or be null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn thread_create(
    entry: u32,
    arg: u32,
    name: *const u8,
    name_len: usize,
    stack_size: usize,
) -> Pid {
    let name = if name.is_null() {
        ""
    } else {
        // SAFETY: guaranteed by the caller.
        let bytes = unsafe { core::slice::from_raw_parts(name, name_len) };
        core::str::from_utf8(bytes).unwrap_or("thread")
    };

    manager::create(entry, arg, name, stack_size)
}

#[unsafe(no_mangle)]
pub extern "C" fn thread_exit(code: u32) {
    manager::exit(code);
}

#[unsafe(no_mangle)]
pub extern "C" fn thread_kill(pid: Pid) -> u32 {
    status(manager::kill(pid))
}

#[unsafe(no_mangle)]
pub extern "C" fn thread_set_priority(pid: Pid, priority: i32) -> u32 {
    status(manager::set_priority(pid, priority))
}

#[unsafe(no_mangle)]
pub extern "C" fn thread_get_own_pid() -> Pid {
    manager::own_pid()
}

#[unsafe(no_mangle)]
pub extern "C" fn thread_number_of_threads() -> u32 {
    manager::count() as u32
}

#[unsafe(no_mangle)]
pub extern "C" fn thread_show_info() -> u32 {
    manager::enumerate() as u32
}

/// # Safety
///
/// `message` must point to `len` writable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn thread_message_read(message: *mut u8, len: usize) -> u8 {
    // SAFETY: guaranteed by the caller.
    let message = unsafe { core::slice::from_raw_parts_mut(message, len) };
    manager::read_message(&mut ExternTransport, message)
}

/// One way: the caller cannot use any of the functions above afterwards.
#[unsafe(no_mangle)]
pub extern "C" fn switch_to_user_mode() {
    usermode::switch_to_user_mode();
}
