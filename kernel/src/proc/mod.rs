//! Threads: the context registry, the quantum policy, the switch protocol and the scheduler that
//! ties them to the timer.

pub mod context;
pub mod error;
pub mod loader;
pub mod message;
pub mod quantum;
pub mod registry;
pub mod scheduler;
pub mod switch;

#[cfg(target_arch = "x86")]
pub mod ffi;
#[cfg(target_arch = "x86")]
pub mod manager;

pub use context::{Pid, Stack, ThreadContext, ThreadId};
pub use error::ThreadError;
pub use loader::LoadError;
pub use scheduler::Scheduler;
