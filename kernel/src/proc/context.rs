use crate::arch::Eflags;
use crate::arch::selectors::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;
use derivative::Derivative;

pub type Pid = u32;

/// Priority >= 0 is a cooperative weight (the quantum is multiplied by it), < 0 is urgent
pub const PRIORITY_URGENT: i32 = -1;
pub const PRIORITY_IDLE: i32 = 0;
pub const PRIORITY_NORMAL: i32 = 1;

/// Longest thread name kept, in bytes
pub const NAME_LEN: usize = 32;

/// Stable handle of a record in the registry arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub(crate) usize);

impl ThreadId {
    /// The base/idle context always occupies the first slot
    pub const BASE: ThreadId = ThreadId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Control request posted to a thread. Opaque to the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct Request(pub u32);

impl Request {
    pub const NONE: Request = Request(0);
}

bitflags::bitflags! {
    /// Signal state of a thread. Opaque to the scheduler.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Signal: u32 {
        const BREAK_ALLOWED = 1 << 0;
    }
}

/// Fixed-size thread label. Longer names are cut on a character boundary.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ThreadName {
    bytes: [u8; NAME_LEN],
    len: u8,
}

impl ThreadName {
    pub const fn empty() -> Self {
        Self {
            bytes: [0; NAME_LEN],
            len: 0,
        }
    }

    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0; NAME_LEN];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);

        Self {
            bytes,
            len: end as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        // `new` only ever copies whole characters
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for ThreadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ThreadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

/// Register file of a thread while it is not running.
///
/// The field order is relied upon by `arch::x86::context`, which addresses the fields by offset.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuState {
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub eip: u32,
    pub eflags: u32,
    pub cs: u32,
    pub ds: u32,
    pub es: u32,
    pub fs: u32,
    pub gs: u32,
    pub ss: u32,
}

impl CpuState {
    pub const fn zeroed() -> Self {
        Self {
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            eip: 0,
            eflags: 0,
            cs: 0,
            ds: 0,
            es: 0,
            fs: 0,
            gs: 0,
            ss: 0,
        }
    }

    /// Ring-0 state entering `entry` with the stack pointer at `esp`
    pub fn kernel(entry: u32, esp: u32, eflags: Eflags) -> Self {
        let data = KERNEL_DATA_SELECTOR as u32;

        Self {
            eip: entry,
            esp,
            eflags: eflags.bits(),
            cs: KERNEL_CODE_SELECTOR as u32,
            ds: data,
            es: data,
            fs: data,
            gs: data,
            ss: data,
            ..Self::zeroed()
        }
    }
}

/// Private stack block of a thread. Released when the owning record is dropped.
pub struct Stack {
    words: Box<[u32]>,
}

impl Stack {
    /// Smallest stack handed out, in bytes
    pub const MIN_SIZE: usize = 64;

    /// Allocate a zeroed stack of `size` bytes, rounded down to whole words.
    pub fn new(size: usize) -> Self {
        let words = size.max(Self::MIN_SIZE) / size_of::<u32>();

        Self {
            words: vec![0u32; words].into_boxed_slice(),
        }
    }

    pub fn start(&self) -> usize {
        self.words.as_ptr() as usize
    }

    pub fn size(&self) -> usize {
        self.words.len() * size_of::<u32>()
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Lay out the initial frame and return the stack pointer to start with.
    ///
    /// ```text
    ///          | argument       |  <- top word
    ///          | return address |  <- zero, so returning from the entry point faults
    ///  esp --> |----------------|
    /// ```
    pub(crate) fn prepare(&mut self, arg: u32) -> usize {
        self.words.fill(0);

        let top = self.words.len();
        self.words[top - 1] = arg;
        self.words[top - 2] = 0;

        self.start() + self.size() - 2 * size_of::<u32>()
    }
}

/// One live thread: identity, scheduling state, saved registers and its stack.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ThreadContext {
    pub pid: Pid,
    pub name: ThreadName,
    pub child_of: Pid,

    pub priority: i32,
    /// Absolute tick at which the thread is preempted, 0 while not armed
    pub next_switch: u64,
    pub request: Request,
    pub signal: Signal,

    pub cpu: CpuState,

    pub stack_start: usize,
    pub stack_size: usize,
    #[derivative(Debug = "ignore")]
    stack: Option<Stack>,

    pub(crate) next: Option<ThreadId>,
}

impl ThreadContext {
    /// The all-zero record describing whatever was running when threading started
    pub fn base() -> Self {
        Self {
            pid: 0,
            name: ThreadName::empty(),
            child_of: 0,
            priority: PRIORITY_IDLE,
            next_switch: 0,
            request: Request::NONE,
            signal: Signal::empty(),
            cpu: CpuState::zeroed(),
            stack_start: 0,
            stack_size: 0,
            stack: None,
            next: None,
        }
    }

    /// A new ring-0 thread that starts at `entry` with `arg` on its stack.
    pub fn new(
        pid: Pid,
        child_of: Pid,
        name: &str,
        mut stack: Stack,
        entry: u32,
        arg: u32,
        eflags: Eflags,
    ) -> Self {
        let esp = stack.prepare(arg);

        Self {
            pid,
            name: ThreadName::new(name),
            child_of,
            priority: PRIORITY_NORMAL,
            next_switch: 0,
            request: Request::NONE,
            signal: Signal::BREAK_ALLOWED,
            cpu: CpuState::kernel(entry, esp as u32, eflags),
            stack_start: stack.start(),
            stack_size: stack.size(),
            stack: Some(stack),
            next: None,
        }
    }

    pub fn next(&self) -> Option<ThreadId> {
        self.next
    }

    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }
}
