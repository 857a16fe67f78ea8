use crate::proc::context::Pid;

/// Why a registry operation was refused. None of these change the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ThreadError {
    #[error("no thread with pid {0}")]
    NotFound(Pid),

    #[error("the base context cannot be removed")]
    BaseContext,
}

impl ThreadError {
    /// Status code handed back across the C ABI (0 is success)
    pub fn status(&self) -> u32 {
        match self {
            ThreadError::NotFound(_) => 1,
            ThreadError::BaseContext => 2,
        }
    }
}
