//! Framework status codes

use thiserror::Error;

/// Result type for framework operations
pub type FwkResult<T> = Result<T, FwkError>;

/// Failures reported by framework, transport and module operations.
///
/// Every variant maps onto the numeric status word exchanged with firmware
/// components that predate this crate (see [`FwkError::code`]).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FwkError {
    /// Operation completes later; the caller gets its answer asynchronously
    #[error("request pending")]
    Pending,

    /// Invalid parameter or malformed addressing
    #[error("invalid parameter")]
    Param,

    /// A module handler failed
    #[error("handler failed")]
    Handler,

    /// Caller is not allowed to do this
    #[error("access denied")]
    Access,

    /// Out of event records, slots or signal entries
    #[error("out of memory")]
    NoMem,

    /// Operation not supported by the target
    #[error("not supported")]
    Support,

    /// Resource in use, try again later
    #[error("busy")]
    Busy,

    /// Invalid or inconsistent configuration data
    #[error("invalid data")]
    Data,

    /// Object is not in a state that permits the operation
    #[error("invalid state")]
    State,

    /// Initialization failed
    #[error("initialization failed")]
    Init,

    /// Unrecoverable internal inconsistency
    #[error("framework panic")]
    Panic,
}

impl FwkError {
    /// Numeric status word for this error
    pub const fn code(self) -> i32 {
        match self {
            FwkError::Pending => 1,
            FwkError::Param => -1,
            FwkError::Handler => -4,
            FwkError::Access => -5,
            FwkError::NoMem => -8,
            FwkError::Support => -10,
            FwkError::Busy => -12,
            FwkError::Data => -14,
            FwkError::State => -15,
            FwkError::Init => -16,
            FwkError::Panic => -18,
        }
    }

    /// Status word of a whole result; success is 0
    pub fn status<T>(result: &FwkResult<T>) -> i32 {
        match result {
            Ok(_) => 0,
            Err(e) => e.code(),
        }
    }
}
