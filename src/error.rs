//! The single error vocabulary used throughout the crate (spec §7).
//!
//! Every fallible operation in this crate returns `Result<T, RuntimeError>`,
//! except the patch-local Krylov solvers which may additionally fail with
//! [`BreakdownError`]. Neither error type is ever swallowed internally: a
//! caller always sees the failure.

use std::fmt;

/// The crate's catch-all error: a human readable message, nothing more.
///
/// Mirrors `ThunderEgg::RuntimeError`, which is itself just a tagged
/// `std::runtime_error`. We don't attempt to recover structured detail from
/// the message because none of this crate's callers need to match on error
/// *kind* — only report it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RuntimeError(pub String);

impl RuntimeError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

/// Raised by a patch-local Krylov solver when it detects a zero denominator
/// (`rho`, `omega`, ...) and `continue_on_breakdown` is `false`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("breakdown in patch-local iterative solve: {0}")]
pub struct BreakdownError(pub String);

/// The result type threaded through nearly every fallible call in the crate.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Either a hard [`RuntimeError`] or a recoverable-by-configuration
/// [`BreakdownError`], returned by the patch Krylov solvers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    Runtime(RuntimeError),
    Breakdown(BreakdownError),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::Runtime(e) => write!(f, "{}", e),
            SolveError::Breakdown(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SolveError {}

impl From<RuntimeError> for SolveError {
    fn from(e: RuntimeError) -> Self {
        SolveError::Runtime(e)
    }
}

impl From<BreakdownError> for SolveError {
    fn from(e: BreakdownError) -> Self {
        SolveError::Breakdown(e)
    }
}

/// Convenience macro mirroring the teacher's terse `assert!`-with-message
/// style, but producing a [`RuntimeError`] instead of panicking.
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::error::RuntimeError::new(format!($($arg)*)))
    };
}

pub(crate) use bail;
