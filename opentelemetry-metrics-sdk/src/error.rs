//! Errors shared by lifecycle operations (flush and shutdown) of readers,
//! exporters and the meter provider.
use std::time::Duration;
use thiserror::Error;

/// Errors returned by flush and shutdown operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OTelSdkError {
    /// Shutdown has already been invoked.
    ///
    /// Callers that invoke shutdown more than once can usually ignore this
    /// variant; it only tells them the earlier call did the work.
    #[error("Shutdown already invoked")]
    AlreadyShutdown,

    /// Operation timed out before completing.
    ///
    /// No data is dropped or duplicated by a timed out call; the next
    /// successful collection picks up where the last one left off.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Operation failed due to an internal error.
    ///
    /// The error message is intended for logging purposes only and should not
    /// be used to make programmatic decisions.
    #[error("Operation failed: {0}")]
    InternalFailure(String),
}

/// A specialized `Result` type for lifecycle operations.
pub type OTelSdkResult = Result<(), OTelSdkError>;
