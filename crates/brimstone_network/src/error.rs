use std::io;

use thiserror::Error;

/// The failure taxonomy of the server core.
///
/// The reactor sorts errors into two fates: [`Protocol`](Error::Protocol)
/// disconnects the offending client and the service keeps running; everything
/// else tears the process down. [`Os`](Error::Os) straddles the line — fatal
/// at startup and in the global pools, a disconnect when it comes back on a
/// per-client completion.
#[derive(Debug, Error)]
pub enum Error {
    /// An internal invariant did not hold.
    #[error("check failed: {0}")]
    Check(&'static str),

    /// The client sent something the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(anyhow::Error),

    /// An operating system error, carrying the underlying code.
    #[error(transparent)]
    Os(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True when the right response is to disconnect one client rather than
    /// take down the server.
    pub fn is_client_scoped(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}
