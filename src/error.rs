use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// SQLSTATE reported when no server state is available.
pub const SQLSTATE_UNKNOWN: &str = "00000";

/// Driver error surface.
///
/// Three kinds matter to callers: `Client` (API misuse, the connection is
/// untouched), `Protocol` (the byte stream no longer conforms to the
/// grammar, the connection is unusable), and `Server` (an ERR packet, the
/// connection stays idle and the command may be retried). Transport
/// failures (`Io`, `Timeout`) close the connection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("client error: {0}")]
    Client(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error {code} ({sqlstate}): {message}")]
    Server {
        code: u16,
        sqlstate: String,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out")]
    Timeout,
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub(crate) fn client(msg: impl Into<String>) -> Self {
        Error::Client(msg.into())
    }

    /// Server error number, 0 for non-server errors.
    pub fn errno(&self) -> u16 {
        match self {
            Error::Server { code, .. } => *code,
            _ => 0,
        }
    }

    /// Five-character SQLSTATE, `"00000"` when the server supplied none.
    pub fn sqlstate(&self) -> &str {
        match self {
            Error::Server { sqlstate, .. } => sqlstate,
            _ => SQLSTATE_UNKNOWN,
        }
    }

    /// True for errors that leave the connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Io(_) | Error::Timeout)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}
