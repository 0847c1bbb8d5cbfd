//! IMAP connection error types.

use std::fmt;
use std::io::Error as IoError;
use std::net::TcpStream;
use std::result;

use bufstream::IntoInnerError as BufError;
#[cfg(feature = "native-tls")]
use native_tls::{Error as TlsError, HandshakeError as TlsHandshakeError};
#[cfg(feature = "rustls-tls")]
use rustls_connector::HandshakeError as RustlsHandshakeError;
use thiserror::Error;

use crate::context::ChannelState;
use crate::types::{Response, Status};

/// A convenience wrapper around `Result` for `imap_connection::Error`.
pub type Result<T> = result::Result<T, Error>;

/// A tagged response that completed with something other than `OK`.
///
/// The connection does not interpret these beyond telling authentication failures and
/// server unavailability apart; everything else is left for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// The raw status line, without the trailing CRLF.
    pub raw: String,
    /// The status token, e.g. `NO` or `BAD`.
    pub status: String,
    /// Human-readable text following the status and response code.
    pub alert: String,
    /// The bracketed response code, e.g. `AUTHENTICATIONFAILED`, or empty if there was none.
    pub code: String,
}

impl CommandFailure {
    pub(crate) fn from_response(response: &Response) -> Self {
        CommandFailure {
            raw: response.to_string(),
            status: response
                .status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            alert: response.alert().unwrap_or_default().to_string(),
            code: response.code().unwrap_or_default().to_string(),
        }
    }

    /// Whether this failure means the credentials were rejected or have expired.
    ///
    /// That is the case when the server says `AUTHENTICATIONFAILED` or `EXPIRED`, or when it
    /// answers a plain `NO` with no response code at all.
    pub fn is_authentication_failure(&self) -> bool {
        self.code.eq_ignore_ascii_case(AUTHENTICATIONFAILED)
            || self.code.eq_ignore_ascii_case(EXPIRED)
            || (self.status.eq_ignore_ascii_case(Status::No.as_str()) && self.code.is_empty())
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

pub(crate) const AUTHENTICATIONFAILED: &str = "AUTHENTICATIONFAILED";
pub(crate) const EXPIRED: &str = "EXPIRED";
pub(crate) const UNAVAILABLE: &str = "UNAVAILABLE";

/// A set of errors that can occur while opening or using an IMAP connection
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    #[error("{0}")]
    Io(#[from] IoError),
    /// An error from the `native_tls` library during the TLS handshake.
    #[cfg(feature = "native-tls")]
    #[error("{0}")]
    TlsHandshake(#[from] TlsHandshakeError<TcpStream>),
    /// An error from the `native_tls` library while managing the socket.
    #[cfg(feature = "native-tls")]
    #[error("{0}")]
    Tls(#[from] TlsError),
    /// An error from the `rustls` library during the TLS handshake.
    #[cfg(feature = "rustls-tls")]
    #[error("{0}")]
    RustlsHandshake(#[from] RustlsHandshakeError<TcpStream>),
    /// The connection was terminated unexpectedly.
    #[error("Connection Lost")]
    ConnectionLost,
    /// The server sent something that does not fit the exchange in progress.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The server reported itself temporarily unavailable (`[UNAVAILABLE]`).
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),
    /// The server rejected the credentials, or they have expired.
    #[error("Authentication failed: {alert}")]
    AuthenticationFailed {
        /// Text the server (or the SASL exchange) gave for the failure.
        alert: String,
        /// The terminal response that caused this, if the server sent one.
        failure: Option<CommandFailure>,
    },
    /// A command completed with a non-`OK` status.
    #[error("Command failed: {0}")]
    Command(CommandFailure),
    /// Error validating input data
    #[error("{0}")]
    Validate(ValidateError),
    /// The session context has no username or password.
    #[error("No credentials configured")]
    MissingCredentials,
    /// The connection was closed and has not been bound to a new context.
    #[error("Connection is not bound to a session context")]
    Unbound,
}

impl<T> From<BufError<T>> for Error {
    fn from(err: BufError<T>) -> Error {
        Error::Io(err.into())
    }
}

impl From<ValidateError> for Error {
    fn from(err: ValidateError) -> Error {
        Error::Validate(err)
    }
}

impl Error {
    /// The health state this error is reported as, if any.
    ///
    /// Command failures and validation errors are the caller's to interpret and map to `None`.
    pub fn channel_state(&self) -> Option<ChannelState> {
        match self {
            Error::Io(_) | Error::ConnectionLost => Some(ChannelState::CommunicationError),
            #[cfg(feature = "native-tls")]
            Error::Tls(_) | Error::TlsHandshake(_) => Some(ChannelState::ServerError),
            #[cfg(feature = "rustls-tls")]
            Error::RustlsHandshake(_) => Some(ChannelState::ServerError),
            Error::Protocol(_) | Error::ServerUnavailable(_) => Some(ChannelState::ServerError),
            Error::AuthenticationFailed { .. } | Error::MissingCredentials => {
                Some(ChannelState::BadConfiguration)
            }
            Error::Command(_) | Error::Validate(_) | Error::Unbound => None,
        }
    }

    /// Whether this error came out of the TLS layer.
    pub fn is_tls(&self) -> bool {
        match self {
            #[cfg(feature = "native-tls")]
            Error::Tls(_) | Error::TlsHandshake(_) => true,
            #[cfg(feature = "rustls-tls")]
            Error::RustlsHandshake(_) => true,
            _ => false,
        }
    }
}

/// An invalid character was found in an input string.
#[derive(Debug, Error)]
#[error("Invalid character in input: {0:?}")]
pub struct ValidateError(pub char);
