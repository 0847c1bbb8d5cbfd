//! A client-side IMAP connection: connect, negotiate `STARTTLS`, authenticate, then run
//! commands one at a time.
//!
//! # Usage
//!
//! A [`Connection`] is bound to a [`SessionContext`], which supplies credentials, the transport
//! and a hook for reporting channel health. [`ImapConfig`] is the context for plain TCP servers.
//!
//! ```no_run
//! use imap_connection::{ChannelState, Connection, ImapConfig};
//!
//! fn main() -> imap_connection::Result<()> {
//!     let config = ImapConfig::builder("imap.example.com", 143)
//!         .credentials("user", "password")
//!         .on_channel_state(|state: ChannelState| eprintln!("channel: {}", state))
//!         .build();
//!
//!     let mut connection = Connection::new(config);
//!     connection.open()?;
//!     println!("capabilities: {}", connection.capabilities());
//!
//!     for response in connection.execute_simple_command("SELECT INBOX", false)? {
//!         println!("{}", response);
//!     }
//!
//!     connection.execute_simple_command("LOGOUT", false)?;
//!     connection.close();
//!     Ok(())
//! }
//! ```
//!
//! Servers that advertise `STARTTLS` are always upgraded before credentials are sent. If the
//! server offers `AUTH=DIGEST-MD5` it is preferred over `LOGIN`.
//!
//! ## Opting out of native-tls
//!
//! For situations where using openssl becomes problematic, you can disable the
//! default feature which provides integration with native-tls. To use rustls instead:
//!
//! ```sh
//! cargo add imap-connection --no-default-features --features rustls-tls
//! ```

mod parse;
pub mod types;

pub mod authenticator;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod transport;
mod utils;

#[cfg(feature = "test_helpers")]
pub mod testing;

#[cfg(test)]
mod mock_transport;

pub use crate::config::{ImapConfig, ImapConfigBuilder};
pub use crate::connection::{Connection, ConnectionState};
pub use crate::context::{ChannelState, SessionContext, TagCounter};
pub use crate::error::{CommandFailure, Error, Result};
pub use crate::parse::ResponseParser;
pub use crate::transport::{TcpTransport, TlsKind, Transport};
pub use crate::types::*;
