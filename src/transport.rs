//! Byte channel a [`Connection`](crate::Connection) talks over.

use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use bufstream::BufStream;
#[cfg(feature = "native-tls")]
use native_tls::{TlsConnector, TlsStream};
#[cfg(feature = "rustls-tls")]
use rustls_connector::{RustlsConnector, TlsStream as RustlsStream};

use crate::error::{Error, Result};

const CRLF: &[u8] = b"\r\n";

/// An open-able, line-oriented channel to the server that can be upgraded to TLS in place.
pub trait Transport {
    /// Establish the channel.
    fn open(&mut self) -> Result<()>;

    /// Tear the channel down. Closing a closed transport does nothing.
    fn close(&mut self);

    /// Whether the channel is currently established.
    fn is_open(&self) -> bool;

    /// Write `line` followed by CRLF. `for_log` is what may be logged in its place.
    fn write_line(&mut self, line: &str, for_log: &str) -> Result<()>;

    /// The buffered input side of the channel.
    fn reader(&mut self) -> Result<&mut dyn BufRead>;

    /// Negotiate TLS over the established channel, after the server agreed to `STARTTLS`.
    fn reopen_tls(&mut self) -> Result<()>;
}

/// Which TLS implementation performs the `STARTTLS` handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsKind {
    /// Use the `native-tls` crate.
    #[cfg(feature = "native-tls")]
    Native,
    /// Use the `rustls` crate.
    #[cfg(feature = "rustls-tls")]
    Rust,
}

impl Default for TlsKind {
    #[allow(unreachable_code)]
    fn default() -> Self {
        #[cfg(feature = "native-tls")]
        return TlsKind::Native;
        #[cfg(feature = "rustls-tls")]
        return TlsKind::Rust;
        #[cfg(not(any(feature = "native-tls", feature = "rustls-tls")))]
        unreachable!("no TLS backend enabled")
    }
}

enum ImapStream {
    Plain(TcpStream),
    #[cfg(feature = "native-tls")]
    Tls(TlsStream<TcpStream>),
    #[cfg(feature = "rustls-tls")]
    Rustls(RustlsStream<TcpStream>),
}

impl ImapStream {
    fn is_secure(&self) -> bool {
        !matches!(self, ImapStream::Plain(_))
    }
}

impl Read for ImapStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ImapStream::Plain(s) => s.read(buf),
            #[cfg(feature = "native-tls")]
            ImapStream::Tls(s) => s.read(buf),
            #[cfg(feature = "rustls-tls")]
            ImapStream::Rustls(s) => s.read(buf),
        }
    }
}

impl Write for ImapStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ImapStream::Plain(s) => s.write(buf),
            #[cfg(feature = "native-tls")]
            ImapStream::Tls(s) => s.write(buf),
            #[cfg(feature = "rustls-tls")]
            ImapStream::Rustls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ImapStream::Plain(s) => s.flush(),
            #[cfg(feature = "native-tls")]
            ImapStream::Tls(s) => s.flush(),
            #[cfg(feature = "rustls-tls")]
            ImapStream::Rustls(s) => s.flush(),
        }
    }
}

/// A plaintext TCP connection that is secured with `STARTTLS` when the server offers it.
pub struct TcpTransport {
    domain: String,
    port: u16,
    read_timeout: Option<Duration>,
    tls_kind: TlsKind,
    skip_tls_verify: bool,
    stream: Option<BufStream<ImapStream>>,
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("domain", &self.domain)
            .field("port", &self.port)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

impl TcpTransport {
    /// Make a closed transport for `domain:port`.
    pub fn new(domain: impl Into<String>, port: u16) -> Self {
        TcpTransport {
            domain: domain.into(),
            port,
            read_timeout: None,
            tls_kind: TlsKind::default(),
            skip_tls_verify: false,
            stream: None,
        }
    }

    /// Give up on reads that block for longer than `timeout`.
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Pick the TLS implementation used by [`reopen_tls`](Transport::reopen_tls).
    pub fn tls_kind(mut self, kind: TlsKind) -> Self {
        self.tls_kind = kind;
        self
    }

    /// Accept any certificate and host name during the TLS handshake (`native-tls` only).
    pub fn danger_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    /// Whether the channel has been upgraded to TLS.
    pub fn is_secure(&self) -> bool {
        self.stream.as_ref().map_or(false, |s| s.get_ref().is_secure())
    }

    fn stream(&mut self) -> Result<&mut BufStream<ImapStream>> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::NotConnected, "not open")))
    }

    #[allow(unused_variables)]
    fn handshake(&self, tcp: TcpStream) -> Result<ImapStream> {
        match self.tls_kind {
            #[cfg(feature = "native-tls")]
            TlsKind::Native => {
                let ssl_conn = TlsConnector::builder()
                    .danger_accept_invalid_certs(self.skip_tls_verify)
                    .danger_accept_invalid_hostnames(self.skip_tls_verify)
                    .build()?;
                Ok(ImapStream::Tls(TlsConnector::connect(
                    &ssl_conn,
                    &self.domain,
                    tcp,
                )?))
            }
            #[cfg(feature = "rustls-tls")]
            TlsKind::Rust => {
                let ssl_conn = RustlsConnector::new_with_native_certs()?;
                Ok(ImapStream::Rustls(ssl_conn.connect(&self.domain, tcp)?))
            }
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        let tcp = TcpStream::connect((self.domain.as_str(), self.port))?;
        tcp.set_read_timeout(self.read_timeout)?;
        tracing::debug!(domain = %self.domain, port = self.port, "connected");
        self.stream = Some(BufStream::new(ImapStream::Plain(tcp)));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Ok(ImapStream::Plain(tcp)) = stream.into_inner() {
                let _ = tcp.shutdown(std::net::Shutdown::Both);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn write_line(&mut self, line: &str, for_log: &str) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(line.as_bytes())?;
        stream.write_all(CRLF)?;
        stream.flush()?;
        tracing::debug!("C: {}", for_log);
        Ok(())
    }

    fn reader(&mut self) -> Result<&mut dyn BufRead> {
        let stream = self.stream()?;
        Ok(stream as &mut dyn BufRead)
    }

    fn reopen_tls(&mut self) -> Result<()> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::NotConnected, "not open")))?;
        let tcp = match stream.into_inner()? {
            ImapStream::Plain(tcp) => tcp,
            secured => {
                self.stream = Some(BufStream::new(secured));
                return Err(Error::Protocol("connection is already secured".to_string()));
            }
        };
        let secured = self.handshake(tcp)?;
        tracing::debug!(domain = %self.domain, "TLS established");
        self.stream = Some(BufStream::new(secured));
        Ok(())
    }
}
