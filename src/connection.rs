//! The connection state machine.
//!
//! A [`Connection`] takes one session from a closed socket to an authenticated channel:
//!
//! ```text
//! Closed -> Connecting -> Greeted -> CapabilitiesKnown
//!        [-> TlsUpgrading -> CapabilitiesKnown] -> Authenticating -> Ready
//! ```
//!
//! Any step may instead end in `Failed`. Once open, callers run commands one at a time through
//! [`Connection::execute_simple_command`] and friends; commands are never pipelined.

use std::fmt;

use crate::authenticator::{self, DigestMd5};
use crate::context::{ChannelState, SessionContext, TagCounter};
use crate::error::{CommandFailure, Error, Result, UNAVAILABLE};
use crate::parse::ResponseParser;
use crate::transport::Transport;
use crate::types::{Capabilities, Response};
use crate::utils::{validate_line, validate_str};

/// Logged in place of sensitive client lines.
pub const REDACTED: &str = "[IMAP command redacted]";

const CAPABILITY: &str = "CAPABILITY";
const STARTTLS: &str = "STARTTLS";
const AUTH_DIGEST_MD5: &str = "AUTH=DIGEST-MD5";

/// Where a [`Connection`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport.
    Closed,
    /// Transport acquired and opened, waiting for the greeting.
    Connecting,
    /// The server greeted us with `OK`.
    Greeted,
    /// The capability set reflects the current (plaintext or secured) channel.
    CapabilitiesKnown,
    /// `STARTTLS` accepted, handshake in progress.
    TlsUpgrading,
    /// Logging in.
    Authenticating,
    /// Authenticated and ready for commands.
    Ready,
    /// The last `open` attempt failed.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single IMAP session bound to a [`SessionContext`].
///
/// The connection owns its transport and response parser exclusively; the two exist together
/// or not at all. Credentials, disabled capabilities and the tag counter are borrowed from the
/// context.
///
/// ```no_run
/// # use imap_connection::{Connection, ImapConfig};
/// # fn main() -> imap_connection::Result<()> {
/// let config = ImapConfig::builder("imap.example.com", 143)
///     .credentials("user", "secret")
///     .build();
/// let mut connection = Connection::new(config);
/// let responses = connection.execute_simple_command("NOOP", false)?;
/// for response in &responses {
///     println!("{}", response);
/// }
/// connection.close();
/// # Ok(())
/// # }
/// ```
pub struct Connection<C: SessionContext> {
    context: Option<C>,
    transport: Option<C::Transport>,
    parser: Option<ResponseParser>,
    capabilities: Capabilities,
    tags: TagCounter,
    login_phrase: Option<String>,
    state: ConnectionState,
}

impl<C: SessionContext> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("open", &self.is_open())
            .field("capabilities", &self.capabilities)
            .field("last_tag", &self.tags.current())
            .finish()
    }
}

impl<C: SessionContext> Connection<C> {
    /// Make a closed connection bound to `context`.
    pub fn new(context: C) -> Self {
        Connection {
            tags: context.tag_counter().clone(),
            context: Some(context),
            transport: None,
            parser: None,
            capabilities: Capabilities::default(),
            login_phrase: None,
            state: ConnectionState::Closed,
        }
    }

    /// Bind to a (possibly different) context, forgetting anything derived from the old one.
    pub fn set_context(&mut self, context: C) {
        self.tags = context.tag_counter().clone();
        self.context = Some(context);
        self.login_phrase = None;
    }

    /// The context this connection is bound to, if any.
    pub fn context(&self) -> Option<&C> {
        self.context.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the transport is up.
    pub fn is_open(&self) -> bool {
        self.transport.as_ref().map_or(false, |t| t.is_open())
    }

    /// Capabilities from the most recent `CAPABILITY` query.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Whether the most recent `CAPABILITY` query advertised `capability`.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.has(capability)
    }

    /// The underlying transport, while there is one.
    pub fn transport(&self) -> Option<&C::Transport> {
        self.transport.as_ref()
    }

    /// Connect, negotiate and authenticate.
    ///
    /// Does nothing if the connection is already open and authenticated. A connection whose
    /// last attempt failed is torn down and connected afresh. Whatever the outcome, responses
    /// left unread by the attempt are discarded.
    pub fn open(&mut self) -> Result<()> {
        if self.state == ConnectionState::Ready && self.is_open() {
            return Ok(());
        }
        if self.transport.is_some() {
            self.release();
        }
        if self.context.is_none() {
            return Err(Error::Unbound);
        }

        let result = self.establish();
        self.destroy_responses();

        match result {
            Ok(()) => {
                self.state = ConnectionState::Ready;
                tracing::debug!(capabilities = %self.capabilities, "IMAP connection ready");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                tracing::warn!("IMAP connection failed to open: {}", e);
                if matches!(e, Error::Io(_) | Error::ConnectionLost) || e.is_tls() {
                    if let Some(state) = e.channel_state() {
                        self.report(state);
                    }
                }
                Err(e)
            }
        }
    }

    /// Release the transport and parser and unbind from the context.
    ///
    /// The connection cannot be opened again until [`set_context`](Self::set_context) is called.
    pub fn close(&mut self) {
        self.release();
        self.context = None;
        self.login_phrase = None;
        self.capabilities = Capabilities::default();
    }

    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.parser = None;
        self.state = ConnectionState::Closed;
    }

    fn establish(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;
        let mut transport = self.bound_context()?.new_transport();
        transport.open()?;
        self.transport = Some(transport);
        self.parser = Some(ResponseParser::new());

        let greeting = self.read_response()?;
        if !(greeting.is_untagged() && greeting.is_ok()) {
            self.report(ChannelState::ServerError);
            return Err(Error::Protocol(format!("unexpected greeting: {}", greeting)));
        }
        self.state = ConnectionState::Greeted;

        self.query_capability()?;
        self.maybe_start_tls()?;

        self.state = ConnectionState::Authenticating;
        self.authenticate()
    }

    fn query_capability(&mut self) -> Result<()> {
        let responses = self.execute(CAPABILITY, false)?;
        let context = self.bound_context()?;
        let capabilities =
            Capabilities::from_responses(&responses, context.disabled_capabilities());
        tracing::debug!(%capabilities, "server capabilities");
        self.capabilities = capabilities;
        self.state = ConnectionState::CapabilitiesKnown;
        Ok(())
    }

    fn maybe_start_tls(&mut self) -> Result<()> {
        if !self.capabilities.has(STARTTLS) {
            return Ok(());
        }
        self.state = ConnectionState::TlsUpgrading;
        self.execute(STARTTLS, false)?;
        self.transport_mut()?.reopen_tls()?;
        // The old parser may hold plaintext bytes; start over on the secured stream.
        self.parser = Some(ResponseParser::new());
        self.query_capability()
    }

    fn authenticate(&mut self) -> Result<()> {
        let result = if self.capabilities.has(AUTH_DIGEST_MD5) {
            self.authenticate_digest_md5()
        } else {
            self.login()
        };

        match result {
            Err(Error::Command(failure)) if failure.is_authentication_failure() => {
                self.report(ChannelState::BadConfiguration);
                Err(Error::AuthenticationFailed {
                    alert: failure.alert.clone(),
                    failure: Some(failure),
                })
            }
            Err(Error::MissingCredentials) => {
                self.report(ChannelState::BadConfiguration);
                Err(Error::MissingCredentials)
            }
            other => other,
        }
    }

    fn login(&mut self) -> Result<()> {
        let phrase = self.login_phrase()?;
        self.execute(&phrase, true).map(|_| ())
    }

    fn login_phrase(&mut self) -> Result<String> {
        if let Some(ref phrase) = self.login_phrase {
            return Ok(phrase.clone());
        }
        let (username, password) = self.credentials()?;
        let phrase = format!(
            "LOGIN {} {}",
            validate_line(&username)?,
            validate_str(&password)?
        );
        self.login_phrase = Some(phrase.clone());
        Ok(phrase)
    }

    fn authenticate_digest_md5(&mut self) -> Result<()> {
        let (username, password) = self.credentials()?;
        let context = self.bound_context()?;
        let host = context.host().to_string();
        let cnonce = context.client_nonce();

        let responses = self.execute(
            &format!("AUTHENTICATE {}", authenticator::MECHANISM),
            false,
        )?;
        let challenge = authenticator::decode_base64(&continuation_payload(&responses)?)?;
        let digest = DigestMd5::new(&username, &password, &host, &challenge, cnonce)?;

        let reply = authenticator::encode_base64(&digest.create_response());
        let responses = self.execute_continuation_response(&reply, true)?;
        let rspauth = authenticator::decode_base64(&continuation_payload(&responses)?)?;
        digest.verify_response_auth(&rspauth)?;

        let responses = self.execute_continuation_response("", false)?;
        match responses.last() {
            Some(done) if done.is_tagged() => Ok(()),
            _ => Err(Error::Protocol(
                "AUTHENTICATE did not complete after response-auth".to_string(),
            )),
        }
    }

    fn credentials(&self) -> Result<(String, String)> {
        let context = self.bound_context()?;
        match (context.username(), context.password()) {
            (Some(username), Some(password)) => Ok((username.to_string(), password.to_string())),
            _ => Err(Error::MissingCredentials),
        }
    }

    /// Send `command` with a fresh tag, opening the connection first if needed.
    ///
    /// Returns the tag. When `sensitive` is set, the command text is kept out of the logs.
    pub fn send_command(&mut self, command: &str, sensitive: bool) -> Result<String> {
        self.open()?;
        self.send_tagged(command, sensitive)
    }

    fn send_tagged(&mut self, command: &str, sensitive: bool) -> Result<String> {
        let tag = self.tags.next_tag().to_string();
        let line = format!("{} {}", tag, command);
        let for_log = if sensitive {
            format!("{} {}", tag, REDACTED)
        } else {
            line.clone()
        };
        self.transport_mut()?.write_line(&line, &for_log)?;
        Ok(tag)
    }

    /// Read responses up to and including the next tagged line or continuation request.
    ///
    /// A tagged line with any status other than `OK` fails the whole batch: `[UNAVAILABLE]`
    /// becomes [`Error::ServerUnavailable`], anything else [`Error::Command`].
    pub fn get_command_responses(&mut self) -> Result<Vec<Response>> {
        let mut responses = Vec::new();
        let terminal = loop {
            let response = self.read_response()?;
            if response.is_tagged() || response.is_continuation_request() {
                break response;
            }
            responses.push(response);
        };

        if terminal.is_continuation_request() || terminal.is_ok() {
            responses.push(terminal);
            return Ok(responses);
        }

        drop(responses);
        self.destroy_responses();
        self.report(ChannelState::ServerError);

        let failure = CommandFailure::from_response(&terminal);
        tracing::debug!("command failed: {}", failure);
        if failure.code.eq_ignore_ascii_case(UNAVAILABLE) {
            Err(Error::ServerUnavailable(failure.alert))
        } else {
            Err(Error::Command(failure))
        }
    }

    /// Send `command` and collect its responses.
    pub fn execute_simple_command(
        &mut self,
        command: &str,
        sensitive: bool,
    ) -> Result<Vec<Response>> {
        self.send_command(command, sensitive)?;
        self.get_command_responses()
    }

    fn execute(&mut self, command: &str, sensitive: bool) -> Result<Vec<Response>> {
        self.send_tagged(command, sensitive)?;
        self.get_command_responses()
    }

    /// Answer a continuation request with `payload` (sent without a tag) and collect what
    /// follows.
    pub fn execute_continuation_response(
        &mut self,
        payload: &str,
        sensitive: bool,
    ) -> Result<Vec<Response>> {
        let for_log = if sensitive { REDACTED } else { payload };
        self.transport_mut()?.write_line(payload, for_log)?;
        self.get_command_responses()
    }

    /// Read one response off the wire.
    pub fn read_response(&mut self) -> Result<Response> {
        match (self.parser.as_mut(), self.transport.as_mut()) {
            (Some(parser), Some(transport)) => parser.read_response(transport.reader()?),
            _ => Err(Error::ConnectionLost),
        }
    }

    /// Drop anything the parser has buffered but not yet handed out.
    pub fn destroy_responses(&mut self) {
        if let Some(parser) = self.parser.as_mut() {
            parser.discard_buffered();
        }
    }

    fn bound_context(&self) -> Result<&C> {
        self.context.as_ref().ok_or(Error::Unbound)
    }

    fn transport_mut(&mut self) -> Result<&mut C::Transport> {
        self.transport.as_mut().ok_or(Error::ConnectionLost)
    }

    fn report(&self, state: ChannelState) {
        if let Some(ref context) = self.context {
            context.report_channel_state(state);
        }
    }
}

/// The payload of the continuation request that ended `responses`.
fn continuation_payload(responses: &[Response]) -> Result<String> {
    match responses.last() {
        Some(last) if last.is_continuation_request() => Ok(last.string_or_empty(0).to_string()),
        Some(last) => Err(Error::Protocol(format!(
            "expected a continuation request, got: {}",
            last
        ))),
        None => Err(Error::Protocol("expected a continuation request".to_string())),
    }
}
