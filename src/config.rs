use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::context::{ChannelState, SessionContext, TagCounter};
use crate::transport::{TcpTransport, TlsKind};

type ChannelStateHook = Arc<dyn Fn(ChannelState) + Send + Sync>;

/// A [`SessionContext`] for a server reached over TCP.
///
/// ```no_run
/// # use imap_connection::{Connection, ImapConfig};
/// # fn main() -> Result<(), imap_connection::Error> {
/// let config = ImapConfig::builder("imap.example.com", 143)
///     .credentials("user", "secret")
///     .build();
/// let mut connection = Connection::new(config);
/// connection.open()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ImapConfig {
    domain: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    disabled_capabilities: HashSet<String>,
    read_timeout: Option<Duration>,
    tls_kind: TlsKind,
    skip_tls_verify: bool,
    tags: TagCounter,
    on_channel_state: Option<ChannelStateHook>,
}

impl fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapConfig")
            .field("domain", &self.domain)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("disabled_capabilities", &self.disabled_capabilities)
            .field("read_timeout", &self.read_timeout)
            .field("tls_kind", &self.tls_kind)
            .finish()
    }
}

impl ImapConfig {
    /// Start configuring a session against `domain:port`.
    pub fn builder(domain: impl Into<String>, port: u16) -> ImapConfigBuilder {
        ImapConfigBuilder::new(domain, port)
    }

    /// The server port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl SessionContext for ImapConfig {
    type Transport = TcpTransport;

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn host(&self) -> &str {
        &self.domain
    }

    fn disabled_capabilities(&self) -> &HashSet<String> {
        &self.disabled_capabilities
    }

    fn tag_counter(&self) -> &TagCounter {
        &self.tags
    }

    fn new_transport(&self) -> TcpTransport {
        TcpTransport::new(self.domain.clone(), self.port)
            .read_timeout(self.read_timeout)
            .tls_kind(self.tls_kind)
            .danger_skip_tls_verify(self.skip_tls_verify)
    }

    fn report_channel_state(&self, state: ChannelState) {
        match self.on_channel_state {
            Some(ref hook) => hook(state),
            None => tracing::warn!(domain = %self.domain, %state, "IMAP channel state"),
        }
    }
}

/// A convenience builder for [`ImapConfig`].
///
/// ```no_run
/// # use imap_connection::ImapConfig;
/// # use std::time::Duration;
/// let config = ImapConfig::builder("imap.example.com", 143)
///     .credentials("user", "secret")
///     .disable_capability("STARTTLS")
///     .read_timeout(Duration::from_secs(30))
///     .on_channel_state(|state| eprintln!("channel: {}", state))
///     .build();
/// ```
pub struct ImapConfigBuilder {
    config: ImapConfig,
}

impl ImapConfigBuilder {
    /// Make a new `ImapConfigBuilder` using the given domain and port.
    pub fn new(domain: impl Into<String>, port: u16) -> Self {
        ImapConfigBuilder {
            config: ImapConfig {
                domain: domain.into(),
                port,
                username: None,
                password: None,
                disabled_capabilities: HashSet::new(),
                read_timeout: None,
                tls_kind: TlsKind::default(),
                skip_tls_verify: false,
                tags: TagCounter::new(),
                on_channel_state: None,
            },
        }
    }

    /// Log in as `username` with `password`.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Behave as if the server never advertised `capability`.
    pub fn disable_capability(mut self, capability: impl Into<String>) -> Self {
        self.config.disabled_capabilities.insert(capability.into());
        self
    }

    /// Fail reads that block for longer than `timeout`.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// The TLS implementation to use for `STARTTLS`.
    pub fn tls_kind(mut self, kind: TlsKind) -> Self {
        self.config.tls_kind = kind;
        self
    }

    /// Controls the use of certificate validation.
    ///
    /// Defaults to `false`.
    ///
    /// # Warning
    ///
    /// You should only use this as a last resort as it allows another server to impersonate the
    /// server you think you're talking to, which would include being able to receive your
    /// credentials.
    pub fn danger_skip_tls_verify(mut self, skip: bool) -> Self {
        self.config.skip_tls_verify = skip;
        self
    }

    /// Draw command tags from `tags` instead of a counter private to this config.
    pub fn tag_counter(mut self, tags: TagCounter) -> Self {
        self.config.tags = tags;
        self
    }

    /// Call `hook` whenever a connection reports the health of its channel.
    pub fn on_channel_state<F>(mut self, hook: F) -> Self
    where
        F: Fn(ChannelState) + Send + Sync + 'static,
    {
        self.config.on_channel_state = Some(Arc::new(hook));
        self
    }

    /// Finish the configuration.
    pub fn build(self) -> ImapConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn builder_sets_fields() {
        let config = ImapConfig::builder("imap.example.com", 143)
            .credentials("user", "pass")
            .disable_capability("STARTTLS")
            .build();
        assert_eq!(config.host(), "imap.example.com");
        assert_eq!(config.port(), 143);
        assert_eq!(config.username(), Some("user"));
        assert_eq!(config.password(), Some("pass"));
        assert!(config.disabled_capabilities().contains("STARTTLS"));
    }

    #[test]
    fn no_credentials_by_default() {
        let config = ImapConfig::builder("imap.example.com", 143).build();
        assert_eq!(config.username(), None);
        assert_eq!(config.password(), None);
    }

    #[test]
    fn shared_tag_counter() {
        let tags = TagCounter::new();
        let a = ImapConfig::builder("a", 143).tag_counter(tags.clone()).build();
        let b = ImapConfig::builder("b", 143).tag_counter(tags.clone()).build();
        a.tag_counter().next_tag();
        b.tag_counter().next_tag();
        assert_eq!(tags.current(), 2);
    }

    #[test]
    fn hook_receives_states() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let config = ImapConfig::builder("imap.example.com", 143)
            .on_channel_state(move |s| sink.lock().unwrap().push(s))
            .build();
        config.report_channel_state(ChannelState::ServerError);
        config.report_channel_state(ChannelState::BadConfiguration);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChannelState::ServerError, ChannelState::BadConfiguration]
        );
    }

    #[test]
    fn transports_start_closed() {
        use crate::transport::Transport;
        let config = ImapConfig::builder("imap.example.com", 143).build();
        assert!(!config.new_transport().is_open());
    }
}
