//! The session context a [`Connection`](crate::Connection) is bound to.
//!
//! A context supplies everything a connection borrows rather than owns: credentials, the
//! capabilities the caller does not want used, the host for the SASL digest-uri, a factory for
//! fresh transports, the command tag counter, and a hook through which the connection reports
//! the health of the channel.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::authenticator;
use crate::transport::Transport;

/// Health of the data channel, as reported through [`SessionContext::report_channel_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// The server misbehaved: bad greeting, non-`OK` completion, TLS failure.
    ServerError,
    /// The network failed underneath us.
    CommunicationError,
    /// The configured credentials were rejected.
    BadConfiguration,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelState::ServerError => "server error",
            ChannelState::CommunicationError => "communication error",
            ChannelState::BadConfiguration => "bad configuration",
        })
    }
}

/// Monotonically increasing command tag counter.
///
/// Clones share the same underlying counter, so every connection created from one context (or
/// from several contexts handed the same counter) draws from a single sequence. Tags start at 1.
#[derive(Debug, Clone, Default)]
pub struct TagCounter(Arc<AtomicU64>);

impl TagCounter {
    /// Make a new counter whose first tag will be `1`.
    pub fn new() -> Self {
        TagCounter::default()
    }

    /// Allocate the next tag.
    pub fn next_tag(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently allocated tag, or `0` if none has been handed out.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration and collaborators a [`Connection`](crate::Connection) is bound to.
pub trait SessionContext {
    /// The transport type handed to connections bound to this context.
    type Transport: Transport;

    /// The login name, if configured.
    fn username(&self) -> Option<&str>;

    /// The password, if configured.
    fn password(&self) -> Option<&str>;

    /// Host name of the server, used for the DIGEST-MD5 `digest-uri`.
    fn host(&self) -> &str;

    /// Capabilities the connection must behave as if the server never advertised.
    fn disabled_capabilities(&self) -> &HashSet<String>;

    /// Counter shared by every connection bound to this context.
    fn tag_counter(&self) -> &TagCounter;

    /// Make a fresh, not yet opened, transport.
    fn new_transport(&self) -> Self::Transport;

    /// Health-reporting hook.
    fn report_channel_state(&self, state: ChannelState);

    /// Client nonce for a DIGEST-MD5 exchange.
    fn client_nonce(&self) -> String {
        authenticator::generate_cnonce()
    }
}

impl<C: SessionContext + ?Sized> SessionContext for Arc<C> {
    type Transport = C::Transport;

    fn username(&self) -> Option<&str> {
        (**self).username()
    }

    fn password(&self) -> Option<&str> {
        (**self).password()
    }

    fn host(&self) -> &str {
        (**self).host()
    }

    fn disabled_capabilities(&self) -> &HashSet<String> {
        (**self).disabled_capabilities()
    }

    fn tag_counter(&self) -> &TagCounter {
        (**self).tag_counter()
    }

    fn new_transport(&self) -> Self::Transport {
        (**self).new_transport()
    }

    fn report_channel_state(&self, state: ChannelState) {
        (**self).report_channel_state(state)
    }

    fn client_nonce(&self) -> String {
        (**self).client_nonce()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_start_at_one() {
        let tags = TagCounter::new();
        assert_eq!(tags.current(), 0);
        assert_eq!(tags.next_tag(), 1);
        assert_eq!(tags.next_tag(), 2);
        assert_eq!(tags.current(), 2);
    }

    #[test]
    fn tags_keep_increasing_past_u32() {
        let tags = TagCounter(Arc::new(AtomicU64::new(u64::from(u32::MAX) - 1)));
        assert_eq!(tags.next_tag(), u64::from(u32::MAX));
        assert_eq!(tags.next_tag(), u64::from(u32::MAX) + 1);
        assert_eq!(tags.current(), 4_294_967_296);
    }

    #[test]
    fn clones_share_sequence() {
        let a = TagCounter::new();
        let b = a.clone();
        assert_eq!(a.next_tag(), 1);
        assert_eq!(b.next_tag(), 2);
        assert_eq!(a.next_tag(), 3);
    }

    #[test]
    fn concurrent_increments() {
        let tags = TagCounter::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tags = tags.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        tags.next_tag();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tags.current(), 1000);
    }
}
