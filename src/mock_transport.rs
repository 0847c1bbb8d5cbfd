use std::collections::{HashSet, VecDeque};
use std::io::{self, BufRead, Cursor};
use std::sync::Mutex;

use crate::context::{ChannelState, SessionContext, TagCounter};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// A transport that replays a scripted server and records everything written to it.
///
/// Reads come from the plaintext script until `reopen_tls` is called, then from the TLS script.
#[derive(Debug, Default)]
pub struct MockTransport {
    plain: Cursor<Vec<u8>>,
    secured: Option<Cursor<Vec<u8>>>,
    secure: bool,
    open: bool,
    err_on_open: bool,
    pub written_buf: Vec<u8>,
    pub logged: Vec<String>,
    pub opens: usize,
    pub tls_upgrades: usize,
}

impl MockTransport {
    pub fn new(read_buf: impl Into<Vec<u8>>) -> MockTransport {
        MockTransport {
            plain: Cursor::new(read_buf.into()),
            ..MockTransport::default()
        }
    }

    pub fn with_tls(mut self, read_buf: impl Into<Vec<u8>>) -> MockTransport {
        self.secured = Some(Cursor::new(read_buf.into()));
        self
    }

    pub fn with_err_on_open(mut self) -> MockTransport {
        self.err_on_open = true;
        self
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written_buf).into_owned()
    }
}

fn not_open() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::NotConnected, "MockTransport closed"))
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        if self.err_on_open {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "MockTransport Error",
            )));
        }
        self.open = true;
        self.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write_line(&mut self, line: &str, for_log: &str) -> Result<()> {
        if !self.open {
            return Err(not_open());
        }
        self.written_buf.extend_from_slice(line.as_bytes());
        self.written_buf.extend_from_slice(b"\r\n");
        self.logged.push(for_log.to_string());
        Ok(())
    }

    fn reader(&mut self) -> Result<&mut dyn BufRead> {
        if !self.open {
            return Err(not_open());
        }
        match (self.secure, self.secured.as_mut()) {
            (true, Some(secured)) => Ok(secured as &mut dyn BufRead),
            _ => Ok(&mut self.plain as &mut dyn BufRead),
        }
    }

    fn reopen_tls(&mut self) -> Result<()> {
        if !self.open {
            return Err(not_open());
        }
        if self.secured.is_none() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "MockTransport has no TLS script",
            )));
        }
        self.secure = true;
        self.tls_upgrades += 1;
        Ok(())
    }
}

/// A session context handing out scripted transports and recording reported states.
#[derive(Debug)]
pub struct MockContext {
    transports: Mutex<VecDeque<MockTransport>>,
    username: Option<String>,
    password: Option<String>,
    host: String,
    disabled: HashSet<String>,
    tags: TagCounter,
    cnonce: String,
    states: Mutex<Vec<ChannelState>>,
}

impl MockContext {
    pub fn new(transport: MockTransport) -> MockContext {
        MockContext {
            transports: Mutex::new(VecDeque::from(vec![transport])),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            host: "imap.example.com".to_string(),
            disabled: HashSet::new(),
            tags: TagCounter::new(),
            cnonce: "OA6MHXh6VqTrRk".to_string(),
            states: Mutex::new(Vec::new()),
        }
    }

    pub fn with_transport(self, transport: MockTransport) -> MockContext {
        self.transports.lock().unwrap().push_back(transport);
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> MockContext {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn without_credentials(mut self) -> MockContext {
        self.username = None;
        self.password = None;
        self
    }

    pub fn with_host(mut self, host: &str) -> MockContext {
        self.host = host.to_string();
        self
    }

    pub fn with_disabled(mut self, capability: &str) -> MockContext {
        self.disabled.insert(capability.to_string());
        self
    }

    pub fn with_tags(mut self, tags: TagCounter) -> MockContext {
        self.tags = tags;
        self
    }

    pub fn states(&self) -> Vec<ChannelState> {
        self.states.lock().unwrap().clone()
    }
}

impl SessionContext for MockContext {
    type Transport = MockTransport;

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn disabled_capabilities(&self) -> &HashSet<String> {
        &self.disabled
    }

    fn tag_counter(&self) -> &TagCounter {
        &self.tags
    }

    fn new_transport(&self) -> MockTransport {
        self.transports
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
    }

    fn report_channel_state(&self, state: ChannelState) {
        self.states.lock().unwrap().push(state);
    }

    fn client_nonce(&self) -> String {
        self.cnonce.clone()
    }
}
