use std::fmt;

/// From [section 7.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.1).
///
/// The status carried by a status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `OK`: the command (or greeting) succeeded.
    Ok,
    /// `NO`: the command failed.
    No,
    /// `BAD`: the command was not understood.
    Bad,
    /// `PREAUTH`: greeting for a connection that is already authenticated.
    PreAuth,
    /// `BYE`: the server is about to close the connection.
    Bye,
}

impl Status {
    /// Recognize a status atom, case-insensitively.
    pub fn from_atom(atom: &str) -> Option<Status> {
        [Status::Ok, Status::No, Status::Bad, Status::PreAuth, Status::Bye]
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(atom))
    }

    /// The wire form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bad => "BAD",
            Status::PreAuth => "PREAUTH",
            Status::Bye => "BYE",
        }
    }
}

/// How a response line was prefixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
    /// `+`: the server wants more data before it can complete the command.
    Continuation,
    /// `*`: data or status not tied to command completion.
    Untagged,
    /// The tag of the command this line completes.
    Tagged(String),
}

/// One element of a response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A bare atom, including numbers and `NIL`.
    Atom(String),
    /// A quoted string or a literal.
    String(String),
    /// A parenthesized list.
    List(Vec<Token>),
}

impl Token {
    /// The textual value of an atom or string. Lists have none.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::Atom(s) | Token::String(s) => Some(s),
            Token::List(_) => None,
        }
    }
}

/// A single response line from the server, with any literals it carried.
///
/// A status response (`* OK ...`, `a1 NO [CODE] text`) exposes its [`Status`], response
/// code and alert text; any other line exposes its contents as [`Token`]s. A continuation
/// request carries its payload as the alert text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub(crate) kind: TagKind,
    pub(crate) status: Option<Status>,
    pub(crate) code: Option<String>,
    pub(crate) alert: Option<String>,
    pub(crate) tokens: Vec<Token>,
    pub(crate) raw: Vec<u8>,
}

impl Response {
    /// How this line was tagged.
    pub fn kind(&self) -> &TagKind {
        &self.kind
    }

    /// The command tag, for tagged responses.
    pub fn tag(&self) -> Option<&str> {
        match self.kind {
            TagKind::Tagged(ref tag) => Some(tag),
            _ => None,
        }
    }

    /// Whether this line completes a command.
    pub fn is_tagged(&self) -> bool {
        matches!(self.kind, TagKind::Tagged(_))
    }

    /// Whether this line is a `*` line.
    pub fn is_untagged(&self) -> bool {
        self.kind == TagKind::Untagged
    }

    /// Whether the server asked for a continuation.
    pub fn is_continuation_request(&self) -> bool {
        self.kind == TagKind::Continuation
    }

    /// The status, if this is a status response.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Whether this is an `OK` status response.
    pub fn is_ok(&self) -> bool {
        self.status == Some(Status::Ok)
    }

    /// The bracketed response code, e.g. `AUTHENTICATIONFAILED`.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Human-readable text, or the payload of a continuation request.
    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    /// The contents of a non-status line.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The string value of the `index`th token, or `""` if there is none.
    pub fn string_or_empty(&self, index: usize) -> &str {
        self.tokens
            .get(index)
            .and_then(Token::as_str)
            .unwrap_or_default()
    }

    /// The line exactly as it was received, including CRLF and literal data.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = String::from_utf8_lossy(&self.raw);
        f.write_str(raw.trim_end_matches(&['\r', '\n'][..]))
    }
}
