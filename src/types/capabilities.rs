use std::collections::hash_set::Iter;
use std::collections::HashSet;
use std::fmt;

use imap_proto::Capability;

use super::{Response, Token};
use crate::utils::iter_join;

/// From [section 7.2.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.2.1).
///
/// A list of capabilities that the server supports.
///
/// A capability name which begins with `AUTH=` indicates that the server supports that particular
/// authentication mechanism. `STARTTLS` indicates the server will upgrade the plaintext
/// connection to TLS in place.
///
/// The set is rebuilt from scratch on every `CAPABILITY` query; nothing carries over from an
/// earlier query, so a server may legitimately advertise less (or more) once secured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(pub(crate) HashSet<String>);

impl Capabilities {
    /// Collect the capabilities advertised by the untagged lines in `responses`, leaving out
    /// anything in `disabled`.
    pub(crate) fn from_responses<'a, I>(responses: I, disabled: &HashSet<String>) -> Self
    where
        I: IntoIterator<Item = &'a Response>,
    {
        let mut caps = HashSet::new();
        for response in responses.into_iter().filter(|r| r.is_untagged()) {
            caps.extend(
                advertised(response)
                    .into_iter()
                    .filter(|c| !disabled.iter().any(|d| d.eq_ignore_ascii_case(c))),
            );
        }
        Capabilities(caps)
    }

    /// Check if the server has the given capability. Capability names are case-insensitive.
    pub fn has(&self, s: &str) -> bool {
        self.0.contains(s) || self.0.iter().any(|c| c.eq_ignore_ascii_case(s))
    }

    /// Iterate over all the server's capabilities
    pub fn iter(&self) -> Iter<'_, String> {
        self.0.iter()
    }

    /// Returns how many capabilities the server has.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the server purports to have no capabilities.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.0.iter().collect();
        names.sort();
        write!(f, "[{}]", iter_join(names, ", "))
    }
}

/// Capability names on one untagged line.
///
/// `* CAPABILITY ...` lines go through `imap-proto`; anything it does not recognize falls back
/// to the line's plain tokens.
fn advertised(response: &Response) -> Vec<String> {
    if let Ok((_, imap_proto::Response::Capabilities(caps))) =
        imap_proto::parser::parse_response(response.raw())
    {
        if let Some(names) = caps.iter().map(capability_name).collect() {
            return names;
        }
    }

    response
        .tokens()
        .iter()
        .filter_map(Token::as_str)
        .filter(|t| !t.eq_ignore_ascii_case("CAPABILITY"))
        .map(str::to_string)
        .collect()
}

fn capability_name(cap: &Capability<'_>) -> Option<String> {
    #[allow(unreachable_patterns)]
    match cap {
        Capability::Imap4rev1 => Some("IMAP4rev1".to_string()),
        Capability::Auth(mechanism) => Some(format!("AUTH={}", mechanism)),
        Capability::Atom(atom) => Some(atom.to_string()),
        _ => None,
    }
}
