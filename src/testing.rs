//! Enable the test_helpers feature to expose helper methods to build
//! response structures for testing code that drives a [`Connection`](crate::Connection)
//! through a custom [`SessionContext`](crate::SessionContext)
//!
//! To use add a dev-dependency on this crate with the feature "test_helpers"
//! e.g.
//!
//! ```toml
//! [dependencies]
//! imap-connection = { version = "0.1" }
//!
//! [dev-dependencies]
//! # mirror the same configuration your dependencies and add test_helpers
//! imap-connection = { version = "0.1", features = ["test_helpers"] }
//! ```
//!

/// Methods to build a [`Response`](crate::Response) object
pub mod responses {
    use crate::types::Response;

    /// Builds a [`Response`] from one CRLF-terminated line
    ///
    /// Example input.
    ///
    /// ```
    /// let response = imap_connection::testing::responses::parse("a4 NO [UNAVAILABLE] later\r\n");
    /// assert_eq!(response.code(), Some("UNAVAILABLE"));
    /// ```
    pub fn parse(input: impl Into<Vec<u8>>) -> Response {
        crate::parse::parse_response(input.into()).unwrap()
    }
}

/// Methods to build a [`Capabilities`](crate::Capabilities) object
pub mod capabilities {
    use std::collections::HashSet;

    use crate::types::Capabilities;

    /// Builds [`Capabilities`] from the untagged lines in `input`, leaving out `disabled`
    ///
    /// Example input.
    ///
    /// ```
    /// let input = "* CAPABILITY IMAP4rev1 STARTTLS AUTH=DIGEST-MD5\r\n1 OK done\r\n";
    /// let caps = imap_connection::testing::capabilities::parse(input, &["STARTTLS"]);
    /// assert!(caps.has("AUTH=DIGEST-MD5"));
    /// assert!(!caps.has("STARTTLS"));
    /// ```
    pub fn parse(input: &str, disabled: &[&str]) -> Capabilities {
        let responses: Vec<_> = input
            .split_inclusive('\n')
            .map(|line| super::responses::parse(line))
            .collect();
        let disabled: HashSet<String> = disabled.iter().map(|d| d.to_string()).collect();
        Capabilities::from_responses(&responses, &disabled)
    }
}
