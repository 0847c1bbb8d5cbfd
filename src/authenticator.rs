//! SASL `DIGEST-MD5` ([RFC 2831](https://tools.ietf.org/html/rfc2831)).
//!
//! ```text
//! C: 4 AUTHENTICATE DIGEST-MD5
//! S: + <base64 challenge: realm, nonce, qop, algorithm, charset>
//! C: <base64 response: ..., digest-uri, response=<32 hex>>
//! S: + <base64 "rspauth=<32 hex>">
//! C: <empty>
//! S: 4 OK User logged in
//! ```

use std::collections::HashMap;

use base64::{
    alphabet,
    engine::{general_purpose::STANDARD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use lazy_static::lazy_static;
use md5::{Digest, Md5};
use regex::Regex;

use crate::error::{Error, Result};
use crate::utils::quote;

/// The mechanism name, as it appears after `AUTHENTICATE` and in `AUTH=` capabilities.
pub const MECHANISM: &str = "DIGEST-MD5";

const NC: &str = "00000001";
const QOP: &str = "auth";
const CHARSET: &str = "utf-8";
const ALGORITHM: &str = "md5-sess";

/// Standard alphabet; tolerates missing padding and trailing bits on decode.
const PERMISSIVE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

lazy_static! {
    static ref DIRECTIVE: Regex =
        Regex::new(r#"([A-Za-z0-9_-]+)\s*=\s*("(?:[^"\\]|\\.)*"|[^,]*)"#).unwrap();
}

fn auth_error(alert: impl Into<String>) -> Error {
    Error::AuthenticationFailed {
        alert: alert.into(),
        failure: None,
    }
}

/// Encode a SASL payload: standard alphabet, no line wrapping.
pub fn encode_base64(data: &str) -> String {
    STANDARD.encode(data)
}

/// Decode a SASL payload, ignoring whitespace and missing padding.
pub fn decode_base64(data: &str) -> Result<String> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = PERMISSIVE
        .decode(compact)
        .map_err(|e| auth_error(format!("invalid base64 from server: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Split a `key=value,key="quoted value"` digest message into its directives.
///
/// Keys are lower-cased; quoted values are unquoted and unescaped.
pub fn parse_digest_message(message: &str) -> HashMap<String, String> {
    DIRECTIVE
        .captures_iter(message)
        .map(|cap| {
            let key = cap[1].to_ascii_lowercase();
            let value = cap[2].trim();
            let value = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
                Some(quoted) => unescape(quoted),
                None => value.to_string(),
            };
            (key, value)
        })
        .collect()
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// A fresh random client nonce.
pub fn generate_cnonce() -> String {
    let bytes: [u8; 24] = rand::random();
    STANDARD.encode(bytes)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// State of one DIGEST-MD5 exchange, built from the server's challenge.
#[derive(Debug, Clone)]
pub struct DigestMd5 {
    username: String,
    password: String,
    realm: String,
    nonce: String,
    cnonce: String,
    digest_uri: String,
}

impl DigestMd5 {
    /// Prepare a response to `challenge` (already base64-decoded).
    ///
    /// The digest-uri is `imap/<host>`.
    pub fn new(
        username: &str,
        password: &str,
        host: &str,
        challenge: &str,
        cnonce: String,
    ) -> Result<Self> {
        let mut directives = parse_digest_message(challenge);
        let nonce = directives
            .remove("nonce")
            .ok_or_else(|| auth_error("DIGEST-MD5 challenge has no nonce"))?;
        if let Some(algorithm) = directives.get("algorithm") {
            if !algorithm.eq_ignore_ascii_case(ALGORITHM) {
                return Err(auth_error(format!(
                    "unsupported DIGEST-MD5 algorithm {:?}",
                    algorithm
                )));
            }
        }

        Ok(DigestMd5 {
            username: username.to_string(),
            password: password.to_string(),
            realm: directives.remove("realm").unwrap_or_default(),
            nonce,
            cnonce,
            digest_uri: format!("imap/{}", host),
        })
    }

    fn digest(&self, a2: &str) -> String {
        let mut a1 = Md5::digest(format!(
            "{}:{}:{}",
            self.username, self.realm, self.password
        ))
        .to_vec();
        a1.extend_from_slice(format!(":{}:{}", self.nonce, self.cnonce).as_bytes());
        let ha1 = hex(&Md5::digest(&a1));
        let ha2 = hex(&Md5::digest(a2));

        hex(&Md5::digest(format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, self.nonce, NC, self.cnonce, QOP, ha2
        )))
    }

    /// The `response` directive the client proves knowledge of the password with.
    pub fn response_value(&self) -> String {
        self.digest(&format!("AUTHENTICATE:{}", self.digest_uri))
    }

    /// The `rspauth` value the server must send back.
    pub fn expected_response_auth(&self) -> String {
        self.digest(&format!(":{}", self.digest_uri))
    }

    /// The full client response, before base64 encoding.
    ///
    /// Quoted directives are escaped; the digest is computed over the unescaped values.
    pub fn create_response(&self) -> String {
        format!(
            "charset={},username={},realm={},nonce={},nc={},cnonce={},digest-uri={},\
             response={},qop={}",
            CHARSET,
            quote(&self.username),
            quote(&self.realm),
            quote(&self.nonce),
            NC,
            quote(&self.cnonce),
            quote(&self.digest_uri),
            self.response_value(),
            QOP
        )
    }

    /// Check the server's (base64-decoded) `rspauth=...` message.
    pub fn verify_response_auth(&self, message: &str) -> Result<()> {
        let directives = parse_digest_message(message);
        match directives.get("rspauth") {
            Some(rspauth) if rspauth.eq_ignore_ascii_case(&self.expected_response_auth()) => {
                Ok(())
            }
            Some(_) => Err(auth_error("DIGEST-MD5 response-auth mismatch")),
            None => Err(auth_error("DIGEST-MD5 reply has no rspauth")),
        }
    }
}
