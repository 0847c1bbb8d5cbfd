use std::io::BufRead;

use nom::{
    branch::alt,
    bytes::complete::{tag, take, take_till, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, map, map_opt, opt, rest},
    multi::separated_list0,
    sequence::{delimited, terminated, tuple},
    IResult,
};

use super::error::{Error, Result};
use super::types::{Response, Status, TagKind, Token};

const LF: u8 = 0x0a;

/// Largest `{n}` literal accepted from the server.
pub const MAX_LITERAL_LEN: usize = 64 * 1024 * 1024;

/// Reads responses, one line (plus any literals) at a time, off a buffered stream.
///
/// Bytes of a line that could not be completed (for example because the read failed half-way)
/// stay buffered until [`discard_buffered`](Self::discard_buffered) is called.
#[derive(Debug, Default)]
pub struct ResponseParser {
    line: Vec<u8>,
}

impl ResponseParser {
    /// Make a parser with nothing buffered.
    pub fn new() -> Self {
        ResponseParser::default()
    }

    /// Read and classify the next response.
    pub fn read_response<R: BufRead + ?Sized>(&mut self, reader: &mut R) -> Result<Response> {
        loop {
            let read = reader.read_until(LF, &mut self.line)?;
            if read == 0 || !self.line.ends_with(&[LF]) {
                return Err(Error::ConnectionLost);
            }

            match literal_length(&self.line) {
                Some(len) => {
                    let start = self.line.len();
                    let end = start
                        .checked_add(len)
                        .filter(|_| len <= MAX_LITERAL_LEN)
                        .ok_or_else(|| {
                            Error::Protocol(format!("literal of {} bytes is too large", len))
                        })?;
                    self.line.resize(end, 0);
                    reader.read_exact(&mut self.line[start..])?;
                }
                None => break,
            }
        }

        let raw = std::mem::take(&mut self.line);
        tracing::trace!("S: {}", String::from_utf8_lossy(strip_crlf(&raw)));
        parse_response(raw)
    }

    /// Drop anything read but not yet turned into a response.
    pub fn discard_buffered(&mut self) {
        self.line.clear();
    }

    /// Whether a partial line is buffered.
    pub fn has_buffered(&self) -> bool {
        !self.line.is_empty()
    }
}

/// Classify and tokenize one complete response line.
pub fn parse_response(raw: Vec<u8>) -> Result<Response> {
    let line = strip_crlf(&raw);
    let (body, kind) = header(line).map_err(|_| invalid(&raw))?;

    let mut response = Response {
        kind,
        status: None,
        code: None,
        alert: None,
        tokens: Vec::new(),
        raw: Vec::new(),
    };

    if response.is_continuation_request() {
        let payload = lossy(body.strip_prefix(b" ").unwrap_or(body));
        response.tokens.push(Token::Atom(payload.clone()));
        response.alert = Some(payload);
    } else if let Ok((_, (status, code, text))) = status_response(body) {
        response.status = Some(status);
        response.code = code;
        response.alert = Some(text);
    } else if response.is_tagged() {
        return Err(invalid(&raw));
    } else {
        response.tokens = tokenize(body);
    }

    response.raw = raw;
    Ok(response)
}

fn invalid(raw: &[u8]) -> Error {
    Error::Protocol(format!(
        "unable to parse response: {:?}",
        String::from_utf8_lossy(strip_crlf(raw))
    ))
}

fn strip_crlf(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Length of the literal announced at the end of `line`, if any.
fn literal_length(line: &[u8]) -> Option<usize> {
    let line = strip_crlf(line).strip_suffix(b"}")?;
    let open = line.iter().rposition(|&b| b == b'{')?;
    std::str::from_utf8(&line[open + 1..]).ok()?.parse().ok()
}

fn is_atom_char(c: u8) -> bool {
    c > 0x20 && c < 0x7f && !matches!(c, b'(' | b')' | b'{' | b'"')
}

fn is_tag_char(c: u8) -> bool {
    is_atom_char(c) && c != b'+'
}

fn header(i: &[u8]) -> IResult<&[u8], TagKind> {
    alt((
        map(tag("+"), |_: &[u8]| TagKind::Continuation),
        map(terminated(tag("*"), char(' ')), |_: &[u8]| TagKind::Untagged),
        map(terminated(take_while1(is_tag_char), char(' ')), |t: &[u8]| {
            TagKind::Tagged(lossy(t))
        }),
    ))(i)
}

fn status(i: &[u8]) -> IResult<&[u8], Status> {
    map_opt(take_while1(|c: u8| c.is_ascii_alphabetic()), |s: &[u8]| {
        std::str::from_utf8(s).ok().and_then(Status::from_atom)
    })(i)
}

/// `[CODE args]`, yielding just `CODE`.
fn response_code(i: &[u8]) -> IResult<&[u8], String> {
    map(
        delimited(char('['), take_till(|c: u8| c == b']'), char(']')),
        |inner: &[u8]| {
            let name = inner.split(|&c| c == b' ').next().unwrap_or_default();
            lossy(name).to_ascii_uppercase()
        },
    )(i)
}

fn status_response(i: &[u8]) -> IResult<&[u8], (Status, Option<String>, String)> {
    map(
        tuple((
            status,
            alt((space1, all_consuming(space0))),
            opt(terminated(response_code, space0)),
            rest,
        )),
        |(status, _, code, text)| (status, code, lossy(text).trim().to_string()),
    )(i)
}

fn atom(i: &[u8]) -> IResult<&[u8], Token> {
    map(take_while1(is_atom_char), |a: &[u8]| Token::Atom(lossy(a)))(i)
}

fn quoted(input: &[u8]) -> IResult<&[u8], Token> {
    let mut i = match input.split_first() {
        Some((b'"', tail)) => tail,
        _ => return Err(token_error(input)),
    };
    let mut out = Vec::new();
    loop {
        match i.split_first() {
            Some((b'"', tail)) => return Ok((tail, Token::String(lossy(&out)))),
            Some((b'\\', tail)) => match tail.split_first() {
                Some((&c, tail)) => {
                    out.push(c);
                    i = tail;
                }
                None => break,
            },
            Some((&c, tail)) => {
                out.push(c);
                i = tail;
            }
            None => break,
        }
    }
    Err(token_error(i))
}

fn token_error(i: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(i, nom::error::ErrorKind::Char))
}

fn literal_prefix(i: &[u8]) -> IResult<&[u8], usize> {
    delimited(
        char('{'),
        map_opt(digit1, |d: &[u8]| std::str::from_utf8(d).ok()?.parse().ok()),
        tag("}\r\n"),
    )(i)
}

fn literal(i: &[u8]) -> IResult<&[u8], Token> {
    let (i, len) = literal_prefix(i)?;
    map(take(len), |data: &[u8]| Token::String(lossy(data)))(i)
}

fn list(i: &[u8]) -> IResult<&[u8], Token> {
    map(
        delimited(char('('), separated_list0(space1, token), char(')')),
        Token::List,
    )(i)
}

fn token(i: &[u8]) -> IResult<&[u8], Token> {
    alt((list, literal, quoted, atom))(i)
}

fn tokens(i: &[u8]) -> IResult<&[u8], Vec<Token>> {
    separated_list0(space1, token)(i)
}

/// Tokens of a data line. Whatever the grammar does not cover is kept as one trailing atom.
fn tokenize(body: &[u8]) -> Vec<Token> {
    match tokens(body) {
        Ok((rest, mut tokens)) => {
            let rest = lossy(rest);
            let rest = rest.trim();
            if !rest.is_empty() {
                tokens.push(Token::Atom(rest.to_string()));
            }
            tokens
        }
        Err(_) => vec![Token::Atom(lossy(body))],
    }
}
