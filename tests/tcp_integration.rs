extern crate imap_connection;

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use imap_connection::{ChannelState, Connection, ConnectionState, Error, ImapConfig, TagCounter};

fn test_host() -> String {
    std::env::var("TEST_HOST").unwrap_or("127.0.0.1".to_string())
}

fn test_imap_port() -> u16 {
    std::env::var("TEST_IMAP_PORT")
        .unwrap_or("3143".to_string())
        .parse()
        .unwrap_or(3143)
}

/// Serve one client: send `greeting`, then answer each line read with the next reply.
///
/// Returns the lines the client sent.
fn scripted_server(
    greeting: &'static str,
    replies: Vec<&'static str>,
) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        sock.write_all(greeting.as_bytes()).unwrap();
        let mut reader = BufReader::new(sock.try_clone().unwrap());
        let mut seen = Vec::new();
        for reply in replies {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 {
                break;
            }
            seen.push(line.trim_end().to_string());
            sock.write_all(reply.as_bytes()).unwrap();
        }
        seen
    });
    (port, handle)
}

fn config(port: u16) -> imap_connection::ImapConfigBuilder {
    ImapConfig::builder("127.0.0.1", port)
        .credentials("readonly-test@localhost", "pass word")
        .read_timeout(Duration::from_secs(5))
}

#[test]
fn login_and_noop() {
    let (port, server) = scripted_server(
        "* OK [CAPABILITY IMAP4rev1] test server ready\r\n",
        vec![
            "* CAPABILITY IMAP4rev1 AUTH=PLAIN IDLE\r\n1 OK CAPABILITY completed\r\n",
            "2 OK [CAPABILITY IMAP4rev1 IDLE] Logged in\r\n",
            "* 3 EXISTS\r\n3 OK NOOP completed\r\n",
            "* BYE logging out\r\n4 OK LOGOUT completed\r\n",
        ],
    );

    let mut c = Connection::new(config(port).build());
    c.open().unwrap();
    assert_eq!(c.state(), ConnectionState::Ready);
    assert!(c.has_capability("IDLE"));
    assert!(!c.transport().unwrap().is_secure());

    let responses = c.execute_simple_command("NOOP", false).unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].string_or_empty(1), "EXISTS");

    let responses = c.execute_simple_command("LOGOUT", false).unwrap();
    assert_eq!(responses.last().unwrap().tag(), Some("4"));
    c.close();

    assert_eq!(
        server.join().unwrap(),
        vec![
            "1 CAPABILITY",
            "2 LOGIN readonly-test@localhost \"pass word\"",
            "3 NOOP",
            "4 LOGOUT",
        ]
    );
}

#[test]
fn rejected_login_reports_bad_configuration() {
    let (port, server) = scripted_server(
        "* OK ready\r\n",
        vec![
            "* CAPABILITY IMAP4rev1\r\n1 OK done\r\n",
            "2 NO [AUTHENTICATIONFAILED] invalid credentials\r\n",
        ],
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let config = config(port)
        .on_channel_state(move |s| sink.lock().unwrap().push(s))
        .build();

    let mut c = Connection::new(config);
    match c.open() {
        Err(Error::AuthenticationFailed { alert, .. }) => assert_eq!(alert, "invalid credentials"),
        r => panic!("expected authentication failure, got {:?}", r),
    }
    assert_eq!(c.state(), ConnectionState::Failed);
    c.close();
    server.join().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![ChannelState::ServerError, ChannelState::BadConfiguration]
    );
}

#[test]
fn server_hangs_up() {
    let (port, server) = scripted_server("* OK ready\r\n", vec![]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut c = Connection::new(
        config(port)
            .on_channel_state(move |s| sink.lock().unwrap().push(s))
            .build(),
    );
    assert!(c.open().is_err());
    server.join().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![ChannelState::CommunicationError]);
}

#[test]
fn nothing_listening() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut c = Connection::new(config(port).build());
    assert!(matches!(c.open(), Err(Error::Io(_))));
    assert!(!c.is_open());
}

#[test]
fn shared_counter_across_configs() {
    let tags = TagCounter::new();
    let (port, server) = scripted_server(
        "* OK ready\r\n",
        vec![
            "* CAPABILITY IMAP4rev1\r\n1 OK done\r\n",
            "2 OK Logged in\r\n",
        ],
    );
    let mut a = Connection::new(config(port).tag_counter(tags.clone()).build());
    a.open().unwrap();
    a.close();
    server.join().unwrap();

    let (port, server) = scripted_server(
        "* OK ready\r\n",
        vec![
            "* CAPABILITY IMAP4rev1\r\n3 OK done\r\n",
            "4 OK Logged in\r\n",
        ],
    );
    let mut b = Connection::new(config(port).tag_counter(tags.clone()).build());
    b.open().unwrap();
    b.close();
    assert_eq!(server.join().unwrap()[0], "3 CAPABILITY");
}

#[test]
fn failed_tls_handshake_reports_server_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(sock.try_clone().unwrap());
        let mut line = String::new();
        sock.write_all(b"* OK ready\r\n").unwrap();
        reader.read_line(&mut line).unwrap();
        sock.write_all(b"* CAPABILITY IMAP4rev1 STARTTLS\r\n1 OK done\r\n")
            .unwrap();
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "2 STARTTLS\r\n");
        sock.write_all(b"2 OK Begin TLS negotiation now\r\n").unwrap();
        // Answer the ClientHello with plaintext.
        assert!(!reader.fill_buf().unwrap().is_empty());
        sock.write_all(b"* BYE this is not a TLS record\r\n").unwrap();
        // Hold the socket open until the client gives up on the handshake.
        let _ = io::copy(&mut reader, &mut io::sink());
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut c = Connection::new(
        config(port)
            .on_channel_state(move |s| sink.lock().unwrap().push(s))
            .build(),
    );
    match c.open() {
        Err(e) if e.is_tls() => {}
        r => panic!("expected a TLS error, got {:?}", r),
    }
    assert_eq!(c.state(), ConnectionState::Failed);
    c.close();
    server.join().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![ChannelState::ServerError]);
}

// Needs a real server, e.g. GreenMail with STARTTLS on TEST_IMAP_PORT.
#[test]
#[ignore]
fn live_server_starttls() {
    let config = ImapConfig::builder(test_host(), test_imap_port())
        .credentials("readonly-test@localhost", "password")
        .danger_skip_tls_verify(true)
        .build();
    let mut c = Connection::new(config);
    c.open().unwrap();
    assert_eq!(c.state(), ConnectionState::Ready);
    c.execute_simple_command("NOOP", false).unwrap();
    c.close();
}
