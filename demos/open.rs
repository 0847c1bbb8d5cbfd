use std::env;
use std::error::Error;
use std::time::Duration;

use clap::Parser;
use imap_connection::{Connection, ImapConfig};
use tracing_subscriber::EnvFilter;

/// Open an IMAP connection, print what the server advertises, then log out.
#[derive(Parser)]
#[command(name = "open")]
struct Cli {
    /// Server host name
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long, default_value_t = 143)]
    port: u16,

    /// Login name (defaults to $MAILUSER)
    #[arg(short, long)]
    user: Option<String>,

    /// Capabilities to ignore, e.g. STARTTLS
    #[arg(long = "disable")]
    disabled: Vec<String>,

    /// Read timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Accept invalid certificates and host names
    #[arg(long)]
    insecure: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Read config from environment or .env file
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let host = match cli.host {
        Some(host) => host,
        None => env::var("HOST")?,
    };
    let user = match cli.user {
        Some(user) => user,
        None => env::var("MAILUSER")?,
    };
    let password = env::var("PASSWORD")?;

    let mut builder = ImapConfig::builder(host, cli.port)
        .credentials(user, password)
        .read_timeout(Duration::from_secs(cli.timeout))
        .danger_skip_tls_verify(cli.insecure)
        .on_channel_state(|state| eprintln!("channel state: {}", state));
    for capability in cli.disabled {
        builder = builder.disable_capability(capability);
    }

    let mut connection = Connection::new(builder.build());
    connection.open()?;
    println!("{:?}", connection.state());
    println!("capabilities: {}", connection.capabilities());

    for response in connection.execute_simple_command("LOGOUT", false)? {
        println!("{}", response);
    }
    connection.close();

    Ok(())
}
