use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use chatseal::app::Direction;
use chatseal::{AppConfig, E2eeError, Messenger};

#[derive(Parser)]
#[command(name = "chatseal", about = "End-to-end encrypted local chat accounts")]
struct Args {
    /// Path to the SQLite database, overrides CHATSEAL_DB
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and seal its new private key
    Signup {
        user: String,
        #[arg(long, env = "CHATSEAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Check a password against an account
    Login {
        user: String,
        #[arg(long, env = "CHATSEAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Encrypt a message for another account
    Send {
        #[arg(long = "as")]
        user: String,
        #[arg(long, env = "CHATSEAL_PASSWORD", hide_env_values = true)]
        password: String,
        to: String,
        message: String,
    },
    /// List the accounts you can write to
    Users {
        #[arg(long = "as")]
        user: String,
        #[arg(long, env = "CHATSEAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List conversation partners, most recent first
    Threads {
        #[arg(long = "as")]
        user: String,
        #[arg(long, env = "CHATSEAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Decrypt the conversation with a peer
    Read {
        #[arg(long = "as")]
        user: String,
        #[arg(long, env = "CHATSEAL_PASSWORD", hide_env_values = true)]
        password: String,
        peer: String,
    },
    /// Show an account's public key fingerprint
    Fingerprint { user: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatseal=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load().context("loading configuration")?;
    if let Some(db) = args.db {
        config.db_path = db;
    }
    let messenger = Messenger::open(&config)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;

    if let Err(e) = run(&messenger, args.command).await {
        match &e {
            E2eeError::InvalidCredentials => error!("Invalid username or password"),
            E2eeError::PlaintextTooLarge { len, max } => {
                error!("Message is {} bytes, the limit is {}; set CHATSEAL_MESSAGE_MODE=hybrid for long messages", len, max)
            }
            other => error!("{}", other),
        }
        // 2: bad input the user can correct and retry, 1: anything else
        std::process::exit(if e.is_recoverable() { 2 } else { 1 });
    }
    Ok(())
}

async fn run(messenger: &Messenger, command: Command) -> Result<(), E2eeError> {
    match command {
        Command::Signup { user, password } => {
            let session = messenger.signup(&user, &password).await?;
            println!("Created account {}", session.account_id());
        }
        Command::Login { user, password } => {
            let session = messenger.authenticate(&user, &password).await?;
            println!(
                "Password accepted for {} at {}",
                session.account_id(),
                session.authenticated_at().format("%Y-%m-%d %H:%M:%S")
            );
        }
        Command::Send { user, password, to, message } => {
            let session = messenger.authenticate(&user, &password).await?;
            let sent = messenger.send(&session, &to, &message).await?;
            println!("Sent {} to {}", sent.id, sent.recipient);
        }
        Command::Users { user, password } => {
            let session = messenger.authenticate(&user, &password).await?;
            for id in messenger.users(&session)? {
                println!("{}", id);
            }
        }
        Command::Threads { user, password } => {
            let session = messenger.authenticate(&user, &password).await?;
            for thread in messenger.threads(&session)? {
                println!("{}  {}", thread.last_at.format("%Y-%m-%d %H:%M"), thread.peer);
            }
        }
        Command::Read { user, password, peer } => {
            let session = messenger.authenticate(&user, &password).await?;
            for message in messenger.conversation(&session, &peer, &password).await? {
                let arrow = match message.direction {
                    Direction::In => "<",
                    Direction::Out => ">",
                };
                println!("{} {} {}", message.created_at.format("%H:%M"), arrow, message.body);
            }
        }
        Command::Fingerprint { user } => {
            println!("{}", messenger.fingerprint(&user)?);
        }
    }
    Ok(())
}
