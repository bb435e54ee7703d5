//! recall CLI - persistent sessions and text chunking for stateless tools.

mod chunk;
mod colors;
mod serve;
mod submit;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use recall_core::AddressKind;

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Persistent execution sessions and deterministic text chunking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh, unused session address
    Addr {
        /// Allocate a loopback TCP endpoint instead of a socket path
        #[arg(long)]
        tcp: bool,
    },

    /// Start a session server on an address
    Serve {
        /// Session address (socket path or host:port)
        #[arg(env = "RECALL_ADDR")]
        address: String,
    },

    /// Send code or a control command to a running session
    Submit {
        /// Session address (socket path or host:port)
        #[arg(env = "RECALL_ADDR")]
        address: String,

        /// Code to execute, or @path to send a file's contents. Read from
        /// stdin when omitted.
        code: Option<String>,

        /// Have the server read the code from this file
        #[arg(long, conflicts_with_all = ["code", "vars", "shutdown"])]
        file: Option<PathBuf>,

        /// List the session's variables and their types
        #[arg(long, conflicts_with_all = ["code", "shutdown"])]
        vars: bool,

        /// Stop the session and release its address
        #[arg(long, conflicts_with = "code")]
        shutdown: bool,
    },

    /// Print size and structure metrics of a file as JSON
    Info {
        /// Path to the text file
        file: PathBuf,
    },

    /// Print the structural boundaries of a file as JSON
    Boundaries {
        /// Path to the text file
        file: PathBuf,
    },

    /// Split a file into overlapping chunks and print them as JSON
    Chunk {
        /// Path to the text file
        file: PathBuf,

        /// Target chunk size in characters
        #[arg(long, default_value_t = 100_000)]
        size: usize,

        /// Characters shared between consecutive chunks
        #[arg(long, default_value_t = 500)]
        overlap: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}error:{} {}", colors::RED, colors::RESET, format_error(&err));
            ExitCode::from(2)
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Addr { tcp } => {
            let kind = if tcp {
                AddressKind::Tcp
            } else {
                AddressKind::default()
            };
            println!("{}", recall_core::allocate_kind(kind)?);
        }

        Commands::Serve { address } => serve::execute(&address).await?,

        Commands::Submit {
            address,
            code,
            file,
            vars,
            shutdown,
        } => {
            let action = if shutdown {
                submit::Action::Shutdown
            } else if vars {
                submit::Action::Variables
            } else if let Some(path) = file {
                submit::Action::ServerFile(path)
            } else {
                submit::Action::Code(code)
            };
            return submit::execute(&address, action).await;
        }

        Commands::Info { file } => chunk::info(&file)?,

        Commands::Boundaries { file } => chunk::boundaries(&file)?,

        Commands::Chunk {
            file,
            size,
            overlap,
        } => chunk::split(&file, size, overlap)?,
    }

    Ok(ExitCode::SUCCESS)
}

/// Render recall-core errors with their recovery hints.
fn format_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<recall_core::Error>() {
        Some(core_err) => core_err.with_hint(),
        None => format!("{:#}", err),
    }
}
