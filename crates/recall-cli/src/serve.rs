//! Serve command implementation for recall CLI.
//!
//! Binds a session server and runs it in the foreground until shutdown.

use recall_core::{Address, Server, ServerConfig, Stopped};

use crate::colors;

/// Start a session server on `address`.
pub async fn execute(address: &str) -> anyhow::Result<()> {
    let config = ServerConfig::new(Address::parse(address));
    let server = Server::bind(config).await?;
    let bound = server.address();

    // Banner on stderr; stdout is left to the launcher.
    eprintln!(
        "{}recall session{} listening on {} ({})",
        colors::BOLD,
        colors::RESET,
        bound,
        bound.transport()
    );
    eprintln!(
        "{}  submit with:{} recall submit {} '<code>'",
        colors::CYAN,
        colors::RESET,
        bound
    );
    eprintln!(
        "{}  stop with:{} recall submit {} --shutdown, or Ctrl+C",
        colors::DIM,
        colors::RESET,
        bound
    );

    let stopped = server.run().await?;

    eprintln!("{}Session closed{}", colors::GREEN, colors::RESET);
    if stopped == Stopped::Interrupted {
        // The abandoned evaluation thread would block runtime shutdown.
        std::process::exit(0);
    }
    Ok(())
}
