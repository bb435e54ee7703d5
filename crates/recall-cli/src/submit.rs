//! Submit command implementation for recall CLI.
//!
//! One request per invocation. Exit status is 0 on success and 1 when the
//! submitted code raised; every other failure is reported by the caller.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use recall_core::{Address, Client, ExecutionResponse};

use crate::colors;

/// What to send.
pub enum Action {
    /// Inline code, an `@path` whose contents are sent, or stdin when `None`.
    Code(Option<String>),
    /// A file the server reads itself.
    ServerFile(PathBuf),
    Variables,
    Shutdown,
}

pub async fn execute(address: &str, action: Action) -> anyhow::Result<ExitCode> {
    let client = Client::new(Address::parse(address));

    let response = match action {
        Action::Variables => {
            let bindings = client.variables().await?;
            println!("{}", serde_json::to_string_pretty(&bindings)?);
            return Ok(ExitCode::SUCCESS);
        }
        Action::Shutdown => {
            client.shutdown().await?;
            eprintln!("{}Session at {} shut down{}", colors::DIM, address, colors::RESET);
            return Ok(ExitCode::SUCCESS);
        }
        Action::ServerFile(path) => client.execute_file(absolute(&path)?).await?,
        Action::Code(code) => client.execute(load_code(code)?).await?,
    };

    report(&response)
}

/// Print a response the way a shell user expects: output on stdout, the
/// error on stderr, and the visible names when there was nothing else.
fn report(response: &ExecutionResponse) -> anyhow::Result<ExitCode> {
    print!("{}", response.stdout);

    if let Some(detail) = &response.error_detail {
        eprintln!("{}{}{}", colors::RED, detail, colors::RESET);
    } else if response.stdout.is_empty() {
        println!("{}", serde_json::to_string_pretty(&response.bindings)?);
    }

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn load_code(code: Option<String>) -> anyhow::Result<String> {
    match code {
        Some(code) => match code.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read code file {}", path)),
            None => Ok(code),
        },
        None => {
            let mut code = String::new();
            std::io::stdin()
                .read_to_string(&mut code)
                .context("Failed to read code from stdin")?;
            Ok(code)
        }
    }
}

/// The server may run in another directory, so file references are sent
/// as absolute paths.
fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to resolve payload path {}", path.display()))
}
