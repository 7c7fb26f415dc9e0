//! Terminal confirmation prompt

use async_trait::async_trait;
use ephemera_host_api::{Confirm, HostError, HostResult};
use std::io::{BufRead, IsTerminal, Write};

/// y/N prompt on stdin/stderr
///
/// Fails with `HostError::NoTerminal` when stdin is not a terminal, e.g.
/// when run from the backstop job.
#[derive(Debug, Clone, Default)]
pub struct TerminalConfirm;

impl TerminalConfirm {
    pub fn new() -> Self {
        Self
    }
}

/// `y` / `yes` (any case) confirms; anything else declines
pub fn parse_answer(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl Confirm for TerminalConfirm {
    async fn ask(&self, title: &str, message: &str) -> HostResult<bool> {
        if !std::io::stdin().is_terminal() {
            return Err(HostError::NoTerminal);
        }

        let prompt = format!("{}\n{} [y/N]: ", title, message);
        tokio::task::spawn_blocking(move || -> HostResult<bool> {
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(prompt.as_bytes())?;
            stderr.flush()?;

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(parse_answer(&line))
        })
        .await
        .map_err(|e| HostError::Io(std::io::Error::other(e)))?
    }
}
