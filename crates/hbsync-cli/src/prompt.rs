//! Terminal prompts for the MFA code and the password
//!
//! Lines are read by a dedicated OS thread and handed over a channel, so an
//! abandoned prompt never leaves a runtime blocking task behind and the
//! process can exit right after a timeout or Ctrl-C.

use std::io::BufRead;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use hbsync_core::domain::MfaChallenge;
use hbsync_core::ports::IMfaCodeSupplier;

/// Environment variable holding a code for non-interactive runs
pub const MFA_CODE_ENV: &str = "HBSYNC_MFA_CODE";

/// Lines from a blocking source, read on their own thread
pub struct LineReader {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl LineReader {
    /// Starts a reader thread over `source`
    ///
    /// The thread ends at end of input, on a read error, or once the reader
    /// is dropped and the next line arrives.
    pub fn spawn<R>(source: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("hbsync-input".to_string())
            .spawn(move || {
                for line in source.lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        if let Err(err) = spawned {
            // The sender went down with the closure, so reads report end of input
            warn!(error = %err, "Failed to start terminal reader");
        }
        Self {
            lines: Mutex::new(rx),
        }
    }

    /// Next trimmed line, or `None` at end of input
    ///
    /// An empty line comes back as an empty string.
    pub async fn next_line(&self) -> Option<String> {
        self.lines
            .lock()
            .await
            .recv()
            .await
            .map(|line| line.trim().to_string())
    }
}

/// Process-wide reader over stdin
pub fn stdin_lines() -> Arc<LineReader> {
    static STDIN: OnceLock<Arc<LineReader>> = OnceLock::new();
    STDIN
        .get_or_init(|| Arc::new(LineReader::spawn(std::io::BufReader::new(std::io::stdin()))))
        .clone()
}

/// Asks for MFA codes on the terminal
///
/// A code from [`MFA_CODE_ENV`] is offered once, before any prompt. The
/// state machine bounds the wait, so a prompt nobody answers simply times out.
pub struct TerminalMfaPrompt {
    env_code: StdMutex<Option<String>>,
    input: Arc<LineReader>,
}

impl TerminalMfaPrompt {
    pub fn new() -> Self {
        let env_code = std::env::var(MFA_CODE_ENV)
            .ok()
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty());
        Self {
            env_code: StdMutex::new(env_code),
            input: stdin_lines(),
        }
    }

    /// Prompt reading from `input` instead of stdin, ignoring the environment
    pub fn with_input(input: LineReader) -> Self {
        Self {
            env_code: StdMutex::new(None),
            input: Arc::new(input),
        }
    }

    fn take_env_code(&self) -> Option<String> {
        self.env_code.lock().ok().and_then(|mut code| code.take())
    }
}

impl Default for TerminalMfaPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IMfaCodeSupplier for TerminalMfaPrompt {
    async fn request_code(&self, challenge: &MfaChallenge) -> Option<String> {
        if let Some(code) = self.take_env_code() {
            return Some(code);
        }

        let message = format!(
            "Verification required ({}). Enter code ({} attempts left, {}s): ",
            challenge.kind(),
            challenge.remaining_attempts(),
            challenge.max_wait().as_secs()
        );
        write_prompt(&message).await.ok()?;
        self.input.next_line().await
    }
}

/// Prints `message` to stderr and reads one trimmed line from stdin
///
/// Returns `None` at end of input and an empty string for an empty line.
pub async fn read_line(message: &str) -> Result<Option<String>> {
    write_prompt(message).await?;
    Ok(stdin_lines().next_line().await)
}

async fn write_prompt(message: &str) -> Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr
        .write_all(message.as_bytes())
        .await
        .context("Failed to write prompt")?;
    stderr.flush().await.context("Failed to write prompt")?;
    Ok(())
}
