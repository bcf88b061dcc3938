use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::workflow::CommandError;

const DEFAULT_PREPARE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_FINISH_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SAVE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Prepare,
    Capture,
    Retake,
    Finish,
    Save,
}

impl CommandKind {
    pub const fn capture(retake: bool) -> Self {
        if retake {
            Self::Retake
        } else {
            Self::Capture
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prepare => "prepare capture",
            Self::Capture => "capture",
            Self::Retake => "retake",
            Self::Finish => "finish capture",
            Self::Save => "save",
        })
    }
}

/// Upper bounds for each remote command, read from `config.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandTimeouts {
    pub prepare_timeout_ms: u64,
    pub capture_timeout_ms: u64,
    pub finish_timeout_ms: u64,
    pub save_timeout_ms: u64,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            prepare_timeout_ms: DEFAULT_PREPARE_TIMEOUT_MS,
            capture_timeout_ms: DEFAULT_CAPTURE_TIMEOUT_MS,
            finish_timeout_ms: DEFAULT_FINISH_TIMEOUT_MS,
            save_timeout_ms: DEFAULT_SAVE_TIMEOUT_MS,
        }
    }
}

impl CommandTimeouts {
    pub const fn for_kind(&self, kind: CommandKind) -> Duration {
        let millis = match kind {
            CommandKind::Prepare => self.prepare_timeout_ms,
            CommandKind::Capture | CommandKind::Retake => self.capture_timeout_ms,
            CommandKind::Finish => self.finish_timeout_ms,
            CommandKind::Save => self.save_timeout_ms,
        };
        Duration::from_millis(millis)
    }
}

/// Runs remote commands under a timeout and a shared cancellation token.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeouts: CommandTimeouts,
    cancel: CancellationToken,
}

impl CommandRunner {
    pub fn new(timeouts: CommandTimeouts) -> Self {
        Self {
            timeouts,
            cancel: CancellationToken::new(),
        }
    }

    /// Runner whose commands are cancelled together with this one, but which
    /// can also be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            timeouts: self.timeouts,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn timeouts(&self) -> CommandTimeouts {
        self.timeouts
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn run<T, E, F>(&self, kind: CommandKind, command: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<CommandError>,
    {
        let limit = self.timeouts.for_kind(kind);
        tracing::debug!(command = %kind, ?limit, "issuing command");
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::debug!(command = %kind, "command cancelled");
                Err(CommandError::Cancelled { command: kind }.into())
            }
            outcome = tokio::time::timeout(limit, command) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(command = %kind, ?limit, "command timed out");
                    Err(CommandError::Timeout { command: kind, after: limit }.into())
                }
            },
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(CommandTimeouts::default())
    }
}
