//! Command routing
//!
//! A submitted line is either a local builtin (`help`, `clear`) or goes to
//! the remote execution endpoint, optionally translated from natural
//! language into a shell command first. Every failure becomes a
//! [`CommandResult::Error`]; nothing here can take the session down.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error};

use super::sink::{DisplaySink, SinkHandle, Style};

/// Default prefix a translated reply must start with
pub const DEFAULT_COMMAND_MARKER: &str = "$";

pub const EXECUTION_FAILED: &str = "Command execution failed";
pub const INVALID_TRANSLATION: &str = "Invalid command format from AI";
pub const PROCESSING_HINT: &str = "Processing input...";

/// Outcome of routing one line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandResult {
    Builtin(String),
    Translated {
        marker: String,
        shell_command: String,
        output: String,
    },
    Error(String),
}

impl CommandResult {
    /// True when rendering would write nothing
    pub fn is_silent(&self) -> bool {
        matches!(self, CommandResult::Builtin(output) if output.is_empty())
    }

    /// Render as complete lines
    pub fn render(&self, sink: &mut DisplaySink) {
        match self {
            CommandResult::Builtin(output) => {
                if !output.is_empty() {
                    sink.write_block(None, output);
                }
            }
            CommandResult::Translated { marker, shell_command, output } => {
                sink.write_styled_line(
                    Style::Success,
                    &format!("Translated command: {} {}", marker, shell_command),
                );
                if !output.is_empty() {
                    sink.write_block(None, output);
                }
            }
            CommandResult::Error(message) => {
                sink.write_block(Some(Style::Error), &format!("Error: {}", message));
            }
        }
    }
}

/// Failures at the routing boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Request could not be sent, or timed out
    #[error("{0}")]
    Network(String),

    /// Non-success status, with the server's message
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Response body missing fields, or not in the agreed format
    #[error("{0}")]
    Protocol(String),
}

impl RouteError {
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::Network(_) => "network",
            RouteError::Server { .. } => "server",
            RouteError::Protocol(_) => "protocol",
        }
    }
}

/// Runs a shell command remotely
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<String, RouteError>;
}

/// Turns natural language into a reply that should hold a shell command
#[async_trait]
pub trait CommandTranslator: Send + Sync {
    async fn translate(&self, input: &str) -> Result<String, RouteError>;
}

/// How non-builtin lines are handled; fixed per deployment
#[derive(Clone)]
pub enum RoutingPolicy {
    Direct,
    Translate {
        translator: Arc<dyn CommandTranslator>,
        marker: String,
    },
}

impl RoutingPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            RoutingPolicy::Direct => "direct",
            RoutingPolicy::Translate { .. } => "translate",
        }
    }
}

/// Resolves submitted lines into results
pub struct CommandRouter {
    executor: Arc<dyn CommandExecutor>,
    policy: RoutingPolicy,
}

impl CommandRouter {
    pub fn new(executor: Arc<dyn CommandExecutor>, policy: RoutingPolicy) -> Self {
        Self { executor, policy }
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Banner subtitle for sessions using this router
    pub fn banner_subtitle(&self) -> &'static str {
        match self.policy {
            RoutingPolicy::Direct => "Remote Commands Ready",
            RoutingPolicy::Translate { .. } => "Natural Language Commands Ready",
        }
    }

    pub async fn route(&self, line: &str, out: &SinkHandle) -> CommandResult {
        match line {
            "clear" => {
                out.clear();
                return CommandResult::Builtin(String::new());
            }
            "help" => return CommandResult::Builtin(self.help_text()),
            _ => {}
        }

        debug!("Routing '{}' ({} mode)", line, self.policy.name());

        let result = match &self.policy {
            RoutingPolicy::Direct => self
                .executor
                .execute(line)
                .await
                .map(CommandResult::Builtin),
            RoutingPolicy::Translate { translator, marker } => {
                out.emit(|sink| sink.write_styled_line(Style::Hint, PROCESSING_HINT));
                self.translate_and_execute(translator.as_ref(), marker, line)
                    .await
            }
        };

        result.unwrap_or_else(|e| {
            error!("Command '{}' failed ({}): {}", line, e.kind(), e);
            CommandResult::Error(e.to_string())
        })
    }

    async fn translate_and_execute(
        &self,
        translator: &dyn CommandTranslator,
        marker: &str,
        line: &str,
    ) -> Result<CommandResult, RouteError> {
        let reply = translator.translate(line).await?;
        let shell_command = extract_command(&reply, marker)
            .ok_or_else(|| RouteError::Protocol(INVALID_TRANSLATION.to_string()))?;

        debug!("Translated '{}' into '{}'", line, shell_command);
        let output = self.executor.execute(&shell_command).await?;
        Ok(CommandResult::Translated {
            marker: marker.to_string(),
            shell_command,
            output,
        })
    }

    pub fn help_text(&self) -> String {
        let mut text = String::from(
            "Available commands:\n  \
             help     - Show this help message\n  \
             clear    - Clear terminal\n",
        );
        match self.policy {
            RoutingPolicy::Direct => text.push_str(
                "Anything else runs on the remote shell, for example:\n  \
                 ls       - List files\n  \
                 pwd      - Print working directory\n  \
                 echo     - Echo a message",
            ),
            RoutingPolicy::Translate { .. } => text.push_str(
                "Anything else is translated into a shell command, for example:\n  \
                 list all files in this folder\n  \
                 show the current directory\n  \
                 print hello world",
            ),
        }
        text
    }
}

/// Strip the command marker from a translated reply
fn extract_command(reply: &str, marker: &str) -> Option<String> {
    let command = reply.trim().strip_prefix(marker)?.trim();
    if command.is_empty() {
        None
    } else {
        Some(command.to_string())
    }
}
