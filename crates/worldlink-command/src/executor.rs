//! Command executor: sanitize, authorize, then run on the host thread.

use std::sync::Arc;

use worldlink_host::{HostError, HostHandle};

use crate::{CommandError, CommandPolicy};

/// An instruction that ran and was accepted by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    /// The instruction as dispatched, without a leading `/`.
    pub command: String,
    /// Lower-cased first word.
    pub name: String,
}

/// Runs plain-text instructions against the host.
///
/// Cheap to clone; the policy is shared.
#[derive(Clone)]
pub struct CommandExecutor {
    policy: Arc<CommandPolicy>,
    host: HostHandle,
}

impl CommandExecutor {
    pub fn new(policy: Arc<CommandPolicy>, host: HostHandle) -> Self {
        Self { policy, host }
    }

    pub fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    /// Executes one raw instruction.
    ///
    /// The instruction is only dispatched after it passes sanitization
    /// and the policy; the host runs it on its own update thread and this
    /// call resolves when the host has answered.
    pub async fn execute(&self, raw: &str) -> Result<ExecutedCommand, CommandError> {
        let result = self.try_execute(raw).await;
        match &result {
            Ok(done) => tracing::info!(command = %done.command, "command executed"),
            Err(e) => tracing::warn!(reason = e.category(), error = %e, "command refused"),
        }
        result
    }

    async fn try_execute(&self, raw: &str) -> Result<ExecutedCommand, CommandError> {
        let clean = self
            .policy
            .sanitize_checked(raw)
            .map_err(|reason| CommandError::Invalid(reason.to_string()))?;

        let command = clean.strip_prefix('/').unwrap_or(&clean).trim().to_string();
        let name = command
            .split_whitespace()
            .next()
            .ok_or_else(|| CommandError::Invalid("empty command".to_string()))?
            .to_ascii_lowercase();

        self.policy.check(&name)?;

        let accepted = self
            .host
            .execute_command(command.clone())
            .await
            .map_err(|e| match e {
                HostError::Unavailable => CommandError::HostUnavailable,
                other => CommandError::Rejected(other.to_string()),
            })?;
        if !accepted {
            return Err(CommandError::Rejected(command));
        }

        Ok(ExecutedCommand { command, name })
    }

    /// Shows a chat-style message to players in the host world.
    pub async fn announce(&self, message: &str) -> Result<(), CommandError> {
        self.host
            .announce(message)
            .await
            .map_err(|_| CommandError::HostUnavailable)
    }
}
