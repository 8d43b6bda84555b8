//! Error types for instruction handling.

/// Why the policy refused a command name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("command blocked: {0}")]
    Blocked(String),

    #[error("command not in allowed list: {0}")]
    NotAllowListed(String),

    #[error("dangerous command blocked: {0}")]
    Dangerous(String),
}

/// Errors from [`CommandExecutor::execute`](crate::CommandExecutor::execute).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Empty input or a rejected syntax pattern.
    #[error("invalid command: {0}")]
    Invalid(String),

    #[error(transparent)]
    Denied(#[from] PolicyViolation),

    /// The host ran the instruction and reported failure.
    #[error("command execution failed: {0}")]
    Rejected(String),

    #[error("host is unavailable")]
    HostUnavailable,
}

impl CommandError {
    /// Short reason category used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::Denied(PolicyViolation::Blocked(_)) => "blocked",
            Self::Denied(PolicyViolation::NotAllowListed(_)) => "not_allowlisted",
            Self::Denied(PolicyViolation::Dangerous(_)) => "dangerous",
            Self::Rejected(_) => "rejected",
            Self::HostUnavailable => "unavailable",
        }
    }
}
