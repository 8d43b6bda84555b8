//! Command policy: which instruction names may reach the host.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::PolicyViolation;

/// Names that are refused no matter how the lists are configured.
///
/// These stop, reload or reconfigure the host, or change who may join.
pub const DANGEROUS_COMMANDS: &[&str] = &[
    "stop",
    "restart",
    "reload",
    "reload-all",
    "save-all",
    "save-off",
    "save-on",
    "whitelist",
    "ban",
    "ban-ip",
    "pardon",
    "pardon-ip",
    "kick",
    "op",
    "deop",
    "setworldspawn",
    "world",
    "worlds",
    "multiverse",
    "mv",
];

const CHAIN_PATTERNS: &[&str] = &["&&", "||", ";"];

/// The `[commands]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolicyConfig {
    /// When non-empty, only these names may run.
    pub allowed_commands: Vec<String>,
    pub blocked_commands: Vec<String>,
    /// Longer instructions are truncated to this many characters.
    pub max_command_length: usize,
    pub strip_color_codes: bool,
    /// Reject chained or empty instructions.
    pub validate_commands: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_commands: Vec::new(),
            blocked_commands: Vec::new(),
            max_command_length: 256,
            strip_color_codes: true,
            validate_commands: true,
        }
    }
}

/// Immutable filter deciding which instructions may touch host state.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    allowlist: HashSet<String>,
    denylist: HashSet<String>,
    dangerous: HashSet<&'static str>,
    max_length: usize,
    strip_color_codes: bool,
    validate_syntax: bool,
}

impl CommandPolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        let lower = |names: &[String]| {
            names
                .iter()
                .map(|n| n.trim().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .collect::<HashSet<_>>()
        };
        Self {
            allowlist: lower(&config.allowed_commands),
            denylist: lower(&config.blocked_commands),
            dangerous: DANGEROUS_COMMANDS.iter().copied().collect(),
            max_length: config.max_command_length,
            strip_color_codes: config.strip_color_codes,
            validate_syntax: config.validate_commands,
        }
    }

    /// Checks a command name.
    ///
    /// The denylist is consulted first, then the dangerous set, then the
    /// allowlist (only when non-empty). Names compare case-insensitively.
    pub fn check(&self, name: &str) -> Result<(), PolicyViolation> {
        let name = name.to_ascii_lowercase();
        if self.denylist.contains(&name) {
            return Err(PolicyViolation::Blocked(name));
        }
        if self.dangerous.contains(name.as_str()) {
            return Err(PolicyViolation::Dangerous(name));
        }
        if !self.allowlist.is_empty() && !self.allowlist.contains(&name) {
            return Err(PolicyViolation::NotAllowListed(name));
        }
        Ok(())
    }

    pub fn is_permitted(&self, name: &str) -> bool {
        self.check(name).is_ok()
    }

    /// Cleans a raw instruction, or returns `None` if it must not run.
    pub fn sanitize(&self, raw: &str) -> Option<String> {
        self.sanitize_checked(raw).ok()
    }

    /// Like [`sanitize`](Self::sanitize) but says why input was refused.
    pub(crate) fn sanitize_checked(&self, raw: &str) -> Result<String, &'static str> {
        let mut cmd = raw.trim().to_string();

        if self.strip_color_codes {
            cmd = strip_color_codes(&cmd).trim().to_string();
        }

        if cmd.chars().count() > self.max_length {
            tracing::warn!(
                max = self.max_length,
                len = cmd.chars().count(),
                "command truncated"
            );
            cmd = cmd.chars().take(self.max_length).collect::<String>();
            cmd.truncate(cmd.trim_end().len());
        }

        if cmd.split_whitespace().next().is_none() {
            return Err("empty command");
        }

        if self.validate_syntax && CHAIN_PATTERNS.iter().any(|p| cmd.contains(p)) {
            return Err("command chaining is not allowed");
        }

        Ok(cmd)
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

/// Removes legacy formatting codes: `§` or `&` followed by one of
/// `0-9`, `a-f`, `k-o` or `r` (either case).
fn strip_color_codes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if matches!(c, '§' | '&')
            && chars.peek().is_some_and(|next| is_format_char(*next))
        {
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

fn is_format_char(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}
