//! Transaction commit policies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// When a transactional invocation commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionPolicy {
    /// Commit if the delegate succeeds, roll back otherwise
    #[default]
    #[serde(alias = "success")]
    CommitOnSuccess,

    /// Commit even when the delegate fails
    #[serde(alias = "always")]
    AlwaysCommit,

    /// Roll back even when the delegate succeeds
    #[serde(alias = "never")]
    AlwaysRollback,
}

impl TransactionPolicy {
    /// All policies
    pub const ALL: [Self; 3] = [Self::CommitOnSuccess, Self::AlwaysCommit, Self::AlwaysRollback];

    /// Decide the outcome for a delegate result
    #[inline]
    #[must_use]
    pub fn should_commit(self, succeeded: bool) -> bool {
        match self {
            Self::CommitOnSuccess => succeeded,
            Self::AlwaysCommit => true,
            Self::AlwaysRollback => false,
        }
    }

    /// Canonical name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommitOnSuccess => "commit_on_success",
            Self::AlwaysCommit => "always_commit",
            Self::AlwaysRollback => "always_rollback",
        }
    }
}

impl fmt::Display for TransactionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized policy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction policy: '{0}'")]
pub struct ParsePolicyError(String);

impl FromStr for TransactionPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "commit_on_success" | "success" => Ok(Self::CommitOnSuccess),
            "always_commit" | "always" => Ok(Self::AlwaysCommit),
            "always_rollback" | "never" => Ok(Self::AlwaysRollback),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}
