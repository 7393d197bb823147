//! The closed set of schedulable jobs.
//!
//! Every job the scheduler knows about is a variant here; registration,
//! control routes, and introspection all key off this enum, so an id that
//! parses is always registered.

use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobId {
    GithubTrends,
    FeedsParser,
}

impl JobId {
    /// Declaration order is the presentation order for overviews.
    pub const ALL: [JobId; 2] = [JobId::GithubTrends, JobId::FeedsParser];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            JobId::GithubTrends => "github_trends",
            JobId::FeedsParser => "feeds_parser",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            JobId::GithubTrends => "GitHub Trends",
            JobId::FeedsParser => "Feeds Parser",
        }
    }

    /// Environment variable that overrides this job's cron expression.
    #[must_use]
    pub const fn cron_env_var(self) -> &'static str {
        match self {
            JobId::GithubTrends => "GITHUB_TRENDS_CRON",
            JobId::FeedsParser => "FEEDS_PARSER_CRON",
        }
    }

    /// Hardcoded default schedule, five-field cron. Must always parse.
    #[must_use]
    pub const fn default_cron(self) -> &'static str {
        match self {
            JobId::GithubTrends => "0 5 * * *",
            JobId::FeedsParser => "0 8 * * *",
        }
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job '{0}'")]
pub struct UnknownJobError(pub String);

impl FromStr for JobId {
    type Err = UnknownJobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownJobError(s.to_string()))
    }
}
