//! Runtime environment selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment the engine runs in.
///
/// Drives the default TTL table and the maintenance sweep interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Live traffic.
    Production,
    /// Local and shared development.
    #[default]
    Development,
    /// Automated test runs; short TTLs so expiry is observable.
    Testing,
}

impl Environment {
    /// Returns true for production.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns true for testing.
    #[must_use]
    pub const fn is_testing(&self) -> bool {
        matches!(self, Self::Testing)
    }

    /// Canonical lowercase name, also used as the config file stem.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Testing => "testing",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            "testing" | "test" => Ok(Self::Testing),
            other => Err(format!("Unknown environment: '{}'", other)),
        }
    }
}
