//! External fact-check strategies keyed by [`FactCategory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Closed set of fact categories with a dedicated checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    /// Sanctions-list membership.
    Sanctions,
    /// Regulatory filing facts.
    RegulatoryFiling,
    /// Anything else.
    Generic,
}

impl FactCategory {
    /// Snake-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sanctions => "sanctions",
            Self::RegulatoryFiling => "regulatory_filing",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for FactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sanctions" | "sanctions_list" => Ok(Self::Sanctions),
            "regulatory_filing" | "regulatory" => Ok(Self::RegulatoryFiling),
            "generic" => Ok(Self::Generic),
            other => Err(AppError::Validation {
                field: "category".to_string(),
                reason: format!("unknown fact category '{}'", other),
            }),
        }
    }
}

/// Outcome of one external check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactVerdict {
    /// Whether the fact holds.
    pub is_valid: bool,
    /// Category-specific confidence.
    pub confidence: f64,
}

/// A fact-check service for one category.
#[async_trait]
pub trait FactChecker: Send + Sync {
    /// Check a single fact.
    async fn check(&self, fact: &str) -> AppResult<FactVerdict>;
}

/// Screens facts against a configured sanctions list.
#[derive(Debug, Clone, Default)]
pub struct SanctionsListCheck {
    entries: HashSet<String>,
}

impl SanctionsListCheck {
    /// Build from list entries; matching is case-insensitive.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl FactChecker for SanctionsListCheck {
    async fn check(&self, fact: &str) -> AppResult<FactVerdict> {
        let fact = fact.to_lowercase();
        let flagged =
            fact.contains("sanctioned") || self.entries.iter().any(|e| fact.contains(e.as_str()));
        Ok(FactVerdict {
            is_valid: !flagged,
            confidence: 0.95,
        })
    }
}

/// Regulatory filing facts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegulatoryFilingCheck;

#[async_trait]
impl FactChecker for RegulatoryFilingCheck {
    async fn check(&self, _fact: &str) -> AppResult<FactVerdict> {
        Ok(FactVerdict {
            is_valid: true,
            confidence: 0.9,
        })
    }
}

/// Catch-all check.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericCheck;

#[async_trait]
impl FactChecker for GenericCheck {
    async fn check(&self, _fact: &str) -> AppResult<FactVerdict> {
        Ok(FactVerdict {
            is_valid: true,
            confidence: 0.8,
        })
    }
}
