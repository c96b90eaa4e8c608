// Local crates
use crate::filter::errors::FilterError;

// External crates
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Configured string match rule, written in TOML as `{ prefix = "/api" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
    Regex(String),
}

/// Compiled form of a [`MatchRule`].
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
    Regex(Regex),
}

impl Matcher {
    pub fn compile(rule: &MatchRule) -> Result<Self, FilterError> {
        Ok(match rule {
            MatchRule::Exact(s) => Matcher::Exact(s.clone()),
            MatchRule::Prefix(s) => Matcher::Prefix(s.clone()),
            MatchRule::Suffix(s) => Matcher::Suffix(s.clone()),
            MatchRule::Substring(s) => Matcher::Substring(s.clone()),
            MatchRule::Regex(s) => Matcher::Regex(compile_regex(s)?),
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(s) => value == s,
            Matcher::Prefix(s) => value.starts_with(s.as_str()),
            Matcher::Suffix(s) => value.ends_with(s.as_str()),
            Matcher::Substring(s) => value.contains(s.as_str()),
            Matcher::Regex(re) => re.is_match(value),
        }
    }
}

pub(crate) fn compile_regex(pattern: &str) -> Result<Regex, FilterError> {
    Regex::new(pattern).map_err(|source| FilterError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}
