// Local crates
use crate::parser::{
    candidates::CandidatePattern,
    fields::ParsedFields,
    pattern::{Pattern, PatternError},
};

// External crates
use tracing::instrument;

/// Name given to a pattern supplied through configuration.
pub const CUSTOM_PATTERN_NAME: &str = "custom";

/// Line parser bound to a single pattern, selected once at initialization.
#[derive(Debug, Clone)]
pub struct LogParser {
    pattern: Pattern,
}

impl LogParser {
    /// Learns the log layout from one representative line.
    ///
    /// Candidates are tried in the order given; the first whose pattern
    /// fully matches `sample` is adopted. Learning is deterministic: the same
    /// sample and candidate list always select the same pattern.
    ///
    /// Returns [`PatternError::NoPatternMatches`] when no candidate fits.
    #[instrument(
        name = "weblog_parser::learn",
        target = "parser::parser::LogParser",
        skip_all,
        level = "debug"
    )]
    pub fn learn(sample: &str, candidates: &[CandidatePattern]) -> Result<Self, PatternError> {
        let sample = sample.trim_end_matches(['\r', '\n']);

        for candidate in candidates {
            let pattern = Pattern::compile(candidate.name, candidate.format)?;

            if pattern.is_match(sample) {
                tracing::debug!(
                    pattern = candidate.name,
                    sample_line = %sample,
                    "Sample line matches candidate pattern"
                );
                return Ok(Self { pattern });
            }

            tracing::trace!(
                pattern = candidate.name,
                sample_line = %sample,
                "Sample line does not match candidate pattern"
            );
        }

        tracing::error!(
            sample_line = %sample,
            candidates = candidates.len(),
            "No candidate pattern matches the sample line"
        );
        Err(PatternError::NoPatternMatches {
            sample: sample.to_string(),
        })
    }

    /// Uses an explicitly configured pattern. Only its syntax is checked,
    /// it is never tested against a sample line.
    #[instrument(
        name = "weblog_parser::custom",
        target = "parser::parser::LogParser",
        skip_all,
        level = "debug"
    )]
    pub fn with_pattern(format: &str) -> Result<Self, PatternError> {
        let pattern = Pattern::compile(CUSTOM_PATTERN_NAME, format)?;
        tracing::debug!(pattern = %format, "Using custom log pattern");
        Ok(Self { pattern })
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// `None` signals an unmatched line.
    pub fn parse(&self, line: &str) -> Option<ParsedFields> {
        self.pattern.parse(line)
    }
}

/// Compiles every candidate, surfacing the first syntax error.
pub fn validate_candidates(candidates: &[CandidatePattern]) -> Result<(), PatternError> {
    for candidate in candidates {
        Pattern::compile(candidate.name, candidate.format)?;
    }
    Ok(())
}
