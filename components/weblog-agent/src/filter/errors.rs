// External crates
use thiserror::Error;

/// Errors raised while compiling filter expressions or match rules.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter expression `{expression}` at byte {position}: {reason}")]
    Syntax {
        expression: String,
        position: usize,
        reason: String,
    },

    #[error("invalid regular expression `{pattern}`")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
