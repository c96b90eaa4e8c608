// Local crates
use crate::filter::{
    errors::FilterError,
    expression::Expr,
    matcher::{MatchRule, Matcher},
};
use crate::parser::fields::{ParsedFields, field};

// External crates
use serde::{Deserialize, Serialize};

/// Line filter as written in the job configuration.
///
/// ```toml
/// [weblog.filter]
/// include = { prefix = "/api" }
/// exclude = { suffix = ".png" }
/// expression = "status < 500 && method != OPTIONS"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    pub include: Option<MatchRule>,
    pub exclude: Option<MatchRule>,
    pub expression: Option<String>,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none() && self.expression.is_none()
    }
}

/// Compiled predicate over parsed lines. Evaluation is side-effect free.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    include: Option<Matcher>,
    exclude: Option<Matcher>,
    expression: Option<Expr>,
}

impl Filter {
    /// Accepts every line.
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn compile(config: &FilterConfig) -> Result<Self, FilterError> {
        Ok(Self {
            include: config.include.as_ref().map(Matcher::compile).transpose()?,
            exclude: config.exclude.as_ref().map(Matcher::compile).transpose()?,
            expression: config.expression.as_deref().map(Expr::parse).transpose()?,
        })
    }

    /// `include(uri) && !exclude(uri) && expression`. Absent parts hold.
    pub fn evaluate(&self, fields: &ParsedFields) -> bool {
        let uri = fields.str(field::URI);

        if let Some(include) = &self.include {
            if !uri.is_some_and(|uri| include.matches(uri)) {
                return false;
            }
        }

        if let Some(exclude) = &self.exclude {
            if uri.is_some_and(|uri| exclude.matches(uri)) {
                return false;
            }
        }

        self.expression
            .as_ref()
            .is_none_or(|expression| expression.evaluate(fields))
    }
}
