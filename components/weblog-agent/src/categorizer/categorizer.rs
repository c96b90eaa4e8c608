// Local crates
use crate::filter::{
    errors::FilterError,
    matcher::{MatchRule, Matcher},
};
use crate::parser::fields::{ParsedFields, field};

// External crates
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("{kind} category at position {index} has an empty name")]
    EmptyName { kind: CategoryKind, index: usize },

    #[error("{kind} category name `{name}` may only contain letters, digits, `_` and `-`")]
    InvalidName { kind: CategoryKind, name: String },

    #[error("{kind} category `{name}` is declared more than once")]
    Duplicate { kind: CategoryKind, name: String },

    #[error("{kind} category `{name}` has an invalid match rule")]
    Rule {
        kind: CategoryKind,
        name: String,
        #[source]
        source: FilterError,
    },
}

/// One configured category entry.
///
/// ```toml
/// [[weblog.categories]]
/// name = "api"
/// match = { prefix = "/api" }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CategoryConfig {
    pub name: String,
    #[serde(rename = "match")]
    pub rule: MatchRule,
    /// Field the rule is applied to. Defaults to the list's field.
    #[serde(default)]
    pub field: Option<String>,
}

/// The two independent classification passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryKind {
    Url,
    User,
}

impl CategoryKind {
    pub fn default_field(self) -> &'static str {
        match self {
            CategoryKind::Url => field::URI,
            CategoryKind::User => field::USER_DEFINED,
        }
    }

    pub fn metric_prefix(self) -> &'static str {
        match self {
            CategoryKind::Url => "category_",
            CategoryKind::User => "user_category_",
        }
    }

    pub fn chart_id(self) -> &'static str {
        match self {
            CategoryKind::Url => "url_categories",
            CategoryKind::User => "user_categories",
        }
    }

    pub fn uncategorized_key(self) -> &'static str {
        match self {
            CategoryKind::Url => "url_uncategorized",
            CategoryKind::User => "user_uncategorized",
        }
    }

    /// Metric key counting lines classified into `name`.
    pub fn count_key(self, name: &str) -> String {
        format!("{}{}_count", self.metric_prefix(), name)
    }
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryKind::Url => f.write_str("url"),
            CategoryKind::User => f.write_str("user"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Category {
    name: String,
    field: String,
    matcher: Matcher,
}

impl Category {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn matches(&self, fields: &ParsedFields) -> bool {
        fields
            .get(&self.field)
            .is_some_and(|value| self.matcher.matches(&value.to_text()))
    }
}

/// Ordered first-match-wins rule list.
#[derive(Debug, Clone)]
pub struct Categorizer {
    kind: CategoryKind,
    categories: Vec<Category>,
}

impl Categorizer {
    pub fn compile(
        kind: CategoryKind,
        configs: &[CategoryConfig],
        default_field: &str,
    ) -> Result<Self, CategoryError> {
        let mut seen = HashSet::new();
        let mut categories = Vec::with_capacity(configs.len());

        for (index, config) in configs.iter().enumerate() {
            let name = config.name.trim();
            if name.is_empty() {
                return Err(CategoryError::EmptyName { kind, index });
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(CategoryError::InvalidName {
                    kind,
                    name: name.to_string(),
                });
            }
            if !seen.insert(name.to_string()) {
                return Err(CategoryError::Duplicate {
                    kind,
                    name: name.to_string(),
                });
            }

            let matcher = Matcher::compile(&config.rule).map_err(|source| CategoryError::Rule {
                kind,
                name: name.to_string(),
                source,
            })?;

            categories.push(Category {
                name: name.to_string(),
                field: config
                    .field
                    .clone()
                    .unwrap_or_else(|| default_field.to_string()),
                matcher,
            });
        }

        Ok(Self { kind, categories })
    }

    pub fn kind(&self) -> CategoryKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(Category::name)
    }

    /// First category whose rule matches, in declaration order.
    pub fn classify(&self, fields: &ParsedFields) -> Option<&Category> {
        self.categories.iter().find(|c| c.matches(fields))
    }
}
