use serde::{Deserialize, Serialize};

/// A column rename declared with `expression AS alias` in a table query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAlias {
    /// Bare field name when derivable, otherwise the full expression.
    pub original: String,
    pub alias: String,
    pub expression: String,
}

impl ColumnAlias {
    /// Whether this alias renames `name`, either by field or by the full
    /// expression (result headers carry the alias, the row may carry either).
    pub fn matches(&self, name: &str) -> bool {
        self.original.eq_ignore_ascii_case(name)
            || self.expression.eq_ignore_ascii_case(name)
            || self.alias == name
    }
}
