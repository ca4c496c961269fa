//! Fluent builder for portal search filter expressions.

use std::fmt;

/// A portal search expression built from term, field and boolean clauses.
///
/// ```
/// use portal_assistant::domain::query::SearchQuery;
///
/// let query = SearchQuery::new()
///     .term("root")
///     .in_field("ownerfolder")
///     .and()
///     .term("jsmith")
///     .in_field("owner");
///
/// assert_eq!(query.to_string(), "ownerfolder:root AND owner:jsmith");
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SearchQuery {
    clauses: Vec<String>,
    pending_term: Option<String>,
}

impl SearchQuery {
    /// Creates an empty expression.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a term. Unless followed by [`SearchQuery::in_field`] it matches
    /// any field.
    #[must_use]
    pub fn term(mut self, value: impl AsRef<str>) -> Self {
        self.flush_pending_term();
        self.pending_term = Some(quote_term(value.as_ref()));

        self
    }

    /// Restricts the preceding term to `field`.
    #[must_use]
    pub fn in_field(mut self, field: &str) -> Self {
        if let Some(term) = self.pending_term.take() {
            self.clauses.push(format!("{field}:{term}"));
        }

        self
    }

    #[must_use]
    pub fn and(self) -> Self {
        self.operator("AND")
    }

    #[must_use]
    pub fn or(self) -> Self {
        self.operator("OR")
    }

    #[must_use]
    pub fn not(self) -> Self {
        self.operator("NOT")
    }

    /// Returns whether no clause has been added.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty() && self.pending_term.is_none()
    }

    fn operator(mut self, operator: &str) -> Self {
        self.flush_pending_term();
        if !self.clauses.is_empty() {
            self.clauses.push(operator.to_string());
        }

        self
    }

    fn flush_pending_term(&mut self) {
        if let Some(term) = self.pending_term.take() {
            self.clauses.push(term);
        }
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clauses = self.clauses.iter().map(String::as_str).collect::<Vec<_>>();
        if let Some(term) = &self.pending_term {
            clauses.push(term);
        }

        write!(formatter, "{}", clauses.join(" "))
    }
}

fn quote_term(value: &str) -> String {
    if value.is_empty() || value.contains(|character: char| character.is_whitespace()) {
        return format!("\"{}\"", value.replace('"', "\\\""));
    }

    value.to_string()
}
