//! Convenience builder for LDAP search filters.
//!
//! Values pushed through the builder are escaped per RFC 4515, so user-supplied input can never
//! change the structure of the filter.

/// Builder for a conjunction of filter clauses.
#[derive(Debug, Default, Clone)]
pub struct FilterBuilder {
    clauses: Vec<String>,
}

impl FilterBuilder {
    /// Create a new, empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Append an equality clause with an escaped value.
    #[must_use]
    pub fn equals(mut self, attribute: &str, value: &str) -> Self {
        self.clauses
            .push(format!("({attribute}={})", escape_filter_value(value)));
        self
    }

    /// Append a clause matching entries where the attribute is absent.
    #[must_use]
    pub fn absent(mut self, attribute: &str) -> Self {
        self.clauses.push(format!("(!({attribute}=*))"));
        self
    }

    /// Append a pre-built clause verbatim.
    ///
    /// A clause without surrounding parentheses is wrapped in them. Blank input is ignored.
    #[must_use]
    pub fn raw(mut self, clause: &str) -> Self {
        let clause = clause.trim();
        if clause.is_empty() {
            return self;
        }
        if clause.starts_with('(') {
            self.clauses.push(clause.to_string());
        } else {
            self.clauses.push(format!("({clause})"));
        }
        self
    }

    /// Returns true if no clauses have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render the filter. A single clause is returned as-is; several are AND-ed.
    #[must_use]
    pub fn build(self) -> String {
        match self.clauses.len() {
            0 => String::new(),
            1 => self.clauses.into_iter().next().unwrap_or_default(),
            _ => format!("(&{})", self.clauses.concat()),
        }
    }
}

/// Escapes a value for inclusion in an LDAP filter.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
