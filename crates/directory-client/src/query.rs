//! Search requests, search results and the query executor.

use crate::session::LdapConnection;
use crate::Result;
use directory_core::{to_common_name, DistinguishedName, Error};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for ldap3::Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => ldap3::Scope::Base,
            SearchScope::OneLevel => ldap3::Scope::OneLevel,
            SearchScope::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// A single filtered search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// LDAP filter string.
    pub filter: String,
    /// Attributes to load, in request order.
    pub attributes: Vec<String>,
    /// Search scope relative to the search base.
    pub scope: SearchScope,
}

impl SearchQuery {
    /// Creates a subtree query loading the given attributes.
    #[must_use]
    pub fn new<I, S>(filter: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut query = Self {
            filter: filter.into(),
            attributes: Vec::new(),
            scope: SearchScope::Subtree,
        };
        for attribute in attributes {
            let attribute = attribute.into();
            if !query
                .attributes
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(&attribute))
            {
                query.attributes.push(attribute);
            }
        }
        query
    }

    /// Overrides the search scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Directory entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRecord {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserve server order).
    pub attributes: HashMap<String, Vec<String>>,
}

impl SearchRecord {
    /// Creates an empty record for the given distinguished name.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Adds values for an attribute.
    #[must_use]
    pub fn with_values<I, S>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .insert(attribute.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Returns all values for the attribute, matching the name case-insensitively.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(attribute)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }

    /// Returns the first non-empty value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.iter().find(|value| !value.is_empty()))
            .map(String::as_str)
    }

    /// Returns the short name of the entry itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FormatError`] if the record has an empty distinguished name.
    pub fn common_name(&self) -> Result<String> {
        to_common_name(&self.dn)
    }
}

/// Runs searches rooted at the endpoint base DN and projects their results.
#[derive(Debug, Clone)]
pub(crate) struct QueryExecutor {
    base_dn: DistinguishedName,
}

impl QueryExecutor {
    pub(crate) fn new(base_dn: DistinguishedName) -> Self {
        Self { base_dn }
    }

    pub(crate) fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// Subtree search below the base DN returning every match.
    pub(crate) async fn search(
        &self,
        connection: &mut dyn LdapConnection,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<SearchRecord>> {
        let query = SearchQuery::new(filter, attributes.iter().copied());
        self.search_in(connection, self.base_dn.as_str(), &query)
            .await
    }

    /// Runs a fully specified query against an explicit search base.
    pub(crate) async fn search_in(
        &self,
        connection: &mut dyn LdapConnection,
        base: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchRecord>> {
        if query.filter.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "search filter cannot be empty".to_string(),
            ));
        }

        let records = connection.search(base, query).await?;
        debug!(
            base,
            filter = %query.filter,
            matches = records.len(),
            "directory search complete"
        );
        Ok(records)
    }

    /// Returns the first match, or `None` when nothing matches.
    pub(crate) async fn search_single(
        &self,
        connection: &mut dyn LdapConnection,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Option<SearchRecord>> {
        Ok(self
            .search(connection, filter, attributes)
            .await?
            .into_iter()
            .next())
    }
}

/// Projects search records into short names.
///
/// With an empty `attribute` each record contributes its own common name; otherwise every value
/// of that attribute is normalised to a common name. Record order, then value order, is kept and
/// duplicates are not removed.
#[must_use]
pub fn extract_names(records: &[SearchRecord], attribute: &str) -> Vec<String> {
    let mut names = Vec::new();
    for record in records {
        if attribute.is_empty() {
            push_common_name(&mut names, &record.dn);
        } else if let Some(values) = record.values(attribute) {
            for value in values {
                push_common_name(&mut names, value);
            }
        }
    }
    names
}

fn push_common_name(names: &mut Vec<String>, dn: &str) {
    match to_common_name(dn) {
        Ok(name) => names.push(name),
        Err(err) => warn!(dn, "skipping unusable directory name: {err}"),
    }
}
