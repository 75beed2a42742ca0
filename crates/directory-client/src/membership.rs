//! Transitive group membership resolution.
//!
//! Membership is followed through `memberOf` values read live from the directory. The walk is
//! depth-first and keeps a visited set for the whole call, so every group is queried at most
//! once and cycles of any length terminate. Output is first-seen order: each direct group is
//! followed by its ancestors before the next direct group.

use crate::query::{extract_names, QueryExecutor};
use crate::schema::{attrs, filters};
use crate::session::LdapConnection;
use crate::Result;
use directory_core::FilterBuilder;
use std::collections::HashSet;
use tracing::debug;

pub(crate) struct MembershipResolver<'a> {
    executor: &'a QueryExecutor,
}

impl<'a> MembershipResolver<'a> {
    pub(crate) fn new(executor: &'a QueryExecutor) -> Self {
        Self { executor }
    }

    /// All groups `username` belongs to, directly or through nesting.
    pub(crate) async fn resolve_for_user(
        &self,
        connection: &mut dyn LdapConnection,
        username: &str,
    ) -> Result<Vec<String>> {
        let filter = FilterBuilder::new()
            .raw(filters::PERSON)
            .equals(attrs::SAM_ACCOUNT_NAME, username)
            .build();
        let direct = self.direct_memberships(connection, &filter).await?;
        self.walk(connection, None, direct).await
    }

    /// All groups `group` is nested in. The group itself is never part of the result.
    pub(crate) async fn resolve_for_group(
        &self,
        connection: &mut dyn LdapConnection,
        group: &str,
    ) -> Result<Vec<String>> {
        let direct = self.group_parents(connection, group).await?;
        self.walk(connection, Some(group), direct).await
    }

    /// Expands already-known direct groups with all of their ancestors.
    pub(crate) async fn expand(
        &self,
        connection: &mut dyn LdapConnection,
        direct: Vec<String>,
    ) -> Result<Vec<String>> {
        self.walk(connection, None, direct).await
    }

    async fn walk(
        &self,
        connection: &mut dyn LdapConnection,
        root: Option<&str>,
        direct: Vec<String>,
    ) -> Result<Vec<String>> {
        let mut walk = Walk::new(root);
        let mut stack = vec![direct.into_iter()];

        while let Some(frame) = stack.last_mut() {
            let Some(group) = frame.next() else {
                stack.pop();
                continue;
            };
            if !walk.record(&group) {
                continue;
            }
            if walk.enter(&group) {
                let parents = self.group_parents(connection, &group).await?;
                stack.push(parents.into_iter());
            }
        }

        debug!(
            root = root.unwrap_or_default(),
            visited = walk.visited.len(),
            groups = walk.groups.len(),
            "group membership resolved"
        );
        Ok(walk.groups)
    }

    async fn group_parents(
        &self,
        connection: &mut dyn LdapConnection,
        group: &str,
    ) -> Result<Vec<String>> {
        let filter = FilterBuilder::new()
            .raw(filters::GROUP)
            .equals(attrs::COMMON_NAME, group)
            .build();
        self.direct_memberships(connection, &filter).await
    }

    async fn direct_memberships(
        &self,
        connection: &mut dyn LdapConnection,
        filter: &str,
    ) -> Result<Vec<String>> {
        let record = self
            .executor
            .search_single(connection, filter, &[attrs::MEMBER_OF])
            .await?;
        Ok(record
            .map(|record| extract_names(&[record], attrs::MEMBER_OF))
            .unwrap_or_default())
    }
}

/// State carried across one resolution call. Group identity is case-insensitive.
struct Walk {
    root: Option<String>,
    seen: HashSet<String>,
    visited: HashSet<String>,
    groups: Vec<String>,
}

impl Walk {
    fn new(root: Option<&str>) -> Self {
        let root = root.map(str::to_lowercase);
        let visited = root.iter().cloned().collect();
        Self {
            root,
            seen: HashSet::new(),
            visited,
            groups: Vec::new(),
        }
    }

    /// Adds the group to the output unless it is the root. Returns false for the root.
    fn record(&mut self, group: &str) -> bool {
        let key = group.to_lowercase();
        if self.root.as_deref() == Some(key.as_str()) {
            return false;
        }
        if self.seen.insert(key) {
            self.groups.push(group.to_string());
        }
        true
    }

    /// Marks the group visited. Returns true the first time only.
    fn enter(&mut self, group: &str) -> bool {
        self.visited.insert(group.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{SearchQuery, SearchRecord};
    use crate::session::MockLdapConnection;
    use directory_core::DistinguishedName;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Mock directory answering `memberOf` lookups from an adjacency list.
    fn graph_connection(
        user: (&str, &[&str]),
        groups: &[(&str, &[&str])],
        lookups: Arc<Mutex<Vec<String>>>,
    ) -> MockLdapConnection {
        let mut parents: HashMap<String, Vec<String>> = groups
            .iter()
            .map(|(name, of)| {
                (
                    format!("(cn={name})"),
                    of.iter().map(|p| (*p).to_string()).collect(),
                )
            })
            .collect();
        parents.insert(
            format!("(sAMAccountName={})", user.0),
            user.1.iter().map(|p| (*p).to_string()).collect(),
        );

        let mut connection = MockLdapConnection::new();
        connection
            .expect_search()
            .returning(move |_, query: &SearchQuery| {
                lookups.lock().unwrap().push(query.filter.clone());
                Ok(parents
                    .iter()
                    .find(|(clause, _)| query.filter.ends_with(&format!("{clause})")))
                    .map(|(clause, of)| {
                        vec![SearchRecord::new(format!("CN={clause},DC=example,DC=com"))
                            .with_values(
                                "memberOf",
                                of.iter()
                                    .map(|p| format!("CN={p},OU=Groups,DC=example,DC=com")),
                            )]
                    })
                    .unwrap_or_default())
            });
        connection
    }

    fn executor() -> QueryExecutor {
        QueryExecutor::new(DistinguishedName::parse("DC=example,DC=com").unwrap())
    }

    fn lookups() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn user_closure_is_depth_first_and_deduplicated() {
        // alice -> Sales, Staff; Sales -> Staff, Everyone; Staff -> Everyone
        let log = lookups();
        let mut connection = graph_connection(
            ("alice", &["Sales", "Staff"]),
            &[
                ("Sales", &["Staff", "Everyone"]),
                ("Staff", &["Everyone"]),
                ("Everyone", &[]),
            ],
            log.clone(),
        );
        let executor = executor();

        let groups = MembershipResolver::new(&executor)
            .resolve_for_user(&mut connection, "alice")
            .await
            .unwrap();

        assert_eq!(groups, vec!["Sales", "Staff", "Everyone"]);
        // user + one lookup per distinct group
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn group_never_contains_itself() {
        let log = lookups();
        let mut connection = graph_connection(
            ("nobody", &[]),
            &[("Admins", &["Admins", "Operators"]), ("Operators", &[])],
            log,
        );
        let executor = executor();

        let groups = MembershipResolver::new(&executor)
            .resolve_for_group(&mut connection, "Admins")
            .await
            .unwrap();

        assert_eq!(groups, vec!["Operators"]);
    }

    #[tokio::test]
    async fn long_cycles_terminate_with_single_lookup_per_group() {
        // A -> B -> C -> A
        let log = lookups();
        let mut connection = graph_connection(
            ("nobody", &[]),
            &[("A", &["B"]), ("B", &["C"]), ("C", &["A"])],
            log.clone(),
        );
        let executor = executor();

        let groups = MembershipResolver::new(&executor)
            .resolve_for_group(&mut connection, "A")
            .await
            .unwrap();

        assert_eq!(groups, vec!["B", "C"]);
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cycle_not_through_root_is_visited_once() {
        // alice -> X; X -> Y; Y -> X
        let log = lookups();
        let mut connection = graph_connection(
            ("alice", &["X"]),
            &[("X", &["Y"]), ("Y", &["X"])],
            log.clone(),
        );
        let executor = executor();

        let groups = MembershipResolver::new(&executor)
            .resolve_for_user(&mut connection, "alice")
            .await
            .unwrap();

        assert_eq!(groups, vec!["X", "Y"]);
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn expand_treats_names_case_insensitively() {
        let log = lookups();
        let mut connection = graph_connection(
            ("nobody", &[]),
            &[("Sales", &["everyone"]), ("Everyone", &[])],
            log,
        );
        let executor = executor();

        let groups = MembershipResolver::new(&executor)
            .expand(
                &mut connection,
                vec!["Sales".to_string(), "EVERYONE".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(groups, vec!["Sales", "everyone"]);
    }

    #[tokio::test]
    async fn unknown_user_has_no_groups() {
        let mut connection = graph_connection(("alice", &["Sales"]), &[], lookups());
        let executor = executor();

        let groups = MembershipResolver::new(&executor)
            .resolve_for_user(&mut connection, "mallory")
            .await
            .unwrap();

        assert!(groups.is_empty());
    }
}
