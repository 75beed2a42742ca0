//! Directory sessions and the LDAP transport seam.
//!
//! [`DirectorySession`] hands out connections bound with either the endpoint's stored
//! credentials or caller-supplied ones. Every caller releases the connection through
//! [`DirectorySession::release`] on all exit paths; a failed unbind is logged, never propagated.

use crate::query::{SearchQuery, SearchRecord};
use crate::Result;
use async_trait::async_trait;
use directory_core::{DirectoryEndpoint, Error};
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Mod, ResultEntry, SearchEntry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// LDAP result code for `noSuchObject`.
const RC_NO_SUCH_OBJECT: u32 = 32;

/// Replacement of every value of one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttributeReplacement {
    pub(crate) attribute: String,
    pub(crate) values: Vec<Vec<u8>>,
}

impl AttributeReplacement {
    pub(crate) fn text(attribute: &str, value: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            values: vec![value.as_bytes().to_vec()],
        }
    }

    pub(crate) fn binary(attribute: &str, value: Vec<u8>) -> Self {
        Self {
            attribute: attribute.to_string(),
            values: vec![value],
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnection: Send {
    async fn simple_bind(&mut self, bind_name: &str, password: &str) -> Result<()>;
    async fn search(&mut self, base: &str, query: &SearchQuery) -> Result<Vec<SearchRecord>>;
    async fn modify(&mut self, dn: &str, changes: &[AttributeReplacement]) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn LdapConnection>>;
}

/// Produces connections to one directory endpoint.
pub(crate) struct DirectorySession {
    endpoint: Arc<DirectoryEndpoint>,
    connector: Box<dyn LdapConnector>,
}

impl DirectorySession {
    pub(crate) fn new(endpoint: Arc<DirectoryEndpoint>, connector: Box<dyn LdapConnector>) -> Self {
        Self {
            endpoint,
            connector,
        }
    }

    /// Connects with the stored credentials, or anonymously when none are configured.
    pub(crate) async fn connect(&self) -> Result<Box<dyn LdapConnection>> {
        match (self.endpoint.username(), self.endpoint.password()) {
            (Some(username), Some(password)) => self.connect_as(username, password).await,
            _ => {
                debug!(url = self.endpoint.url(), "opening anonymous directory connection");
                self.connector.open().await
            }
        }
    }

    /// Connects and binds with the supplied credentials.
    pub(crate) async fn connect_as(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn LdapConnection>> {
        let mut connection = self.connector.open().await?;
        let bind_name = self.endpoint.bind_name(username);
        debug!(url = self.endpoint.url(), bind_name = %bind_name, "binding directory connection");
        if let Err(err) = connection.simple_bind(&bind_name, password).await {
            Self::release(connection).await;
            return Err(err);
        }
        Ok(connection)
    }

    /// Unbinds the connection, logging rather than returning any failure.
    pub(crate) async fn release(mut connection: Box<dyn LdapConnection>) {
        if let Err(err) = connection.unbind().await {
            warn!("failed to unbind directory connection: {err}");
        }
    }
}

/// Real LDAP connector backed by `ldap3`.
pub(crate) struct RealLdapConnector {
    endpoint: Arc<DirectoryEndpoint>,
}

impl RealLdapConnector {
    pub(crate) fn new(endpoint: Arc<DirectoryEndpoint>) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn open(&self) -> Result<Box<dyn LdapConnection>> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.endpoint.connection_timeout());
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.endpoint.url())
            .await
            .map_err(connection_error)?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapConnection {
            inner: ldap,
            operation_timeout: self.endpoint.operation_timeout(),
        }))
    }
}

struct RealLdapConnection {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapConnection for RealLdapConnection {
    async fn simple_bind(&mut self, bind_name: &str, password: &str) -> Result<()> {
        timeout(
            self.operation_timeout,
            self.inner.simple_bind(bind_name, password),
        )
        .await
        .map_err(|_| Error::Timeout("directory bind timed out".to_string()))?
        .and_then(ldap3::LdapResult::success)
        .map_err(connection_error)?;
        Ok(())
    }

    async fn search(&mut self, base: &str, query: &SearchQuery) -> Result<Vec<SearchRecord>> {
        let result = timeout(
            self.operation_timeout,
            self.inner.search(
                base,
                query.scope.into(),
                &query.filter,
                query.attributes.clone(),
            ),
        )
        .await
        .map_err(|_| Error::Timeout("directory search timed out".to_string()))?
        .map_err(query_error)?;
        let (entries, _) = result.success().map_err(query_error)?;
        Ok(project_entries(entries))
    }

    async fn modify(&mut self, dn: &str, changes: &[AttributeReplacement]) -> Result<()> {
        let mods = changes
            .iter()
            .map(|change| {
                Mod::Replace(
                    change.attribute.as_bytes().to_vec(),
                    change.values.iter().cloned().collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        timeout(self.operation_timeout, self.inner.modify(dn, mods))
            .await
            .map_err(|_| Error::Timeout("directory modify timed out".to_string()))?
            .and_then(ldap3::LdapResult::success)
            .map_err(|err| Error::OperationError(err.to_string()))?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Timeout("directory unbind timed out".to_string()))?
            .map_err(connection_error)?;
        Ok(())
    }
}

/// Converts search results into records.
///
/// Search references (AD returns them for `DomainDnsZones` and friends on a subtree search at the
/// domain root) and intermediate messages carry no entry and are skipped.
fn project_entries(entries: Vec<ResultEntry>) -> Vec<SearchRecord> {
    entries
        .into_iter()
        .filter(|entry| {
            if entry.is_ref() {
                debug!("skipping search reference");
                return false;
            }
            !entry.is_intermediate()
        })
        .map(SearchEntry::construct)
        .map(|entry| SearchRecord {
            dn: entry.dn,
            attributes: entry.attrs,
        })
        .collect()
}

fn connection_error(err: LdapError) -> Error {
    Error::ConnectionError(err.to_string())
}

fn query_error(err: LdapError) -> Error {
    match err {
        LdapError::LdapResult { result } if result.rc == RC_NO_SUCH_OBJECT => {
            Error::NotFound(format!("no such directory object: {}", result.matched))
        }
        other => Error::QueryError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use directory_core::DistinguishedName;
    use ldap3::asn1::{StructureTag, TagClass, PL};

    fn endpoint(with_credentials: bool) -> Arc<DirectoryEndpoint> {
        let base_dn = DistinguishedName::parse("DC=example,DC=com").unwrap();
        let endpoint = DirectoryEndpoint::new("ldap://dc1.example.com", base_dn)
            .unwrap()
            .with_bind_name_template("{username}@example.com")
            .unwrap();
        if with_credentials {
            Arc::new(endpoint.with_credentials("svc-directory", "secret"))
        } else {
            Arc::new(endpoint)
        }
    }

    #[tokio::test]
    async fn connect_binds_with_stored_credentials() {
        let mut connection = MockLdapConnection::new();
        connection
            .expect_simple_bind()
            .withf(|name, password| name == "svc-directory@example.com" && password == "secret")
            .times(1)
            .returning(|_, _| Ok(()));
        let mut connector = MockLdapConnector::new();
        connector
            .expect_open()
            .return_once(move || Ok(Box::new(connection)));

        let session = DirectorySession::new(endpoint(true), Box::new(connector));
        assert!(session.connect().await.is_ok());
    }

    #[tokio::test]
    async fn connect_without_credentials_skips_bind() {
        let mut connection = MockLdapConnection::new();
        connection.expect_simple_bind().never();
        let mut connector = MockLdapConnector::new();
        connector
            .expect_open()
            .return_once(move || Ok(Box::new(connection)));

        let session = DirectorySession::new(endpoint(false), Box::new(connector));
        assert!(session.connect().await.is_ok());
    }

    #[tokio::test]
    async fn rejected_bind_releases_connection() {
        let mut connection = MockLdapConnection::new();
        connection
            .expect_simple_bind()
            .returning(|_, _| Err(Error::ConnectionError("invalidCredentials".to_string())));
        connection.expect_unbind().times(1).returning(|| Ok(()));
        let mut connector = MockLdapConnector::new();
        connector
            .expect_open()
            .return_once(move || Ok(Box::new(connection)));

        let session = DirectorySession::new(endpoint(false), Box::new(connector));
        let result = session.connect_as("jdoe", "wrong").await;
        assert!(matches!(result, Err(Error::ConnectionError(_))));
    }

    #[tokio::test]
    async fn release_swallows_unbind_failure() {
        let mut connection = MockLdapConnection::new();
        connection
            .expect_unbind()
            .times(1)
            .returning(|| Err(Error::ConnectionError("reset by peer".to_string())));

        DirectorySession::release(Box::new(connection)).await;
    }

    #[test]
    fn no_such_object_maps_to_not_found() {
        let err = query_error(LdapError::LdapResult {
            result: ldap3::LdapResult {
                rc: RC_NO_SUCH_OBJECT,
                matched: "DC=example,DC=com".to_string(),
                text: String::new(),
                refs: Vec::new(),
                ctrls: Vec::new(),
            },
        });
        assert!(matches!(err, Error::NotFound(_)));
    }

    fn octets(value: &str) -> StructureTag {
        StructureTag {
            class: TagClass::Universal,
            id: 4,
            payload: PL::P(value.as_bytes().to_vec()),
        }
    }

    fn constructed(class: TagClass, id: u64, items: Vec<StructureTag>) -> StructureTag {
        StructureTag {
            class,
            id,
            payload: PL::C(items),
        }
    }

    fn group_entry(dn: &str, cn: &str) -> ResultEntry {
        let attribute = constructed(
            TagClass::Universal,
            16,
            vec![
                octets("cn"),
                constructed(TagClass::Universal, 17, vec![octets(cn)]),
            ],
        );
        ResultEntry::new(constructed(
            TagClass::Application,
            4,
            vec![
                octets(dn),
                constructed(TagClass::Universal, 16, vec![attribute]),
            ],
        ))
    }

    fn reference(url: &str) -> ResultEntry {
        ResultEntry::new(constructed(TagClass::Application, 19, vec![octets(url)]))
    }

    #[test]
    fn search_references_are_skipped() {
        let records = project_entries(vec![
            group_entry("CN=Sales,OU=Groups,DC=example,DC=com", "Sales"),
            reference("ldap://DomainDnsZones.example.com/DC=DomainDnsZones,DC=example,DC=com"),
            reference("ldap://ForestDnsZones.example.com/DC=ForestDnsZones,DC=example,DC=com"),
        ]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dn, "CN=Sales,OU=Groups,DC=example,DC=com");
        assert_eq!(records[0].first("cn"), Some("Sales"));
    }

    #[test]
    fn only_references_yield_no_records() {
        let records = project_entries(vec![reference("ldap://example.com/DC=example,DC=com")]);
        assert!(records.is_empty());
    }

    #[test]
    fn replacements_encode_values() {
        let text = AttributeReplacement::text("lockoutTime", "0");
        assert_eq!(text.values, vec![b"0".to_vec()]);
        let binary = AttributeReplacement::binary("unicodePwd", vec![0x22, 0x00]);
        assert_eq!(binary.values, vec![vec![0x22, 0x00]]);
    }
}
