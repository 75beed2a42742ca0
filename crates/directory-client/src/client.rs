//! Directory client implementation.

use crate::membership::MembershipResolver;
use crate::profile::{sort_users, MailingAddress, UserProfile, UserProfileBuilder};
use crate::query::{extract_names, QueryExecutor, SearchQuery, SearchRecord, SearchScope};
use crate::result::{AuthResult, AUTHENTICATION_FAILED};
use crate::schema::{attrs, filters};
use crate::session::{
    AttributeReplacement, DirectorySession, LdapConnection, LdapConnector, RealLdapConnector,
};
use crate::timestamp::parse_filetime;
use crate::Result;
use chrono::{DateTime, Utc};
use directory_core::{DirectoryEndpoint, Error, FilterBuilder, RelativeDistinguishedName};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const LISTING_ATTRIBUTES: &[&str] = &[attrs::SAM_ACCOUNT_NAME, attrs::DISPLAY_NAME];

const EXPIRATION_ATTRIBUTES: &[&str] = &[
    attrs::SAM_ACCOUNT_NAME,
    attrs::DISPLAY_NAME,
    attrs::PWD_LAST_SET,
];

const PROFILE_ATTRIBUTES: &[&str] = &[
    attrs::MAIL,
    attrs::DEPARTMENT,
    attrs::TELEPHONE_NUMBER,
    attrs::PWD_LAST_SET,
    attrs::MEMBER_OF,
];

/// Client for a directory service with an Active Directory style schema.
///
/// Every call opens its own connection and releases it before returning, so one client can be
/// shared freely between tasks.
pub struct DirectoryClient {
    endpoint: Arc<DirectoryEndpoint>,
    session: DirectorySession,
    executor: QueryExecutor,
}

impl DirectoryClient {
    /// Creates a client that talks to the endpoint over LDAP.
    #[must_use]
    pub fn new(endpoint: DirectoryEndpoint) -> Self {
        let endpoint = Arc::new(endpoint);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(endpoint.clone()));
        Self::from_parts(endpoint, connector)
    }

    #[cfg(test)]
    pub(crate) fn with_connector(
        endpoint: DirectoryEndpoint,
        connector: Box<dyn LdapConnector>,
    ) -> Self {
        Self::from_parts(Arc::new(endpoint), connector)
    }

    fn from_parts(endpoint: Arc<DirectoryEndpoint>, connector: Box<dyn LdapConnector>) -> Self {
        Self {
            session: DirectorySession::new(endpoint.clone(), connector),
            executor: QueryExecutor::new(endpoint.base_dn().clone()),
            endpoint,
        }
    }

    /// Connection parameters this client was built with.
    #[must_use]
    pub fn endpoint(&self) -> &DirectoryEndpoint {
        &self.endpoint
    }

    /// Verifies credentials by binding as the user, then loads the account.
    ///
    /// The display name is always loaded. With `include_profile` the contact details, password
    /// timestamp, postal address and the full nested group membership are loaded too, all through
    /// the user's own connection. This never fails: every error is reported inside the
    /// [`AuthResult`].
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        include_profile: bool,
    ) -> AuthResult {
        // An empty password would be accepted as an unauthenticated bind.
        if password.is_empty() {
            warn!("rejected authentication attempt with an empty password");
            return AuthResult::from_error(&Error::InvalidRequest(
                "password cannot be empty".to_string(),
            ));
        }

        let mut connection = match self.session.connect_as(username, password).await {
            Ok(connection) => connection,
            Err(err) => {
                log_auth_failure(&err);
                return AuthResult::from_error(&err);
            }
        };
        let outcome = self
            .load_profile(&mut *connection, account_name(username), include_profile)
            .await;
        DirectorySession::release(connection).await;

        match outcome {
            Ok(Some(profile)) => AuthResult::success(profile),
            Ok(None) => {
                warn!("bind succeeded but no directory account matched");
                AuthResult::failure(
                    AUTHENTICATION_FAILED,
                    format!("no directory account matches `{username}`"),
                    "",
                )
            }
            Err(err) => {
                log_auth_failure(&err);
                AuthResult::from_error(&err)
            }
        }
    }

    /// All groups the user belongs to, including groups reached through nesting.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error that stopped the walk.
    pub async fn get_user_group_membership(&self, username: &str) -> Result<Vec<String>> {
        let mut connection = self.session.connect().await?;
        let groups = MembershipResolver::new(&self.executor)
            .resolve_for_user(&mut *connection, username)
            .await;
        DirectorySession::release(connection).await;
        groups
    }

    /// All groups a group is nested in. The group itself is never included.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error that stopped the walk.
    pub async fn get_group_membership(&self, group: &str) -> Result<Vec<String>> {
        let mut connection = self.session.connect().await?;
        let groups = MembershipResolver::new(&self.executor)
            .resolve_for_group(&mut *connection, group)
            .await;
        DirectorySession::release(connection).await;
        groups
    }

    /// Direct groups of the account entry `CN=<username>` directly below the base DN.
    ///
    /// Only one level is read; nested groups are not followed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist and
    /// [`Error::InvalidRequest`] for a blank username.
    pub async fn get_local_group_membership(&self, username: &str) -> Result<Vec<String>> {
        require("username", username)?;
        let entry = self
            .executor
            .base_dn()
            .clone()
            .with_prefix(RelativeDistinguishedName::new("CN", username));
        let query =
            SearchQuery::new(filters::ANY, [attrs::MEMBER_OF]).with_scope(SearchScope::Base);

        let mut connection = self.session.connect().await?;
        let records = self
            .executor
            .search_in(&mut *connection, entry.as_str(), &query)
            .await;
        DirectorySession::release(connection).await;

        let records = records?;
        if records.is_empty() {
            return Err(Error::NotFound(format!("directory entry `{entry}` not found")));
        }
        Ok(extract_names(&records, attrs::MEMBER_OF))
    }

    /// Names of all groups, sorted ascending. Duplicates in the directory are kept.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn get_groups(&self) -> Result<Vec<String>> {
        let mut connection = self.session.connect().await?;
        let records = self
            .executor
            .search(&mut *connection, filters::GROUP, &[attrs::COMMON_NAME])
            .await;
        DirectorySession::release(connection).await;

        let mut names = extract_names(&records?, "");
        names.sort();
        Ok(names)
    }

    /// Person accounts, optionally narrowed by a raw LDAP filter, sorted by display name.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn get_users(&self, filter: Option<&str>) -> Result<Vec<UserProfile>> {
        let filter = FilterBuilder::new()
            .raw(filters::PERSON)
            .raw(filter.unwrap_or_default())
            .build();
        self.list_users(&filter, LISTING_ATTRIBUTES).await
    }

    /// Postal address of the account. Components that are not set are empty strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no account matches.
    pub async fn get_user_address(&self, username: &str) -> Result<MailingAddress> {
        let record = self.read_user(username, attrs::ADDRESS).await?;
        Ok(mailing_address(&record))
    }

    /// First value of an arbitrary attribute on the account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no account matches or the attribute is not set.
    pub async fn get_user_property(&self, username: &str, attribute: &str) -> Result<String> {
        let record = self.read_user(username, &[attribute]).await?;
        record.first(attribute).map(str::to_string).ok_or_else(|| {
            Error::NotFound(format!("attribute `{attribute}` is not set for `{username}`"))
        })
    }

    /// Email address of the account.
    ///
    /// # Errors
    ///
    /// See [`DirectoryClient::get_user_property`].
    pub async fn get_user_email(&self, username: &str) -> Result<String> {
        self.get_user_property(username, attrs::MAIL).await
    }

    /// Company of the account.
    ///
    /// # Errors
    ///
    /// See [`DirectoryClient::get_user_property`].
    pub async fn get_user_company(&self, username: &str) -> Result<String> {
        self.get_user_property(username, attrs::COMPANY).await
    }

    /// Display name of the account.
    ///
    /// # Errors
    ///
    /// See [`DirectoryClient::get_user_property`].
    pub async fn get_user_display_name(&self, username: &str) -> Result<String> {
        self.get_user_property(username, attrs::DISPLAY_NAME).await
    }

    /// Department of the account.
    ///
    /// # Errors
    ///
    /// See [`DirectoryClient::get_user_property`].
    pub async fn get_user_department(&self, username: &str) -> Result<String> {
        self.get_user_property(username, attrs::DEPARTMENT).await
    }

    /// Telephone number of the account.
    ///
    /// # Errors
    ///
    /// See [`DirectoryClient::get_user_property`].
    pub async fn get_user_phone(&self, username: &str) -> Result<String> {
        self.get_user_property(username, attrs::TELEPHONE_NUMBER).await
    }

    /// Time the account password was last set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the account or the timestamp is missing and
    /// [`Error::FormatError`] if the stored value is not a valid timestamp.
    pub async fn get_password_last_changed(&self, username: &str) -> Result<DateTime<Utc>> {
        let raw = self.get_user_property(username, attrs::PWD_LAST_SET).await?;
        parse_filetime(&raw)
    }

    /// Returns true if a person account with this name exists.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn user_exists(&self, username: &str) -> Result<bool> {
        let mut connection = self.session.connect().await?;
        let record = self
            .executor
            .search_single(
                &mut *connection,
                &user_filter(username),
                &[attrs::SAM_ACCOUNT_NAME],
            )
            .await;
        DirectorySession::release(connection).await;
        Ok(record?.is_some())
    }

    /// Account name for an email address.
    ///
    /// Looks the address up in `mail` first, then tries the part before `@` as an account name.
    /// Returns an empty string when neither matches.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn get_user_name_by_email(&self, email: &str) -> Result<String> {
        if email.trim().is_empty() {
            return Ok(String::new());
        }
        let mut connection = self.session.connect().await?;
        let name = self.find_user_name_by_email(&mut *connection, email).await;
        DirectorySession::release(connection).await;
        name
    }

    /// Sets a new password and clears any lockout on the account.
    ///
    /// The password write and the lockout reset are two separate modify operations; if the
    /// second fails the new password stays in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an empty password, [`Error::NotFound`] if no account
    /// matches and [`Error::OperationError`] if the directory rejects either write.
    #[instrument(skip(self, new_password))]
    pub async fn change_password(&self, username: &str, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(Error::InvalidRequest(
                "new password cannot be empty".to_string(),
            ));
        }
        let mut connection = self.session.connect().await?;
        let outcome = self
            .reset_password(&mut *connection, username, new_password)
            .await;
        DirectorySession::release(connection).await;
        outcome
    }

    /// Enabled accounts without an office.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn get_users_with_missing_office(&self) -> Result<Vec<UserProfile>> {
        self.users_missing(attrs::OFFICE).await
    }

    /// Enabled accounts without a telephone number.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn get_users_with_missing_phone_number(&self) -> Result<Vec<UserProfile>> {
        self.users_missing(attrs::TELEPHONE_NUMBER).await
    }

    /// Enabled accounts without an email address.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn get_users_with_missing_email_address(&self) -> Result<Vec<UserProfile>> {
        self.users_missing(attrs::MAIL).await
    }

    /// Enabled accounts without a street address.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn get_users_with_missing_address(&self) -> Result<Vec<UserProfile>> {
        self.users_missing(attrs::STREET_ADDRESS).await
    }

    /// Enabled accounts without a department.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn get_users_with_missing_department(&self) -> Result<Vec<UserProfile>> {
        self.users_missing(attrs::DEPARTMENT).await
    }

    /// Person accounts with their password-last-set time, sorted by display name.
    ///
    /// Accounts whose stored timestamp is missing or unreadable are listed without one.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error.
    pub async fn get_users_password_expiration(
        &self,
        filter: Option<&str>,
    ) -> Result<Vec<UserProfile>> {
        let filter = FilterBuilder::new()
            .raw(filters::PERSON)
            .raw(filter.unwrap_or_default())
            .build();
        self.list_users(&filter, EXPIRATION_ATTRIBUTES).await
    }

    async fn load_profile(
        &self,
        connection: &mut dyn LdapConnection,
        username: &str,
        include_profile: bool,
    ) -> Result<Option<UserProfile>> {
        let mut attributes = LISTING_ATTRIBUTES.to_vec();
        if include_profile {
            attributes.extend_from_slice(PROFILE_ATTRIBUTES);
            attributes.extend_from_slice(attrs::ADDRESS);
        }
        let Some(record) = self
            .executor
            .search_single(connection, &user_filter(username), &attributes)
            .await?
        else {
            return Ok(None);
        };

        let mut builder = listing_builder(&record, username);
        if include_profile {
            if let Some(email) = record.first(attrs::MAIL) {
                builder = builder.email(email);
            }
            if let Some(department) = record.first(attrs::DEPARTMENT) {
                builder = builder.department(department);
            }
            if let Some(phone) = record.first(attrs::TELEPHONE_NUMBER) {
                builder = builder.phone(phone);
            }
            if let Some(timestamp) = password_last_set(&record) {
                builder = builder.password_last_set(timestamp);
            }
            builder = builder.address(mailing_address(&record));

            let direct = extract_names(std::slice::from_ref(&record), attrs::MEMBER_OF);
            let groups = MembershipResolver::new(&self.executor)
                .expand(connection, direct)
                .await?;
            builder = builder.groups(groups);
        }
        Ok(Some(builder.build()))
    }

    async fn read_user(&self, username: &str, attributes: &[&str]) -> Result<SearchRecord> {
        let mut connection = self.session.connect().await?;
        let record = self
            .executor
            .search_single(&mut *connection, &user_filter(username), attributes)
            .await;
        DirectorySession::release(connection).await;
        record?.ok_or_else(|| account_not_found(username))
    }

    async fn list_users(&self, filter: &str, attributes: &[&str]) -> Result<Vec<UserProfile>> {
        let mut connection = self.session.connect().await?;
        let records = self
            .executor
            .search(&mut *connection, filter, attributes)
            .await;
        DirectorySession::release(connection).await;

        let mut users: Vec<UserProfile> = records?.iter().filter_map(listed_user).collect();
        sort_users(&mut users);
        Ok(users)
    }

    async fn users_missing(&self, attribute: &str) -> Result<Vec<UserProfile>> {
        let filter = FilterBuilder::new()
            .raw(filters::PERSON)
            .raw(filters::ENABLED)
            .absent(attribute)
            .build();
        self.list_users(&filter, LISTING_ATTRIBUTES).await
    }

    async fn find_user_name_by_email(
        &self,
        connection: &mut dyn LdapConnection,
        email: &str,
    ) -> Result<String> {
        let by_mail = FilterBuilder::new()
            .raw(filters::PERSON)
            .equals(attrs::MAIL, email)
            .build();
        if let Some(record) = self
            .executor
            .search_single(connection, &by_mail, &[attrs::SAM_ACCOUNT_NAME])
            .await?
        {
            return Ok(account_of(&record));
        }

        let local_part = email.split_once('@').map_or(email, |(local, _)| local);
        if local_part.trim().is_empty() {
            return Ok(String::new());
        }
        Ok(self
            .executor
            .search_single(
                connection,
                &user_filter(local_part),
                &[attrs::SAM_ACCOUNT_NAME],
            )
            .await?
            .map(|record| account_of(&record))
            .unwrap_or_default())
    }

    async fn reset_password(
        &self,
        connection: &mut dyn LdapConnection,
        username: &str,
        new_password: &str,
    ) -> Result<()> {
        let record = self
            .executor
            .search_single(
                connection,
                &user_filter(username),
                &[attrs::SAM_ACCOUNT_NAME],
            )
            .await?
            .ok_or_else(|| account_not_found(username))?;

        connection
            .modify(
                &record.dn,
                &[AttributeReplacement::binary(
                    attrs::UNICODE_PWD,
                    encode_password(new_password),
                )],
            )
            .await?;
        connection
            .modify(
                &record.dn,
                &[AttributeReplacement::text(attrs::LOCKOUT_TIME, "0")],
            )
            .await?;
        info!(dn = %record.dn, "password changed and lockout cleared");
        Ok(())
    }
}

fn user_filter(username: &str) -> String {
    FilterBuilder::new()
        .raw(filters::PERSON)
        .equals(attrs::SAM_ACCOUNT_NAME, username)
        .build()
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidRequest(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn log_auth_failure(err: &Error) {
    if err.should_log() {
        warn!(code = err.error_code(), "authentication failed: {err}");
    } else {
        debug!(code = err.error_code(), "authentication failed: {err}");
    }
}

fn account_not_found(username: &str) -> Error {
    Error::NotFound(format!("directory account `{username}` not found"))
}

/// Account name of a possibly qualified login (`DOMAIN\name` or `name@domain`).
fn account_name(login: &str) -> &str {
    let login = login.rsplit_once('\\').map_or(login, |(_, name)| name);
    login.split_once('@').map_or(login, |(name, _)| name)
}

fn account_of(record: &SearchRecord) -> String {
    record
        .first(attrs::SAM_ACCOUNT_NAME)
        .map(str::to_string)
        .or_else(|| record.common_name().ok())
        .unwrap_or_default()
}

fn listing_builder(record: &SearchRecord, fallback_username: &str) -> UserProfileBuilder {
    let username = record
        .first(attrs::SAM_ACCOUNT_NAME)
        .unwrap_or(fallback_username);
    let builder = UserProfile::builder(username);
    match record.first(attrs::DISPLAY_NAME) {
        Some(display_name) => builder.display_name(display_name),
        None => builder,
    }
}

fn listed_user(record: &SearchRecord) -> Option<UserProfile> {
    let username = account_of(record);
    if username.is_empty() {
        warn!(dn = %record.dn, "skipping directory entry without an account name");
        return None;
    }
    let mut builder = listing_builder(record, &username);
    if let Some(timestamp) = password_last_set(record) {
        builder = builder.password_last_set(timestamp);
    }
    Some(builder.build())
}

fn password_last_set(record: &SearchRecord) -> Option<DateTime<Utc>> {
    let raw = record.first(attrs::PWD_LAST_SET)?;
    match parse_filetime(raw) {
        Ok(timestamp) => Some(timestamp),
        Err(err) => {
            warn!(dn = %record.dn, "ignoring unreadable password timestamp: {err}");
            None
        }
    }
}

fn mailing_address(record: &SearchRecord) -> MailingAddress {
    let text = |attribute: &str| record.first(attribute).unwrap_or_default().to_string();
    MailingAddress {
        po_box: text(attrs::PO_BOX),
        city: text(attrs::CITY),
        state: text(attrs::STATE),
        postal_code: text(attrs::POSTAL_CODE),
        country: text(attrs::COUNTRY),
        ..MailingAddress::default()
    }
    .with_street(record.first(attrs::STREET_ADDRESS).unwrap_or_default())
}

/// `unicodePwd` value: the password in double quotes, UTF-16LE encoded.
fn encode_password(password: &str) -> Vec<u8> {
    format!("\"{password}\"")
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect()
}
