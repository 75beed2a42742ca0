//! Connection parameters for a directory endpoint.
//!
//! An endpoint is configured once, either programmatically or from JSON, and is immutable
//! afterwards.

use crate::dn::DistinguishedName;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Placeholder substituted with the username when building a bind name.
pub const USERNAME_PLACEHOLDER: &str = "{username}";

const SUPPORTED_SCHEMES: &[&str] = &["ldap", "ldaps", "ldapi"];

/// Connection parameters for a directory service.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DirectoryEndpoint {
    #[validate(url)]
    url: String,

    base_dn: DistinguishedName,

    #[serde(default)]
    username: Option<String>,

    #[serde(default)]
    password: Option<SecretString>,

    #[serde(default = "default_bind_name_template")]
    #[validate(length(min = 1))]
    bind_name_template: String,

    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    connection_timeout_secs: u64,

    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_operation_timeout_secs")]
    operation_timeout_secs: u64,
}

fn default_bind_name_template() -> String {
    USERNAME_PLACEHOLDER.to_string()
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

impl DirectoryEndpoint {
    /// Creates an endpoint that connects without stored credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or does not use an LDAP scheme.
    pub fn new(url: impl Into<String>, base_dn: DistinguishedName) -> Result<Self> {
        let endpoint = Self {
            url: url.into(),
            base_dn,
            username: None,
            password: None,
            bind_name_template: default_bind_name_template(),
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        };
        endpoint.check()?;
        Ok(endpoint)
    }

    /// Loads an endpoint from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for malformed JSON or an unsupported URL and
    /// [`Error::ValidationError`] when a field is out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let endpoint: Self = serde_json::from_str(json)?;
        endpoint.check()?;
        Ok(endpoint)
    }

    fn check(&self) -> Result<()> {
        self.validate()?;
        let url = Url::parse(&self.url)?;
        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(Error::ConfigError(format!(
                "unsupported directory URL scheme `{}`",
                url.scheme()
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(Error::ConfigError(
                "username and password must be configured together".to_string(),
            ));
        }
        if !self.bind_name_template.contains(USERNAME_PLACEHOLDER) {
            return Err(Error::ConfigError(format!(
                "bind name template must contain `{USERNAME_PLACEHOLDER}`"
            )));
        }
        Ok(())
    }

    /// Returns the directory URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the base distinguished name all searches are rooted at.
    #[must_use]
    pub const fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// Returns the stored username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the stored password, if any.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|secret| secret.expose_secret())
    }

    /// Returns the template used to turn a plain username into a bind name.
    #[must_use]
    pub fn bind_name_template(&self) -> &str {
        &self.bind_name_template
    }

    /// Returns the name to bind with for `username`.
    ///
    /// Names that are already qualified (a DN, a UPN or `DOMAIN\user`) are used unchanged.
    #[must_use]
    pub fn bind_name(&self, username: &str) -> String {
        if username.contains(['=', '@', '\\']) {
            username.to_string()
        } else {
            self.bind_name_template
                .replace(USERNAME_PLACEHOLDER, username)
        }
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Stores bind credentials used for every non-authentication operation.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Overrides the bind name template, e.g. `{username}@corp.example.com`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the template lacks the `{username}` placeholder.
    pub fn with_bind_name_template(mut self, template: impl Into<String>) -> Result<Self> {
        self.bind_name_template = template.into();
        self.check()?;
        Ok(self)
    }

    /// Overrides the connection timeout in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the value is outside 1 to 300 seconds.
    pub fn with_connection_timeout_secs(mut self, seconds: u64) -> Result<Self> {
        self.connection_timeout_secs = seconds;
        self.check()?;
        Ok(self)
    }

    /// Overrides the operation timeout in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the value is outside 1 to 300 seconds.
    pub fn with_operation_timeout_secs(mut self, seconds: u64) -> Result<Self> {
        self.operation_timeout_secs = seconds;
        self.check()?;
        Ok(self)
    }
}
