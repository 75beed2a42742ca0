//! Outcome of an authentication attempt.

use crate::profile::UserProfile;
use directory_core::Error;
use serde::Serialize;

/// Operation tag recorded on authentication results.
pub const AUTHENTICATE_OPERATION: &str = "Authenticate";
/// Message used when the bind succeeds but no account matches.
pub const AUTHENTICATION_FAILED: &str = "Authentication failed.";

/// Numeric outcome of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum ResultCode {
    /// The credentials were accepted and the account was found.
    Success = 0,
    /// Anything else.
    Failure = 1,
}

impl From<ResultCode> for u8 {
    fn from(code: ResultCode) -> Self {
        code as u8
    }
}

/// Result of [`DirectoryClient::authenticate`](crate::DirectoryClient::authenticate).
///
/// Only the constructors can create a value, so a success always carries a profile and no error
/// text, and a failure never carries a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    result_code: ResultCode,
    error_message: String,
    full_message: String,
    error_source: String,
    operation: String,
    user: Option<UserProfile>,
}

impl AuthResult {
    /// Successful authentication.
    #[must_use]
    pub fn success(user: UserProfile) -> Self {
        Self {
            result_code: ResultCode::Success,
            error_message: String::new(),
            full_message: String::new(),
            error_source: String::new(),
            operation: AUTHENTICATE_OPERATION.to_string(),
            user: Some(user),
        }
    }

    /// Failed authentication with explicit diagnostics.
    ///
    /// A blank message is replaced with [`AUTHENTICATION_FAILED`].
    #[must_use]
    pub fn failure(
        error_message: impl Into<String>,
        full_message: impl Into<String>,
        error_source: impl Into<String>,
    ) -> Self {
        let mut error_message = error_message.into();
        if error_message.trim().is_empty() {
            error_message = AUTHENTICATION_FAILED.to_string();
        }
        Self {
            result_code: ResultCode::Failure,
            error_message,
            full_message: full_message.into(),
            error_source: error_source.into(),
            operation: AUTHENTICATE_OPERATION.to_string(),
            user: None,
        }
    }

    /// Failed authentication caused by `err`.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        Self::failure(err.to_string(), format!("{err:?}"), err.error_code())
    }

    /// Returns the outcome code.
    #[must_use]
    pub const fn result_code(&self) -> ResultCode {
        self.result_code
    }

    /// Returns true for a successful authentication.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result_code == ResultCode::Success
    }

    /// Short error message; empty on success.
    #[must_use]
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Full diagnostic text; empty on success.
    #[must_use]
    pub fn full_message(&self) -> &str {
        &self.full_message
    }

    /// Where the error originated; empty on success.
    #[must_use]
    pub fn error_source(&self) -> &str {
        &self.error_source
    }

    /// Operation tag.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Authenticated user's profile; `None` on failure.
    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    /// Consumes the result, returning the profile on success.
    #[must_use]
    pub fn into_user(self) -> Option<UserProfile> {
        self.user
    }
}
