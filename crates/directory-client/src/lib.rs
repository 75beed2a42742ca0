//! LDAP client for directory services with an Active Directory style schema.
//!
//! [`DirectoryClient`] authenticates users, resolves nested group membership, enumerates users
//! and groups, reads account attributes and runs a handful of maintenance queries. All calls are
//! async and open one short-lived connection each.

#![deny(missing_docs)]

mod client;
mod membership;
mod profile;
mod query;
mod result;
mod schema;
mod session;
mod timestamp;

pub use client::DirectoryClient;
pub use directory_core::{DirectoryEndpoint, DistinguishedName, Error};
pub use profile::{compare_users, sort_users, MailingAddress, UserProfile, UserProfileBuilder};
pub use query::{extract_names, SearchQuery, SearchRecord, SearchScope};
pub use result::{AuthResult, ResultCode, AUTHENTICATE_OPERATION, AUTHENTICATION_FAILED};
pub use timestamp::{filetime_to_datetime, parse_filetime};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = directory_core::Result<T>;
