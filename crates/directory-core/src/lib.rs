//! # directory-core
//!
//! Core types and utilities for directory-access clients.
//!
//! This crate holds the transport-independent pieces shared by the directory client: the
//! error taxonomy, endpoint configuration, distinguished-name handling and filter construction.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and result alias
//! - [`config`] - Endpoint connection parameters
//! - [`dn`] - Distinguished names and common-name extraction
//! - [`filter`] - LDAP filter builder with value escaping

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dn;
pub mod error;
pub mod filter;

// Re-export commonly used types
pub use config::DirectoryEndpoint;
pub use dn::{
    to_common_name, DistinguishedName, DistinguishedNameError, RelativeDistinguishedName,
};
pub use error::{Error, Result};
pub use filter::{escape_filter_value, FilterBuilder};
