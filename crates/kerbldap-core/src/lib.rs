//! # kerbldap-core
//!
//! Core types shared by the directory client and the migration tool.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy for the migration run
//! - [`ids`] - Strongly-typed UUID wrappers for migrated records
//! - [`protocol`] - LDAP transport protocol selection
//! - [`credentials`] - Bind credentials for a legacy domain

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod credentials;
pub mod error;
pub mod ids;
pub mod protocol;

// Re-export commonly used types
pub use credentials::DomainCredentials;
pub use error::{Error, Result};
pub use protocol::Protocol;
