//! # kerbldap-migrate
//!
//! Converts one legacy Kerberos/LDAP authentication domain of the engine into a
//! directory-backed AAA profile.
//!
//! ## Modules
//!
//! - [`cli`] - Command line surface
//! - [`options`] - Validated run options
//! - [`engine_config`] - Engine configuration files
//! - [`vdc_options`] - Legacy domain settings
//! - [`decrypt`] - Stored password decryption
//! - [`store`] - Engine database access
//! - [`translate`] - Entity translation and foreign key remapping
//! - [`files`] - Staged file writes
//! - [`profile`] - AAA profile artifacts
//! - [`migrate`] - The migration run
//! - [`logging`] - Tracing subscriber setup

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod decrypt;
pub mod engine_config;
pub mod files;
pub mod logging;
pub mod migrate;
pub mod options;
pub mod profile;
pub mod store;
pub mod translate;
pub mod vdc_options;

// Re-export commonly used types
pub use cli::Cli;
pub use decrypt::{EngineKeyDecryptor, PasswordDecryptor};
pub use engine_config::{DatabaseSettings, EngineConfig};
pub use logging::init_logging;
pub use migrate::{Migration, MigrationReport, MigrationState};
pub use options::MigrationOptions;
pub use profile::{service_account, AaaProfile, Keytool, TrustStoreTool};
pub use store::{AaaStore, PgAaaStore};
