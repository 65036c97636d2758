//! Engine configuration files.
//!
//! The engine keeps its settings in `etc/ovirt-engine/engine.conf.d/*.conf` as shell-style
//! `KEY="value"` assignments. Files are applied in lexical order, later files overriding earlier
//! ones.

use kerbldap_core::{Error, Result};
use secrecy::SecretString;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONF_DIR: &str = "etc/ovirt-engine/engine.conf.d";
const DEFAULT_PKI_STORE: &str = "etc/pki/ovirt-engine/keys/engine.p12";
const DEFAULT_PKI_STORE_PASSWORD: &str = "mypass";
const DEFAULT_DB_PORT: u16 = 5432;

/// Parsed engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    prefix: PathBuf,
    values: HashMap<String, String>,
}

/// Database coordinates of the engine.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login role.
    pub user: String,
    /// Login password.
    pub password: SecretString,
    /// Database name.
    pub database: String,
    /// Whether TLS is required.
    pub secured: bool,
}

impl EngineConfig {
    /// Loads every `*.conf` file under `<prefix>/etc/ovirt-engine/engine.conf.d`.
    ///
    /// A missing directory yields an empty configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when a file cannot be read.
    pub fn load(prefix: &Path) -> Result<Self> {
        let dir = prefix.join(CONF_DIR);
        let mut config = Self {
            prefix: prefix.to_path_buf(),
            values: HashMap::new(),
        };
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "engine configuration directory missing");
            return Ok(config);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "conf") && path.is_file())
            .collect();
        files.sort();

        for file in files {
            debug!(file = %file.display(), "loading engine configuration");
            config.apply(&fs::read_to_string(&file)?);
        }
        Ok(config)
    }

    /// Parses configuration text on top of the current values.
    pub fn apply(&mut self, text: &str) {
        for line in text.lines() {
            if let Some((key, value)) = parse_line(line) {
                self.values.insert(key, value);
            }
        }
    }

    /// Value of `key`, if set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Installation prefix the configuration was loaded from.
    #[must_use]
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Engine database settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the host, user or database is missing or the port
    /// is not a number.
    pub fn database(&self) -> Result<DatabaseSettings> {
        let port = match self.get("ENGINE_DB_PORT").filter(|port| !port.is_empty()) {
            Some(port) => port
                .parse()
                .map_err(|_| Error::Configuration(format!("invalid ENGINE_DB_PORT '{port}'")))?,
            None => DEFAULT_DB_PORT,
        };
        Ok(DatabaseSettings {
            host: self.require("ENGINE_DB_HOST")?.to_string(),
            port,
            user: self.require("ENGINE_DB_USER")?.to_string(),
            password: SecretString::from(
                self.get("ENGINE_DB_PASSWORD").unwrap_or_default().to_string(),
            ),
            database: self.require("ENGINE_DB_DATABASE")?.to_string(),
            secured: self
                .get("ENGINE_DB_SECURED")
                .is_some_and(|value| value.eq_ignore_ascii_case("true")),
        })
    }

    /// PKCS#12 store holding the key that decrypts stored passwords.
    #[must_use]
    pub fn pki_store(&self) -> PathBuf {
        self.get("ENGINE_PKI_ENGINE_STORE")
            .map_or_else(|| self.prefix.join(DEFAULT_PKI_STORE), PathBuf::from)
    }

    /// Password of [`EngineConfig::pki_store`].
    #[must_use]
    pub fn pki_store_password(&self) -> SecretString {
        SecretString::from(
            self.get("ENGINE_PKI_ENGINE_STORE_PASSWORD")
                .unwrap_or(DEFAULT_PKI_STORE_PASSWORD)
                .to_string(),
        )
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::Configuration(format!("engine configuration lacks {key}")))
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return None;
    }
    Some((key.to_string(), unquote(value.trim())))
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return if quote == '"' {
                inner.replace("\\\"", "\"").replace("\\\\", "\\")
            } else {
                inner.to_string()
            };
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    fn write_conf(prefix: &Path, name: &str, text: &str) {
        let dir = prefix.join(CONF_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), text).unwrap();
    }

    #[test]
    fn parses_quoted_assignments() {
        let mut config = EngineConfig::default();
        config.apply(
            "# comment\n\
             ENGINE_DB_HOST=\"db.example.com\"\n\
             ENGINE_DB_USER='engine'\n\
             ENGINE_DB_PASSWORD=\"pa\\\"ss\"\n\
             not a line\n",
        );
        assert_eq!(config.get("ENGINE_DB_HOST"), Some("db.example.com"));
        assert_eq!(config.get("ENGINE_DB_USER"), Some("engine"));
        assert_eq!(config.get("ENGINE_DB_PASSWORD"), Some("pa\"ss"));
        assert_eq!(config.get("not a line"), None);
    }

    #[test]
    fn later_files_override() {
        let prefix = TempDir::new().unwrap();
        write_conf(prefix.path(), "10-setup-database.conf", "ENGINE_DB_HOST=\"old\"\n");
        write_conf(prefix.path(), "20-override.conf", "ENGINE_DB_HOST=\"new\"\n");
        write_conf(prefix.path(), "30-ignored.conf.rpmnew", "ENGINE_DB_HOST=\"ignored\"\n");

        let config = EngineConfig::load(prefix.path()).unwrap();

        assert_eq!(config.get("ENGINE_DB_HOST"), Some("new"));
    }

    #[test]
    fn missing_directory_is_empty() {
        let prefix = TempDir::new().unwrap();
        let config = EngineConfig::load(prefix.path()).unwrap();
        assert!(config.get("ENGINE_DB_HOST").is_none());
        assert!(matches!(config.database(), Err(Error::Configuration(_))));
    }

    #[test]
    fn database_settings() {
        let mut config = EngineConfig::default();
        config.apply(
            "ENGINE_DB_HOST=\"localhost\"\n\
             ENGINE_DB_PORT=\"5433\"\n\
             ENGINE_DB_USER=\"engine\"\n\
             ENGINE_DB_PASSWORD=\"secret\"\n\
             ENGINE_DB_DATABASE=\"engine\"\n\
             ENGINE_DB_SECURED=\"True\"\n",
        );

        let db = config.database().unwrap();

        assert_eq!(db.host, "localhost");
        assert_eq!(db.port, 5433);
        assert_eq!(db.user, "engine");
        assert_eq!(db.password.expose_secret(), "secret");
        assert_eq!(db.database, "engine");
        assert!(db.secured);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut config = EngineConfig::default();
        config.apply("ENGINE_DB_PORT=\"abc\"\n");
        assert!(matches!(config.database(), Err(Error::Configuration(_))));
    }

    #[test]
    fn pki_defaults_follow_prefix() {
        let config = EngineConfig::load(Path::new("/nonexistent-prefix")).unwrap();
        assert_eq!(
            config.pki_store(),
            Path::new("/nonexistent-prefix/etc/pki/ovirt-engine/keys/engine.p12")
        );
        assert_eq!(config.pki_store_password().expose_secret(), "mypass");
    }
}
