//! Decryption of passwords stored by the engine.
//!
//! Stored passwords are base64 RSA ciphertext (PKCS#1 v1.5 padding) made with the engine
//! certificate; the matching private key lives in the engine PKCS#12 store.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use kerbldap_core::{Error, Result};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Padding;
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::path::Path;

/// Turns a stored password into clear text.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordDecryptor: Send + Sync {
    /// Decrypts one stored password.
    fn decrypt(&self, encrypted: &str) -> Result<SecretString>;
}

/// [`PasswordDecryptor`] using the engine private key.
pub struct EngineKeyDecryptor {
    key: PKey<Private>,
}

impl EngineKeyDecryptor {
    /// Loads the private key from a PKCS#12 store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decryption`] when the store cannot be read, opened or holds no key.
    pub fn from_pkcs12(path: &Path, password: &SecretString) -> Result<Self> {
        let der = fs::read(path).map_err(|err| {
            Error::Decryption(format!("cannot read {}: {err}", path.display()))
        })?;
        let parsed = Pkcs12::from_der(&der)
            .and_then(|store| store.parse2(password.expose_secret()))
            .map_err(map_openssl_error)?;
        let key = parsed
            .pkey
            .ok_or_else(|| Error::Decryption(format!("{} holds no private key", path.display())))?;
        Ok(Self::from_key(key))
    }

    /// Uses an already loaded key.
    #[must_use]
    pub fn from_key(key: PKey<Private>) -> Self {
        Self { key }
    }
}

impl PasswordDecryptor for EngineKeyDecryptor {
    fn decrypt(&self, encrypted: &str) -> Result<SecretString> {
        let ciphertext = BASE64
            .decode(encrypted.trim())
            .map_err(|err| Error::Decryption(format!("password is not base64: {err}")))?;
        let rsa = self.key.rsa().map_err(map_openssl_error)?;
        let mut clear = vec![0; rsa.size() as usize];
        let len = rsa
            .private_decrypt(&ciphertext, &mut clear, Padding::PKCS1)
            .map_err(map_openssl_error)?;
        clear.truncate(len);
        let clear = String::from_utf8(clear)
            .map_err(|_| Error::Decryption("password is not UTF-8".to_string()))?;
        Ok(SecretString::from(clear))
    }
}

#[allow(clippy::needless_pass_by_value)]
fn map_openssl_error(err: openssl::error::ErrorStack) -> Error {
    Error::Decryption(err.to_string())
}
