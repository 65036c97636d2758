//! Entry-id codecs.
//!
//! The legacy store keeps every directory id as a dashed UUID string. Each provider needs it in
//! a different shape to search for it, and some persist the found id in yet another form:
//!
//! | codec        | legacy → filter                                 | found → persisted       |
//! |--------------|-------------------------------------------------|-------------------------|
//! | `ObjectGuid` | UUID → 16 little-endian bytes, `\xx` escaped    | raw bytes → base64      |
//! | `NsUniqueId` | UUID → `8-8-8-8` hex groups                     | unchanged               |
//! | `Verbatim`   | unchanged                                       | unchanged               |

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use kerbldap_core::{Error, Result};
use uuid::Uuid;

use crate::dn::{escape_filter_bytes, escape_filter_value};
use crate::entry::LdapEntry;

/// How a provider's entry ids are translated on the way in and out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryIdCodec {
    /// Active Directory `objectGUID`.
    ObjectGuid,
    /// 389-DS / RHDS `nsUniqueId`.
    NsUniqueId,
    /// Ids stored as the server returns them (`entryUUID`, `ipaUniqueID`).
    Verbatim,
}

impl EntryIdCodec {
    /// Turns a legacy-stored id into the assertion value used to search for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] when the legacy id is not in the expected shape.
    pub fn filter_value(self, legacy_id: &str) -> Result<String> {
        match self {
            Self::ObjectGuid => Ok(escape_filter_bytes(&guid_bytes_from_legacy(legacy_id)?)),
            Self::NsUniqueId => Ok(escape_filter_value(&ns_unique_id_from_legacy(legacy_id)?)),
            Self::Verbatim => Ok(escape_filter_value(legacy_id)),
        }
    }

    /// Extracts the found entry's id in the form persisted for the new record.
    #[must_use]
    pub fn persisted_id(self, entry: &LdapEntry, attribute: &str) -> Option<String> {
        match self {
            Self::ObjectGuid => entry.first_bytes(attribute).map(|raw| BASE64.encode(raw)),
            Self::NsUniqueId | Self::Verbatim => entry.first(attribute).map(str::to_string).or_else(
                || {
                    entry
                        .first_bytes(attribute)
                        .map(|raw| String::from_utf8_lossy(raw).into_owned())
                },
            ),
        }
    }
}

/// Legacy UUID string to the 16 `objectGUID` bytes (mixed-endian layout).
///
/// # Errors
///
/// Returns [`Error::InvalidId`] if the input is not a UUID.
pub fn guid_bytes_from_legacy(legacy_id: &str) -> Result<[u8; 16]> {
    Uuid::parse_str(legacy_id)
        .map(|uuid| uuid.to_bytes_le())
        .map_err(|_| Error::InvalidId(format!("'{legacy_id}' is not a GUID")))
}

/// `objectGUID` bytes back to the legacy UUID string.
///
/// # Errors
///
/// Returns [`Error::InvalidId`] unless exactly 16 bytes are given.
pub fn legacy_from_guid_bytes(raw: &[u8]) -> Result<String> {
    let bytes: [u8; 16] = raw
        .try_into()
        .map_err(|_| Error::InvalidId(format!("objectGUID has {} bytes", raw.len())))?;
    Ok(Uuid::from_bytes_le(bytes).to_string())
}

/// Persisted base64 `objectGUID` back to raw bytes.
///
/// # Errors
///
/// Returns [`Error::InvalidId`] if the value is not base64.
pub fn guid_bytes_from_persisted(persisted: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(persisted)
        .map_err(|err| Error::InvalidId(format!("'{persisted}' is not base64: {err}")))
}

/// Legacy UUID string to `nsUniqueId` form: the 32 hex digits regrouped as `8-8-8-8`.
///
/// # Errors
///
/// Returns [`Error::InvalidId`] unless the input holds exactly 32 hex digits.
pub fn ns_unique_id_from_legacy(legacy_id: &str) -> Result<String> {
    let digits = hex_digits(legacy_id)?;
    Ok(digits
        .as_bytes()
        .chunks(8)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-"))
}

/// `nsUniqueId` back to the legacy dashed UUID layout (`8-4-4-4-12`).
///
/// # Errors
///
/// Returns [`Error::InvalidId`] unless the input holds exactly 32 hex digits.
pub fn legacy_from_ns_unique_id(ns_unique_id: &str) -> Result<String> {
    let digits = hex_digits(ns_unique_id)?;
    Ok(format!(
        "{}-{}-{}-{}-{}",
        &digits[..8],
        &digits[8..12],
        &digits[12..16],
        &digits[16..20],
        &digits[20..]
    ))
}

fn hex_digits(value: &str) -> Result<String> {
    let digits: String = value.chars().filter(|ch| *ch != '-').collect();
    if digits.len() == 32 && digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        Ok(digits)
    } else {
        Err(Error::InvalidId(format!("'{value}' is not a 32 hex digit id")))
    }
}
