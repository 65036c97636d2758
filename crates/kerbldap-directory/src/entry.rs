//! Raw search results and the materialized directory entry handed to the translator.

use std::collections::HashMap;
use uuid::Uuid;

/// LDAP entry as returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attributes whose values are valid UTF-8.
    pub attributes: HashMap<String, Vec<String>>,
    /// Attributes carrying at least one non UTF-8 value.
    pub binary_attributes: HashMap<String, Vec<Vec<u8>>>,
}

impl LdapEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Self::default()
        }
    }

    /// Adds a text value.
    #[must_use]
    pub fn with_attribute(mut self, attribute: &str, value: impl Into<String>) -> Self {
        self.attributes
            .entry(attribute.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// Adds a binary value.
    #[must_use]
    pub fn with_binary_attribute(mut self, attribute: &str, value: impl Into<Vec<u8>>) -> Self {
        self.binary_attributes
            .entry(attribute.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// Returns the first text value of the attribute.
    ///
    /// Attribute names are matched case-insensitively; servers do not always echo the
    /// requested spelling.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        lookup(&self.attributes, attribute)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns the first value of the attribute as bytes, whichever map holds it.
    #[must_use]
    pub fn first_bytes(&self, attribute: &str) -> Option<&[u8]> {
        lookup(&self.binary_attributes, attribute)
            .and_then(|values| values.first())
            .map(Vec::as_slice)
            .or_else(|| self.first(attribute).map(str::as_bytes))
    }
}

fn lookup<'a, V>(map: &'a HashMap<String, V>, attribute: &str) -> Option<&'a V> {
    map.get(attribute).or_else(|| {
        map.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, value)| value)
    })
}

/// A user or group found in the directory, ready to become a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Freshly generated identity for the new record.
    pub identity: Uuid,
    /// Provider entry id in its portable, persisted form.
    pub provider_entry_id: String,
    /// Given name for users, common name for groups.
    pub name: String,
    /// Surname (users only, empty otherwise).
    pub surname: String,
    /// Mail address (users only, empty otherwise).
    pub email: String,
    /// Department (users only, empty otherwise).
    pub department: String,
    /// Login name (users only, empty otherwise).
    pub username: String,
    /// Description (groups only, empty otherwise).
    pub description: String,
    /// Search namespace the entry was found under.
    pub namespace: String,
    /// Distinguished name of the entry.
    pub distinguished_name: String,
}
