//! Distinguished names as returned by, and built for, directory searches.

use thiserror::Error;

use kerbldap_core::error::Error as CoreError;

/// Errors that can occur when parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component was not of the form `attribute=value`.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::DirectoryLookup(err.to_string())
    }
}

/// Validated distinguished name.
///
/// The server spelling is kept verbatim; parsing only checks that every RDN component is an
/// `attribute=value` pair with well-formed escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    raw: String,
}

impl DistinguishedName {
    /// Parses a distinguished name.
    ///
    /// Multi-valued RDNs (`cn=a+uid=b`) are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the name is empty or a component lacks `=`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        for rdn in split_unescaped(raw, ',')? {
            for part in split_unescaped(&rdn, '+')? {
                let well_formed = part.split_once('=').is_some_and(|(attribute, value)| {
                    !attribute.trim().is_empty() && !value.trim().is_empty()
                });
                if !well_formed {
                    return Err(DistinguishedNameError::InvalidComponent(part));
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// Borrows the distinguished name as received.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Builds the DN of a direct child entry, escaping `value`.
    #[must_use]
    pub fn child(&self, attribute: &str, value: &str) -> Self {
        Self {
            raw: format!("{attribute}={},{}", escape_value(value), self.raw),
        }
    }
}

/// Splits on `delimiter` outside escape sequences. Escapes are kept intact; a trailing lone
/// backslash is rejected.
fn split_unescaped(input: &str, delimiter: char) -> Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let next = chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            current.push(ch);
            current.push(next);
        } else if ch == delimiter {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    parts.push(current);

    if parts.iter().any(|part| part.trim().is_empty()) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && matches!(ch, ' ' | '#'))
            || (idx == last && ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escapes a string for use as an assertion value inside a search filter (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Escapes raw bytes for a filter assertion value, every byte as `\xx`.
#[must_use]
pub fn escape_filter_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("\\{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_server_spelling() {
        let dn = DistinguishedName::parse(" CN=Configuration,DC=legacy,DC=example ").unwrap();
        assert_eq!(dn.as_str(), "CN=Configuration,DC=legacy,DC=example");
    }

    #[test]
    fn parse_escaped_comma_and_multi_valued_rdn() {
        assert!(DistinguishedName::parse("cn=Smith\\, John,ou=People,dc=example,dc=com").is_ok());
        assert!(DistinguishedName::parse("cn=John+uid=1234,dc=example,dc=com").is_ok());
    }

    #[test]
    fn reject_malformed() {
        assert_eq!(
            DistinguishedName::parse("  ").unwrap_err(),
            DistinguishedNameError::Empty
        );
        assert!(matches!(
            DistinguishedName::parse("cn=John,"),
            Err(DistinguishedNameError::InvalidComponent(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("John"),
            Err(DistinguishedNameError::InvalidComponent(_))
        ));
        assert_eq!(
            DistinguishedName::parse("cn=John\\").unwrap_err(),
            DistinguishedNameError::UnterminatedEscape
        );
    }

    #[test]
    fn child_prefixes_and_escapes() {
        let base = DistinguishedName::parse("CN=Configuration,DC=legacy,DC=example").unwrap();
        let partitions = base.child("CN", "Partitions");
        assert_eq!(
            partitions.as_str(),
            "CN=Partitions,CN=Configuration,DC=legacy,DC=example"
        );

        let odd = base.child("cn", "a,b");
        assert!(odd.as_str().starts_with("cn=a\\,b,"));
        assert_eq!(DistinguishedName::parse(odd.as_str()).unwrap(), odd);
    }

    #[test]
    fn filter_escaping() {
        assert_eq!(escape_filter_value("jdoe"), "jdoe");
        assert_eq!(escape_filter_value("(admin*)"), "\\28admin\\2a\\29");
        assert_eq!(escape_filter_value("a\\b"), "a\\5cb");
        assert_eq!(escape_filter_bytes(&[0x00, 0x2a, 0xff]), "\\00\\2a\\ff");
    }
}
