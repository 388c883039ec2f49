//! Sign-in e-mail addresses.
//!
//! The address is the customer's only identity, so two spellings of the same
//! mailbox must compare equal: input is trimmed and lowercased before it is
//! checked. The check itself mirrors the sign-in form (`a@b.c` passes, `a@b`
//! does not); deliverability is the auth provider's problem.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why a string is not an e-mail address.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,
    #[error("email must be at most {max} characters")]
    TooLong { max: usize },
    /// Anything that is not `local@host.tld` with a single `@` and no spaces.
    #[error("email must look like name@example.com")]
    Malformed,
}

/// A normalized e-mail address.
///
/// ```
/// use guoyan_core::Email;
///
/// let email = Email::parse("  Wang@Example.COM ").unwrap();
/// assert_eq!(email.as_str(), "wang@example.com");
/// assert!(Email::parse("wang@localhost").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// RFC 5321 path limit.
    pub const MAX_LENGTH: usize = 254;

    /// Normalize and check an address.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] if the trimmed input is empty, too long, or not
    /// of the form `local@host.tld`.
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(EmailError::Empty);
        }
        if normalized.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(EmailError::Malformed);
        }

        let (local, domain) = normalized.split_once('@').ok_or(EmailError::Malformed)?;
        let domain_ok = !domain.contains('@')
            && domain
                .split_once('.')
                .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty());
        if local.is_empty() || !domain_ok {
            return Err(EmailError::Malformed);
        }

        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_addresses() {
        for raw in [
            "wang@example.com",
            "li.hua+orders@mail.example.ca",
            "a@b.c",
        ] {
            assert!(Email::parse(raw).is_ok(), "{raw}");
        }
    }

    #[test]
    fn test_normalizes_case_and_whitespace() {
        let a = Email::parse(" Wang@Example.com").unwrap();
        let b = Email::parse("wang@example.COM\n").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "wang@example.com");
    }

    #[test]
    fn test_rejects_blank() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
    }

    #[test]
    fn test_rejects_overlong() {
        let long = format!("{}@example.com", "a".repeat(250));
        assert_eq!(
            Email::parse(&long),
            Err(EmailError::TooLong {
                max: Email::MAX_LENGTH
            })
        );
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in [
            "no-at-symbol",
            "@example.com",
            "wang@",
            "wang@localhost",
            "wang@example.",
            "wang@.com",
            "wa ng@example.com",
            "wang@exa@mple.com",
        ] {
            assert_eq!(Email::parse(raw), Err(EmailError::Malformed), "{raw}");
        }
    }

    #[test]
    fn test_deserialize_validates() {
        let email: Email = serde_json::from_str("\"Wang@Example.com\"").unwrap();
        assert_eq!(email.as_str(), "wang@example.com");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"wang@example.com\"");
        assert!(serde_json::from_str::<Email>("\"not-an-email\"").is_err());
    }
}
