//! Email logic management.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Email does not look like `local@domain`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid email formatting")]
pub struct InvalidEmail;

/// Value object of a normalized email address.
///
/// Emails are trimmed and lower-cased so that every lookup and every
/// uniqueness check sees the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Converts a string into a valid [`EmailAddress`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if there is not exactly one `@`, or if either side of
    /// it is empty.
    pub fn parse(email: impl AsRef<str>) -> Result<Self, InvalidEmail> {
        let email = email.as_ref().trim().to_lowercase();

        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@') =>
            {
                Ok(Self(email))
            },
            _ => Err(InvalidEmail),
        }
    }

    /// Returns the same string as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = InvalidEmail;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EmailAddress> for String {
    fn from(email: EmailAddress) -> Self {
        email.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
