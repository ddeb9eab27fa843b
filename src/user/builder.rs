//! Typed builder for a new [`Profile`].

use crate::crypto::PasswordManager;
use crate::user::{EmailAddress, Profile, Role};

/// Marker type for missing value.
#[derive(Debug)]
pub struct Missing;

/// Marker type for present value.
pub struct Present<T>(pub T);

/// A builder to track presence of `Email` and `Password`.
///
/// Only a builder holding both can be turned into a [`Profile`].
pub struct ProfileBuilder<Email, Password> {
    name: String,
    email: Email,
    password: Password,
}

impl ProfileBuilder<Missing, Missing> {
    /// Creates a new [`ProfileBuilder`] with all required fields initialized
    /// as [`Missing`].
    pub fn new() -> Self {
        Self {
            name: String::new(),
            email: Missing,
            password: Missing,
        }
    }
}

impl Default for ProfileBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Password> ProfileBuilder<Missing, Password> {
    /// Sets user email using [`EmailAddress`] value object.
    pub fn email(
        self,
        email: EmailAddress,
    ) -> ProfileBuilder<Present<EmailAddress>, Password> {
        ProfileBuilder {
            name: self.name,
            email: Present(email),
            password: self.password,
        }
    }
}

impl<Email> ProfileBuilder<Email, Missing> {
    /// Sets the plaintext password. It is hashed on [`ProfileBuilder::build`].
    pub fn password(
        self,
        password: impl Into<String>,
    ) -> ProfileBuilder<Email, Present<String>> {
        ProfileBuilder {
            name: self.name,
            email: self.email,
            password: Present(password.into()),
        }
    }
}

impl<Email, Password> ProfileBuilder<Email, Password> {
    /// Sets the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl ProfileBuilder<Present<EmailAddress>, Present<String>> {
    /// Finalizes build: draws a new id and salt, then hashes the password.
    pub fn build(self, role: Role, crypto: &PasswordManager) -> Profile {
        let ProfileBuilder {
            name,
            email: Present(email),
            password: Present(password),
        } = self;

        let salt = crypto.generate_salt();
        let password_hash = crypto.hash(&salt, password);

        Profile {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            role,
            salt,
            password_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_manager;

    #[test]
    fn test_build_profile() {
        let crypto = test_manager();
        let profile = ProfileBuilder::new()
            .password("correct1")
            .name("Alice")
            .email(EmailAddress::parse("a@x.com").unwrap())
            .build(Role::Patient, &crypto);

        assert_eq!(profile.name, "Alice");
        assert_eq!(profile.email.as_str(), "a@x.com");
        assert_eq!(profile.role, Role::Patient);
        assert!(uuid::Uuid::parse_str(&profile.id).is_ok());
        assert_ne!(profile.password_hash.as_str(), "correct1");
        assert!(crypto.verify(&profile.salt, &profile.password_hash, "correct1"));
    }

    #[test]
    fn test_ids_are_unique() {
        let crypto = test_manager();
        let build = || {
            ProfileBuilder::new()
                .email(EmailAddress::parse("a@x.com").unwrap())
                .password("correct1")
                .build(Role::Practitioner, &crypto)
        };

        let (first, second) = (build(), build());
        assert_ne!(first.id, second.id);
        assert_ne!(first.salt, second.salt);
    }
}
