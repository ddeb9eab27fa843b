mod builder;
mod email;
mod error;
mod store;

pub use builder::*;
pub use email::*;
pub use error::*;
pub use store::*;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::crypto::{PasswordHash, Salt};
use crate::store::{Document, ETag, StoreError};
use crate::vitals::Vitals;

/// Kind of account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Patient,
    /// Healthcare practitioner. Older documents call it `ADMIN`.
    #[serde(alias = "ADMIN")]
    Practitioner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "PATIENT",
            Role::Practitioner => "PRACTITIONER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fields shared by every account, as saved on the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: EmailAddress,
    pub role: Role,
    pub salt: Salt,
    pub password_hash: PasswordHash,
}

/// Patient document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(default)]
    pub vitals: Vitals,
    /// Version the snapshot was read at.
    #[serde(skip)]
    pub etag: ETag,
}

/// Healthcare practitioner document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Practitioner {
    #[serde(flatten)]
    pub profile: Profile,
    /// Emails of the monitored patients.
    #[serde(default)]
    pub patients: Vec<EmailAddress>,
    /// Version the snapshot was read at.
    #[serde(skip)]
    pub etag: ETag,
}

/// Any registered account.
#[derive(Debug, Clone, PartialEq)]
pub enum User {
    Patient(Patient),
    Practitioner(Practitioner),
}

impl User {
    pub fn profile(&self) -> &Profile {
        match self {
            User::Patient(patient) => &patient.profile,
            User::Practitioner(practitioner) => &practitioner.profile,
        }
    }

    pub fn id(&self) -> &str {
        &self.profile().id
    }

    pub fn email(&self) -> &EmailAddress {
        &self.profile().email
    }

    pub fn name(&self) -> &str {
        &self.profile().name
    }

    pub fn role(&self) -> Role {
        self.profile().role
    }
}

/// A typed user document living in the store.
pub(crate) trait StoredUser: Serialize + DeserializeOwned {
    fn profile(&self) -> &Profile;

    fn set_etag(&mut self, etag: ETag);

    /// Decode a stored document, keeping its version.
    fn from_document(document: Document) -> std::result::Result<Self, StoreError> {
        let mut user: Self = serde_json::from_value(document.body)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        user.set_etag(document.etag);
        Ok(user)
    }
}

impl StoredUser for Patient {
    fn profile(&self) -> &Profile {
        &self.profile
    }

    fn set_etag(&mut self, etag: ETag) {
        self.etag = etag;
    }
}

impl StoredUser for Practitioner {
    fn profile(&self) -> &Profile {
        &self.profile
    }

    fn set_etag(&mut self, etag: ETag) {
        self.etag = etag;
    }
}
