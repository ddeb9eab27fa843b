//! Registration and lookup of accounts.

use std::sync::Arc;

use serde::Deserialize;

use crate::crypto::PasswordManager;
use crate::store::{Document, DocumentStore, Filter, NewDocument, StoreError};
use crate::user::{
    EmailAddress, Patient, Practitioner, ProfileBuilder, Result, Role,
    StoredUser, User, UserError,
};
use crate::vitals::Vitals;

/// Account manager over the user document collection.
#[derive(Clone)]
pub struct UserStore {
    store: Arc<dyn DocumentStore>,
    crypto: Arc<PasswordManager>,
}

impl UserStore {
    /// Create a new [`UserStore`].
    pub fn new(store: Arc<dyn DocumentStore>, crypto: Arc<PasswordManager>) -> Self {
        Self { store, crypto }
    }

    /// Password manager used for registrations.
    pub fn crypto(&self) -> &PasswordManager {
        &self.crypto
    }

    pub(crate) fn documents(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Register a new patient with empty vitals.
    ///
    /// Fails with [`UserError::DuplicateEmail`] if the email is taken.
    pub async fn register_patient(
        &self,
        name: &str,
        email: &EmailAddress,
        password: &str,
    ) -> Result<Patient> {
        let profile = ProfileBuilder::new()
            .name(name)
            .email(email.clone())
            .password(password)
            .build(Role::Patient, &self.crypto);

        self.create(Patient {
            profile,
            vitals: Vitals::default(),
            etag: Default::default(),
        })
        .await
    }

    /// Register a new healthcare practitioner watching no patient.
    ///
    /// Fails with [`UserError::DuplicateEmail`] if the email is taken.
    pub async fn register_practitioner(
        &self,
        name: &str,
        email: &EmailAddress,
        password: &str,
    ) -> Result<Practitioner> {
        let profile = ProfileBuilder::new()
            .name(name)
            .email(email.clone())
            .password(password)
            .build(Role::Practitioner, &self.crypto);

        self.create(Practitioner {
            profile,
            patients: Vec::new(),
            etag: Default::default(),
        })
        .await
    }

    /// Find a patient using `email` field.
    pub async fn find_patient_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Patient> {
        let document = self.find_one(Role::Patient, email).await?;
        decode(document)
    }

    /// Find a practitioner using `email` field.
    pub async fn find_practitioner_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Practitioner> {
        let document = self.find_one(Role::Practitioner, email).await?;
        decode(document)
    }

    /// Find any account with `role` using `email` field.
    pub async fn find_by_email(
        &self,
        role: Role,
        email: &EmailAddress,
    ) -> Result<User> {
        Ok(match role {
            Role::Patient => User::Patient(self.find_patient_by_email(email).await?),
            Role::Practitioner => {
                User::Practitioner(self.find_practitioner_by_email(email).await?)
            },
        })
    }

    async fn create<T: StoredUser>(&self, user: T) -> Result<T> {
        let profile = user.profile();
        let email = profile.email.as_str();
        let role = profile.role;

        let body = serde_json::to_value(&user).map_err(|err| {
            UserError::storage(
                "register",
                email,
                StoreError::Corrupt(err.to_string()),
            )
        })?;
        let document = NewDocument {
            id: profile.id.clone(),
            partition_key: email.to_owned(),
            body,
        };

        let document = match self.store.create(document).await {
            Ok(document) => document,
            Err(StoreError::Conflict) => {
                tracing::info!(email, %role, "registration refused, email already in use");
                return Err(UserError::DuplicateEmail);
            },
            Err(err) => return Err(UserError::storage("register", email, err)),
        };

        metrics::counter!("rvms_registrations_total", "role" => role.as_str())
            .increment(1);
        tracing::info!(user_id = %document.id, %role, "account created");

        decode(document)
    }

    async fn find_one(&self, role: Role, email: &EmailAddress) -> Result<Document> {
        let filter = Filter::new().with("email", email.as_str());

        // Role is compared once decoded so legacy spellings still match.
        let documents: Vec<Document> = self
            .store
            .query(&filter)
            .await
            .map_err(|err| UserError::storage("find_by_email", email.as_str(), err))?
            .into_iter()
            .filter(|document| {
                Role::deserialize(&document.body["role"]).is_ok_and(|found| found == role)
            })
            .collect();

        if documents.len() > 1 {
            tracing::warn!(
                %email,
                %role,
                count = documents.len(),
                "several accounts share one email, using the first"
            );
        }

        documents.into_iter().next().ok_or(UserError::NotFound)
    }
}

/// Decode a stored document, reporting corruption as a storage fault.
pub(crate) fn decode<T: StoredUser>(document: Document) -> Result<T> {
    let id = document.id.clone();
    T::from_document(document).map_err(|err| UserError::storage("decode", &id, err))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::store::{ETag, Patch};
    use crate::{test_email as email, test_users};

    /// Store whose backend cannot be reached.
    struct Down;

    #[async_trait]
    impl DocumentStore for Down {
        async fn create(&self, _: NewDocument) -> crate::store::Result<Document> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn query(&self, _: &Filter) -> crate::store::Result<Vec<Document>> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn patch(
            &self,
            _: &str,
            _: &str,
            _: &[Patch],
            _: Option<&ETag>,
        ) -> crate::store::Result<Document> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_register_then_find() {
        let (_, users) = test_users();
        let registered = users
            .register_patient("Alice", &email("a@x.com"), "correct1")
            .await
            .unwrap();

        let found = users.find_patient_by_email(&email("A@X.com")).await.unwrap();
        assert_eq!(found, registered);
        assert_eq!(found.profile.email, email("a@x.com"));
        assert_eq!(found.profile.role, Role::Patient);
        assert!(found.vitals.is_empty());
        assert_ne!(found.profile.password_hash.as_str(), "correct1");
        assert!(users.crypto().verify(
            &found.profile.salt,
            &found.profile.password_hash,
            "correct1"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (memory, users) = test_users();
        users
            .register_patient("Alice", &email("a@x.com"), "correct1")
            .await
            .unwrap();

        let second = users
            .register_patient("Mallory", &email("a@x.com"), "another1")
            .await;
        assert!(matches!(second, Err(UserError::DuplicateEmail)));

        // Email is unique across roles too.
        let third = users
            .register_practitioner("Dr. A", &email("a@x.com"), "another1")
            .await;
        assert!(matches!(third, Err(UserError::DuplicateEmail)));

        let documents = memory
            .query(&Filter::new().with("email", "a@x.com"))
            .await
            .unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].body["name"], "Alice");
    }

    #[tokio::test]
    async fn test_role_constrained_lookup() {
        let (_, users) = test_users();
        users
            .register_practitioner("Dr. B", &email("b@x.com"), "correct1")
            .await
            .unwrap();

        let practitioner = users
            .find_practitioner_by_email(&email("b@x.com"))
            .await
            .unwrap();
        assert!(practitioner.patients.is_empty());

        assert!(matches!(
            users.find_patient_by_email(&email("b@x.com")).await,
            Err(UserError::NotFound)
        ));
        assert!(matches!(
            users.find_by_email(Role::Practitioner, &email("c@x.com")).await,
            Err(UserError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_legacy_admin_role() {
        let (memory, users) = test_users();
        let practitioner = users
            .register_practitioner("Dr. B", &email("b@x.com"), "correct1")
            .await
            .unwrap();

        let mut body = serde_json::to_value(&practitioner).unwrap();
        body["id"] = json!("legacy");
        body["email"] = json!("old@x.com");
        body["role"] = json!("ADMIN");
        memory
            .create(NewDocument {
                id: "legacy".into(),
                partition_key: "old@x.com".into(),
                body,
            })
            .await
            .unwrap();

        let found = users
            .find_practitioner_by_email(&email("old@x.com"))
            .await
            .unwrap();
        assert_eq!(found.profile.id, "legacy");
        assert_eq!(found.profile.role, Role::Practitioner);
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let (memory, users) = test_users();
        let original = users
            .register_patient("Alice", &email("a@x.com"), "correct1")
            .await
            .unwrap();

        // Bypass the partition key to simulate a broken uniqueness invariant.
        let mut body = serde_json::to_value(&original).unwrap();
        body["id"] = json!("duplicate");
        body["name"] = json!("Impostor");
        memory
            .create(NewDocument {
                id: "duplicate".into(),
                partition_key: "other".into(),
                body,
            })
            .await
            .unwrap();

        let found = users.find_patient_by_email(&email("a@x.com")).await.unwrap();
        assert_eq!(found.profile.name, "Alice");
    }

    #[tokio::test]
    async fn test_storage_fault() {
        let users = UserStore::new(Arc::new(Down), Arc::new(crate::crypto::test_manager()));

        assert!(matches!(
            users
                .register_patient("Alice", &email("a@x.com"), "correct1")
                .await,
            Err(UserError::StorageUnavailable(StoreError::Unavailable(_)))
        ));
        assert!(matches!(
            users
                .register_practitioner("Dr. B", &email("b@x.com"), "correct1")
                .await,
            Err(UserError::StorageUnavailable(StoreError::Unavailable(_)))
        ));
        assert!(matches!(
            users.find_patient_by_email(&email("a@x.com")).await,
            Err(UserError::StorageUnavailable(StoreError::Unavailable(_)))
        ));
        assert!(matches!(
            users.find_by_email(Role::Practitioner, &email("b@x.com")).await,
            Err(UserError::StorageUnavailable(StoreError::Unavailable(_)))
        ));
    }
}
