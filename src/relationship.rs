//! Practitioner to patient monitoring links.

use crate::store::{Patch, StoreError};
use crate::user::{EmailAddress, Practitioner, Result, UserError, UserStore, decode};

/// Maintains the set of patients a practitioner monitors.
#[derive(Clone)]
pub struct RelationshipManager {
    users: UserStore,
}

impl RelationshipManager {
    /// Create a new [`RelationshipManager`].
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }

    /// Patients monitored by the practitioner owning `email`.
    pub async fn patients(&self, email: &EmailAddress) -> Result<Vec<EmailAddress>> {
        Ok(self.users.find_practitioner_by_email(email).await?.patients)
    }

    /// Start monitoring `patient`.
    ///
    /// `patient` must be a registered patient. Adding a patient already in
    /// the set writes nothing and returns the snapshot as is.
    pub async fn add_patient(
        &self,
        practitioner: &Practitioner,
        patient: &EmailAddress,
    ) -> Result<Practitioner> {
        self.users.find_patient_by_email(patient).await?;

        if practitioner.patients.contains(patient) {
            tracing::debug!(%patient, "patient already monitored");
            return Ok(practitioner.clone());
        }

        let value = serde_json::Value::String(patient.to_string());
        self.write(
            practitioner,
            Patch::append("patients", value),
            "add_patient",
            UserError::NotFound,
        )
        .await
    }

    /// Stop monitoring `patient`.
    ///
    /// Removing an absent patient writes nothing, so calling it twice leaves
    /// the same state as calling it once.
    pub async fn remove_patient(
        &self,
        practitioner: &Practitioner,
        patient: &EmailAddress,
    ) -> Result<Practitioner> {
        if !practitioner.patients.contains(patient) {
            tracing::debug!(%patient, "patient not monitored, nothing to remove");
            return Ok(practitioner.clone());
        }

        let remaining: Vec<&EmailAddress> = practitioner
            .patients
            .iter()
            .filter(|email| *email != patient)
            .collect();
        let key = practitioner.profile.email.as_str();
        let value = serde_json::to_value(remaining).map_err(|err| {
            UserError::storage("remove_patient", key, StoreError::Corrupt(err.to_string()))
        })?;

        self.write(
            practitioner,
            Patch::set("patients", value),
            "remove_patient",
            UserError::Conflict,
        )
        .await
    }

    async fn write(
        &self,
        practitioner: &Practitioner,
        patch: Patch,
        operation: &str,
        missing: UserError,
    ) -> Result<Practitioner> {
        let key = practitioner.profile.email.as_str();

        let document = self
            .users
            .documents()
            .patch(
                &practitioner.profile.id,
                key,
                &[patch],
                Some(&practitioner.etag),
            )
            .await
            .map_err(|err| UserError::patch(operation, key, err, missing))?;

        tracing::info!(user_id = %document.id, operation, "monitored patients updated");

        decode(document)
    }
}
