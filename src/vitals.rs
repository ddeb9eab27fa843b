//! Vital-sign time series of patients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Patch, StoreError};
use crate::user::{EmailAddress, Patient, Result, UserError, UserStore, decode};

/// One timestamped measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// RFC 3339 instant with an offset, kept in UTC.
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Independent, append-only channels of a patient.
///
/// Channels are not aligned with each other: lengths and timestamps may
/// differ freely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    /// Electrocardiogram.
    #[serde(default)]
    pub ecg: Vec<Sample>,
    /// Heart-rate or oxygen saturation.
    #[serde(default)]
    pub spo2: Vec<Sample>,
    #[serde(default)]
    pub skin_temperature: Vec<Sample>,
}

impl Vitals {
    /// Whether no channel holds any sample.
    pub fn is_empty(&self) -> bool {
        self.ecg.is_empty() && self.spo2.is_empty() && self.skin_temperature.is_empty()
    }

    /// Total number of samples across channels.
    pub fn len(&self) -> usize {
        self.ecg.len() + self.spo2.len() + self.skin_temperature.len()
    }

    /// Append every channel of `batch` after the existing samples.
    ///
    /// Order is kept as given, including out-of-order timestamps.
    pub fn extend(&mut self, batch: Vitals) {
        self.ecg.extend(batch.ecg);
        self.spo2.extend(batch.spo2);
        self.skin_temperature.extend(batch.skin_temperature);
    }
}

/// Appends vital signs to patient documents.
#[derive(Clone)]
pub struct VitalsLedger {
    users: UserStore,
}

impl VitalsLedger {
    /// Create a new [`VitalsLedger`].
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }

    /// Current vitals of a patient.
    pub async fn vitals(&self, email: &EmailAddress) -> Result<Vitals> {
        Ok(self.users.find_patient_by_email(email).await?.vitals)
    }

    /// Append `batch` to the patient's series.
    ///
    /// Only the `vitals` field is written, and only if the document did not
    /// change since it was read; otherwise [`UserError::Conflict`] is
    /// returned and the caller may fetch again and retry. An empty batch
    /// writes nothing.
    pub async fn append_vitals(
        &self,
        email: &EmailAddress,
        batch: Vitals,
    ) -> Result<Patient> {
        let patient = self.users.find_patient_by_email(email).await?;

        if batch.is_empty() {
            tracing::debug!(%email, "empty vitals batch, nothing to write");
            return Ok(patient);
        }

        let appended = batch.len();
        let mut vitals = patient.vitals.clone();
        vitals.extend(batch);

        let key = patient.profile.email.as_str();
        let value = serde_json::to_value(&vitals).map_err(|err| {
            UserError::storage("append_vitals", key, StoreError::Corrupt(err.to_string()))
        })?;

        let document = self
            .users
            .documents()
            .patch(
                &patient.profile.id,
                key,
                &[Patch::set("vitals", value)],
                Some(&patient.etag),
            )
            .await
            .map_err(|err| {
                UserError::patch("append_vitals", key, err, UserError::Conflict)
            })?;

        metrics::counter!("rvms_vitals_samples_total").increment(appended as u64);
        tracing::debug!(user_id = %document.id, appended, "vitals appended");

        decode(document)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::store::{DocumentStore, Filter, RacingStore};
    use crate::{test_email as email, test_racing_users, test_users};

    fn sample(seconds: i64, value: f64) -> Sample {
        Sample {
            timestamp: Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap(),
            value,
        }
    }

    fn batch(ecg: &[i64], spo2: &[i64], skin: &[i64]) -> Vitals {
        let channel = |seconds: &[i64]| -> Vec<Sample> {
            seconds.iter().map(|&s| sample(s, s as f64 / 10.0)).collect()
        };
        Vitals {
            ecg: channel(ecg),
            spo2: channel(spo2),
            skin_temperature: channel(skin),
        }
    }

    async fn setup() -> (std::sync::Arc<crate::store::MemoryStore>, VitalsLedger) {
        let (memory, users) = test_users();
        users
            .register_patient("Alice", &email("a@x.com"), "correct1")
            .await
            .unwrap();
        (memory, VitalsLedger::new(users))
    }

    #[test]
    fn test_vitals_serde() {
        let vitals: Vitals = serde_json::from_value(json!({
            "ecg": [{ "timestamp": "2024-01-01T00:00:00Z", "value": 0.5 }],
        }))
        .unwrap();

        assert_eq!(vitals.len(), 1);
        assert!(vitals.spo2.is_empty());
        let value = serde_json::to_value(&vitals).unwrap();
        assert_eq!(value["skinTemperature"], json!([]));
    }

    #[test]
    fn test_timestamp_needs_offset() {
        let sample: Sample = serde_json::from_value(json!({
            "timestamp": "2024-01-01T00:00:00+02:00",
            "value": 1.0,
        }))
        .unwrap();
        assert_eq!(
            serde_json::to_value(sample).unwrap()["timestamp"],
            "2023-12-31T22:00:00Z"
        );

        assert!(
            serde_json::from_value::<Sample>(json!({
                "timestamp": "2024-01-01T00:00:00",
                "value": 1.0,
            }))
            .is_err()
        );
    }

    #[tokio::test]
    async fn test_append_keeps_order() {
        let (_, ledger) = setup().await;

        // Out-of-order timestamps are stored as given.
        ledger
            .append_vitals(&email("a@x.com"), batch(&[3, 1], &[], &[5]))
            .await
            .unwrap();
        let patient = ledger
            .append_vitals(&email("a@x.com"), batch(&[2], &[7, 8], &[]))
            .await
            .unwrap();

        assert_eq!(patient.vitals, batch(&[3, 1, 2], &[7, 8], &[5]));
        assert_eq!(
            ledger.vitals(&email("a@x.com")).await.unwrap(),
            patient.vitals
        );
    }

    #[tokio::test]
    async fn test_append_is_associative() {
        let (_, split) = setup().await;
        let (_, whole) = setup().await;
        let first = batch(&[1, 2], &[10], &[]);
        let second = batch(&[3], &[11, 12], &[20]);

        split
            .append_vitals(&email("a@x.com"), first.clone())
            .await
            .unwrap();
        let split = split
            .append_vitals(&email("a@x.com"), second.clone())
            .await
            .unwrap();

        let mut concatenated = first;
        concatenated.extend(second);
        let whole = whole
            .append_vitals(&email("a@x.com"), concatenated)
            .await
            .unwrap();

        assert_eq!(split.vitals, whole.vitals);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let (memory, ledger) = setup().await;
        let writes = memory.writes();

        let patient = ledger
            .append_vitals(&email("a@x.com"), Vitals::default())
            .await
            .unwrap();

        assert!(patient.vitals.is_empty());
        assert_eq!(memory.writes(), writes);
    }

    #[tokio::test]
    async fn test_unknown_patient() {
        let (_, ledger) = setup().await;

        assert!(matches!(
            ledger
                .append_vitals(&email("nobody@x.com"), batch(&[1], &[], &[]))
                .await,
            Err(UserError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_only_vitals_field_is_written() {
        let (memory, ledger) = setup().await;
        let before = memory
            .query(&Filter::new().with("email", "a@x.com"))
            .await
            .unwrap()
            .remove(0);

        ledger
            .append_vitals(&email("a@x.com"), batch(&[1], &[], &[]))
            .await
            .unwrap();

        let after = memory
            .query(&Filter::new().with("email", "a@x.com"))
            .await
            .unwrap()
            .remove(0);
        for field in ["id", "name", "email", "role", "salt", "passwordHash"] {
            assert_eq!(before.body[field], after.body[field], "{field}");
        }
        assert_ne!(before.etag, after.etag);
    }

    #[tokio::test]
    async fn test_concurrent_append_conflicts() {
        let (racing, users) = test_racing_users();
        users
            .register_patient("Alice", &email("a@x.com"), "correct1")
            .await
            .unwrap();
        let ledger = VitalsLedger::new(users);

        // Another writer lands between the read and the guarded patch.
        racing.arm();
        assert!(matches!(
            ledger
                .append_vitals(&email("a@x.com"), batch(&[1], &[], &[]))
                .await,
            Err(UserError::Conflict)
        ));

        let patient = ledger
            .users
            .find_patient_by_email(&email("a@x.com"))
            .await
            .unwrap();
        assert!(patient.vitals.is_empty());
        assert_eq!(patient.profile.name, RacingStore::WRITER);

        // A retry on a fresh read goes through.
        let patient = ledger
            .append_vitals(&email("a@x.com"), batch(&[1], &[], &[]))
            .await
            .unwrap();
        assert_eq!(patient.vitals.len(), 1);
    }
}
