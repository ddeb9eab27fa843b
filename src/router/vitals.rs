//! Vital signs of patients.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::AppState;
use crate::error::Result;
use crate::user::EmailAddress;
use crate::vitals::Vitals;

pub fn router() -> Router<AppState> {
    // `GET /api/vitals/{email}` reads, `PUT` appends a batch.
    Router::new().route("/{email}", get(handler).put(append))
}

pub async fn handler(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Vitals>> {
    let email = EmailAddress::parse(email)?;
    Ok(Json(state.vitals.vitals(&email).await?))
}

/// Append a batch of samples. Responds with the whole series.
pub async fn append(
    State(state): State<AppState>,
    Path(email): Path<String>,
    batch: std::result::Result<Json<Vitals>, JsonRejection>,
) -> Result<Json<Vitals>> {
    let Json(batch) = batch?;
    let email = EmailAddress::parse(email)?;

    let patient = state.vitals.append_vitals(&email, batch).await?;
    Ok(Json(patient.vitals))
}
