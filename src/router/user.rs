//! Accounts and monitoring links.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::{EmailAddress, Patient, Practitioner, Role, User};
use crate::vitals::Vitals;

/// Kind of account as written in paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Patient,
    #[serde(rename = "hcp")]
    Practitioner,
}

impl From<Audience> for Role {
    fn from(audience: Audience) -> Self {
        match audience {
            Audience::Patient => Role::Patient,
            Audience::Practitioner => Role::Practitioner,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterBody {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must contain between 1 and 100 characters."
    ))]
    pub name: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(max = 255))]
    pub password: String,
}

/// Public view of an account. Credentials never leave the server.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: EmailAddress,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<Vitals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patients: Option<Vec<EmailAddress>>,
}

impl From<Patient> for Account {
    fn from(patient: Patient) -> Self {
        let profile = patient.profile;
        Self {
            id: profile.id,
            name: profile.name,
            email: profile.email,
            role: profile.role,
            vitals: Some(patient.vitals),
            patients: None,
        }
    }
}

impl From<Practitioner> for Account {
    fn from(practitioner: Practitioner) -> Self {
        let profile = practitioner.profile;
        Self {
            id: profile.id,
            name: profile.name,
            email: profile.email,
            role: profile.role,
            vitals: None,
            patients: Some(practitioner.patients),
        }
    }
}

impl From<User> for Account {
    fn from(user: User) -> Self {
        match user {
            User::Patient(patient) => patient.into(),
            User::Practitioner(practitioner) => practitioner.into(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        // `POST /api/user/auth/{patient,hcp}/register` goes to `register`.
        .route("/auth/{audience}/register", post(register))
        // `POST /api/user/auth/{patient,hcp}/login` goes to `login`.
        .route("/auth/{audience}/login", post(login))
        .route("/patient/{email}", get(get_patient))
        .route("/hcp/{email}", get(get_practitioner))
        .route("/hcp/{email}/patients", get(list_patients))
        .route(
            "/hcp/{email}/patients/{patient}",
            put(add_patient).delete(remove_patient),
        )
}

/// Handler to create an account.
pub async fn register(
    State(state): State<AppState>,
    Path(audience): Path<Audience>,
    Valid(body): Valid<RegisterBody>,
) -> Result<(StatusCode, Json<Account>)> {
    let email = EmailAddress::parse(&body.email)?;

    let account: Account = match audience {
        Audience::Patient => state
            .users
            .register_patient(&body.name, &email, &body.password)
            .await?
            .into(),
        Audience::Practitioner => state
            .users
            .register_practitioner(&body.name, &email, &body.password)
            .await?
            .into(),
    };

    Ok((StatusCode::CREATED, Json(account)))
}

/// Handler to log in.
pub async fn login(
    State(state): State<AppState>,
    Path(audience): Path<Audience>,
    Valid(body): Valid<LoginBody>,
) -> Result<Json<Account>> {
    let email = EmailAddress::parse(&body.email)?;
    let user = state
        .auth
        .login(audience.into(), &email, &body.password)
        .await?;

    Ok(Json(user.into()))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Account>> {
    let email = EmailAddress::parse(email)?;
    let patient = state.users.find_patient_by_email(&email).await?;
    Ok(Json(patient.into()))
}

pub async fn get_practitioner(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Account>> {
    let email = EmailAddress::parse(email)?;
    let practitioner = state.users.find_practitioner_by_email(&email).await?;
    Ok(Json(practitioner.into()))
}

pub async fn list_patients(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Vec<EmailAddress>>> {
    let email = EmailAddress::parse(email)?;
    Ok(Json(state.relationships.patients(&email).await?))
}

/// Handler to start monitoring a patient.
pub async fn add_patient(
    State(state): State<AppState>,
    Path((email, patient)): Path<(String, String)>,
) -> Result<Json<Account>> {
    let (email, patient) = (EmailAddress::parse(email)?, EmailAddress::parse(patient)?);

    let practitioner = state.users.find_practitioner_by_email(&email).await?;
    let practitioner = state
        .relationships
        .add_patient(&practitioner, &patient)
        .await?;

    Ok(Json(practitioner.into()))
}

/// Handler to stop monitoring a patient.
pub async fn remove_patient(
    State(state): State<AppState>,
    Path((email, patient)): Path<(String, String)>,
) -> Result<Json<Account>> {
    let (email, patient) = (EmailAddress::parse(email)?, EmailAddress::parse(patient)?);

    let practitioner = state.users.find_practitioner_by_email(&email).await?;
    let practitioner = state
        .relationships
        .remove_patient(&practitioner, &patient)
        .await?;

    Ok(Json(practitioner.into()))
}
