//! Password login.

use crate::user::{EmailAddress, Result, Role, User, UserError, UserStore};

/// Checks a password against the stored credential of an account.
#[derive(Clone)]
pub struct AuthenticationService {
    users: UserStore,
}

impl AuthenticationService {
    /// Create a new [`AuthenticationService`].
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }

    /// Log into the account of `role` owning `email`.
    ///
    /// An unknown account yields [`UserError::NotFound`] and a wrong password
    /// [`UserError::InvalidCredentials`]. Both outcomes are kept apart to
    /// stay compatible with existing clients, even if it reveals whether an
    /// email is registered.
    pub async fn login(
        &self,
        role: Role,
        email: &EmailAddress,
        password: &str,
    ) -> Result<User> {
        let user = match self.users.find_by_email(role, email).await {
            Ok(user) => user,
            Err(UserError::NotFound) => {
                record(role, "unknown_account");
                tracing::info!(%email, %role, "login refused, unknown account");
                return Err(UserError::NotFound);
            },
            Err(err) => {
                record(role, "error");
                return Err(err);
            },
        };

        let profile = user.profile();
        if !self
            .users
            .crypto()
            .verify(&profile.salt, &profile.password_hash, password)
        {
            record(role, "invalid_password");
            tracing::info!(user_id = %profile.id, %role, "login refused, invalid password");
            return Err(UserError::InvalidCredentials);
        }

        record(role, "success");
        tracing::info!(user_id = %profile.id, %role, "user logged in");

        Ok(user)
    }
}

fn record(role: Role, outcome: &'static str) {
    metrics::counter!("rvms_logins_total", "role" => role.as_str(), "outcome" => outcome)
        .increment(1);
}
