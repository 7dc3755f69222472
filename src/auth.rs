//! Password hashing and the bearer-token request guard.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::db::{self, DbPool};
use crate::errors::ApiError;

/// How long a login token stays valid.
const TOKEN_TTL_HOURS: i64 = 2;

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes())
        .map_err(|_| ApiError::Internal)?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Current instant in the fixed-width RFC 3339 form stored in the database.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Expiry horizon for a session issued right now.
pub fn session_expiry() -> String {
    (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn expired(expires_at: &str) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(moment) => moment.with_timezone(&Utc) <= Utc::now(),
        Err(_) => true,
    }
}

/// The authenticated caller, resolved from the `Authorization: Bearer`
/// header against the sessions table. A missing header is 401; an unknown
/// or expired token is 403.
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(token) = bearer_token(req) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let Some(pool) = req.rocket().state::<DbPool>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        let conn = match pool.get() {
            Ok(conn) => conn,
            Err(_) => return Outcome::Error((Status::InternalServerError, ())),
        };
        match db::session_user(&conn, token) {
            Ok(Some((user, expires_at))) if !expired(&expires_at) => Outcome::Success(AuthUser {
                id: user.id,
                username: user.username,
            }),
            Ok(_) => Outcome::Error((Status::Forbidden, ())),
            Err(_) => Outcome::Error((Status::InternalServerError, ())),
        }
    }
}

fn bearer_token<'r>(req: &'r Request<'_>) -> Option<&'r str> {
    let header = req.headers().get_one("Authorization")?;
    header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}
