//! Access and refresh token issuance and verification.
//!
//! Tokens are HS256 JWTs. Access tokens carry `{id, email, role}`, refresh
//! tokens carry `{id, tokenVersion}`. There is no revocation list: refresh
//! tokens die when the user's token version moves on, access tokens when
//! they expire or the secret rotates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use quest_db::models::UserRow;
use quest_types::api::{AccessClaims, RefreshClaims};
use quest_types::models::Role;

use crate::config::AppConfig;

/// Verification failed. Expired, malformed and wrong-secret tokens are
/// deliberately indistinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid or expired token")]
pub struct InvalidToken;

/// Identity a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub token_version: i64,
}

impl From<&UserRow> for Subject {
    fn from(user: &UserRow) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role(),
            token_version: user.token_version,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.jwt_secret.clone(),
            config.jwt_refresh_secret.clone(),
            config.jwt_expires_in,
            config.jwt_refresh_expires_in,
        )
    }

    pub fn issue_access_token(&self, subject: &Subject) -> anyhow::Result<String> {
        self.issue_access_token_at(subject, Utc::now())
    }

    /// Same input, secret and clock always produce the same token.
    pub fn issue_access_token_at(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let (iat, exp) = window(now, self.access_ttl);
        let claims = AccessClaims {
            id: subject.id.clone(),
            email: subject.email.clone(),
            role: subject.role,
            iat,
            exp,
        };
        sign(&claims, &self.access_secret)
    }

    pub fn issue_refresh_token(&self, subject: &Subject) -> anyhow::Result<String> {
        self.issue_refresh_token_at(subject, Utc::now())
    }

    pub fn issue_refresh_token_at(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let (iat, exp) = window(now, self.refresh_ttl);
        let claims = RefreshClaims {
            id: subject.id.clone(),
            token_version: subject.token_version,
            iat,
            exp,
        };
        sign(&claims, &self.refresh_secret)
    }

    pub fn issue_pair(&self, subject: &Subject) -> anyhow::Result<TokenPair> {
        let now = Utc::now();
        Ok(TokenPair {
            access_token: self.issue_access_token_at(subject, now)?,
            refresh_token: self.issue_refresh_token_at(subject, now)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, InvalidToken> {
        verify(token, &self.access_secret)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, InvalidToken> {
        verify(token, &self.refresh_secret)
    }
}

fn window(now: DateTime<Utc>, ttl: Duration) -> (i64, i64) {
    let iat = now.timestamp();
    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    (iat, iat.saturating_add(ttl_secs))
}

fn sign<C: Serialize>(claims: &C, secret: &str) -> anyhow::Result<String> {
    let token = encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Check signature and expiry, then decode the claims.
pub fn verify<C: DeserializeOwned>(token: &str, secret: &str) -> Result<C, InvalidToken> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<C>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|_| InvalidToken)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
/// Missing or malformed headers yield `None`, never an error.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}
