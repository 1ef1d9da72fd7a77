//! Session tokens handed out after login, registration and a completed
//! password reset.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    kind: TokenKind,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid or expired token")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("expected a {expected:?} token")]
    WrongKind { expected: TokenKind },
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: Duration::minutes(config.ttl_minutes),
            refresh_ttl: Duration::minutes(config.refresh_ttl_minutes),
        }
    }

    fn sign(&self, account_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: account_id,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Access and refresh token for an account that just proved who it is.
    pub fn sign_pair(&self, account_id: Uuid) -> anyhow::Result<(String, String)> {
        let pair = (
            self.sign(account_id, TokenKind::Access)?,
            self.sign(account_id, TokenKind::Refresh)?,
        );
        debug!(%account_id, "session tokens signed");
        Ok(pair)
    }

    /// Account id carried by `token`, provided it is a live token of `expected` kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Uuid, SessionError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.kind != expected {
            return Err(SessionError::WrongKind { expected });
        }
        Ok(claims.sub)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt)
    }
}

/// Account id of a request carrying a valid access token.
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing bearer token".to_string(),
            ))?;

        JwtKeys::from_ref(state)
            .verify(token, TokenKind::Access)
            .map(AuthUser)
            .map_err(|e| {
                warn!(error = %e, "rejected session token");
                (StatusCode::UNAUTHORIZED, e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 15,
            refresh_ttl_minutes: 60,
        }
    }

    #[test]
    fn pair_verifies_by_kind() {
        let keys = JwtKeys::new(&config());
        let account_id = Uuid::new_v4();
        let (access, refresh) = keys.sign_pair(account_id).unwrap();
        assert_eq!(keys.verify(&access, TokenKind::Access).unwrap(), account_id);
        assert_eq!(keys.verify(&refresh, TokenKind::Refresh).unwrap(), account_id);
        assert!(matches!(
            keys.verify(&access, TokenKind::Refresh).unwrap_err(),
            SessionError::WrongKind {
                expected: TokenKind::Refresh
            }
        ));
    }

    #[test]
    fn other_audience_or_secret_is_rejected() {
        let (access, _) = JwtKeys::new(&config()).sign_pair(Uuid::new_v4()).unwrap();

        let mut other = config();
        other.audience = "someone-else".into();
        assert!(matches!(
            JwtKeys::new(&other).verify(&access, TokenKind::Access),
            Err(SessionError::Invalid(_))
        ));

        let mut other = config();
        other.secret = "another-secret".into();
        assert!(JwtKeys::new(&other).verify(&access, TokenKind::Access).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut cfg = config();
        cfg.ttl_minutes = -5;
        let (access, _) = JwtKeys::new(&cfg).sign_pair(Uuid::new_v4()).unwrap();
        assert!(JwtKeys::new(&config()).verify(&access, TokenKind::Access).is_err());
    }

    async fn extract(header: Option<String>) -> Result<Uuid, StatusCode> {
        let state = AppState::fake();
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(AUTHORIZATION, h);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, &state)
            .await
            .map(|AuthUser(id)| id)
            .map_err(|(status, _)| status)
    }

    #[tokio::test]
    async fn extractor_accepts_access_token_only() {
        let account_id = Uuid::new_v4();
        let (access, refresh) = JwtKeys::new(&config()).sign_pair(account_id).unwrap();
        assert_eq!(extract(Some(format!("Bearer {access}"))).await, Ok(account_id));
        assert_eq!(
            extract(Some(format!("Bearer {refresh}"))).await,
            Err(StatusCode::UNAUTHORIZED)
        );
        assert_eq!(extract(Some(access)).await, Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract(None).await, Err(StatusCode::UNAUTHORIZED));
    }
}
