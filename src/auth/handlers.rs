use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::Duration;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotRequest, LoginRequest, MessageResponse, PublicAccount,
            RefreshRequest, RegisterRequest, ResetPasswordRequest, ResetTokenStatus,
        },
        jwt::{AuthUser, JwtKeys, TokenKind},
        password::{check_new_password, hash_password, verify_password, MIN_PASSWORD_LEN},
        repo::PgAccountStore,
        repo_types::Account,
        reset::{AccountStore, OsEntropy, ResetError, TokenLifecycle},
        services::{is_valid_email, normalize_email},
    },
    clock::SystemClock,
    mailer::ResetEmail,
    state::AppState,
};

const FORGOT_MESSAGE: &str = "If that account exists, a password reset link has been emailed.";

impl FromRef<AppState> for TokenLifecycle {
    fn from_ref(state: &AppState) -> Self {
        TokenLifecycle::new(
            Arc::new(PgAccountStore::new(state.db.clone())),
            Arc::new(OsEntropy),
            Arc::new(SystemClock),
        )
        .with_ttl(Duration::seconds(state.config.reset_token_ttl_secs))
    }
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/forgot", post(forgot))
        .route("/auth/reset/:token", get(reset_form).post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

/// Maps reset failures without telling "unknown" apart from "expired".
fn reset_rejection(e: ResetError) -> (StatusCode, String) {
    match e {
        ResetError::NotFound | ResetError::InvalidOrExpired => (
            StatusCode::BAD_REQUEST,
            "Password reset is invalid or has expired".into(),
        ),
        ResetError::Persistence(e) => {
            error!(error = %e, "reset store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        }
    }
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
}

fn auth_response(state: &AppState, account: Account) -> Result<AuthResponse, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let (access_token, refresh_token) = keys.sign_pair(account.id).map_err(internal)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicAccount {
            id: account.id,
            email: account.email,
        },
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let accounts = PgAccountStore::new(state.db.clone());
    if accounts
        .find_by_identity(&email)
        .await
        .map_err(internal)?
        .is_some()
    {
        warn!(email = %email, "email already registered");
        return Err((StatusCode::CONFLICT, "Email already registered".into()));
    }

    let hash = hash_password(&payload.password).map_err(internal)?;
    let account = accounts.create(&email, &hash).await.map_err(internal)?;

    info!(account_id = %account.id, email = %account.email, "account registered");
    Ok(Json(auth_response(&state, account)?))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let accounts = PgAccountStore::new(state.db.clone());
    let account = match accounts.find_by_identity(&email).await {
        Ok(Some(a)) => a,
        Ok(None) => {
            warn!(email = %email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => return Err(internal(e)),
    };

    if !verify_password(&payload.password, &account.password_hash).map_err(internal)? {
        warn!(account_id = %account.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    info!(account_id = %account.id, "account logged in");
    Ok(Json(auth_response(&state, account)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let account_id = JwtKeys::from_ref(&state)
        .verify(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let account = PgAccountStore::new(state.db.clone())
        .find_by_id(account_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    Ok(Json(auth_response(&state, account)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(account_id): AuthUser,
) -> Result<Json<PublicAccount>, (StatusCode, String)> {
    let account = PgAccountStore::new(state.db.clone())
        .find_by_id(account_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            error!(account_id = %account_id, "user not found");
            (StatusCode::UNAUTHORIZED, "User not found".to_string())
        })?;

    Ok(Json(PublicAccount {
        id: account.id,
        email: account.email,
    }))
}

/// Issues a reset token and hands it to the mailer. The answer is the same
/// whether or not the account exists.
#[instrument(skip(state, lifecycle, payload))]
pub async fn forgot(
    State(state): State<AppState>,
    State(lifecycle): State<TokenLifecycle>,
    Json(payload): Json<ForgotRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), (StatusCode, String)> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    match lifecycle.issue(&email).await {
        Ok((account, token)) => {
            let mail = ResetEmail {
                recipient: account.email,
                reset_url: state.config.reset_url(&token),
                token,
            };
            let mailer = state.mailer.clone();
            tokio::spawn(async move {
                if let Err(e) = mailer.send_password_reset(mail).await {
                    error!(error = %e, "password reset email failed");
                }
            });
        }
        Err(ResetError::NotFound) => {
            warn!("password reset requested for unknown email");
        }
        Err(e) => return Err(reset_rejection(e)),
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: FORGOT_MESSAGE.into(),
        }),
    ))
}

#[instrument(skip_all)]
pub async fn reset_form(
    State(lifecycle): State<TokenLifecycle>,
    Path(token): Path<String>,
) -> Result<Json<ResetTokenStatus>, (StatusCode, String)> {
    lifecycle.validate(&token).await.map_err(reset_rejection)?;
    Ok(Json(ResetTokenStatus { valid: true }))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    State(lifecycle): State<TokenLifecycle>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    check_new_password(&payload.password, &payload.password_confirm)
        .map_err(|reason| (StatusCode::BAD_REQUEST, reason.to_string()))?;

    let hash = hash_password(&payload.password).map_err(internal)?;
    let account = lifecycle
        .consume(&token, hash)
        .await
        .map_err(reset_rejection)?;

    Ok(Json(auth_response(&state, account)?))
}
