use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for account registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for "forgot my password".
#[derive(Debug, Deserialize)]
pub struct ForgotRequest {
    pub email: String,
}

/// Request body for setting a new password with a reset token.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    #[serde(alias = "password-confirm")]
    pub password_confirm: String,
}

/// Response returned after login, register, refresh or a completed reset.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicAccount,
}

/// Public part of the account returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicAccount {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ResetTokenStatus {
    pub valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_request_accepts_dashed_confirmation() {
        let req: ResetPasswordRequest =
            serde_json::from_str(r#"{"password":"abcdefgh","password-confirm":"abcdefgh"}"#)
                .unwrap();
        assert_eq!(req.password, req.password_confirm);

        let req: ResetPasswordRequest =
            serde_json::from_str(r#"{"password":"abcdefgh","password_confirm":"x"}"#).unwrap();
        assert_eq!(req.password_confirm, "x");
    }

    #[test]
    fn public_account_serialization() {
        let response = PublicAccount {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("id"));
    }
}
