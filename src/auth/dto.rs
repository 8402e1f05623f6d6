use serde::{Deserialize, Serialize};

/// Login outcome token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginToken {
    Ok,
    Fail,
}

/// Registration outcome token. `Repeat` means the username is taken.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RegistrationToken {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "Repeat")]
    Repeat,
}

/// Request body for login. The password is never persisted or logged.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request body for registration.
#[derive(Deserialize)]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    pub token: LoginToken,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationResponse {
    pub token: RegistrationToken,
}

impl From<LoginToken> for LoginResponse {
    fn from(token: LoginToken) -> Self {
        Self { token }
    }
}

impl From<RegistrationToken> for RegistrationResponse {
    fn from(token: RegistrationToken) -> Self {
        Self { token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_use_wire_spelling() {
        let json = serde_json::to_string(&LoginResponse::from(LoginToken::Ok)).unwrap();
        assert_eq!(json, r#"{"token":"ok"}"#);
        let json = serde_json::to_string(&LoginResponse::from(LoginToken::Fail)).unwrap();
        assert_eq!(json, r#"{"token":"fail"}"#);
        let json = serde_json::to_string(&RegistrationResponse::from(RegistrationToken::Success)).unwrap();
        assert_eq!(json, r#"{"token":"success"}"#);
        let json = serde_json::to_string(&RegistrationResponse::from(RegistrationToken::Repeat)).unwrap();
        assert_eq!(json, r#"{"token":"Repeat"}"#);
    }
}
