use uuid::Uuid;

/// Account row in the `"user"` table.
#[derive(Debug, Clone)]
pub struct Account {
    pub user_id: String,  // 32 hex chars, no dashes
    pub nickname: String, // display name, empty on registration
    pub email: String,    // login name, unique
    pub password: String, // Argon2 PHC string, never the plaintext
}

impl Account {
    /// New account with a random id and an empty display name.
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            user_id: Uuid::new_v4().simple().to_string(),
            nickname: String::new(),
            email: email.into(),
            password: password_hash.into(),
        }
    }
}
