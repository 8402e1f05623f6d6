use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, LoginToken, RegistrationRequest, RegistrationResponse, RegistrationToken},
        error::AuthError,
        password::Hasher,
        repo_types::Account,
    },
    db::{CallCtx, Conn, Db, DbError},
};

/// Why a login was refused. Internal only: callers always see `fail`, so an
/// unknown user and an unreachable store look the same from outside.
#[derive(Debug)]
enum LoginFailure {
    UnknownUser,
    WrongPassword,
    Store(DbError),
    Task(JoinError),
}

impl LoginFailure {
    fn reason(&self) -> &'static str {
        match self {
            LoginFailure::UnknownUser => "unknown_user",
            LoginFailure::WrongPassword => "wrong_password",
            LoginFailure::Store(e) if e.is_cancellation() => "store_cancelled",
            LoginFailure::Store(_) => "store_error",
            LoginFailure::Task(_) => "verify_task_failed",
        }
    }

    fn log(&self, username: &str) {
        match self {
            LoginFailure::UnknownUser | LoginFailure::WrongPassword => {
                warn!(username, reason = self.reason(), "login rejected")
            }
            LoginFailure::Store(e) => {
                error!(username, reason = self.reason(), error = %e, "login lookup failed")
            }
            LoginFailure::Task(e) => {
                error!(username, reason = self.reason(), error = %e, "login verification failed")
            }
        }
    }
}

/// Login and registration over the instrumented store.
#[derive(Clone)]
pub struct AuthService {
    db: Db,
    hasher: Hasher,
}

impl AuthService {
    pub fn new(db: Db, hasher: Hasher) -> Self {
        Self { db, hasher }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Verify credentials. Every failure, including store errors, yields
    /// `fail`; the reason only reaches the logs.
    pub async fn login(&self, ctx: &CallCtx, req: LoginRequest) -> LoginResponse {
        let username = req.username.clone();
        match self.check_credentials(ctx, req).await {
            Ok(()) => {
                info!(username = %username, "login accepted");
                LoginToken::Ok.into()
            }
            Err(failure) => {
                failure.log(&username);
                LoginToken::Fail.into()
            }
        }
    }

    async fn check_credentials(&self, ctx: &CallCtx, req: LoginRequest) -> Result<(), LoginFailure> {
        let hash = Account::password_hash_for(&self.db, ctx, &req.username)
            .await
            .map_err(LoginFailure::Store)?
            .ok_or(LoginFailure::UnknownUser)?;

        let hasher = self.hasher.clone();
        let password = req.password;
        let matched = tokio::task::spawn_blocking(move || hasher.verify(&hash, &password))
            .await
            .map_err(LoginFailure::Task)?;

        if matched {
            Ok(())
        } else {
            Err(LoginFailure::WrongPassword)
        }
    }

    /// Create an account unless the username is taken.
    ///
    /// Store failures surface as errors. The existence check is only a fast
    /// path: the UNIQUE constraint decides, and losing that race also yields
    /// `Repeat`.
    pub async fn registration(
        &self,
        ctx: &CallCtx,
        req: RegistrationRequest,
    ) -> Result<RegistrationResponse, AuthError> {
        let mut conn = self.db.acquire(ctx).await.map_err(|e| {
            error!(error = %e, "acquire connection failed");
            AuthError::Connect(e)
        })?;

        let taken = Account::email_taken(&mut conn, ctx, &req.username)
            .await
            .map_err(|e| {
                error!(error = %e, "registration lookup failed");
                AuthError::Lookup(e)
            })?;
        if taken {
            info!(username = %req.username, "username already registered");
            return Ok(RegistrationToken::Repeat.into());
        }

        self.provision(&mut conn, ctx, req).await
    }

    async fn provision(
        &self,
        conn: &mut Conn,
        ctx: &CallCtx,
        req: RegistrationRequest,
    ) -> Result<RegistrationResponse, AuthError> {
        let RegistrationRequest { username, password } = req;
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;

        let account = Account::new(username, hash);
        match account.insert(conn, ctx).await {
            Ok(()) => {
                info!(user_id = %account.user_id, username = %account.email, "account registered");
                Ok(RegistrationToken::Success.into())
            }
            Err(e) if e.is_unique_violation() => {
                info!(username = %account.email, "username registered concurrently");
                Ok(RegistrationToken::Repeat.into())
            }
            Err(e) => {
                error!(error = %e, "insert account failed");
                Err(AuthError::Insert(e))
            }
        }
    }
}
