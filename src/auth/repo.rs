use sqlx::Row;

use crate::auth::repo_types::Account;
use crate::db::{Arg, CallCtx, Conn, Db, DbError, Sql};

impl Account {
    /// Stored password hash for `email`, if the account exists.
    pub async fn password_hash_for(
        db: &Db,
        ctx: &CallCtx,
        email: &str,
    ) -> Result<Option<String>, DbError> {
        let row = db
            .fetch_optional(
                ctx,
                &Sql::new(r#"SELECT password FROM "user" WHERE email = $1"#).bind(email),
            )
            .await?;
        row.map(|r| r.try_get::<String, _>("password"))
            .transpose()
            .map_err(DbError::from)
    }

    /// Whether an account with `email` already exists.
    pub async fn email_taken(conn: &mut Conn, ctx: &CallCtx, email: &str) -> Result<bool, DbError> {
        let row = conn
            .fetch_optional(
                ctx,
                &Sql::new(r#"SELECT email FROM "user" WHERE email = $1"#).bind(email),
            )
            .await?;
        Ok(row.is_some())
    }

    /// Insert this account. A duplicate email surfaces as a unique violation.
    pub async fn insert(&self, conn: &mut Conn, ctx: &CallCtx) -> Result<(), DbError> {
        conn.execute(
            ctx,
            &Sql::new(
                r#"
                INSERT INTO "user" (user_id, nickname, email, password)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(self.user_id.as_str())
            .bind(self.nickname.as_str())
            .bind(self.email.as_str())
            .bind(Arg::secret(self.password.as_str())),
        )
        .await?;
        Ok(())
    }
}
