//! Instrumented data access.
//!
//! Every store call goes through [`Observer::run`], which times it, applies
//! the caller's deadline and cancellation token, and logs slow calls. The
//! handles here (`Db`, `Conn`, `Tx`) only decide which executor a statement
//! runs on; none of them bypass the observer.

use std::sync::Arc;

use anyhow::Context;
use sqlx::{
    any::{AnyPoolOptions, AnyQueryResult, AnyRow},
    AnyPool, Executor,
};

mod conn;
mod ctx;
mod error;
mod observe;
mod sql;

pub use conn::{Conn, Stmt, Tx};
pub use ctx::CallCtx;
pub use error::DbError;
pub use observe::{detect_host_ipv4, Observer};
use observe::{Op, Scope, Verb};
pub use sql::{Arg, Sql};

#[cfg(test)]
pub(crate) use observe::tests::Capture;

/// Connection pool wrapped with the observer.
#[derive(Clone)]
pub struct Db {
    pool: AnyPool,
    observer: Arc<Observer>,
}

impl Db {
    pub async fn connect(url: &str, max_connections: u32, observer: Arc<Observer>) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("connect to database")?;
        Ok(Self::new(pool, observer))
    }

    pub fn new(pool: AnyPool, observer: Arc<Observer>) -> Self {
        Self { pool, observer }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn execute(&self, ctx: &CallCtx, sql: &Sql) -> Result<AnyQueryResult, DbError> {
        self.observer
            .run(ctx, Op::with_sql(Scope::Db, Verb::Exec, sql), sql.query().execute(&self.pool))
            .await
    }

    pub async fn fetch_all(&self, ctx: &CallCtx, sql: &Sql) -> Result<Vec<AnyRow>, DbError> {
        self.observer
            .run(ctx, Op::with_sql(Scope::Db, Verb::Query, sql), sql.query().fetch_all(&self.pool))
            .await
    }

    pub async fn fetch_optional(&self, ctx: &CallCtx, sql: &Sql) -> Result<Option<AnyRow>, DbError> {
        self.observer
            .run(
                ctx,
                Op::with_sql(Scope::Db, Verb::QueryRow, sql),
                sql.query().fetch_optional(&self.pool),
            )
            .await
    }

    pub async fn ping(&self, ctx: &CallCtx) -> Result<(), DbError> {
        self.observer
            .run(ctx, Op::new(Scope::Db, Verb::Ping), async {
                let mut conn = self.pool.acquire().await?;
                sqlx::Connection::ping(&mut *conn).await
            })
            .await
    }

    /// Validate `text` against the store and return a reusable handle.
    pub async fn prepare(&self, ctx: &CallCtx, text: &str) -> Result<Stmt, DbError> {
        let sql = Sql::new(text.to_owned());
        self.observer
            .run(ctx, Op::with_sql(Scope::Db, Verb::Prepare, &sql), async {
                (&self.pool).prepare(sql.text()).await.map(|_| ())
            })
            .await?;
        Ok(Stmt::new(text))
    }

    /// Check out a scoped connection; it returns to the pool on drop.
    pub async fn acquire(&self, ctx: &CallCtx) -> Result<Conn, DbError> {
        let inner = self
            .observer
            .run(ctx, Op::new(Scope::Db, Verb::Acquire), self.pool.acquire())
            .await?;
        Ok(Conn::new(inner, Arc::clone(&self.observer)))
    }

    pub async fn begin(&self, ctx: &CallCtx) -> Result<Tx<'static>, DbError> {
        let inner = self
            .observer
            .run(ctx, Op::new(Scope::Db, Verb::Begin), self.pool.begin())
            .await?;
        Ok(Tx::new(inner, Arc::clone(&self.observer)))
    }

    /// Single-connection in-memory SQLite with the schema applied.
    #[cfg(test)]
    pub(crate) async fn memory(observer: Observer) -> Self {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let db = Self::new(pool, Arc::new(observer));
        db.migrate().await.expect("migrations apply");
        db
    }

    /// File-backed SQLite with `max_connections` connections, so calls on
    /// different connections really overlap. The file lives under the temp
    /// dir; callers remove it through the returned path.
    #[cfg(test)]
    pub(crate) async fn temp_file(observer: Observer, max_connections: u32) -> (Self, std::path::PathBuf) {
        sqlx::any::install_default_drivers();
        let path = std::env::temp_dir().join(format!("login-service-{}.db", uuid::Uuid::new_v4().simple()));
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .expect("file-backed sqlite");
        let db = Self::new(pool, Arc::new(observer));
        db.migrate().await.expect("migrations apply");
        (db, path)
    }
}
