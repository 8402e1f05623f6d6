use std::sync::Arc;

use sqlx::{
    any::{Any, AnyQueryResult, AnyRow},
    pool::PoolConnection,
    Executor, Transaction,
};

use super::{CallCtx, DbError, Observer, Op, Scope, Sql, Verb};

/// Prepared statement handle.
///
/// Preparing validates the text against the store and warms the driver's
/// statement cache; [`Stmt::sql`] starts a bound statement that runs on any
/// handle and is tagged `stmt` in timed-operation records.
#[derive(Debug, Clone)]
pub struct Stmt {
    text: Arc<str>,
}

impl Stmt {
    pub(crate) fn new(text: &str) -> Self {
        Self { text: text.into() }
    }

    pub fn sql(&self) -> Sql {
        Sql::prepared(self.text.to_string())
    }
}

/// Scoped connection checked out of the pool. Returned to the pool on drop.
pub struct Conn {
    inner: PoolConnection<Any>,
    observer: Arc<Observer>,
}

impl Conn {
    pub(crate) fn new(inner: PoolConnection<Any>, observer: Arc<Observer>) -> Self {
        Self { inner, observer }
    }

    pub async fn execute(&mut self, ctx: &CallCtx, sql: &Sql) -> Result<AnyQueryResult, DbError> {
        self.observer
            .run(
                ctx,
                Op::with_sql(Scope::Conn, Verb::Exec, sql),
                sql.query().execute(&mut *self.inner),
            )
            .await
    }

    pub async fn fetch_all(&mut self, ctx: &CallCtx, sql: &Sql) -> Result<Vec<AnyRow>, DbError> {
        self.observer
            .run(
                ctx,
                Op::with_sql(Scope::Conn, Verb::Query, sql),
                sql.query().fetch_all(&mut *self.inner),
            )
            .await
    }

    pub async fn fetch_optional(&mut self, ctx: &CallCtx, sql: &Sql) -> Result<Option<AnyRow>, DbError> {
        self.observer
            .run(
                ctx,
                Op::with_sql(Scope::Conn, Verb::QueryRow, sql),
                sql.query().fetch_optional(&mut *self.inner),
            )
            .await
    }

    pub async fn ping(&mut self, ctx: &CallCtx) -> Result<(), DbError> {
        self.observer
            .run(
                ctx,
                Op::new(Scope::Conn, Verb::Ping),
                sqlx::Connection::ping(&mut *self.inner),
            )
            .await
    }

    pub async fn prepare(&mut self, ctx: &CallCtx, text: &str) -> Result<Stmt, DbError> {
        let sql = Sql::new(text.to_owned());
        let conn = &mut *self.inner;
        self.observer
            .run(ctx, Op::with_sql(Scope::Conn, Verb::Prepare, &sql), async {
                conn.prepare(sql.text()).await.map(|_| ())
            })
            .await?;
        Ok(Stmt::new(text))
    }

    /// Start a transaction on this connection.
    pub async fn begin(&mut self, ctx: &CallCtx) -> Result<Tx<'_>, DbError> {
        let observer = Arc::clone(&self.observer);
        let inner = observer
            .run(
                ctx,
                Op::new(Scope::Conn, Verb::Begin),
                sqlx::Connection::begin(&mut *self.inner),
            )
            .await?;
        Ok(Tx::new(inner, observer))
    }
}

/// Open transaction. Dropping it without [`Tx::commit`] or [`Tx::rollback`]
/// makes sqlx queue a rollback, which is recorded as an abandoned
/// `tx rollback`.
pub struct Tx<'c> {
    inner: Transaction<'c, Any>,
    open: OpenTx,
}

struct OpenTx {
    observer: Arc<Observer>,
    finished: bool,
}

impl Drop for OpenTx {
    fn drop(&mut self) {
        if !self.finished {
            self.observer.record_abandoned(Op::new(Scope::Tx, Verb::Rollback));
        }
    }
}

impl<'c> Tx<'c> {
    pub(crate) fn new(inner: Transaction<'c, Any>, observer: Arc<Observer>) -> Self {
        Self {
            inner,
            open: OpenTx {
                observer,
                finished: false,
            },
        }
    }

    pub async fn execute(&mut self, ctx: &CallCtx, sql: &Sql) -> Result<AnyQueryResult, DbError> {
        self.open.observer
            .run(
                ctx,
                Op::with_sql(Scope::Tx, Verb::Exec, sql),
                sql.query().execute(&mut *self.inner),
            )
            .await
    }

    pub async fn fetch_all(&mut self, ctx: &CallCtx, sql: &Sql) -> Result<Vec<AnyRow>, DbError> {
        self.open.observer
            .run(
                ctx,
                Op::with_sql(Scope::Tx, Verb::Query, sql),
                sql.query().fetch_all(&mut *self.inner),
            )
            .await
    }

    pub async fn fetch_optional(&mut self, ctx: &CallCtx, sql: &Sql) -> Result<Option<AnyRow>, DbError> {
        self.open.observer
            .run(
                ctx,
                Op::with_sql(Scope::Tx, Verb::QueryRow, sql),
                sql.query().fetch_optional(&mut *self.inner),
            )
            .await
    }

    pub async fn prepare(&mut self, ctx: &CallCtx, text: &str) -> Result<Stmt, DbError> {
        let sql = Sql::new(text.to_owned());
        let conn = &mut *self.inner;
        self.open.observer
            .run(ctx, Op::with_sql(Scope::Tx, Verb::Prepare, &sql), async {
                conn.prepare(sql.text()).await.map(|_| ())
            })
            .await?;
        Ok(Stmt::new(text))
    }

    pub async fn commit(self, ctx: &CallCtx) -> Result<(), DbError> {
        let Tx { inner, mut open } = self;
        open.finished = true;
        open.observer
            .run(ctx, Op::new(Scope::Tx, Verb::Commit), inner.commit())
            .await
    }

    pub async fn rollback(self, ctx: &CallCtx) -> Result<(), DbError> {
        let Tx { inner, mut open } = self;
        open.finished = true;
        open.observer
            .run(ctx, Op::new(Scope::Tx, Verb::Rollback), inner.rollback())
            .await
    }
}
