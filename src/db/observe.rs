use std::{
    fmt,
    future::Future,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    time::{Duration, Instant},
};

use tracing::{info, warn};

use super::{CallCtx, DbError, Sql};
use crate::config::SqlLogConfig;

/// Which handle an operation ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Db,
    Conn,
    Tx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Exec,
    Query,
    QueryRow,
    Ping,
    Prepare,
    Acquire,
    Begin,
    Commit,
    Rollback,
}

/// Metadata of one data-access call.
#[derive(Debug, Clone, Copy)]
pub struct Op<'a> {
    pub scope: Scope,
    pub verb: Verb,
    pub sql: Option<&'a Sql>,
}

impl<'a> Op<'a> {
    pub fn new(scope: Scope, verb: Verb) -> Self {
        Self {
            scope,
            verb,
            sql: None,
        }
    }

    pub fn with_sql(scope: Scope, verb: Verb, sql: &'a Sql) -> Self {
        Self {
            scope,
            verb,
            sql: Some(sql),
        }
    }
}

impl fmt::Display for Op<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            Scope::Db => "db",
            Scope::Conn => "conn",
            Scope::Tx => "tx",
        };
        let verb = match self.verb {
            Verb::Exec => "exec",
            Verb::Query => "query",
            Verb::QueryRow => "query row",
            Verb::Ping => "ping",
            Verb::Prepare => "prepare",
            Verb::Acquire => "acquire",
            Verb::Begin => "begin",
            Verb::Commit => "commit",
            Verb::Rollback => "rollback",
        };
        if self.sql.is_some_and(Sql::is_prepared) {
            write!(f, "{scope} stmt {verb}")
        } else {
            write!(f, "{scope} {verb}")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ok,
    Error,
    Cancelled,
    Abandoned,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Error => "error",
            Outcome::Cancelled => "cancelled",
            Outcome::Abandoned => "abandoned",
        }
    }
}

/// Observability context shared by every handle of one pool.
///
/// Built once at startup and handed to the data access layer; it owns the
/// slow threshold, the debug switch and the host address that go into every
/// timed-operation record.
#[derive(Debug, Clone)]
pub struct Observer {
    slow: Duration,
    debug: bool,
    host_ip: Option<Ipv4Addr>,
}

impl Observer {
    pub fn new(cfg: &SqlLogConfig, host_ip: Option<Ipv4Addr>) -> Self {
        Self {
            slow: cfg.slow,
            debug: cfg.debug,
            host_ip,
        }
    }

    /// Whether a call that took `elapsed` produces a record.
    pub fn should_record(&self, elapsed: Duration) -> bool {
        self.debug || elapsed >= self.slow
    }

    /// Time `fut` under `ctx`, logging the call when it is slow or when
    /// debugging is on. The result is returned as the delegate produced it.
    pub async fn run<T, F>(&self, ctx: &CallCtx, op: Op<'_>, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut timer = OpTimer {
            observer: self,
            op,
            started: Instant::now(),
            outcome: Outcome::Abandoned,
        };
        let res = ctx.guard(fut).await;
        timer.outcome = match &res {
            Ok(_) => Outcome::Ok,
            Err(e) if e.is_cancellation() => Outcome::Cancelled,
            Err(_) => Outcome::Error,
        };
        res
    }

    /// Record an operation the driver queued on drop instead of awaiting.
    /// It takes no measurable time here, so only debug mode logs it.
    pub(crate) fn record_abandoned(&self, op: Op<'_>) {
        if self.should_record(Duration::ZERO) {
            self.record(&op, Duration::ZERO, Outcome::Abandoned);
        }
    }

    fn record(&self, op: &Op<'_>, elapsed: Duration, outcome: Outcome) {
        let slow = elapsed >= self.slow;
        let host_ip = self
            .host_ip
            .map_or_else(|| "unknown".to_owned(), |ip| ip.to_string());

        match (op.sql, slow) {
            (Some(sql), true) => warn!(
                op = %op,
                elapsed = ?elapsed,
                outcome = outcome.as_str(),
                sql = %sql.compact_text(),
                args = %sql.display_args(),
                host_ip = %host_ip,
                "slow sql operation"
            ),
            (Some(sql), false) => info!(
                op = %op,
                elapsed = ?elapsed,
                outcome = outcome.as_str(),
                sql = %sql.compact_text(),
                args = %sql.display_args(),
                host_ip = %host_ip,
                "sql operation"
            ),
            (None, true) => warn!(
                op = %op,
                elapsed = ?elapsed,
                outcome = outcome.as_str(),
                host_ip = %host_ip,
                "slow sql operation"
            ),
            (None, false) => info!(
                op = %op,
                elapsed = ?elapsed,
                outcome = outcome.as_str(),
                host_ip = %host_ip,
                "sql operation"
            ),
        }
    }
}

/// Emits the record on drop so every exit path is timed, including a
/// caller dropping the future mid-flight.
struct OpTimer<'a> {
    observer: &'a Observer,
    op: Op<'a>,
    started: Instant,
    outcome: Outcome,
}

impl Drop for OpTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        if self.observer.should_record(elapsed) {
            self.observer.record(&self.op, elapsed, self.outcome);
        }
    }
}

/// Outbound IPv4 address of this host.
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick the
/// route and source address.
pub fn detect_host_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) if !addr.ip().is_loopback() && !addr.ip().is_unspecified() => {
            Some(*addr.ip())
        }
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        pub(crate) fn install(&self) -> tracing::subscriber::DefaultGuard {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::TRACE)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn observer(slow: Duration, debug: bool) -> Observer {
        Observer::new(
            &SqlLogConfig { slow, debug },
            Some(Ipv4Addr::new(10, 1, 2, 3)),
        )
    }

    #[test]
    fn threshold_and_debug_decide_recording() {
        let quiet = observer(Duration::from_millis(100), false);
        assert!(!quiet.should_record(Duration::from_millis(99)));
        assert!(quiet.should_record(Duration::from_millis(100)));
        assert!(quiet.should_record(Duration::from_secs(3)));

        let chatty = observer(Duration::from_secs(60), true);
        assert!(chatty.should_record(Duration::ZERO));
    }

    #[test]
    fn op_tags() {
        let sql = Sql::new("SELECT 1");
        let stmt = Sql::prepared("SELECT 1");
        assert_eq!(Op::with_sql(Scope::Db, Verb::QueryRow, &sql).to_string(), "db query row");
        assert_eq!(Op::with_sql(Scope::Tx, Verb::Exec, &stmt).to_string(), "tx stmt exec");
        assert_eq!(Op::new(Scope::Tx, Verb::Commit).to_string(), "tx commit");
        assert_eq!(Op::new(Scope::Conn, Verb::Ping).to_string(), "conn ping");
    }

    #[tokio::test]
    async fn slow_call_is_recorded() {
        let capture = Capture::default();
        let _guard = capture.install();

        let obs = observer(Duration::from_millis(10), false);
        let sql = Sql::new("SELECT password FROM \"user\" WHERE email = $1").bind("bob@x.com");
        let out = obs
            .run(
                &CallCtx::background(),
                Op::with_sql(Scope::Db, Verb::QueryRow, &sql),
                async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok::<_, sqlx::Error>(1)
                },
            )
            .await
            .unwrap();
        assert_eq!(out, 1);

        let logs = capture.contents();
        assert!(logs.contains("slow sql operation"), "{logs}");
        assert!(logs.contains("db query row"), "{logs}");
        assert!(logs.contains("bob@x.com"), "{logs}");
        assert!(logs.contains("10.1.2.3"), "{logs}");
        assert!(logs.contains("outcome=\"ok\""), "{logs}");
    }

    #[tokio::test]
    async fn fast_call_without_debug_is_silent() {
        let capture = Capture::default();
        let _guard = capture.install();

        let obs = observer(Duration::from_secs(60), false);
        obs.run(&CallCtx::background(), Op::new(Scope::Db, Verb::Ping), async {
            Ok::<_, sqlx::Error>(())
        })
        .await
        .unwrap();

        assert!(!capture.contents().contains("sql operation"));
    }

    #[tokio::test]
    async fn debug_records_fast_calls_and_errors() {
        let capture = Capture::default();
        let _guard = capture.install();

        let obs = observer(Duration::from_secs(60), true);
        let err = obs
            .run(&CallCtx::background(), Op::new(Scope::Db, Verb::Ping), async {
                Err::<(), _>(sqlx::Error::PoolClosed)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Sqlx(sqlx::Error::PoolClosed)));

        let logs = capture.contents();
        assert!(logs.contains("db ping"), "{logs}");
        assert!(logs.contains("outcome=\"error\""), "{logs}");
        assert!(!logs.contains("sql="), "{logs}");
    }

    #[tokio::test]
    async fn dropped_call_is_still_timed() {
        let capture = Capture::default();
        let _guard = capture.install();

        let obs = observer(Duration::from_secs(60), true);
        let ctx = CallCtx::background();
        let fut = obs.run(&ctx, Op::new(Scope::Conn, Verb::Acquire), async {
            std::future::pending::<Result<(), sqlx::Error>>().await
        });
        let _ = tokio::time::timeout(Duration::from_millis(5), fut).await;

        let logs = capture.contents();
        assert!(logs.contains("conn acquire"), "{logs}");
        assert!(logs.contains("outcome=\"abandoned\""), "{logs}");
    }
}
