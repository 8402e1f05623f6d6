use std::sync::Arc;

use tracing::info;

use crate::auth::{password::Hasher, AuthService};
use crate::config::AppConfig;
use crate::db::{detect_host_ipv4, CallCtx, Db, Observer};

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let host_ip = detect_host_ipv4();
        info!(host_ip = ?host_ip, "detected outbound address");
        let observer = Arc::new(Observer::new(&config.sql_log, host_ip));

        let db = Db::connect(&config.database_url, config.max_connections, observer).await?;
        let hasher = Hasher::new(&config.hash)?;

        Ok(Self::from_parts(AuthService::new(db, hasher), Arc::new(config)))
    }

    pub fn from_parts(auth: AuthService, config: Arc<AppConfig>) -> Self {
        Self { auth, config }
    }

    /// Deadline for one inbound call, propagated into every store call it makes.
    pub fn call_ctx(&self) -> CallCtx {
        CallCtx::with_timeout(self.config.request_timeout)
    }

    /// In-memory store, cheap hashing, quiet logging.
    #[cfg(test)]
    pub async fn fake() -> Self {
        use std::time::Duration;

        use crate::config::{HashConfig, SqlLogConfig};

        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            request_timeout: Duration::from_secs(5),
            sql_log: SqlLogConfig {
                slow: Duration::from_secs(60),
                debug: false,
            },
            hash: HashConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        };
        let db = Db::memory(Observer::new(&config.sql_log, None)).await;
        let hasher = Hasher::new(&config.hash).expect("valid test params");
        Self::from_parts(AuthService::new(db, hasher), Arc::new(config))
    }
}
