//! PostgreSQL backend: a `deadpool-postgres` pool plus an idle-connection
//! reaper.
//!
//! The pool caps open connections. Idle-count and lifetime limits are enforced
//! by a background task that periodically prunes the idle set. The task only
//! ever sees connections sitting in the pool, never the one a measurement is
//! running on.

use super::{Dialect, Session, Store};
use crate::error::StoreError;
use async_trait::async_trait;
use audience_core::config::{DbConfig, PoolSettings};
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_postgres::NoTls;

const APPLICATION_NAME: &str = "audience-bench";

pub struct PgStore {
    pool: Pool,
    reaper: JoinHandle<()>,
}

impl PgStore {
    /// Build the pool and verify the server answers.
    ///
    /// The pool opens connections lazily, so the trailing ping is what
    /// surfaces DNS, authentication and refused-connection failures.
    pub async fn connect(db: &DbConfig, settings: &PoolSettings) -> Result<Self, StoreError> {
        let mut cfg = Config::new();
        cfg.host = Some(db.host.clone());
        cfg.port = Some(db.port);
        cfg.user = Some(db.user.clone());
        cfg.password = db.password.clone();
        cfg.dbname = Some(db.dbname.clone());
        cfg.application_name = Some(APPLICATION_NAME.to_string());
        cfg.connect_timeout = Some(settings.acquire_timeout);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(settings.max_open);
        pool_cfg.timeouts.wait = Some(settings.acquire_timeout);
        pool_cfg.timeouts.create = Some(settings.acquire_timeout);
        pool_cfg.timeouts.recycle = Some(settings.acquire_timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        log::debug!(
            "Created pool for {}@{}:{}/{} (max open {}, max idle {}, max lifetime {:?})",
            db.user,
            db.host,
            db.port,
            db.dbname,
            settings.max_open,
            settings.max_idle,
            settings.max_lifetime
        );

        let store = Self {
            reaper: spawn_reaper(pool.clone(), *settings),
            pool,
        };
        store.ping().await?;
        Ok(store)
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        self.reaper.abort();
        self.pool.close();
    }
}

/// Interval between reaper passes: a quarter of the lifetime, kept within
/// one to thirty seconds.
fn reap_interval(max_lifetime: Duration) -> Duration {
    (max_lifetime / 4).clamp(Duration::from_secs(1), Duration::from_secs(30))
}

/// Whether an idle connection of the given `age` survives a reaper pass when
/// `kept` idle connections were already retained ahead of it.
fn keeps_idle(age: Duration, kept: usize, settings: &PoolSettings) -> bool {
    age < settings.max_lifetime && kept < settings.max_idle
}

fn spawn_reaper(pool: Pool, settings: PoolSettings) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reap_interval(settings.max_lifetime));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let mut kept = 0usize;
            let result = pool.retain(|_, metrics| {
                let keep = keeps_idle(metrics.age(), kept, &settings);
                if keep {
                    kept += 1;
                }
                keep
            });
            if !result.removed.is_empty() {
                log::debug!(
                    "Reaped {} idle connection(s), {} retained",
                    result.removed.len(),
                    result.retained
                );
            }
        }
    })
}

#[async_trait]
impl Store for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn session(&self) -> Result<Box<dyn Session>, StoreError> {
        let client = self.pool.get().await?;
        Ok(Box::new(PgSession { client }))
    }
}

struct PgSession {
    client: Object,
}

#[async_trait]
impl Session for PgSession {
    async fn query_count(&mut self, sql: &str) -> Result<i64, StoreError> {
        let row = self.client.query_one(sql, &[]).await?;
        Ok(row.try_get::<_, i64>(0)?)
    }

    async fn query_plan(&mut self, explain_sql: &str) -> Result<Vec<String>, StoreError> {
        let rows = self.client.query(explain_sql, &[]).await?;
        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            lines.push(row.try_get::<_, String>(0)?);
        }
        Ok(lines)
    }

    async fn cancel(&mut self) -> Result<(), StoreError> {
        self.client.cancel_token().cancel_query(NoTls).await?;
        Ok(())
    }
}
