//! Database connection supervision.
//!
//! The supervisor owns the process-wide Postgres pool: initial
//! connect-with-retry against a primary endpoint with an optional fallback,
//! a liveness probe that triggers background reconnection, and a bounded
//! close on shutdown. Handlers never see connectivity errors from the
//! reconnect path; while no pool is installed the service runs in limited
//! mode and data routes answer 503.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Retries after the initial attempt within one connect sequence.
const MAX_RETRIES: u32 = 5;
/// Fixed wait between attempts. Deliberately flat: no backoff, no jitter.
const RETRY_INTERVAL: Duration = Duration::from_millis(2000);
/// Grace period before reconnecting after a dropped connection.
const RECONNECT_DELAY: Duration = Duration::from_millis(2000);
/// How often the liveness probe pings the live pool.
const PING_INTERVAL: Duration = Duration::from_secs(10);
/// How long `shutdown` waits for the pool to close before giving up.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the supervisor is in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::Reconnecting => "reconnecting",
            ConnectionPhase::Closed => "closed",
        }
    }
}

/// Why the supervisor believes the connection was lost.
/// A dropped connection gets a short grace period before reconnecting;
/// other errors reconnect immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLoss {
    Errored,
    Disconnected,
}

/// Endpoints and retry policy, injected at construction.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub primary_url: String,
    pub fallback_url: Option<String>,
    pub max_retries: u32,
    pub retry_interval: Duration,
    pub reconnect_delay: Duration,
}

impl ConnectionSettings {
    pub fn new(primary_url: String, fallback_url: Option<String>) -> Self {
        Self {
            primary_url,
            fallback_url,
            max_retries: MAX_RETRIES,
            retry_interval: RETRY_INTERVAL,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// Final outcome of a `connect()` sequence with all endpoints exhausted.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no reachable database instance (all endpoints exhausted)")]
    NoReachableInstance(#[source] sqlx::Error),

    #[error("database connection failed: {0}")]
    Other(#[source] sqlx::Error),
}

fn classify(err: sqlx::Error) -> ConnectError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => {
            ConnectError::NoReachableInstance(err)
        }
        _ => ConnectError::Other(err),
    }
}

/// Seam over the actual pool construction so retry behavior is testable
/// without a database.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, url: &str) -> Result<PgPool, sqlx::Error>;
}

/// Production dialer: a `PgPoolOptions` connect with bounded acquire.
pub struct PgDialer;

#[async_trait]
impl Dialer for PgDialer {
    async fn dial(&self, url: &str) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
    }
}

struct SupervisorInner {
    settings: ConnectionSettings,
    dialer: Box<dyn Dialer>,
    pool: RwLock<Option<PgPool>>,
    phase: RwLock<ConnectionPhase>,
    /// Sole guard serializing reconnect sequences: at most one in flight.
    is_connecting: AtomicBool,
}

/// Owns the lifecycle of the shared Postgres pool. Cheap to clone; all
/// clones share one supervisor.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ConnectionSupervisor {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self::with_dialer(settings, PgDialer)
    }

    pub fn with_dialer(settings: ConnectionSettings, dialer: impl Dialer) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                settings,
                dialer: Box::new(dialer),
                pool: RwLock::new(None),
                phase: RwLock::new(ConnectionPhase::Disconnected),
                is_connecting: AtomicBool::new(false),
            }),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.inner.phase.read().expect("connection phase lock poisoned")
    }

    fn set_phase(&self, phase: ConnectionPhase) {
        *self.inner.phase.write().expect("connection phase lock poisoned") = phase;
    }

    /// The live pool, if any. `None` means limited mode.
    pub fn pool(&self) -> Option<PgPool> {
        self.inner.pool.read().expect("connection pool lock poisoned").clone()
    }

    fn install_pool(&self, pool: PgPool, endpoint: &str) {
        *self.inner.pool.write().expect("connection pool lock poisoned") = Some(pool);
        self.set_phase(ConnectionPhase::Connected);
        info!("database connection established via {endpoint} endpoint");
    }

    /// Establishes the initial connection and spawns the liveness monitor.
    /// A total connect failure is logged, not fatal: the HTTP listener keeps
    /// serving in limited mode.
    pub async fn start(&self) {
        if let Err(e) = self.connect().await {
            error!("could not establish a database connection: {e}; serving in limited mode");
        }
        self.spawn_monitor();
    }

    /// One full connect sequence: the primary endpoint gets a bounded retry
    /// budget; only after it is exhausted does the fallback get one fresh
    /// budget of its own.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        if self.phase() != ConnectionPhase::Reconnecting {
            self.set_phase(ConnectionPhase::Connecting);
        }

        let settings = &self.inner.settings;
        let primary_err = match self.dial_with_retry(&settings.primary_url).await {
            Ok(pool) => {
                self.install_pool(pool, "primary");
                return Ok(());
            }
            Err(e) => e,
        };
        warn!(
            "primary database endpoint exhausted after {} attempts: {primary_err}",
            settings.max_retries + 1
        );

        let Some(fallback_url) = &settings.fallback_url else {
            self.set_phase(ConnectionPhase::Disconnected);
            return Err(classify(primary_err));
        };

        match self.dial_with_retry(fallback_url).await {
            Ok(pool) => {
                self.install_pool(pool, "fallback");
                Ok(())
            }
            Err(e) => {
                warn!(
                    "fallback database endpoint exhausted after {} attempts: {e}",
                    settings.max_retries + 1
                );
                self.set_phase(ConnectionPhase::Disconnected);
                Err(classify(e))
            }
        }
    }

    /// Sequential bounded attempts against one endpoint with a fixed wait
    /// between them: at most `max_retries + 1` dials, then the last error.
    async fn dial_with_retry(&self, url: &str) -> Result<PgPool, sqlx::Error> {
        let settings = &self.inner.settings;
        let mut attempt: u32 = 0;
        loop {
            match self.inner.dialer.dial(url).await {
                Ok(pool) => return Ok(pool),
                Err(e) if attempt < settings.max_retries => {
                    attempt += 1;
                    warn!(
                        "database connection attempt {attempt}/{} failed: {e}; retrying in {:?}",
                        settings.max_retries, settings.retry_interval
                    );
                    tokio::time::sleep(settings.retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reacts to a connection-loss notification. If a reconnect sequence is
    /// already in flight the notification is dropped; otherwise a background
    /// `connect()` is spawned whose failure is logged, never propagated.
    /// Returns whether a reconnect was started.
    pub fn notify_connection_lost(&self, reason: ConnectionLoss) -> bool {
        if self
            .inner
            .is_connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("reconnect already in progress; dropping {reason:?} notification");
            return false;
        }

        self.set_phase(ConnectionPhase::Reconnecting);
        warn!("database connection lost ({reason:?}); reconnecting in the background");

        let supervisor = self.clone();
        tokio::spawn(async move {
            if reason == ConnectionLoss::Disconnected {
                tokio::time::sleep(supervisor.inner.settings.reconnect_delay).await;
            }
            match supervisor.connect().await {
                Ok(()) => info!("database connection re-established"),
                Err(e) => error!("background reconnect failed: {e}"),
            }
            supervisor.inner.is_connecting.store(false, Ordering::SeqCst);
        });
        true
    }

    /// Periodic `SELECT 1` against the live pool. A failed probe is the
    /// connection-loss signal that drives background reconnection.
    fn spawn_monitor(&self) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(PING_INTERVAL).await;
                if supervisor.phase() == ConnectionPhase::Closed {
                    break;
                }
                let Some(pool) = supervisor.pool() else {
                    continue;
                };
                if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
                    warn!("database liveness probe failed: {e}");
                    let reason = match e {
                        sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
                            ConnectionLoss::Disconnected
                        }
                        _ => ConnectionLoss::Errored,
                    };
                    supervisor.notify_connection_lost(reason);
                }
            }
        });
    }

    /// Closes the pool within a bounded window. The caller decides the exit
    /// code: 0 on a clean close, 1 otherwise.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.set_phase(ConnectionPhase::Closed);
        let pool = self
            .inner
            .pool
            .write()
            .expect("connection pool lock poisoned")
            .take();
        if let Some(pool) = pool {
            tokio::time::timeout(CLOSE_TIMEOUT, pool.close())
                .await
                .map_err(|_| anyhow!("timed out closing the database connection pool"))?;
            info!("database connection pool closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Dialer that always fails, recording every URL it was asked to dial.
    struct FailingDialer {
        calls: Arc<Mutex<Vec<String>>>,
        delay: Duration,
    }

    impl FailingDialer {
        fn new(delay: Duration) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    calls: calls.clone(),
                    delay,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Dialer for FailingDialer {
        async fn dial(&self, url: &str) -> Result<PgPool, sqlx::Error> {
            self.calls.lock().unwrap().push(url.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }

    fn fast_settings(fallback: Option<&str>) -> ConnectionSettings {
        ConnectionSettings {
            primary_url: "postgres://primary/db".to_string(),
            fallback_url: fallback.map(str::to_string),
            max_retries: 2,
            retry_interval: Duration::from_millis(1),
            reconnect_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn dial_with_retry_is_bounded() {
        let (dialer, calls) = FailingDialer::new(Duration::ZERO);
        let supervisor = ConnectionSupervisor::with_dialer(fast_settings(None), dialer);

        let result = supervisor.dial_with_retry("postgres://primary/db").await;
        assert!(result.is_err());
        // max_retries = 2 means 3 dials total: initial + 2 retries.
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn fallback_is_tried_once_with_its_own_budget() {
        let (dialer, calls) =
            FailingDialer::new(Duration::ZERO);
        let supervisor = ConnectionSupervisor::with_dialer(
            fast_settings(Some("postgres://fallback/db")),
            dialer,
        );

        let err = supervisor.connect().await.unwrap_err();
        assert!(matches!(err, ConnectError::NoReachableInstance(_)));
        assert_eq!(supervisor.phase(), ConnectionPhase::Disconnected);

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            [
                "postgres://primary/db",
                "postgres://primary/db",
                "postgres://primary/db",
                "postgres://fallback/db",
                "postgres://fallback/db",
                "postgres://fallback/db",
            ]
        );
    }

    #[tokio::test]
    async fn connect_without_fallback_reports_primary_failure() {
        let (dialer, calls) = FailingDialer::new(Duration::ZERO);
        let supervisor = ConnectionSupervisor::with_dialer(fast_settings(None), dialer);

        let err = supervisor.connect().await.unwrap_err();
        assert!(matches!(err, ConnectError::NoReachableInstance(_)));
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn concurrent_loss_notifications_are_serialized() {
        let (dialer, calls) = FailingDialer::new(Duration::from_millis(30));
        let supervisor = ConnectionSupervisor::with_dialer(fast_settings(None), dialer);

        // First notification wins the guard; the second is dropped while the
        // background sequence is still running.
        assert!(supervisor.notify_connection_lost(ConnectionLoss::Errored));
        assert!(!supervisor.notify_connection_lost(ConnectionLoss::Errored));
        assert_eq!(supervisor.phase(), ConnectionPhase::Reconnecting);

        // Let the background sequence run to exhaustion (3 dials * ~30ms).
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!supervisor.inner.is_connecting.load(Ordering::SeqCst));
        assert_eq!(calls.lock().unwrap().len(), 3);

        // Guard is free again: a fresh loss event starts a new sequence.
        assert!(supervisor.notify_connection_lost(ConnectionLoss::Errored));
    }

    #[tokio::test]
    async fn new_supervisor_starts_disconnected_without_pool() {
        let (dialer, _calls) = FailingDialer::new(Duration::ZERO);
        let supervisor = ConnectionSupervisor::with_dialer(fast_settings(None), dialer);
        assert_eq!(supervisor.phase(), ConnectionPhase::Disconnected);
        assert!(supervisor.pool().is_none());
    }

    #[tokio::test]
    async fn shutdown_without_pool_is_clean() {
        let (dialer, _calls) = FailingDialer::new(Duration::ZERO);
        let supervisor = ConnectionSupervisor::with_dialer(fast_settings(None), dialer);
        assert!(supervisor.shutdown().await.is_ok());
        assert_eq!(supervisor.phase(), ConnectionPhase::Closed);
    }

    #[test]
    fn io_errors_classify_as_unreachable() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(matches!(classify(io), ConnectError::NoReachableInstance(_)));

        let other = sqlx::Error::RowNotFound;
        assert!(matches!(classify(other), ConnectError::Other(_)));
    }
}
