//! RoutingDaemon implementation.
//!
//! Owns the operational database and the routing manager and drives them
//! from a tokio loop:
//! - drains at most `batch_size` queued requests per tick
//! - logs the introspection dump periodically
//! - stops on request, unregistering the manager

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use vxlan_oper_db::OperDb;

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::RoutingConfig;
use crate::introspect;
use crate::routing::RoutingManager;
use crate::xmpp::XmppAdvertiser;

/// Configuration for the RoutingDaemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDaemonConfig {
    /// Tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Requests applied per tick
    pub batch_size: usize,
    /// Seconds between introspection dumps, 0 to disable
    pub dump_interval_secs: u64,
}

impl Default for RoutingDaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            batch_size: 256,
            dump_interval_secs: 60,
        }
    }
}

impl From<&RoutingConfig> for RoutingDaemonConfig {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            tick_interval_ms: config.tick_interval_ms,
            batch_size: config.batch_size,
            dump_interval_secs: config.dump_interval_secs,
        }
    }
}

/// Stops a running [`RoutingDaemon`] from another task.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        info!("Stopping RoutingDaemon");
        let record = AuditRecord::new(AuditCategory::AdminAction, "RoutingDaemon", "stop_requested")
            .with_outcome(AuditOutcome::Success);
        audit_log!(record);
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct RoutingDaemon {
    config: RoutingDaemonConfig,
    db: Arc<OperDb>,
    manager: Arc<RoutingManager>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for RoutingDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingDaemon")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("pending", &self.db.has_pending())
            .finish()
    }
}

impl RoutingDaemon {
    pub fn new(config: RoutingDaemonConfig, db: Arc<OperDb>, advertiser: Arc<dyn XmppAdvertiser>) -> Self {
        let manager = RoutingManager::new(Arc::clone(&db), advertiser);
        Self {
            config,
            db,
            manager,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn db(&self) -> &Arc<OperDb> {
        &self.db
    }

    pub fn manager(&self) -> &Arc<RoutingManager> {
        &self.manager
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    /// Registers the routing manager with the database.
    pub fn init(&self) -> bool {
        info!("Initializing RoutingDaemon");
        self.manager.register();

        let record = AuditRecord::new(AuditCategory::SystemLifecycle, "RoutingDaemon", "daemon_initialized")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "batch_size": self.config.batch_size,
                "pending": self.db.has_pending(),
            }));
        audit_log!(record);

        self.manager.is_registered()
    }

    /// Applies up to `batch_size` queued requests. Returns how many were
    /// applied.
    pub fn tick(&self) -> usize {
        let mut applied = 0;
        while applied < self.config.batch_size {
            if self.db.process_one().is_none() {
                break;
            }
            applied += 1;
        }
        if applied > 0 {
            debug!("RoutingDaemon: applied {} requests", applied);
        }
        applied
    }

    /// Runs the event loop until [`StopHandle::stop`] is called, then
    /// shuts the manager down.
    pub async fn run(&self) {
        info!("Starting RoutingDaemon event loop");
        self.running.store(true, Ordering::SeqCst);

        let record = AuditRecord::new(AuditCategory::AdminAction, "RoutingDaemon", "event_loop_started")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "tick_interval_ms": self.config.tick_interval_ms,
                "dump_interval_secs": self.config.dump_interval_secs,
            }));
        audit_log!(record);

        let tick_interval = Duration::from_millis(self.config.tick_interval_ms);
        let dump_interval =
            (self.config.dump_interval_secs > 0).then(|| Duration::from_secs(self.config.dump_interval_secs));
        let mut last_dump = Instant::now();

        while self.is_running() {
            self.tick();

            if let Some(interval) = dump_interval {
                if last_dump.elapsed() >= interval {
                    for line in self.dump() {
                        info!("{}", line);
                    }
                    last_dump = Instant::now();
                }
            }

            tokio::time::sleep(tick_interval).await;
        }

        info!("RoutingDaemon event loop stopped");
        self.manager.shutdown();

        let stop_record = AuditRecord::new(AuditCategory::AdminAction, "RoutingDaemon", "event_loop_stopped")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "stats": self.manager.stats(),
            }));
        audit_log!(stop_record);
    }

    /// Dumps state for debugging.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "RoutingDaemon running: {}, pending requests: {}",
            self.is_running(),
            self.db.dump_pending().len()
        )];
        lines.extend(introspect::snapshot(&self.manager).lines());
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmpp::NoOpAdvertiser;
    use pretty_assertions::assert_eq;
    use vxlan_oper_db::{OperDbConfig, VrfEntry};

    fn daemon(batch_size: usize) -> RoutingDaemon {
        let config = RoutingDaemonConfig {
            tick_interval_ms: 1,
            batch_size,
            dump_interval_secs: 0,
        };
        RoutingDaemon::new(
            config,
            Arc::new(OperDb::new(OperDbConfig::default())),
            Arc::new(NoOpAdvertiser),
        )
    }

    #[test]
    fn test_default_config() {
        let config = RoutingDaemonConfig::default();
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.batch_size, 256);
        assert_eq!(RoutingDaemonConfig::from(&RoutingConfig::default()), config);
    }

    #[test]
    fn test_tick_respects_batch_size() {
        let daemon = daemon(2);
        assert!(daemon.init());
        for i in 0..5 {
            daemon.db().add_vrf(VrfEntry::new(format!("vrf{}", i)));
        }

        assert_eq!(daemon.tick(), 2);
        assert_eq!(daemon.tick(), 2);
        assert_eq!(daemon.tick(), 1);
        assert_eq!(daemon.tick(), 0);
        assert_eq!(daemon.manager().listened_vrfs(), 5);
    }

    #[tokio::test]
    async fn test_run_until_stopped() {
        let daemon = Arc::new(daemon(16));
        assert!(daemon.init());
        daemon.db().add_vrf(VrfEntry::new("vrf1"));

        let runner = Arc::clone(&daemon);
        let task = tokio::spawn(async move { runner.run().await });

        while daemon.db().has_pending() || !daemon.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(daemon.manager().listened_vrfs(), 1);

        daemon.stop_handle().stop();
        task.await.unwrap();

        assert!(!daemon.is_running());
        assert!(!daemon.manager().is_registered());
        assert_eq!(daemon.manager().listened_vrfs(), 0);
    }

    #[test]
    fn test_dump() {
        let daemon = daemon(16);
        daemon.init();
        let lines = daemon.dump();
        assert!(lines[0].starts_with("RoutingDaemon running: false"));
        assert!(lines.iter().any(|l| l.contains("logical routers")));
    }
}
