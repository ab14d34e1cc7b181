//! Reconciliation engine ("auto-sync"): detects drift between the module
//! registry and the modules the shell can actually instantiate.
//!
//! Both the periodic timer and the operator trigger funnel into the same
//! single-flight [`Reconciler::reconcile`]; a call arriving while a pass is
//! running subscribes to that pass's result instead of starting another.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use console_core::types::{CapabilitySet, DriftConflict, ModuleStatus, ReconciliationReport, CAP_ALL};
use console_core::{ConsoleError, ConsoleResult};
use console_registry::ModuleRegistry;
use console_shell::ModuleHost;

/// Drift detector between declared (registry) and observed (host) modules.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<ModuleRegistry>,
    host: Arc<ModuleHost>,
    probe_timeout: Duration,
    report_history: usize,
    reports: Mutex<VecDeque<ReconciliationReport>>,
    in_flight: tokio::sync::Mutex<Option<watch::Receiver<Option<ReconciliationReport>>>>,
}

impl Reconciler {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        host: Arc<ModuleHost>,
        probe_timeout: Duration,
        report_history: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                host,
                probe_timeout,
                report_history,
                reports: Mutex::new(VecDeque::new()),
                in_flight: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Run one reconciliation pass, or join the pass already in flight.
    /// Every caller observes the same report for a coalesced run.
    pub async fn reconcile(&self) -> ReconciliationReport {
        let mut rx = {
            let mut slot = self.inner.in_flight.lock().await;
            // A receiver holding a value belongs to a pass that already
            // finished; only coalesce into runs still in flight.
            let in_flight = slot.as_ref().filter(|rx| rx.borrow().is_none()).cloned();
            if let Some(rx) = in_flight {
                debug!("reconcile requested while a pass is in flight, coalescing");
                rx
            } else {
                let (tx, rx) = watch::channel(None);
                *slot = Some(rx.clone());
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    let report = inner.run_pass().await;
                    // The slot keeps the completed receiver; the staleness
                    // check above retires it on the next trigger.
                    let _ = tx.send(Some(report));
                });
                rx
            }
        };

        loop {
            if let Some(report) = (*rx.borrow_and_update()).clone() {
                return report;
            }
            if rx.changed().await.is_err() {
                // The publishing task went away without a result; fall back
                // to a direct pass rather than hanging the caller.
                return self.inner.run_pass().await;
            }
        }
    }

    /// Operator trigger. Restricted to sessions holding the `"all"`
    /// capability; returns the pass's report.
    pub async fn force_reconcile(
        &self,
        capabilities: &CapabilitySet,
    ) -> ConsoleResult<ReconciliationReport> {
        if !capabilities.allows(CAP_ALL) {
            return Err(ConsoleError::PermissionDenied {
                module: "auto-sync".to_string(),
                required: CAP_ALL.to_string(),
            });
        }
        Ok(self.reconcile().await)
    }

    /// Periodic timer invoking the same coalesced operation.
    pub fn spawn_periodic(&self, interval: Duration) -> JoinHandle<()> {
        let reconciler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = reconciler.reconcile().await;
                if !report.is_clean() {
                    info!(conflicts = report.conflicts.len(), "periodic reconciliation found drift");
                }
            }
        })
    }

    /// Retained reports, newest first.
    pub fn reports(&self) -> Vec<ReconciliationReport> {
        self.inner.reports.lock().iter().rev().cloned().collect()
    }

    pub fn latest_report(&self) -> Option<ReconciliationReport> {
        self.inner.reports.lock().back().cloned()
    }
}

impl Inner {
    async fn run_pass(&self) -> ReconciliationReport {
        let run_at = Utc::now();
        let mut conflicts = Vec::new();

        for descriptor in self.registry.list() {
            let observed = self.observe(&descriptor.id).await;
            if observed == descriptor.status {
                continue;
            }
            conflicts.push(DriftConflict {
                module_id: descriptor.id.clone(),
                declared: descriptor.status,
                observed,
            });
            if let Err(e) = self.registry.update_status(&descriptor.id, observed, run_at) {
                // The descriptor vanished mid-pass; record and move on.
                warn!(module_id = %descriptor.id, error = %e, "status update failed");
            }
        }

        let report = ReconciliationReport {
            id: Uuid::new_v4(),
            run_at,
            conflicts,
        };
        info!(
            report_id = %report.id,
            conflicts = report.conflicts.len(),
            "reconciliation pass complete"
        );

        let mut reports = self.reports.lock();
        reports.push_back(report.clone());
        while reports.len() > self.report_history {
            reports.pop_front();
        }
        report
    }

    /// Observe one module. Failures are isolated here: a probe error or
    /// timeout yields `Broken` for this module only, never a pass failure.
    async fn observe(&self, id: &str) -> ModuleStatus {
        let module = match self.host.get(id) {
            Some(m) => m,
            None => return ModuleStatus::Inactive,
        };
        match tokio::time::timeout(self.probe_timeout, module.probe()).await {
            Ok(Ok(())) => ModuleStatus::Active,
            Ok(Err(e)) => {
                warn!(module_id = %id, error = %e, "module probe failed");
                ModuleStatus::Broken
            }
            Err(_) => {
                warn!(module_id = %id, timeout_ms = self.probe_timeout.as_millis() as u64, "module probe timed out");
                ModuleStatus::Broken
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use console_core::types::{Manifest, ManifestEntry};
    use console_shell::{ConsoleModule, FailingModule, ProbeFuture, StubModule};

    struct SlowModule {
        id: String,
        delay: Duration,
    }

    impl ConsoleModule for SlowModule {
        fn id(&self) -> &str {
            &self.id
        }

        fn probe(&self) -> ProbeFuture<'_> {
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(())
            })
        }
    }

    fn manifest_of(ids: &[&str]) -> Manifest {
        Manifest {
            modules: ids
                .iter()
                .map(|id| ManifestEntry {
                    id: id.to_string(),
                    display_name: id.to_uppercase(),
                    required_capability: id.to_string(),
                    version: "1.0.0".to_string(),
                    dependencies: Vec::new(),
                })
                .collect(),
        }
    }

    fn reconciler_for(
        ids: &[&str],
        host: Arc<ModuleHost>,
        probe_timeout: Duration,
    ) -> (Arc<ModuleRegistry>, Reconciler) {
        let registry = Arc::new(ModuleRegistry::from_manifest(manifest_of(ids)).unwrap());
        let reconciler = Reconciler::new(Arc::clone(&registry), host, probe_timeout, 16);
        (registry, reconciler)
    }

    #[tokio::test]
    async fn test_declared_but_absent_goes_inactive() {
        let host = Arc::new(ModuleHost::new());
        host.register(StubModule::new("users"));
        let (registry, reconciler) =
            reconciler_for(&["users", "legacy"], host, Duration::from_millis(500));

        let report = reconciler.reconcile().await;
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].module_id, "legacy");
        assert_eq!(report.conflicts[0].declared, ModuleStatus::Active);
        assert_eq!(report.conflicts[0].observed, ModuleStatus::Inactive);
        assert_eq!(registry.get("legacy").unwrap().status, ModuleStatus::Inactive);
        assert_eq!(registry.get("users").unwrap().status, ModuleStatus::Active);
    }

    #[tokio::test]
    async fn test_failing_probe_isolated_as_broken() {
        let host = Arc::new(ModuleHost::new());
        host.register(StubModule::new("users"));
        host.register(FailingModule::new("polls", "schema migration pending"));
        let (registry, reconciler) =
            reconciler_for(&["users", "polls"], host, Duration::from_millis(500));

        let report = reconciler.reconcile().await;
        // The failure is contained to "polls"; "users" is still checked.
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(registry.get("polls").unwrap().status, ModuleStatus::Broken);
        assert_eq!(registry.get("users").unwrap().status, ModuleStatus::Active);
    }

    #[tokio::test]
    async fn test_slow_probe_times_out_as_broken() {
        let host = Arc::new(ModuleHost::new());
        host.register(Arc::new(SlowModule {
            id: "analytics".into(),
            delay: Duration::from_secs(5),
        }));
        let (registry, reconciler) =
            reconciler_for(&["analytics"], host, Duration::from_millis(20));

        let report = reconciler.reconcile().await;
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(
            registry.get("analytics").unwrap().status,
            ModuleStatus::Broken
        );
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce_into_one_pass() {
        let host = Arc::new(ModuleHost::new());
        host.register(Arc::new(SlowModule {
            id: "users".into(),
            delay: Duration::from_millis(50),
        }));
        let (_registry, reconciler) =
            reconciler_for(&["users"], host, Duration::from_millis(500));

        let (a, b) = tokio::join!(reconciler.reconcile(), reconciler.reconcile());
        assert_eq!(a.id, b.id);
        // Exactly one underlying pass ran.
        assert_eq!(reconciler.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_after_completion_is_fresh() {
        let host = Arc::new(ModuleHost::new());
        host.register(StubModule::new("users"));
        let (_registry, reconciler) =
            reconciler_for(&["users"], host, Duration::from_millis(500));

        let first = reconciler.reconcile().await;
        let second = reconciler.reconcile().await;
        assert_ne!(first.id, second.id);
        assert_eq!(reconciler.reports().len(), 2);
        assert_eq!(reconciler.latest_report().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_idempotent_once_converged() {
        let host = Arc::new(ModuleHost::new());
        host.register(StubModule::new("users"));
        let (_registry, reconciler) =
            reconciler_for(&["users", "legacy"], host, Duration::from_millis(500));

        let first = reconciler.reconcile().await;
        assert_eq!(first.conflicts.len(), 1);
        // Drift already applied; a second pass reports clean.
        let second = reconciler.reconcile().await;
        assert!(second.is_clean());
    }

    #[tokio::test]
    async fn test_report_history_bounded() {
        let host = Arc::new(ModuleHost::new());
        host.register(StubModule::new("users"));
        let registry = Arc::new(ModuleRegistry::from_manifest(manifest_of(&["users"])).unwrap());
        let reconciler = Reconciler::new(registry, host, Duration::from_millis(500), 3);

        for _ in 0..5 {
            reconciler.reconcile().await;
        }
        assert_eq!(reconciler.reports().len(), 3);
    }

    #[tokio::test]
    async fn test_force_reconcile_requires_all_capability() {
        let host = Arc::new(ModuleHost::new());
        host.register(StubModule::new("users"));
        let (_registry, reconciler) =
            reconciler_for(&["users"], host, Duration::from_millis(500));

        let operator = console_access::resolve(console_core::types::Role::Admin);
        assert!(reconciler.force_reconcile(&operator).await.is_ok());

        let moderator = console_access::resolve(console_core::types::Role::Moderator);
        let err = reconciler.force_reconcile(&moderator).await.unwrap_err();
        assert!(matches!(err, ConsoleError::PermissionDenied { .. }));
    }
}
