//! Runs the reconciler over every registered entity type for one session.
//!
//! Entity types are independent, so they are spread over a bounded pool of
//! scoped worker threads. The first failure lands in a shared slot and cancels
//! the pass token; workers stop picking up new entity types and in-flight ones
//! bail out at their next checkpoint. With a single worker the pass runs
//! inline, strictly in registration order.

use crate::cancel::CancelToken;
use crate::cursor::SyncCursor;
use crate::entity::{EntitySync, SyncContext};
use crate::error::{EntityFailure, SyncError, SyncFailure};
use crate::reconcile::{ApplyPolicy, Reconciler};
use crate::registry::Registry;
use crate::report::{EntityReport, SyncReport};
use crate::Timestamp;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default number of entity types synced at the same time.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Tunables for a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound on concurrently synced entity types; 1 means sequential
    pub max_workers: usize,
    pub apply_policy: ApplyPolicy,
    /// Deadline for the whole pass, on top of the caller's token
    pub timeout: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            apply_policy: ApplyPolicy::FailFast,
            timeout: None,
        }
    }
}

impl SyncOptions {
    pub fn sequential() -> Self {
        Self {
            max_workers: 1,
            ..Self::default()
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_apply_policy(mut self, policy: ApplyPolicy) -> Self {
        self.apply_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Syncs all registered entity types of one session.
#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    registry: Arc<Registry>,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one pass. Either every entity type succeeded and the report lists
    /// them in registration order, or exactly one failure names the session,
    /// the entity type and the cause.
    pub fn sync(&self, session_id: &str, cancel: &CancelToken) -> Result<SyncReport, SyncFailure> {
        let pass = match self.options.timeout {
            Some(timeout) => cancel.child_with_timeout(timeout),
            None => cancel.child(),
        };
        let reconciler = Reconciler::new(self.options.apply_policy);
        let entries: Vec<&Arc<dyn EntitySync>> = self.registry.iter().collect();
        let workers = self.options.max_workers.clamp(1, entries.len().max(1));
        let started = Instant::now();

        let span = tracing::info_span!("sync_pass", session_id);
        let _enter = span.enter();
        tracing::info!(entity_types = entries.len(), workers, "sync pass starting");

        let result = if workers == 1 {
            run_sequential(&entries, session_id, &pass, &reconciler)
        } else {
            run_pooled(&entries, session_id, &pass, &reconciler, workers, &span)
        };

        match result {
            Ok(entity_types) => {
                let report = SyncReport {
                    session_id: session_id.to_string(),
                    entity_types,
                };
                tracing::info!(
                    uploaded = report.uploaded(),
                    downloaded = report.downloaded(),
                    skipped = report.skipped(),
                    malformed = report.malformed(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sync pass complete"
                );
                Ok(report)
            }
            Err(failure) => {
                tracing::error!(
                    entity_type = %failure.entity_type,
                    retryable = failure.cause.is_retryable(),
                    "sync pass failed: {}",
                    failure.cause
                );
                Err(failure)
            }
        }
    }

    /// Run one pass and hand the cursor back, advanced to `now` only if the
    /// pass succeeded.
    pub fn sync_and_advance(
        &self,
        session_id: &str,
        mut cursor: SyncCursor,
        now: Timestamp,
        cancel: &CancelToken,
    ) -> (SyncCursor, Result<SyncReport, SyncFailure>) {
        let result = self.sync(session_id, cancel);
        if result.is_ok() {
            cursor.record_success(now);
        }
        (cursor, result)
    }
}

fn failure(session_id: &str, entity_type: &str, err: EntityFailure) -> SyncFailure {
    SyncFailure {
        session_id: session_id.to_string(),
        entity_type: entity_type.to_string(),
        cause: err.cause,
        report: err.report,
    }
}

fn run_sequential(
    entries: &[&Arc<dyn EntitySync>],
    session_id: &str,
    pass: &CancelToken,
    reconciler: &Reconciler,
) -> Result<Vec<EntityReport>, SyncFailure> {
    let ctx = SyncContext::new(session_id, pass);
    let mut reports = Vec::with_capacity(entries.len());
    for entity in entries {
        let report = entity
            .sync(&ctx, reconciler)
            .map_err(|err| failure(session_id, entity.name(), err))?;
        reports.push(report);
    }
    Ok(reports)
}

fn run_pooled(
    entries: &[&Arc<dyn EntitySync>],
    session_id: &str,
    pass: &CancelToken,
    reconciler: &Reconciler,
    workers: usize,
    span: &tracing::Span,
) -> Result<Vec<EntityReport>, SyncFailure> {
    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<EntityReport>>> = Mutex::new(vec![None; entries.len()]);
    let first_failure: Mutex<Option<SyncFailure>> = Mutex::new(None);

    let worker = || {
        span.in_scope(|| {
            let ctx = SyncContext::new(session_id, pass);
            loop {
                if pass.is_cancelled() {
                    break;
                }
                let i = next.fetch_add(1, Ordering::SeqCst);
                let Some(entity) = entries.get(i) else {
                    break;
                };
                match entity.sync(&ctx, reconciler) {
                    Ok(report) => slots.lock()[i] = Some(report),
                    Err(err) => {
                        let mut slot = first_failure.lock();
                        if slot.is_none() {
                            *slot = Some(failure(session_id, entity.name(), err));
                            pass.cancel();
                        } else {
                            tracing::debug!(entity_type = entity.name(), "stopped: {}", err.cause);
                        }
                        break;
                    }
                }
            }
        })
    };

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(worker);
        }
    });

    if let Some(failure) = first_failure.into_inner() {
        return Err(failure);
    }

    // Nothing failed, but the token may have tripped before every entity
    // type was picked up.
    let slots = slots.into_inner();
    if let Some(i) = slots.iter().position(Option::is_none) {
        let cause = pass.checkpoint().err().unwrap_or(SyncError::Cancelled);
        let report = EntityReport::new(entries[i].name());
        return Err(failure(session_id, entries[i].name(), EntityFailure { cause, report }));
    }
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use crate::store::MemoryStore;
    use crate::{EntityTypeSpec, Record};
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    /// Spin until `done` holds, giving up after a few seconds.
    fn wait_until(done: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn registry(stores: &[(&str, MemoryStore<String>, MemoryStore<String>)]) -> Registry {
        let mut registry = Registry::new();
        for (name, local, remote) in stores {
            registry
                .register(EntityTypeSpec::in_memory(*name, local.clone(), remote.clone()))
                .unwrap();
        }
        registry
    }

    fn stores(n: usize) -> Vec<(String, MemoryStore<String>, MemoryStore<String>)> {
        (0..n)
            .map(|i| {
                let local = MemoryStore::with_records([Record::new(
                    format!("local-{i}"),
                    json!({}),
                    100,
                )]);
                let remote = MemoryStore::with_records([Record::new(
                    format!("remote-{i}"),
                    json!({}),
                    100,
                )]);
                (format!("type_{i}"), local, remote)
            })
            .collect()
    }

    fn borrowed(
        owned: &[(String, MemoryStore<String>, MemoryStore<String>)],
    ) -> Vec<(&str, MemoryStore<String>, MemoryStore<String>)> {
        owned
            .iter()
            .map(|(n, l, r)| (n.as_str(), l.clone(), r.clone()))
            .collect()
    }

    #[test]
    fn report_follows_registration_order() {
        for workers in [1, 3, 8] {
            let owned = stores(6);
            let orchestrator = SyncOrchestrator::new(registry(&borrowed(&owned)))
                .with_options(SyncOptions::default().with_max_workers(workers));

            let report = orchestrator.sync("user-1", &CancelToken::new()).unwrap();

            let names: Vec<_> = report.entity_types.iter().map(|r| r.entity_type.as_str()).collect();
            assert_eq!(names, ["type_0", "type_1", "type_2", "type_3", "type_4", "type_5"]);
            assert_eq!(report.uploaded(), 6);
            assert_eq!(report.downloaded(), 6);
            assert_eq!(report.session_id, "user-1");
        }
    }

    #[test]
    fn sequential_failure_stops_later_types() {
        let owned = stores(3);
        owned[1].2.fail_writes_after(0, SyncError::transport("offline"));
        let orchestrator = SyncOrchestrator::new(registry(&borrowed(&owned)))
            .with_options(SyncOptions::sequential());

        let failure = orchestrator.sync("user-1", &CancelToken::new()).unwrap_err();

        assert_eq!(failure.session_id, "user-1");
        assert_eq!(failure.entity_type, "type_1");
        assert_eq!(failure.cause, SyncError::transport("offline"));
        // type_0 ran, type_2 was never touched.
        assert_eq!(owned[0].2.writes(), 1);
        assert_eq!(owned[2].1.writes(), 0);
        assert_eq!(owned[2].2.writes(), 0);
    }

    #[test]
    fn pooled_failure_is_reported_once() {
        let owned = stores(8);
        owned[5].1.fail_reads(SyncError::persistence("locked"));
        let orchestrator = SyncOrchestrator::new(registry(&borrowed(&owned)))
            .with_options(SyncOptions::default().with_max_workers(4));

        let failure = orchestrator.sync("user-1", &CancelToken::new()).unwrap_err();

        assert_eq!(failure.entity_type, "type_5");
        assert_eq!(failure.cause, SyncError::persistence("locked"));
    }

    #[test]
    fn pooled_failure_stops_in_flight_types() {
        let uploading = Arc::new(AtomicBool::new(false));
        let pushed = Arc::new(AtomicUsize::new(0));

        // Uploads five records, holding the first push until the pass is
        // cancelled.
        let slow: EntityTypeSpec<Record<String>> = {
            let (uploading, pushed) = (Arc::clone(&uploading), Arc::clone(&pushed));
            EntityTypeSpec::new(
                "workout_sessions",
                |_| {
                    Ok((0..5)
                        .map(|i| Record::new(format!("session-{i}"), json!({}), 100))
                        .collect())
                },
                |_| Ok(Snapshot::default()),
                |_, _| Ok(()),
                move |ctx, _| {
                    pushed.fetch_add(1, Ordering::SeqCst);
                    uploading.store(true, Ordering::SeqCst);
                    wait_until(|| ctx.cancel.is_cancelled());
                    Ok(())
                },
            )
        };
        // Fails once the other type is part way through its pushes.
        let failing: EntityTypeSpec<Record<String>> = {
            let uploading = Arc::clone(&uploading);
            EntityTypeSpec::new(
                "workout_sets",
                move |_| {
                    wait_until(|| uploading.load(Ordering::SeqCst));
                    Err(SyncError::transport("connection reset"))
                },
                |_| Ok(Snapshot::default()),
                |_, _| Ok(()),
                |_, _| Ok(()),
            )
        };
        let local: MemoryStore<String> =
            MemoryStore::with_records([Record::new("ex1", json!({}), 100)]);
        let remote: MemoryStore<String> = MemoryStore::new();

        let registry = Registry::new()
            .with(slow)
            .and_then(|r| r.with(failing))
            .and_then(|r| {
                r.with(EntityTypeSpec::in_memory("exercises", local.clone(), remote.clone()))
            })
            .unwrap();
        let orchestrator = SyncOrchestrator::new(registry)
            .with_options(SyncOptions::default().with_max_workers(2));

        let failure = orchestrator.sync("user-1", &CancelToken::new()).unwrap_err();

        assert_eq!(failure.entity_type, "workout_sets");
        assert_eq!(failure.cause, SyncError::transport("connection reset"));
        // The in-flight type stopped at its next checkpoint.
        assert_eq!(pushed.load(Ordering::SeqCst), 1);
        // The type nobody had picked up yet was never touched.
        assert_eq!(local.writes() + remote.writes(), 0);
        assert!(remote.is_empty());
    }

    #[test]
    fn cancelled_caller_token_fails_the_pass() {
        for workers in [1, 4] {
            let owned = stores(2);
            let orchestrator = SyncOrchestrator::new(registry(&borrowed(&owned)))
                .with_options(SyncOptions::default().with_max_workers(workers));
            let token = CancelToken::new();
            token.cancel();

            let failure = orchestrator.sync("user-1", &token).unwrap_err();
            assert_eq!(failure.cause, SyncError::Cancelled);
            assert_eq!(failure.entity_type, "type_0");
            assert_eq!(owned[0].1.writes() + owned[0].2.writes(), 0);
        }
    }

    #[test]
    fn zero_timeout_times_out() {
        let owned = stores(1);
        let orchestrator = SyncOrchestrator::new(registry(&borrowed(&owned)))
            .with_options(SyncOptions::sequential().with_timeout(Duration::ZERO));

        let failure = orchestrator.sync("user-1", &CancelToken::new()).unwrap_err();
        assert_eq!(failure.cause, SyncError::TimedOut);
    }

    #[test]
    fn empty_registry_succeeds() {
        let orchestrator = SyncOrchestrator::new(Registry::new());
        let report = orchestrator.sync("user-1", &CancelToken::new()).unwrap();
        assert!(report.entity_types.is_empty());
        assert!(report.is_idle());
    }

    #[test]
    fn cursor_advances_only_on_success() {
        let owned = stores(2);
        let orchestrator = SyncOrchestrator::new(registry(&borrowed(&owned)));

        let (cursor, result) =
            orchestrator.sync_and_advance("user-1", SyncCursor::default(), 5_000, &CancelToken::new());
        assert!(result.is_ok());
        assert_eq!(cursor.last_sync_at(), 5_000);

        owned[0].2.fail_writes_after(0, SyncError::transport("offline"));
        owned[0].1.upsert(&Record::new("fresh", json!({}), 200)).unwrap();
        let (cursor, result) = orchestrator.sync_and_advance("user-1", cursor, 9_000, &CancelToken::new());
        assert!(result.is_err());
        assert_eq!(cursor.last_sync_at(), 5_000);
    }
}
