use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::adjuster::DynamicAdjuster;
use crate::adjuster::RecoveryPhase;
use crate::classify::GroupClassifier;
use crate::classify::ResourceGroup;
use crate::config::LimiterConfig;
use crate::error::AdmissionError;
use crate::error::Result;
use crate::gcra::Admission;
use crate::time::TimeSource;
use crate::worker::GroupShared;
use crate::worker::GroupState;
use crate::worker::TaskHealthMonitor;
use crate::worker::WorkerSet;
use crate::worker::WorkerSlot;
use crate::worker::spawn_group_worker;

/// Read-only snapshot of one group, for observability only
#[derive(Debug, Clone)]
pub struct GroupStatus {
    pub group: ResourceGroup,
    /// Current throttle multiplier (1.0 = nominal)
    pub rate_ratio: f64,
    /// Parked callers
    pub queue_depth: usize,
    pub phase: RecoveryPhase,
    /// How long the head waiter has been parked
    pub oldest_wait: Option<Duration>,
}

/// Adaptive admission controller for outbound exchange API calls
///
/// One instance gates a whole process: construct it once at startup and
/// hand out clones (cheap, `Arc`-backed). Construction spawns one
/// background worker per configured group plus a health monitor, so it must
/// happen inside a tokio runtime.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    classifier: GroupClassifier,
    groups: BTreeMap<ResourceGroup, Arc<GroupShared>>,
    adjuster: Arc<DynamicAdjuster>,
    clock: TimeSource,
    acquire_timeout: Duration,
    running: Arc<AtomicBool>,
    workers: Arc<WorkerSet>,
    monitor: JoinHandle<()>,
}

impl RateLimiter {
    /// Build the limiter and spawn its background workers
    ///
    /// Fails fatally on any configuration error; nothing is spawned in that
    /// case.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        config.validate()?;

        let default_group = config.default_group.ok_or_else(|| AdmissionError::InvalidConfig("default_group is required".to_string()))?;
        let classifier = GroupClassifier::new(config.rules.clone(), default_group);

        let clock = TimeSource::new();
        let running = Arc::new(AtomicBool::new(true));
        let adjuster = Arc::new(DynamicAdjuster::new(&config));

        let mut groups = BTreeMap::new();
        for (group, group_config) in &config.groups {
            groups.insert(*group, Arc::new(GroupShared::new(*group, group_config)));
        }

        let slots = groups
            .values()
            .map(|shared| WorkerSlot {
                shared: Arc::clone(shared),
                handle: spawn_group_worker(Arc::clone(shared), Arc::clone(&adjuster), clock, Arc::clone(&running)),
            })
            .collect();
        let workers = Arc::new(WorkerSet { slots: Mutex::new(slots) });

        let monitor = TaskHealthMonitor {
            workers: Arc::clone(&workers),
            adjuster: Arc::clone(&adjuster),
            clock,
            running: Arc::clone(&running),
        }
        .spawn();

        info!(groups = groups.len(), "rate limiter started");

        Ok(Self {
            inner: Arc::new(Inner {
                classifier,
                groups,
                adjuster,
                clock,
                acquire_timeout: config.acquire_timeout(),
                running,
                workers,
                monitor,
            }),
        })
    }

    /// Suspend until the operation is admitted or the acquire timeout
    /// elapses
    pub async fn acquire(&self, path: &str, method: &str) -> Result<()> {
        let group = self.inner.classifier.classify(path, method);
        self.acquire_group(group).await
    }

    /// [`acquire`](Self::acquire) for a pre-resolved group tag
    pub async fn acquire_group(&self, group: ResourceGroup) -> Result<()> {
        let inner = &self.inner;
        if !inner.running.load(Ordering::Relaxed) {
            return Err(AdmissionError::Shutdown);
        }
        let shared = inner.shared_for(group)?;

        let now = inner.clock.now_nanos();
        let (id, mut rx) = {
            let mut state = shared.state.lock();
            inner.adjuster.advance(group, &mut state.health, now);

            // Fast path only when nobody is parked, otherwise a newcomer
            // would jump the FIFO queue.
            if state.waiters.is_empty() {
                let rate_ratio = state.health.rate_ratio;
                if let Admission::Admitted = state.gcra.try_admit(now, rate_ratio) {
                    return Ok(());
                }
            }
            state.waiters.enqueue(now)
        };
        shared.notify.notify_one();

        // Removes the queue entry if this future is dropped mid-wait
        let guard = WaiterGuard { shared: Arc::clone(shared), id, armed: true };

        match tokio::time::timeout(inner.acquire_timeout, &mut rx).await {
            Ok(Ok(())) => {
                guard.disarm();
                Ok(())
            }
            Ok(Err(_)) => {
                // Sender dropped without signalling: shutdown drained the
                // queue.
                guard.disarm();
                Err(AdmissionError::Shutdown)
            }
            Err(_) => {
                let removed = shared.state.lock().waiters.remove(id);
                guard.disarm();
                if removed {
                    Err(AdmissionError::AcquireTimeout(inner.acquire_timeout))
                } else {
                    // Admission won the race: the signal was sent under the
                    // lock before the entry disappeared, so it is ready now.
                    match rx.try_recv() {
                        Ok(()) => Ok(()),
                        Err(_) => Err(AdmissionError::Shutdown),
                    }
                }
            }
        }
    }

    /// Non-blocking admission attempt
    pub fn try_acquire(&self, path: &str, method: &str) -> Result<()> {
        let group = self.inner.classifier.classify(path, method);
        self.try_acquire_group(group)
    }

    /// [`try_acquire`](Self::try_acquire) for a pre-resolved group tag
    pub fn try_acquire_group(&self, group: ResourceGroup) -> Result<()> {
        let inner = &self.inner;
        if !inner.running.load(Ordering::Relaxed) {
            return Err(AdmissionError::Shutdown);
        }
        let shared = inner.shared_for(group)?;

        let now = inner.clock.now_nanos();
        let mut state = shared.state.lock();
        inner.adjuster.advance(group, &mut state.health, now);

        if !state.waiters.is_empty() {
            return Err(AdmissionError::Exceeded);
        }
        let rate_ratio = state.health.rate_ratio;
        match state.gcra.try_admit(now, rate_ratio) {
            Admission::Admitted => Ok(()),
            Admission::RetryAfter(_) => Err(AdmissionError::Exceeded),
        }
    }

    /// Report a provider-side rate-limit rejection for the operation
    ///
    /// Fire-and-forget from the transport layer's point of view: takes the
    /// group lock briefly, never suspends.
    pub fn report_rejection(&self, path: &str, method: &str) -> Result<()> {
        let group = self.inner.classifier.classify(path, method);
        self.report_rejection_group(group)
    }

    /// [`report_rejection`](Self::report_rejection) for a pre-resolved
    /// group tag
    pub fn report_rejection_group(&self, group: ResourceGroup) -> Result<()> {
        let inner = &self.inner;
        let shared = inner.shared_for(group)?;

        let now = inner.clock.now_nanos();
        {
            let mut state = shared.state.lock();
            let GroupState { gcra, health, .. } = &mut *state;
            inner.adjuster.on_rejection(group, gcra, health, now);
        }
        // The group's TAT may have jumped; let the worker recompute its
        // sleep.
        shared.notify.notify_one();
        Ok(())
    }

    /// Per-group snapshot of ratio, queue depth and phase
    pub fn status(&self) -> Vec<GroupStatus> {
        let inner = &self.inner;
        let now = inner.clock.now_nanos();

        inner
            .groups
            .values()
            .map(|shared| {
                let state = shared.state.lock();
                GroupStatus {
                    group: shared.group,
                    rate_ratio: state.health.rate_ratio,
                    queue_depth: state.waiters.len(),
                    phase: state.health.phase,
                    oldest_wait: state.waiters.oldest_enqueued_nanos().map(|at| Duration::from_nanos(now.saturating_sub(at))),
                }
            })
            .collect()
    }

    /// Stop workers and fail all parked callers with
    /// [`AdmissionError::Shutdown`]
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    #[cfg(test)]
    pub(crate) fn kill_worker(&self, group: ResourceGroup) {
        let slots = self.inner.workers.slots.lock();
        for slot in slots.iter() {
            if slot.shared.group == group {
                slot.handle.abort();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn queue_depth(&self, group: ResourceGroup) -> usize {
        self.inner.groups.get(&group).map(|shared| shared.state.lock().waiters.len()).unwrap_or(0)
    }
}

impl Inner {
    fn shared_for(&self, group: ResourceGroup) -> Result<&Arc<GroupShared>> {
        self.groups.get(&group).ok_or(AdmissionError::UnknownGroup(group))
    }

    fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.monitor.abort();
            for slot in self.workers.slots.lock().iter() {
                slot.handle.abort();
            }
            for shared in self.groups.values() {
                shared.state.lock().waiters.clear();
                shared.notify.notify_one();
            }
            info!("rate limiter shut down");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WaiterGuard {
    shared: Arc<GroupShared>,
    id: u64,
    armed: bool,
}

impl WaiterGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        if self.armed {
            self.shared.state.lock().waiters.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;
    use crate::classify::EndpointRule;
    use crate::config::GroupConfig;

    fn test_config() -> LimiterConfig {
        let mut groups = BTreeMap::new();
        groups.insert(ResourceGroup::PublicRead, GroupConfig::new(10, 1_000));
        groups.insert(ResourceGroup::PrivateOrder, GroupConfig::new(2, 1_000));

        let rules = vec![EndpointRule::prefix("/api/v3/order", ResourceGroup::PrivateOrder)];
        let mut config = LimiterConfig::new(groups, rules, ResourceGroup::PublicRead);
        config.acquire_timeout_ms = 5_000;
        config.cooldown_ms = 60_000;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_example_scenario_burst_then_paced_admissions() {
        // capacity=10, period=1000ms, increment=100ms, 15 concurrent calls
        let limiter = RateLimiter::new(test_config()).expect("valid config");

        let start = Instant::now();
        let completions: Arc<Mutex<Vec<(usize, Duration)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..15 {
            let limiter = limiter.clone();
            let completions = Arc::clone(&completions);
            handles.push(tokio::spawn(async move {
                limiter.acquire("/api/v3/depth", "GET").await.expect("admitted within timeout");
                completions.lock().push((i, start.elapsed()));
            }));
            // Deterministic enqueue order
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.expect("task completes");
        }

        let completions = completions.lock();
        assert_eq!(completions.len(), 15);

        // FIFO: completion order matches submission order
        let order: Vec<usize> = completions.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, (0..15).collect::<Vec<_>>());

        // First 10 ride the burst; the rest are paced one increment apart
        for (_, elapsed) in completions.iter().take(10) {
            assert!(*elapsed < Duration::from_millis(50), "burst admission took {elapsed:?}");
        }
        for (k, (_, elapsed)) in completions.iter().enumerate().skip(10) {
            let expected = Duration::from_millis(100 * (k as u64 - 9));
            assert!(*elapsed >= expected && *elapsed < expected + Duration::from_millis(50), "waiter {k} admitted at {elapsed:?}, expected ~{expected:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout_is_typed() {
        let limiter = RateLimiter::new(test_config()).expect("valid config");

        // PrivateOrder: burst of 2, then 500ms per call; the fourth caller
        // cannot be served within a 1s wait
        for _ in 0..2 {
            limiter.acquire_group(ResourceGroup::PrivateOrder).await.expect("burst admission");
        }
        limiter.report_rejection_group(ResourceGroup::PrivateOrder).expect("known group");

        let result = tokio::time::timeout(Duration::from_secs(10), limiter.acquire_group(ResourceGroup::PrivateOrder)).await.expect("acquire returns");
        assert!(matches!(result, Err(AdmissionError::AcquireTimeout(_))));
        assert_eq!(limiter.queue_depth(ResourceGroup::PrivateOrder), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_freezes_group_for_cooldown() {
        let limiter = RateLimiter::new(test_config()).expect("valid config");

        limiter.try_acquire("/api/v3/order", "POST").expect("budget available");
        limiter.report_rejection("/api/v3/order", "POST").expect("known group");

        let status = limiter.status();
        let order = status.iter().find(|s| s.group == ResourceGroup::PrivateOrder).expect("group present");
        assert_eq!(order.phase, RecoveryPhase::Throttled);
        assert_eq!(order.rate_ratio, 0.5);

        // Frozen until the 60s cooldown has elapsed
        assert!(matches!(limiter.try_acquire_group(ResourceGroup::PrivateOrder), Err(AdmissionError::Exceeded)));
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(matches!(limiter.try_acquire_group(ResourceGroup::PrivateOrder), Err(AdmissionError::Exceeded)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        limiter.try_acquire_group(ResourceGroup::PrivateOrder).expect("admitted after cooldown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_acquires_leave_no_residue() {
        let limiter = RateLimiter::new(test_config()).expect("valid config");

        // Saturate the group so every new acquire parks
        for _ in 0..2 {
            limiter.acquire_group(ResourceGroup::PrivateOrder).await.expect("burst admission");
        }
        limiter.report_rejection_group(ResourceGroup::PrivateOrder).expect("known group");

        for _ in 0..10_000 {
            let clone = limiter.clone();
            let handle = tokio::spawn(async move { clone.acquire_group(ResourceGroup::PrivateOrder).await });
            tokio::task::yield_now().await;
            handle.abort();
            let _ = handle.await;
        }

        assert_eq!(limiter.queue_depth(ResourceGroup::PrivateOrder), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_restart_resumes_parked_waiters() {
        let limiter = RateLimiter::new(test_config()).expect("valid config");

        for _ in 0..2 {
            limiter.acquire_group(ResourceGroup::PrivateOrder).await.expect("burst admission");
        }

        let clone = limiter.clone();
        let waiter = tokio::spawn(async move { clone.acquire_group(ResourceGroup::PrivateOrder).await });
        tokio::task::yield_now().await;
        assert_eq!(limiter.queue_depth(ResourceGroup::PrivateOrder), 1);

        limiter.kill_worker(ResourceGroup::PrivateOrder);

        // Monitor restarts the worker; the waiter is admitted once the
        // budget frees up, well inside the acquire timeout
        waiter.await.expect("task completes").expect("admitted after restart");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_group_surfaces_immediately() {
        let mut groups = BTreeMap::new();
        groups.insert(ResourceGroup::PublicRead, GroupConfig::new(10, 1_000));
        let limiter = RateLimiter::new(LimiterConfig::new(groups, Vec::new(), ResourceGroup::PublicRead)).expect("valid config");

        assert!(matches!(limiter.acquire_group(ResourceGroup::Streaming).await, Err(AdmissionError::UnknownGroup(ResourceGroup::Streaming))));
        assert!(matches!(limiter.report_rejection_group(ResourceGroup::Streaming), Err(AdmissionError::UnknownGroup(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_parked_waiters() {
        let limiter = RateLimiter::new(test_config()).expect("valid config");

        for _ in 0..2 {
            limiter.acquire_group(ResourceGroup::PrivateOrder).await.expect("burst admission");
        }
        limiter.report_rejection_group(ResourceGroup::PrivateOrder).expect("known group");

        let clone = limiter.clone();
        let waiter = tokio::spawn(async move { clone.acquire_group(ResourceGroup::PrivateOrder).await });
        tokio::task::yield_now().await;

        limiter.shutdown();
        assert!(matches!(waiter.await.expect("task completes"), Err(AdmissionError::Shutdown)));
        assert!(matches!(limiter.acquire_group(ResourceGroup::PrivateOrder).await, Err(AdmissionError::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_queue_depth_and_wait() {
        let limiter = RateLimiter::new(test_config()).expect("valid config");

        for _ in 0..2 {
            limiter.acquire_group(ResourceGroup::PrivateOrder).await.expect("burst admission");
        }
        limiter.report_rejection_group(ResourceGroup::PrivateOrder).expect("known group");

        let clone = limiter.clone();
        let _waiter = tokio::spawn(async move { clone.acquire_group(ResourceGroup::PrivateOrder).await });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        let status = limiter.status();
        let order = status.iter().find(|s| s.group == ResourceGroup::PrivateOrder).expect("group present");
        assert_eq!(order.queue_depth, 1);
        assert!(order.oldest_wait.unwrap_or_default() >= Duration::from_millis(250));

        let public = status.iter().find(|s| s.group == ResourceGroup::PublicRead).expect("group present");
        assert_eq!(public.queue_depth, 0);
        assert_eq!(public.phase, RecoveryPhase::Normal);
    }
}
