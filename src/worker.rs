use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::adjuster::DynamicAdjuster;
use crate::adjuster::HealthState;
use crate::classify::ResourceGroup;
use crate::config::GroupConfig;
use crate::gcra::Admission;
use crate::gcra::GcraState;
use crate::time::TimeSource;
use crate::waiters::WaiterQueue;

/// Upper bound on worker sleep, so heartbeats stay fresh even when idle
const IDLE_TICK: Duration = Duration::from_millis(500);

/// How often the health monitor inspects its workers
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Heartbeat age at which a live-but-silent worker is replaced
const HEARTBEAT_STALE: Duration = Duration::from_secs(5);

/// Mutable per-group state: admission clock, health and parked callers
///
/// Owned by [`GroupShared`] and mutated only under its mutex. The state is
/// deliberately independent of the worker task so a restarted worker
/// re-attaches to it with nothing lost.
#[derive(Debug)]
pub(crate) struct GroupState {
    pub gcra: GcraState,
    pub health: HealthState,
    pub waiters: WaiterQueue,
}

/// Everything one group's worker, callers and monitor share
#[derive(Debug)]
pub(crate) struct GroupShared {
    pub group: ResourceGroup,
    pub state: Mutex<GroupState>,
    /// Wakes the worker on enqueue, rejection report or restart
    pub notify: Notify,
    /// Last loop iteration of the worker, nanos since the limiter epoch
    pub heartbeat_nanos: AtomicU64,
}

impl GroupShared {
    pub fn new(group: ResourceGroup, config: &GroupConfig) -> Self {
        Self {
            group,
            state: Mutex::new(GroupState { gcra: GcraState::new(config), health: HealthState::new(), waiters: WaiterQueue::new() }),
            notify: Notify::new(),
            heartbeat_nanos: AtomicU64::new(0),
        }
    }
}

/// Spawn the background notifier task for one group
pub(crate) fn spawn_group_worker(
    shared: Arc<GroupShared>,
    adjuster: Arc<DynamicAdjuster>,
    clock: TimeSource,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(run_group_worker(shared, adjuster, clock, running))
}

async fn run_group_worker(shared: Arc<GroupShared>, adjuster: Arc<DynamicAdjuster>, clock: TimeSource, running: Arc<AtomicBool>) {
    debug!(group = %shared.group, "group worker started");

    while running.load(Ordering::Relaxed) {
        let now = clock.now_nanos();
        shared.heartbeat_nanos.store(now, Ordering::Relaxed);

        let sleep_for = service_queue(&shared, &adjuster, now).min(IDLE_TICK);

        tokio::select! {
            _ = shared.notify.notified() => {}
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }

    debug!(group = %shared.group, "group worker exiting");
}

/// Admit as many queue heads as the budget allows right now
///
/// Returns how long the worker should sleep before re-evaluating, derived
/// from the denial's retry hint and the adjuster's next phase event.
fn service_queue(shared: &GroupShared, adjuster: &DynamicAdjuster, now_nanos: u64) -> Duration {
    let mut state = shared.state.lock();
    let next_event = adjuster.advance(shared.group, &mut state.health, now_nanos);

    let mut retry: Option<Duration> = None;
    while !state.waiters.is_empty() {
        let rate_ratio = state.health.rate_ratio;
        match state.gcra.try_admit(now_nanos, rate_ratio) {
            Admission::Admitted => {
                state.waiters.admit_head();
                debug!(group = %shared.group, queued = state.waiters.len(), "waiter admitted");
            }
            Admission::RetryAfter(wait) => {
                retry = Some(wait);
                break;
            }
        }
    }

    let until_event = next_event.map(|at| Duration::from_nanos(at.saturating_sub(now_nanos)));
    match (retry, until_event) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => IDLE_TICK,
    }
}

/// One supervised worker
pub(crate) struct WorkerSlot {
    pub shared: Arc<GroupShared>,
    pub handle: JoinHandle<()>,
}

/// Worker handles, shared between the facade (shutdown, tests) and the
/// health monitor (restart)
pub(crate) struct WorkerSet {
    pub slots: Mutex<Vec<WorkerSlot>>,
}

/// Watchdog that keeps every group worker alive
///
/// A worker that panicked or was aborted leaves its queue and state behind
/// in [`GroupShared`]; the monitor respawns the task and re-attaches it, so
/// parked callers resume without losing their place. A live task whose
/// heartbeat goes stale is aborted and replaced the same way.
pub(crate) struct TaskHealthMonitor {
    pub workers: Arc<WorkerSet>,
    pub adjuster: Arc<DynamicAdjuster>,
    pub clock: TimeSource,
    pub running: Arc<AtomicBool>,
}

impl TaskHealthMonitor {
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        while self.running.load(Ordering::Relaxed) {
            tokio::time::sleep(MONITOR_INTERVAL).await;
            if !self.running.load(Ordering::Relaxed) {
                break;
            }

            let now = self.clock.now_nanos();
            let mut slots = self.workers.slots.lock();
            for slot in slots.iter_mut() {
                if slot.handle.is_finished() {
                    warn!(group = %slot.shared.group, "group worker died, restarting");
                    slot.handle = spawn_group_worker(
                        Arc::clone(&slot.shared),
                        Arc::clone(&self.adjuster),
                        self.clock,
                        Arc::clone(&self.running),
                    );
                    slot.shared.notify.notify_one();
                    continue;
                }

                let heartbeat = slot.shared.heartbeat_nanos.load(Ordering::Relaxed);
                let age = Duration::from_nanos(now.saturating_sub(heartbeat));
                if age > HEARTBEAT_STALE {
                    // Alive but wedged: treat it the same as dead
                    error!(group = %slot.shared.group, age_ms = age.as_millis() as u64, "group worker heartbeat is stale, restarting");
                    slot.handle.abort();
                    slot.handle = spawn_group_worker(
                        Arc::clone(&slot.shared),
                        Arc::clone(&self.adjuster),
                        self.clock,
                        Arc::clone(&self.running),
                    );
                    slot.shared.notify.notify_one();
                }
            }
        }
    }
}
