//! Single-flight measurement scheduler.
//!
//! Two phases, `Idle` and `Running`. A timer armed for the next top of the
//! hour (or a manual [`Scheduler::run`]) moves Idle to Running and spawns the
//! probe; completion moves back to Idle, re-arms the timer and publishes the
//! outcome. At most one probe is in flight and at most one timer is armed.

use crate::probe::{Probe, ProbeOptions, ProbeResult};
use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 64;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Next top of the hour after `now` on this clock's wall clock. UTC
    /// unless the clock says otherwise.
    fn next_top_of_hour(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_top_of_hour(now, &Utc)
    }
}

/// Wall-clock time in the host's local zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn next_top_of_hour(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_top_of_hour(now, &Local)
    }
}

/// The next instant strictly after `now` whose wall-clock time in `tz` has
/// zero minutes, seconds and milliseconds.
///
/// A local hour skipped by a DST gap is passed over; an hour repeated by a
/// fold resolves to its earliest occurrence.
pub fn next_top_of_hour<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let hour = chrono::Duration::hours(1);
    let local = now.with_timezone(tz).naive_local();
    let Some(mut candidate) = local.date().and_hms_opt(local.hour(), 0, 0) else {
        return now + hour;
    };
    // a DST gap is at most a couple of hours wide
    for _ in 0..4 {
        candidate += hour;
        if let Some(at) = tz.from_local_datetime(&candidate).earliest() {
            let at = at.with_timezone(&Utc);
            if at > now {
                return at;
            }
        }
    }
    now + hour
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    Started,
    Succeeded(Arc<ProbeResult>),
    Failed(Arc<anyhow::Error>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub phase: Phase,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<RunOutcome>,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Timer,
    Manual,
}

struct State {
    phase: Phase,
    timer: Option<JoinHandle<()>>,
    timer_seq: u64,
    next_run_at: Option<DateTime<Utc>>,
    last_outcome: Option<RunOutcome>,
    stopped: bool,
}

struct Inner {
    probe: Arc<dyn Probe>,
    options: ProbeOptions,
    clock: Arc<dyn Clock>,
    runtime: Handle,
    state: Mutex<State>,
    events: broadcast::Sender<RunEvent>,
    idle: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Builds an idle scheduler and arms the first timer.
    ///
    /// Must be called from within a tokio runtime; timers and runs are
    /// spawned onto that runtime.
    pub fn start(probe: Arc<dyn Probe>, options: ProbeOptions, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (idle, _) = watch::channel(true);
        let inner = Arc::new(Inner {
            probe,
            options,
            clock,
            runtime: Handle::current(),
            state: Mutex::new(State {
                phase: Phase::Idle,
                timer: None,
                timer_seq: 0,
                next_run_at: None,
                last_outcome: None,
                stopped: false,
            }),
            events,
            idle,
        });

        {
            let mut state = inner.lock();
            inner.arm(&mut state);
        }
        tracing::info!(
            event = "scheduler_started",
            probe = inner.probe.name(),
            next_run_at = ?inner.lock().next_run_at
        );

        Self { inner }
    }

    /// Starts a run now unless one is in flight. Returns whether a run was
    /// started; a busy scheduler rejects the request without queueing it.
    pub fn run(&self) -> bool {
        self.inner.trigger(Trigger::Manual)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.lock();
        SchedulerStatus {
            phase: state.phase,
            next_run_at: state.next_run_at,
            last_outcome: state.last_outcome.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().phase == Phase::Running
    }

    /// Resolves once no run is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.idle.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    /// Cancels the pending timer and stops re-arming. A run in flight is left
    /// to finish; its outcome is still published.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        state.stopped = true;
        state.next_run_at = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        tracing::info!(
            event = "scheduler_shutdown",
            in_flight = state.phase == Phase::Running
        );
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn trigger(self: &Arc<Self>, trigger: Trigger) -> bool {
        {
            let mut state = self.lock();
            if state.stopped {
                tracing::debug!(event = "run_rejected", ?trigger, reason = "stopped");
                return false;
            }
            if state.phase == Phase::Running {
                tracing::debug!(event = "run_rejected", ?trigger, reason = "in_flight");
                return false;
            }
            state.phase = Phase::Running;
            // idle tracks phase; both only change under the state lock
            self.idle.send_replace(false);
        }

        tracing::info!(event = "run_started", ?trigger, probe = self.probe.name());
        let _ = self.events.send(RunEvent::Started);

        let inner = Arc::clone(self);
        self.runtime.spawn(async move { inner.execute().await });
        true
    }

    async fn execute(self: Arc<Self>) {
        let probe = Arc::clone(&self.probe);
        let options = self.options.clone();
        let outcome = match self
            .runtime
            .spawn(async move { probe.measure(&options).await })
            .await
        {
            Ok(outcome) => outcome,
            Err(join) => Err(anyhow::anyhow!("probe task did not complete: {join}")),
        };

        let finished_at = self.clock.now();
        let (event, record) = match outcome {
            Ok(result) => {
                tracing::info!(
                    event = "run_succeeded",
                    result_id = result.result_id().unwrap_or("<none>")
                );
                let record = RunOutcome {
                    finished_at,
                    succeeded: true,
                    error: None,
                };
                (RunEvent::Succeeded(Arc::new(result)), record)
            }
            Err(e) => {
                tracing::error!(event = "run_failed", error = %e);
                let record = RunOutcome {
                    finished_at,
                    succeeded: false,
                    error: Some(e.to_string()),
                };
                (RunEvent::Failed(Arc::new(e)), record)
            }
        };

        {
            let mut state = self.lock();
            state.phase = Phase::Idle;
            state.last_outcome = Some(record);
            self.arm(&mut state);
            self.idle.send_replace(true);
        }

        if self.events.send(event).is_err() {
            tracing::debug!(event = "run_outcome_unobserved");
        }
    }

    /// Replaces any pending timer with one for the next top of the hour,
    /// derived from the clock's current time.
    fn arm(self: &Arc<Self>, state: &mut State) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.stopped {
            state.next_run_at = None;
            return;
        }

        let now = self.clock.now();
        let at = self.clock.next_top_of_hour(now);
        let wait = (at - now).to_std().unwrap_or_default();

        state.timer_seq += 1;
        state.next_run_at = Some(at);
        let seq = state.timer_seq;
        let weak = Arc::downgrade(self);
        state.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire(seq);
            }
        }));

        tracing::debug!(event = "timer_armed", next_run_at = %at, wait_secs = wait.as_secs());
    }

    fn fire(self: &Arc<Self>, seq: u64) {
        {
            let mut state = self.lock();
            if state.timer_seq != seq || state.stopped {
                return;
            }
            state.timer = None;
            state.next_run_at = None;
        }
        if !self.trigger(Trigger::Timer) {
            tracing::info!(event = "scheduled_run_skipped", reason = "run already in flight");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}
