//! Process-wide session table with actor-per-session workers
//!
//! Each traveler's session runs on its own tokio task with an exclusive
//! mailbox, giving single-writer discipline per session while sessions
//! stay fully parallel across travelers. Grace-window timers live inside
//! the worker's select loop, so ending a session tears them down with the
//! task - nothing can fire after teardown. Re-planning runs off the
//! mailbox path on a spawned task and reports back as a message.

use crate::domain::route::{PlannedRoute, TravelMode};
use crate::domain::session::{AnomalyEvent, TrackSample, TravelerId};
use crate::infra::{Config, Metrics};
use crate::io::dispatch::DispatchSender;
use crate::io::scorer::SafetyScorer;
use crate::services::escalation::EscalationPolicy;
use crate::services::monitor::GeofenceMonitor;
use crate::services::optimizer::RouteOptimizer;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval};
use tracing::{debug, info, warn};

/// Mailbox capacity per session worker
const SESSION_MAILBOX: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active session for traveler {0}")]
    UnknownSession(TravelerId),
}

/// Messages processed by a session worker, in submission order
enum SessionMsg {
    Sample { sample: TrackSample, reply: oneshot::Sender<Option<AnomalyEvent>> },
    ConfirmSafe { reply: oneshot::Sender<()> },
    RouteReplaced(PlannedRoute),
    End,
}

struct SessionHandle {
    tx: mpsc::Sender<SessionMsg>,
    join: JoinHandle<()>,
}

impl SessionHandle {
    /// Stop the worker and wait for it to finish, guaranteeing timers
    /// and any in-flight re-plan are down before returning.
    async fn shutdown(self) {
        let _ = self.tx.send(SessionMsg::End).await;
        let _ = self.join.await;
    }
}

/// Process-wide table of active tracking sessions, keyed by traveler id
pub struct SessionRegistry {
    sessions: Mutex<FxHashMap<TravelerId, SessionHandle>>,
    scorer: Arc<dyn SafetyScorer>,
    /// Optimizer for periodic re-planning; None disables re-planning
    optimizer: Option<Arc<RouteOptimizer>>,
    dispatch: DispatchSender,
    metrics: Arc<Metrics>,
    policy: EscalationPolicy,
    monitor_config: crate::infra::config::MonitorConfig,
    idle_timeout: Option<Duration>,
    replan_interval: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(
        config: &Config,
        scorer: Arc<dyn SafetyScorer>,
        optimizer: Option<Arc<RouteOptimizer>>,
        dispatch: DispatchSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        let nonzero = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
        Self {
            sessions: Mutex::new(FxHashMap::default()),
            scorer,
            optimizer,
            dispatch,
            metrics,
            policy: EscalationPolicy::from_config(config),
            monitor_config: config.monitor().clone(),
            idle_timeout: nonzero(config.idle_timeout_secs()),
            replan_interval: nonzero(config.replan_interval_secs()),
        }
    }

    /// Start tracking a traveler along a planned route.
    ///
    /// A traveler has at most one live session: an existing one is shut
    /// down first, its timers canceled.
    pub async fn start_session(
        &self,
        traveler: TravelerId,
        planned_route: PlannedRoute,
        mode: TravelMode,
    ) {
        let previous = self.sessions.lock().remove(&traveler);
        if let Some(previous) = previous {
            warn!(traveler = %traveler, "session_replaced");
            previous.shutdown().await;
        }

        let rid = planned_route.rid.clone();
        let confidence = planned_route.confidence;

        let monitor = GeofenceMonitor::new(
            traveler.clone(),
            planned_route,
            self.scorer.clone(),
            self.policy,
            self.monitor_config.clone(),
            self.dispatch.clone(),
            self.metrics.clone(),
        );

        let (tx, rx) = mpsc::channel(SESSION_MAILBOX);
        let worker = SessionWorker {
            traveler: traveler.clone(),
            monitor,
            self_tx: tx.clone(),
            mode,
            optimizer: self.optimizer.clone(),
            dispatch: self.dispatch.clone(),
            metrics: self.metrics.clone(),
            idle_timeout: self.idle_timeout,
            replan_interval: self.replan_interval,
            replan_task: None,
        };
        let join = tokio::spawn(worker.run(rx));

        self.sessions.lock().insert(traveler.clone(), SessionHandle { tx, join });

        self.metrics.record_session_started();
        self.dispatch.send_session_event(&traveler, "started", Some(&rid), Some(confidence));
        info!(traveler = %traveler, rid = %rid, "session_started");
    }

    /// Feed one location sample to a traveler's session, returning the
    /// anomaly it raised, if any.
    pub async fn submit_sample(
        &self,
        traveler: &TravelerId,
        sample: TrackSample,
    ) -> Result<Option<AnomalyEvent>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(traveler, SessionMsg::Sample { sample, reply: reply_tx }).await?;

        reply_rx.await.map_err(|_| self.evict(traveler))
    }

    /// Explicit traveler confirmation-of-safety
    pub async fn confirm_safe(&self, traveler: &TravelerId) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(traveler, SessionMsg::ConfirmSafe { reply: reply_tx }).await?;

        reply_rx.await.map_err(|_| self.evict(traveler))
    }

    /// End a traveler's session, canceling its timers and any in-flight
    /// re-plan before returning.
    pub async fn end_session(&self, traveler: &TravelerId) -> Result<(), SessionError> {
        let handle = self
            .sessions
            .lock()
            .remove(traveler)
            .ok_or_else(|| SessionError::UnknownSession(traveler.clone()))?;

        handle.shutdown().await;
        info!(traveler = %traveler, "session_ended");
        Ok(())
    }

    /// Number of live sessions (prunes workers that exited on their own)
    pub fn active_count(&self) -> usize {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, handle| !handle.tx.is_closed());
        sessions.len()
    }

    /// Shut down every session, for process teardown
    pub async fn shutdown_all(&self) {
        let handles: Vec<SessionHandle> = {
            let mut sessions = self.sessions.lock();
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.shutdown().await;
        }
    }

    async fn send(&self, traveler: &TravelerId, msg: SessionMsg) -> Result<(), SessionError> {
        let tx = {
            let sessions = self.sessions.lock();
            sessions
                .get(traveler)
                .map(|handle| handle.tx.clone())
                .ok_or_else(|| SessionError::UnknownSession(traveler.clone()))?
        };

        tx.send(msg).await.map_err(|_| self.evict(traveler))
    }

    /// Remove a dead worker's stale entry (idle timeout path)
    fn evict(&self, traveler: &TravelerId) -> SessionError {
        self.sessions.lock().remove(traveler);
        SessionError::UnknownSession(traveler.clone())
    }
}

/// Deadline placeholder when no grace window is armed
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365)
}

struct SessionWorker {
    traveler: TravelerId,
    monitor: GeofenceMonitor,
    /// For re-plan tasks to report back into the mailbox
    self_tx: mpsc::Sender<SessionMsg>,
    mode: TravelMode,
    optimizer: Option<Arc<RouteOptimizer>>,
    dispatch: DispatchSender,
    metrics: Arc<Metrics>,
    idle_timeout: Option<Duration>,
    replan_interval: Option<Duration>,
    replan_task: Option<JoinHandle<()>>,
}

impl SessionWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionMsg>) {
        debug!(traveler = %self.traveler, "session_worker_started");

        let mut replan_tick: Option<Interval> = self.replan_interval.and_then(|period| {
            // Only meaningful with an optimizer wired in; first tick after
            // one full period, not immediately
            self.optimizer.as_ref()?;
            Some(interval_at(Instant::now() + period, period))
        });
        let mut last_activity = Instant::now();

        loop {
            let grace = self.monitor.grace_deadline();
            let idle_deadline =
                self.idle_timeout.map(|timeout| last_activity + timeout);

            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(SessionMsg::Sample { sample, reply }) => {
                            last_activity = Instant::now();
                            let observe_start = std::time::Instant::now();
                            let anomaly = self.monitor.observe(sample).await;
                            self.metrics
                                .record_sample_observed(observe_start.elapsed().as_micros() as u64);
                            let _ = reply.send(anomaly);
                        }
                        Some(SessionMsg::ConfirmSafe { reply }) => {
                            last_activity = Instant::now();
                            self.monitor.confirm_safe();
                            let _ = reply.send(());
                        }
                        Some(SessionMsg::RouteReplaced(route)) => {
                            self.monitor.replace_route(route);
                        }
                        Some(SessionMsg::End) | None => {
                            self.dispatch.send_session_event(&self.traveler, "ended", None, None);
                            break;
                        }
                    }
                }
                _ = sleep_until(grace.unwrap_or_else(far_future)), if grace.is_some() => {
                    self.monitor.grace_expired();
                }
                _ = async { replan_tick.as_mut().unwrap().tick().await }, if replan_tick.is_some() => {
                    self.maybe_spawn_replan();
                }
                _ = sleep_until(idle_deadline.unwrap_or_else(far_future)), if idle_deadline.is_some() => {
                    info!(traveler = %self.traveler, "session_idle_timeout");
                    self.dispatch.send_session_event(&self.traveler, "idle_timeout", None, None);
                    break;
                }
            }
        }

        // Teardown: a late re-plan must not outlive the session
        if let Some(task) = self.replan_task.take() {
            task.abort();
        }
        self.metrics.record_session_ended();
        debug!(traveler = %self.traveler, "session_worker_stopped");
    }

    /// Kick off a re-plan from the current position, unless one is
    /// already in flight or no position is known yet.
    fn maybe_spawn_replan(&mut self) {
        let Some(optimizer) = self.optimizer.clone() else {
            return;
        };
        if self.replan_task.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(traveler = %self.traveler, "replan_still_in_flight");
            return;
        }
        let Some(position) = self.monitor.last_coordinate() else {
            debug!(traveler = %self.traveler, "replan_skipped_no_position");
            return;
        };

        let destination = self.monitor.destination();
        let mode = self.mode;
        let traveler = self.traveler.clone();
        let tx = self.self_tx.clone();

        self.replan_task = Some(tokio::spawn(async move {
            match optimizer.select_safest_route(position, destination, mode).await {
                Ok(route) => {
                    let _ = tx.try_send(SessionMsg::RouteReplaced(route));
                }
                Err(e) => {
                    warn!(traveler = %traveler, error = %e, "replan_failed");
                }
            }
        }));
    }
}
