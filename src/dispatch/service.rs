// src/dispatch/service.rs — Event inlet, tracker task and dispatch worker
//
// Events arrive on an unbounded channel so the delivering callback never
// waits. One task owns the CallStateTracker and applies events strictly in
// arrival order. Candidates go through a single FIFO queue to one worker,
// which runs each attempt to completion before taking the next, so two
// candidates for the same number can never both pass the throttle check.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::dispatch::config::{DispatchConfig, TriggerPolicy};
use crate::dispatch::coordinator::{DispatchCoordinator, DispatchOutcome};
use crate::dispatch::tracker::{CallStateTracker, DispatchCandidate};
use crate::store::PrefsStore;
use crate::telephony::TelephonyEvent;

/// Capacity of the report broadcast; slow subscribers miss old reports.
const REPORT_BUFFER: usize = 256;

/// Outcome of one dispatch attempt, published to subscribers.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub candidate: DispatchCandidate,
    pub outcome: DispatchOutcome,
}

/// Counters returned by [`DispatchService::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub events: u64,
    pub candidates: u64,
    pub sent: u64,
}

/// Cheap, cloneable handle for delivering events from any thread.
#[derive(Clone)]
pub struct EventInlet {
    tx: mpsc::UnboundedSender<TelephonyEvent>,
}

impl EventInlet {
    /// Queue an event. Never blocks; returns `false` once the service stopped.
    pub fn deliver(&self, event: TelephonyEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

pub struct DispatchService {
    inlet: EventInlet,
    shutdown_tx: watch::Sender<bool>,
    reports: broadcast::Sender<DispatchReport>,
    tracker_task: JoinHandle<u64>,
    worker_task: JoinHandle<(u64, u64)>,
}

impl DispatchService {
    pub fn spawn(
        prefs: Arc<PrefsStore>,
        tracker: CallStateTracker,
        coordinator: DispatchCoordinator,
        queue_capacity: usize,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (candidate_tx, candidate_rx) = mpsc::channel(queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reports, _) = broadcast::channel(REPORT_BUFFER);

        let tracker_task = tokio::spawn(run_tracker(
            prefs,
            tracker,
            event_rx,
            candidate_tx,
            shutdown_rx,
        ));
        let worker_task = tokio::spawn(run_worker(coordinator, candidate_rx, reports.clone()));

        tracing::info!(target: "autopromo::service", "Dispatch service started");

        Self {
            inlet: EventInlet { tx: event_tx },
            shutdown_tx,
            reports,
            tracker_task,
            worker_task,
        }
    }

    pub fn inlet(&self) -> EventInlet {
        self.inlet.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchReport> {
        self.reports.subscribe()
    }

    /// Stop accepting events, process everything already queued, then return.
    pub async fn shutdown(self) -> anyhow::Result<ServiceStats> {
        let _ = self.shutdown_tx.send(true);
        drop(self.inlet);

        let events = self.tracker_task.await?;
        let (candidates, sent) = self.worker_task.await?;

        let stats = ServiceStats {
            events,
            candidates,
            sent,
        };
        tracing::info!(
            target: "autopromo::service",
            "Dispatch service stopped: {} event(s), {} candidate(s), {} sent",
            stats.events,
            stats.candidates,
            stats.sent
        );
        Ok(stats)
    }
}

async fn run_tracker(
    prefs: Arc<PrefsStore>,
    mut tracker: CallStateTracker,
    mut event_rx: mpsc::UnboundedReceiver<TelephonyEvent>,
    candidate_tx: mpsc::Sender<DispatchCandidate>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> u64 {
    let mut processed = 0;

    loop {
        let event = tokio::select! {
            biased;
            event = event_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = shutdown_rx.changed() => {
                // Drain what was delivered before the stop request.
                event_rx.close();
                while let Some(event) = event_rx.recv().await {
                    processed += 1;
                    apply(&prefs, &mut tracker, &event, &candidate_tx).await;
                }
                break;
            }
        };
        processed += 1;
        apply(&prefs, &mut tracker, &event, &candidate_tx).await;
    }

    processed
}

async fn apply(
    prefs: &Arc<PrefsStore>,
    tracker: &mut CallStateTracker,
    event: &TelephonyEvent,
    candidate_tx: &mpsc::Sender<DispatchCandidate>,
) {
    let policy = current_policy(prefs).await;
    if let Some(candidate) = tracker.on_event(event, policy).await {
        if candidate_tx.send(candidate).await.is_err() {
            tracing::error!(
                target: "autopromo::service",
                "Dispatch worker is gone; dropping candidate"
            );
        }
    }
}

async fn current_policy(prefs: &Arc<PrefsStore>) -> TriggerPolicy {
    let prefs = prefs.clone();
    match tokio::task::spawn_blocking(move || DispatchConfig::load(&prefs)).await {
        Ok(Ok(config)) => config.trigger_policy,
        Ok(Err(e)) => {
            tracing::warn!(
                target: "autopromo::service",
                "Cannot read trigger policy, using {}: {}",
                TriggerPolicy::default(),
                e
            );
            TriggerPolicy::default()
        }
        Err(e) => {
            tracing::warn!(target: "autopromo::service", "Settings lookup aborted: {}", e);
            TriggerPolicy::default()
        }
    }
}

async fn run_worker(
    coordinator: DispatchCoordinator,
    mut candidate_rx: mpsc::Receiver<DispatchCandidate>,
    reports: broadcast::Sender<DispatchReport>,
) -> (u64, u64) {
    let (mut candidates, mut sent) = (0, 0);

    while let Some(candidate) = candidate_rx.recv().await {
        candidates += 1;
        let outcome = coordinator.dispatch(&candidate).await;
        if outcome.was_sent() {
            sent += 1;
        }
        // No subscribers is fine.
        let _ = reports.send(DispatchReport { candidate, outcome });
    }

    (candidates, sent)
}
