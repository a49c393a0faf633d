use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use log::{error, info};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{Database, Phase, Session},
    distance::total_distance_km,
    geo::GeoSampler,
};

use super::{
    events::WalkEvent,
    state::{TickOutcome, WalkSnapshot, WalkState, WalkStatus, SAMPLE_INTERVAL_SECS},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct SamplingTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the single active walk: its timing, phase transitions, termination,
/// and the writes to the session store. Clones share one state slot, so at
/// most one walk can be active per controller regardless of who holds a
/// handle.
#[derive(Clone)]
pub struct WalkController {
    state: Arc<Mutex<WalkState>>,
    db: Database,
    sampler: GeoSampler,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    sampling: Arc<Mutex<Option<SamplingTask>>>,
    events: broadcast::Sender<WalkEvent>,
    tick_interval: Duration,
    sample_interval: Duration,
}

impl WalkController {
    pub fn new(db: Database, sampler: GeoSampler) -> Self {
        Self::with_timing(
            db,
            sampler,
            Duration::from_secs(1),
            Duration::from_secs(SAMPLE_INTERVAL_SECS),
            None,
        )
    }

    /// Timing hook for tests and alternate protocols; `phase_duration`
    /// of `None` keeps the standard 180-second phases.
    pub fn with_timing(
        db: Database,
        sampler: GeoSampler,
        tick_interval: Duration,
        sample_interval: Duration,
        phase_duration: Option<Duration>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = match phase_duration {
            Some(duration) => WalkState::with_phase_duration(duration),
            None => WalkState::new(),
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            db,
            sampler,
            ticker: Arc::new(Mutex::new(None)),
            sampling: Arc::new(Mutex::new(None)),
            events,
            tick_interval,
            sample_interval,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalkEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> WalkSnapshot {
        let guard = self.state.lock().await;
        guard.snapshot(Instant::now())
    }

    /// Starts a walk. The session row is created and its id resolved before
    /// any trace write is issued; a failure here aborts the start and is
    /// surfaced to the caller. Starting while a walk is active is rejected.
    ///
    /// The state guard is held across the insert so two racing starts
    /// serialize: the loser observes `Running` and bails without creating
    /// a second session row.
    pub async fn start_walk(&self) -> Result<WalkSnapshot> {
        let started_at = Utc::now();

        let session_id = {
            let mut state = self.state.lock().await;
            if state.status != WalkStatus::Idle {
                bail!("a walk is already active");
            }

            let session_id = self
                .db
                .insert_session(started_at)
                .await
                .context("failed to create session at walk start")?;
            state.begin_session(session_id, started_at, Instant::now());
            session_id
        };

        info!("Walk started, session {session_id}");

        // Immediate reading; the session row already exists, so every point
        // carries the id assigned above.
        self.record_sample(session_id, Phase::Fast).await;

        self.spawn_ticker().await;
        self.spawn_sampling_loop(session_id).await;

        self.emit_state_changed().await;
        Ok(self.snapshot().await)
    }

    /// Suspends the walk: tickers stop, `paused_at` is recorded, and one
    /// final reading is taken before the sampler goes quiet.
    pub async fn pause_walk(&self) -> Result<WalkSnapshot> {
        let (session_id, phase) = {
            let mut state = self.state.lock().await;
            if state.status != WalkStatus::Running {
                bail!("no running walk to pause");
            }
            state.pause(Instant::now());
            let session_id = state
                .session_id
                .ok_or_else(|| anyhow!("missing session id"))?;
            (session_id, state.phase)
        };

        self.cancel_ticker().await;
        self.record_sample(session_id, phase).await;
        self.cancel_sampling_loop().await;

        self.emit_state_changed().await;
        Ok(self.snapshot().await)
    }

    /// Shifts the timing anchors past the pause and restarts both tickers.
    pub async fn resume_walk(&self) -> Result<WalkSnapshot> {
        let (session_id, phase) = {
            let mut state = self.state.lock().await;
            if state.status != WalkStatus::Paused {
                bail!("no paused walk to resume");
            }
            state.resume(Instant::now());
            let session_id = state
                .session_id
                .ok_or_else(|| anyhow!("missing session id"))?;
            (session_id, state.phase)
        };

        self.spawn_ticker().await;
        self.spawn_sampling_loop(session_id).await;
        self.record_sample(session_id, phase).await;

        self.emit_state_changed().await;
        Ok(self.snapshot().await)
    }

    /// Finalizes the walk: one last reading, distance derived from the full
    /// trace, duration and distance written to the same session row created
    /// at start. Idempotent; stopping with no active walk is a no-op.
    pub async fn stop_walk(&self) -> Result<Option<Session>> {
        let (session_id, phase, started_at, duration) = {
            let mut state = self.state.lock().await;
            if state.status == WalkStatus::Idle {
                return Ok(None);
            }

            let now = Instant::now();
            let session_id = state
                .session_id
                .ok_or_else(|| anyhow!("missing session id"))?;
            let started_at = state.started_at.unwrap_or_else(Utc::now);
            let duration = state.active_elapsed(now);
            let phase = state.phase;
            state.reset();

            (session_id, phase, started_at, duration)
        };

        self.cancel_ticker().await;
        self.cancel_sampling_loop().await;

        // The final reading lands before the trace is read back, so the
        // distance written below includes it.
        self.record_sample(session_id, phase).await;

        let trace = self
            .db
            .get_trace_for_session(session_id)
            .await
            .context("failed to read trace at walk stop")?;
        let points: Vec<_> = trace.iter().map(|p| p.position()).collect();
        let distance_km = total_distance_km(&points);
        let duration_seconds = duration.as_secs();

        self.db
            .update_session_totals(session_id, duration_seconds, distance_km)
            .await
            .context("failed to finalize session")?;

        info!(
            "Walk stopped, session {session_id}: {duration_seconds}s, {distance_km:.3} km over {} points",
            trace.len()
        );

        let session = Session {
            id: session_id,
            duration_seconds,
            distance_km,
            created_at: started_at,
        };

        self.emit_state_changed().await;
        let _ = self.events.send(WalkEvent::Completed {
            session_id,
            session: session.clone(),
        });

        Ok(Some(session))
    }

    /// Samples and persists one trace point. A failed insert is logged and
    /// skipped; the walk continues with a gap, never a crash.
    async fn record_sample(&self, session_id: i64, phase: Phase) {
        let point = self.sampler.sample(session_id, phase).await;
        if let Err(err) = self.db.insert_trace_point(&point).await {
            error!("failed to persist trace point for session {session_id}: {err:#}");
        }
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let events = self.events.clone();
        let controller = self.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                let (outcome, snapshot) = {
                    let mut guard = state.lock().await;
                    if guard.status != WalkStatus::Running {
                        break;
                    }
                    let now = Instant::now();
                    let outcome = guard.on_tick(now);
                    (outcome, guard.snapshot(now))
                };

                let _ = events.send(WalkEvent::Heartbeat {
                    snapshot: snapshot.clone(),
                });

                match outcome {
                    TickOutcome::Continue => {}
                    TickOutcome::PhaseChanged(phase) => {
                        info!(
                            "Phase changed to {} (interval {})",
                            phase.as_str(),
                            snapshot.interval_count
                        );
                        let _ = events.send(WalkEvent::PhaseChanged {
                            phase,
                            interval_count: snapshot.interval_count,
                        });
                    }
                    TickOutcome::Complete => {
                        // Finalization runs on its own task; aborting this
                        // ticker from inside stop_walk must not kill the
                        // final writes.
                        let controller = controller.clone();
                        tokio::spawn(async move {
                            if let Err(err) = controller.stop_walk().await {
                                error!("automatic walk completion failed: {err:#}");
                            }
                        });
                        break;
                    }
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    async fn spawn_sampling_loop(&self, session_id: i64) {
        let mut sampling_guard = self.sampling.lock().await;
        if let Some(task) = sampling_guard.take() {
            task.cancel.cancel();
            task.handle.abort();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let controller = self.clone();
        let sample_interval = self.sample_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(sample_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The caller has just recorded a sample; skip the immediate
            // first tick.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let phase = {
                            let guard = controller.state.lock().await;
                            if guard.status != WalkStatus::Running
                                || guard.session_id != Some(session_id)
                            {
                                break;
                            }
                            guard.phase
                        };
                        controller.record_sample(session_id, phase).await;
                    }
                    _ = token.cancelled() => {
                        break;
                    }
                }
            }
        });

        *sampling_guard = Some(SamplingTask { cancel, handle });
    }

    async fn cancel_sampling_loop(&self) {
        let task = self.sampling.lock().await.take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(err) = task.handle.await {
                if !err.is_cancelled() {
                    error!("sampling loop task failed to join: {err}");
                }
            }
        }
    }

    async fn emit_state_changed(&self) {
        let snapshot = {
            let guard = self.state.lock().await;
            guard.snapshot(Instant::now())
        };
        let _ = self.events.send(WalkEvent::StateChanged { snapshot });
    }
}
