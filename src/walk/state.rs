use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use crate::db::Phase;

/// Each phase runs this long before flipping.
pub const PHASE_DURATION_SECS: u64 = 180;
/// Completed transitions into `fast` before the walk auto-terminates.
pub const MAX_INTERVALS: u32 = 4;
/// Cadence of the location-sampling loop.
pub const SAMPLE_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WalkStatus {
    Idle,
    Running,
    Paused,
}

impl Default for WalkStatus {
    fn default() -> Self {
        WalkStatus::Idle
    }
}

/// What a 1-second tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    PhaseChanged(Phase),
    /// The interval budget is spent; the walk must be finalized.
    Complete,
}

/// Scheduler-owned phase state. Never persisted; only the controller
/// mutates it, and only one walk can hold it at a time.
///
/// Monotonic anchors are shifted forward on resume so elapsed-time
/// arithmetic stays correct without tracking cumulative pause separately.
#[derive(Debug, Clone)]
pub struct WalkState {
    pub status: WalkStatus,
    pub phase: Phase,
    pub session_id: Option<i64>,
    /// Wall-clock start, as written to the session row.
    pub started_at: Option<DateTime<Utc>>,
    pub session_started: Option<Instant>,
    pub phase_started: Option<Instant>,
    pub paused_at: Option<Instant>,
    pub interval_count: u32,
    phase_duration: Duration,
}

impl Default for WalkState {
    fn default() -> Self {
        Self {
            status: WalkStatus::Idle,
            phase: Phase::Fast,
            session_id: None,
            started_at: None,
            session_started: None,
            phase_started: None,
            paused_at: None,
            interval_count: 0,
            phase_duration: Duration::from_secs(PHASE_DURATION_SECS),
        }
    }
}

/// Serializable view of the walk for display and events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkSnapshot {
    pub status: WalkStatus,
    pub phase: Phase,
    pub session_id: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub phase_elapsed_seconds: u64,
    pub interval_count: u32,
}

impl WalkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase_duration(phase_duration: Duration) -> Self {
        Self {
            phase_duration,
            ..Self::default()
        }
    }

    pub fn begin_session(&mut self, session_id: i64, started_at: DateTime<Utc>, now: Instant) {
        *self = Self {
            status: WalkStatus::Running,
            phase: Phase::Fast,
            session_id: Some(session_id),
            started_at: Some(started_at),
            session_started: Some(now),
            phase_started: Some(now),
            paused_at: None,
            interval_count: 0,
            phase_duration: self.phase_duration,
        };
    }

    pub fn pause(&mut self, now: Instant) {
        self.status = WalkStatus::Paused;
        self.paused_at = Some(now);
    }

    /// Shifts both anchors forward by the pause duration and re-enters
    /// `Running`.
    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            let pause_duration = now.saturating_duration_since(paused_at);
            if let Some(anchor) = self.session_started {
                self.session_started = Some(anchor + pause_duration);
            }
            if let Some(anchor) = self.phase_started {
                self.phase_started = Some(anchor + pause_duration);
            }
        }
        self.status = WalkStatus::Running;
    }

    /// Active time since the walk started, excluding the open pause if any.
    pub fn active_elapsed(&self, now: Instant) -> Duration {
        let Some(start) = self.session_started else {
            return Duration::ZERO;
        };

        match self.status {
            WalkStatus::Idle => Duration::ZERO,
            WalkStatus::Running => now.saturating_duration_since(start),
            WalkStatus::Paused => self
                .paused_at
                .map(|paused| paused.saturating_duration_since(start))
                .unwrap_or_else(|| now.saturating_duration_since(start)),
        }
    }

    pub fn phase_elapsed(&self, now: Instant) -> Duration {
        let Some(start) = self.phase_started else {
            return Duration::ZERO;
        };

        match self.status {
            WalkStatus::Idle => Duration::ZERO,
            WalkStatus::Running => now.saturating_duration_since(start),
            WalkStatus::Paused => self
                .paused_at
                .map(|paused| paused.saturating_duration_since(start))
                .unwrap_or_else(|| now.saturating_duration_since(start)),
        }
    }

    /// The phase-boundary check, run once per 1-second tick while running.
    /// Boundary uses `>=`: a tick landing exactly on the boundary
    /// transitions immediately rather than waiting one extra tick.
    pub fn on_tick(&mut self, now: Instant) -> TickOutcome {
        if self.status != WalkStatus::Running {
            return TickOutcome::Continue;
        }

        if self.phase_elapsed(now) < self.phase_duration {
            return TickOutcome::Continue;
        }

        if self.interval_count >= MAX_INTERVALS {
            return TickOutcome::Complete;
        }

        self.phase = self.phase.flipped();
        self.phase_started = Some(now);
        if self.phase == Phase::Fast {
            self.interval_count += 1;
        }

        TickOutcome::PhaseChanged(self.phase)
    }

    pub fn snapshot(&self, now: Instant) -> WalkSnapshot {
        WalkSnapshot {
            status: self.status,
            phase: self.phase,
            session_id: self.session_id,
            started_at: self.started_at,
            elapsed_seconds: self.active_elapsed(now).as_secs(),
            phase_elapsed_seconds: self.phase_elapsed(now).as_secs(),
            interval_count: self.interval_count,
        }
    }

    pub fn reset(&mut self) {
        *self = Self {
            phase_duration: self.phase_duration,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn running_state(now: Instant) -> WalkState {
        let mut state = WalkState::new();
        state.begin_session(1, Utc::now(), now);
        state
    }

    #[test]
    fn tick_below_boundary_continues() {
        let t0 = Instant::now();
        let mut state = running_state(t0);

        assert_eq!(state.on_tick(t0 + secs(179)), TickOutcome::Continue);
        assert_eq!(state.phase, Phase::Fast);
    }

    #[test]
    fn tick_exactly_on_boundary_flips() {
        let t0 = Instant::now();
        let mut state = running_state(t0);

        assert_eq!(
            state.on_tick(t0 + secs(PHASE_DURATION_SECS)),
            TickOutcome::PhaseChanged(Phase::Slow)
        );
        assert_eq!(state.interval_count, 0);
        // Anchor was reset to the tick instant, so the next boundary is a
        // full phase away.
        assert_eq!(
            state.on_tick(t0 + secs(PHASE_DURATION_SECS + 179)),
            TickOutcome::Continue
        );
    }

    #[test]
    fn interval_count_increments_on_transitions_into_fast() {
        let t0 = Instant::now();
        let mut state = running_state(t0);

        let mut now = t0;
        now += secs(PHASE_DURATION_SECS);
        assert_eq!(state.on_tick(now), TickOutcome::PhaseChanged(Phase::Slow));
        assert_eq!(state.interval_count, 0);

        now += secs(PHASE_DURATION_SECS);
        assert_eq!(state.on_tick(now), TickOutcome::PhaseChanged(Phase::Fast));
        assert_eq!(state.interval_count, 1);
    }

    #[test]
    fn walk_completes_after_interval_budget() {
        let t0 = Instant::now();
        let mut state = running_state(t0);
        let mut now = t0;
        let mut phases = vec![state.phase];

        loop {
            now += secs(PHASE_DURATION_SECS);
            match state.on_tick(now) {
                TickOutcome::PhaseChanged(phase) => phases.push(phase),
                TickOutcome::Complete => break,
                TickOutcome::Continue => panic!("boundary tick must not continue"),
            }
        }

        // Four fast-phase increments: F S F S F S F S F, then the next
        // boundary completes instead of flipping again.
        assert_eq!(state.interval_count, MAX_INTERVALS);
        assert_eq!(phases.len(), 9);
        assert_eq!(
            phases.iter().filter(|p| **p == Phase::Fast).count(),
            (MAX_INTERVALS + 1) as usize
        );
        // Completion does not mutate state; finalization is the
        // controller's job.
        assert_eq!(state.status, WalkStatus::Running);
    }

    #[test]
    fn pause_resume_shifts_anchors() {
        let t0 = Instant::now();
        let mut state = running_state(t0);

        // Run 60s, pause for 30s, run another 60s.
        state.pause(t0 + secs(60));
        assert_eq!(state.active_elapsed(t0 + secs(75)), secs(60));

        state.resume(t0 + secs(90));
        assert_eq!(state.status, WalkStatus::Running);
        assert_eq!(state.active_elapsed(t0 + secs(150)), secs(120));
        assert_eq!(state.phase_elapsed(t0 + secs(150)), secs(120));
    }

    #[test]
    fn stop_while_paused_excludes_open_pause() {
        let t0 = Instant::now();
        let mut state = running_state(t0);

        state.pause(t0 + secs(60));

        // 30s into the pause, active time is still 60s.
        assert_eq!(state.active_elapsed(t0 + secs(90)), secs(60));
    }

    #[test]
    fn paused_phase_does_not_advance() {
        let t0 = Instant::now();
        let mut state = running_state(t0);

        state.pause(t0 + secs(170));
        state.resume(t0 + secs(500));

        // 170s of the phase were used before the pause; the boundary is
        // still 10s of active time away.
        assert_eq!(state.on_tick(t0 + secs(505)), TickOutcome::Continue);
        assert_eq!(
            state.on_tick(t0 + secs(510)),
            TickOutcome::PhaseChanged(Phase::Slow)
        );
    }

    #[test]
    fn reset_returns_to_idle() {
        let t0 = Instant::now();
        let mut state = running_state(t0);

        state.reset();
        assert_eq!(state.status, WalkStatus::Idle);
        assert!(state.session_id.is_none());
        assert_eq!(state.active_elapsed(t0 + secs(10)), Duration::ZERO);
    }
}
