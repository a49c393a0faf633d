use serde::Serialize;

use crate::db::{Phase, Session};

use super::state::WalkSnapshot;

/// Pushed over the controller's broadcast channel so a view layer can
/// render the walk without polling. Dropped receivers never block the
/// scheduler.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum WalkEvent {
    StateChanged {
        snapshot: WalkSnapshot,
    },
    /// One per 1-second tick while running.
    Heartbeat {
        snapshot: WalkSnapshot,
    },
    PhaseChanged {
        phase: Phase,
        interval_count: u32,
    },
    Completed {
        session_id: i64,
        session: Session,
    },
}
