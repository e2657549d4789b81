//! Plain-text progress markers written to stdout around every phase.

use crate::phase::Phase;
use crate::report::{PhaseStatus, RunState};

pub fn render_phase_start(phase: Phase) -> String {
    format!(
        "==> [{}/{}] {}: start",
        phase.ordinal(),
        Phase::ALL.len(),
        phase.as_str()
    )
}

pub fn render_phase_finish(phase: Phase, status: PhaseStatus, duration_ms: u64) -> String {
    format!(
        "<== [{}/{}] {}: {} ({duration_ms} ms)",
        phase.ordinal(),
        Phase::ALL.len(),
        phase.as_str(),
        status.as_str()
    )
}

pub fn render_final_state(state: &RunState) -> String {
    match state {
        RunState::Ready => "bootstrap: ready".to_string(),
        RunState::Failed { phase } => format!("bootstrap: failed at {}", phase.as_str()),
        RunState::Unbootstrapped => "bootstrap: unbootstrapped".to_string(),
    }
}
