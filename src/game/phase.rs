//! Game phases and the per-second phase timer.

use crate::config::TimingConfig;
use serde::{Deserialize, Serialize};

/// Phase of the game loop.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GamePhase {
    /// Players choose a team.
    #[default]
    Picking,
    /// Players place squares.
    Placing,
    /// The automaton runs. Not timed.
    Simulating,
    /// The result is on display.
    Final,
}

impl GamePhase {
    /// True for phases that end when their timer runs out.
    pub fn is_timed(self) -> bool {
        self != GamePhase::Simulating
    }
}

/// Active phase with its timer and cycle counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    /// Active phase.
    pub phase: GamePhase,
    /// Seconds left; always 0 while simulating.
    pub time_left: u32,
    /// Completed placing/simulating/picking loops before the final one.
    pub cycle_count: u32,
}

impl PhaseState {
    /// Start of a fresh game.
    pub fn start(timing: &TimingConfig) -> Self {
        Self {
            phase: GamePhase::Picking,
            time_left: *timing.picking_secs(),
            cycle_count: 0,
        }
    }

    /// Lets one second pass. Returns true when the phase is due for its
    /// transition: a timed phase whose timer reached zero, or a simulation
    /// that has not finished.
    pub fn tick(&mut self) -> bool {
        if !self.phase.is_timed() {
            self.time_left = 0;
            return true;
        }
        self.time_left = self.time_left.saturating_sub(1);
        self.is_due()
    }

    /// True when the phase is waiting on its transition, without letting
    /// time pass.
    pub fn is_due(&self) -> bool {
        !self.phase.is_timed() || self.time_left == 0
    }

    /// True when the current placing/simulating cycle is the last one.
    pub fn is_final_cycle(&self, max_cycles: u32) -> bool {
        self.cycle_count.saturating_add(1) >= max_cycles
    }

    /// Switches to `phase` with a fresh timer.
    pub fn enter(&mut self, phase: GamePhase, time_left: u32) {
        self.phase = phase;
        self.time_left = if phase.is_timed() { time_left } else { 0 };
    }
}
