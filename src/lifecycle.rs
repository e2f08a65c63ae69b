//! Round phase machine.
//!
//! `waiting -> duel* -> processing -> competing -> results`. The machine never
//! reads a clock: callers hand it `now_ms` and it answers with the step the
//! round is in and when that step ends. Only one deadline is ever pending.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bracket::{Matchup, MatchupView};
use crate::config::iso_from_ms;
use crate::game::Outcome;
use crate::types::{Phase, Trigger, COMPETE_STAGE_MS, DUEL_STAGE_MS, PROCESS_STAGE_MS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseDurations {
  /// Per matchup.
  pub duel_stage_ms: u64,
  pub process_stage_ms: u64,
  pub compete_stage_ms: u64,
}

impl Default for PhaseDurations {
  fn default() -> Self {
    PhaseDurations {
      duel_stage_ms: DUEL_STAGE_MS,
      process_stage_ms: PROCESS_STAGE_MS,
      compete_stage_ms: COMPETE_STAGE_MS,
    }
  }
}

impl PhaseDurations {
  pub fn instant() -> Self {
    PhaseDurations {
      duel_stage_ms: 0,
      process_stage_ms: 0,
      compete_stage_ms: 0,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseStep {
  pub phase: Phase,
  /// Matchup to reveal while in `duel`.
  pub matchup_index: Option<usize>,
  /// `None` once the round has reached `results`.
  pub ends_at_ms: Option<u64>,
}

impl PhaseStep {
  fn results() -> Self {
    PhaseStep {
      phase: Phase::Results,
      matchup_index: None,
      ends_at_ms: None,
    }
  }
}

#[derive(Clone, Debug)]
pub struct RoundLifecycle {
  durations: PhaseDurations,
  matchup_count: usize,
  current: Option<PhaseStep>,
}

impl RoundLifecycle {
  pub fn new(durations: PhaseDurations) -> Self {
    RoundLifecycle {
      durations,
      matchup_count: 0,
      current: None,
    }
  }

  /// The single pending deadline, if any.
  pub fn deadline(&self) -> Option<u64> {
    self.current.and_then(|step| step.ends_at_ms)
  }

  /// Leaves `waiting` for the first timed phase (or straight to `results`).
  pub fn begin(&mut self, matchup_count: usize, now_ms: u64) -> PhaseStep {
    self.matchup_count = matchup_count;
    let step = self.first_step(now_ms);
    self.current = Some(step);
    step
  }

  /// Next step once `step` has run out. Timing chains off the previous
  /// deadline so late wakeups do not stretch the round.
  pub fn step_after(&self, step: PhaseStep, now_ms: u64) -> PhaseStep {
    let at = step.ends_at_ms.unwrap_or(now_ms);
    match step.phase {
      Phase::Waiting => self.first_step(at),
      Phase::Duel => {
        let next = step.matchup_index.map_or(0, |idx| idx + 1);
        if next < self.matchup_count {
          self.duel_step(next, at)
        } else {
          self.enter_processing(at)
        }
      }
      Phase::Processing => self.enter_competing(at),
      Phase::Competing | Phase::Results => PhaseStep::results(),
    }
  }

  /// Fires every transition due at `now_ms` and returns the steps entered,
  /// in order.
  pub fn advance(&mut self, now_ms: u64) -> Vec<PhaseStep> {
    let mut entered = Vec::new();
    let mut safety = 0;
    while let Some(step) = self.current {
      safety += 1;
      if safety > 10_000 {
        warn!(phase = ?step.phase, "phase safety limit reached, stopping early");
        break;
      }
      let Some(ends_at) = step.ends_at_ms else {
        break;
      };
      if ends_at > now_ms {
        break;
      }
      let next = self.step_after(step, now_ms);
      self.current = Some(next);
      entered.push(next);
    }
    entered
  }

  pub fn cancel(&mut self) {
    self.current = None;
    self.matchup_count = 0;
  }

  fn first_step(&self, at: u64) -> PhaseStep {
    if self.durations.duel_stage_ms > 0 && self.matchup_count > 0 {
      self.duel_step(0, at)
    } else {
      self.enter_processing(at)
    }
  }

  fn duel_step(&self, index: usize, at: u64) -> PhaseStep {
    PhaseStep {
      phase: Phase::Duel,
      matchup_index: Some(index),
      ends_at_ms: Some(at + self.durations.duel_stage_ms),
    }
  }

  fn enter_processing(&self, at: u64) -> PhaseStep {
    if self.durations.process_stage_ms > 0 {
      PhaseStep {
        phase: Phase::Processing,
        matchup_index: None,
        ends_at_ms: Some(at + self.durations.process_stage_ms),
      }
    } else {
      self.enter_competing(at)
    }
  }

  fn enter_competing(&self, at: u64) -> PhaseStep {
    if self.durations.compete_stage_ms > 0 {
      PhaseStep {
        phase: Phase::Competing,
        matchup_index: None,
        ends_at_ms: Some(at + self.durations.compete_stage_ms),
      }
    } else {
      PhaseStep::results()
    }
  }
}

// ── Round record ───────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
  pub number: u32,
  pub started: bool,
  pub completed: bool,
  pub phase: Phase,
  pub phase_ends_at: Option<String>,
  pub matchups: Vec<MatchupView>,
  pub current_matchup_index: Option<usize>,
  pub outcome: Option<Outcome>,
  pub triggered_by: Option<Trigger>,
  pub started_at: Option<String>,
  pub completed_at: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Round {
  pub number: u32,
  pub started: bool,
  pub completed: bool,
  pub phase: Phase,
  pub phase_ends_at_ms: Option<u64>,
  pub matchups: Vec<Matchup>,
  pub current_matchup_index: Option<usize>,
  pub outcome: Option<Outcome>,
  pub triggered_by: Option<Trigger>,
  pub started_at_ms: Option<u64>,
  pub completed_at_ms: Option<u64>,
}

impl Round {
  pub fn new(number: u32) -> Self {
    Round {
      number,
      started: false,
      completed: false,
      phase: Phase::Waiting,
      phase_ends_at_ms: None,
      matchups: Vec::new(),
      current_matchup_index: None,
      outcome: None,
      triggered_by: None,
      started_at_ms: None,
      completed_at_ms: None,
    }
  }

  /// Started and not yet archived.
  pub fn is_pending(&self) -> bool {
    self.started && !self.completed
  }

  pub fn enter(&mut self, step: PhaseStep) {
    self.phase = step.phase;
    self.phase_ends_at_ms = step.ends_at_ms;
    self.current_matchup_index = step.matchup_index;
    if let Some(idx) = step.matchup_index {
      if let Some(matchup) = self.matchups.get_mut(idx) {
        matchup.reveal();
      }
    }
  }

  pub fn reveal_all(&mut self) {
    for matchup in &mut self.matchups {
      matchup.reveal();
    }
  }

  pub fn view(&self) -> RoundView {
    RoundView {
      number: self.number,
      started: self.started,
      completed: self.completed,
      phase: self.phase,
      phase_ends_at: self.phase_ends_at_ms.and_then(iso_from_ms),
      matchups: self.matchups.iter().map(Matchup::view).collect(),
      current_matchup_index: self.current_matchup_index,
      outcome: self.outcome.clone(),
      triggered_by: self.triggered_by,
      started_at: self.started_at_ms.and_then(iso_from_ms),
      completed_at: self.completed_at_ms.and_then(iso_from_ms),
    }
  }
}
