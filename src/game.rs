use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bots::assign_bot_moves;
use crate::bracket::{resolve_bracket, BracketOutcome, BracketRules, Entrant, MatchupView, StandingChange};
use crate::config::{iso_from_ms, EngineConfig};
use crate::error::{GameError, GameResult};
use crate::lifecycle::{Round, RoundLifecycle, RoundView};
use crate::player::{Player, PlayerView};
use crate::rng::GameRng;
use crate::types::{BotStrategy, Move, OutcomeStatus, Phase, Role, Trigger};

// ── Public records ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EliminationEvent {
  pub player_id: String,
  pub player_name: String,
  pub stage: i32,
  pub round_number: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
  pub status: OutcomeStatus,
  pub message: String,
  pub round_number: u32,
  pub triggered_by: Trigger,
  pub winning_moves: Vec<Move>,
  pub winner_player_ids: Vec<String>,
  pub bye_player_ids: Vec<String>,
  pub tied_player_ids: Vec<String>,
  pub eliminated_player_ids: Vec<String>,
  pub inactive_player_ids: Vec<String>,
  pub demoted_player_steps: BTreeMap<String, u32>,
  pub elimination_events: Vec<EliminationEvent>,
  pub matchups: Vec<MatchupView>,
  pub started_at: Option<String>,
  pub completed_at: Option<String>,
}

impl Outcome {
  fn skipped(message: &str, round_number: u32, triggered_by: Trigger) -> Self {
    Outcome {
      status: OutcomeStatus::Skipped,
      message: message.to_string(),
      round_number,
      triggered_by,
      winning_moves: Vec::new(),
      winner_player_ids: Vec::new(),
      bye_player_ids: Vec::new(),
      tied_player_ids: Vec::new(),
      eliminated_player_ids: Vec::new(),
      inactive_player_ids: Vec::new(),
      demoted_player_steps: BTreeMap::new(),
      elimination_events: Vec::new(),
      matchups: Vec::new(),
      started_at: None,
      completed_at: None,
    }
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicState {
  pub players: Vec<PlayerView>,
  pub round: RoundView,
  pub last_outcome: Option<Outcome>,
  pub next_round_starts_at: Option<String>,
  pub round_interval_ms: u64,
  pub available_moves: Vec<Move>,
  pub tournament_mode: bool,
  pub active_players: usize,
  pub server_time: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct RegisterPlayer {
  pub name: String,
  pub role: Role,
  pub is_bot: bool,
  pub bot_strategy: Option<BotStrategy>,
}

#[derive(Clone, Debug)]
pub struct StartRoundOptions {
  pub admin_id: Option<String>,
  pub triggered_by: Trigger,
  pub require_all_ready: bool,
  pub skip_admin_validation: bool,
  pub penalize_inactive: bool,
}

impl Default for StartRoundOptions {
  fn default() -> Self {
    StartRoundOptions {
      admin_id: None,
      triggered_by: Trigger::Manual,
      require_all_ready: true,
      skip_admin_validation: false,
      penalize_inactive: true,
    }
  }
}

impl StartRoundOptions {
  /// Options used by the scheduler and tournament continuation.
  pub fn automatic(triggered_by: Trigger) -> Self {
    StartRoundOptions {
      admin_id: None,
      triggered_by,
      require_all_ready: false,
      skip_admin_validation: true,
      penalize_inactive: true,
    }
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStart {
  pub pending: bool,
  pub outcome: Option<Outcome>,
}

/// Everything decided at round start that is applied once `results` is
/// reached.
#[derive(Debug)]
struct PendingResolution {
  bracket: BracketOutcome,
  inactive_ids: Vec<String>,
  auto_bot_ids: Vec<String>,
  penalize_inactive: bool,
  ready_moves: Vec<Move>,
}

// ── Facade ─────────────────────────────────────────────────────────────

pub struct GameState {
  config: EngineConfig,
  players: Vec<Player>,
  index: HashMap<String, usize>,
  round: Round,
  history: Vec<Round>,
  last_outcome: Option<Outcome>,
  pending: Option<PendingResolution>,
  lifecycle: RoundLifecycle,
  rng: GameRng,
  next_round_at_ms: Option<u64>,
}

impl GameState {
  pub fn new(config: EngineConfig, now_ms: u64) -> Result<Self, String> {
    config.validate()?;
    let mut game = GameState {
      lifecycle: RoundLifecycle::new(config.durations()),
      rng: GameRng::from_seed(config.seed),
      config,
      players: Vec::new(),
      index: HashMap::new(),
      round: Round::new(1),
      history: Vec::new(),
      last_outcome: None,
      pending: None,
      next_round_at_ms: None,
    };
    game.schedule_next(now_ms);
    Ok(game)
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn player(&self, id: &str) -> Option<&Player> {
    self.index.get(id).and_then(|idx| self.players.get(*idx))
  }

  fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
    let idx = *self.index.get(id)?;
    self.players.get_mut(idx)
  }

  pub fn round(&self) -> &Round {
    &self.round
  }

  pub fn round_history(&self) -> &[Round] {
    &self.history
  }

  pub fn last_outcome(&self) -> Option<&Outcome> {
    self.last_outcome.as_ref()
  }

  pub fn active_player_count(&self) -> usize {
    self.players.iter().filter(|p| p.is_participant()).count()
  }

  // ── Registration & moves ─────────────────────────────────────────────

  pub fn register_player(&mut self, request: RegisterPlayer, now_ms: u64) -> GameResult<PlayerView> {
    let name = request.name.trim();
    if name.is_empty() {
      return Err(GameError::validation("Player name is required."));
    }
    let taken = self
      .players
      .iter()
      .any(|p| p.name.to_lowercase() == name.to_lowercase());
    if taken {
      return Err(GameError::validation(format!("The name \"{name}\" is already taken.")));
    }
    if request.role == Role::Admin {
      if request.is_bot {
        return Err(GameError::validation("An admin cannot be a bot."));
      }
      if self.players.iter().any(|p| p.role == Role::Admin) {
        return Err(GameError::validation("An admin is already registered for this game."));
      }
    }

    let id = Uuid::new_v4().to_string();
    let start_layer = self.config.start_layer;
    let player = if request.is_bot {
      let strategy = request.bot_strategy.unwrap_or_default();
      Player::new_bot(id.clone(), name.to_string(), strategy, start_layer, now_ms)
    } else {
      Player::new(id.clone(), name.to_string(), request.role, start_layer, now_ms)
    };
    info!(player = %player.name, role = ?player.role, bot = player.is_bot, "player registered");
    let view = player.serialize();
    self.index.insert(id, self.players.len());
    self.players.push(player);
    Ok(view)
  }

  pub fn set_player_move(
    &mut self,
    player_id: &str,
    selection: Option<&str>,
    stage: Option<i32>,
    now_ms: u64,
  ) -> GameResult<PlayerView> {
    let bounds = self.config.bounds();
    let round_pending = self.round.is_pending();
    let player = self
      .player(player_id)
      .ok_or_else(|| GameError::not_found("Player not found."))?;

    let mv = match selection.map(str::trim).filter(|raw| !raw.is_empty()) {
      Some(raw) => Some(raw.parse::<Move>()?),
      None => None,
    };
    let stage = stage.unwrap_or(player.layer);
    if !bounds.contains(stage) {
      return Err(GameError::validation(format!(
        "Stage {stage} is outside the playable range {}..={}.",
        bounds.min, bounds.max
      )));
    }
    if player.role == Role::Admin {
      return Err(GameError::precondition("Admins cannot submit a move."));
    }
    if player.is_eliminated() || !player.active {
      return Err(GameError::precondition("Eliminated players cannot submit a move."));
    }
    if round_pending {
      return Err(GameError::precondition(
        "Round already started. Moves can no longer be changed.",
      ));
    }

    let player = self
      .player_mut(player_id)
      .ok_or_else(|| GameError::not_found("Player not found."))?;
    player.set_move(mv, stage, now_ms);
    debug!(player = %player.name, stage, selection = ?mv, "move recorded");
    Ok(player.serialize())
  }

  // ── Rounds ───────────────────────────────────────────────────────────

  fn check_admin(&self, options: &StartRoundOptions) -> GameResult<()> {
    if !options.skip_admin_validation {
      let admin_id = options
        .admin_id
        .as_deref()
        .ok_or_else(|| GameError::precondition("Admin ID is required to start the round."))?;
      let admin = self
        .player(admin_id)
        .ok_or_else(|| GameError::not_found("Player not found."))?;
      if admin.role != Role::Admin {
        return Err(GameError::precondition("Only an admin can start the round."));
      }
    } else if let Some(admin_id) = options.admin_id.as_deref() {
      self
        .player(admin_id)
        .ok_or_else(|| GameError::not_found("Player not found."))?;
    }
    Ok(())
  }

  pub fn start_round(&mut self, options: StartRoundOptions, now_ms: u64) -> GameResult<RoundStart> {
    self.check_admin(&options)?;
    if self.round.is_pending() {
      return Err(GameError::precondition("Round already in progress or completed."));
    }

    let participants = self.active_player_count();
    if participants < 2 {
      if options.skip_admin_validation {
        let outcome = self.skip_round("Not enough players to run a round.", &options, Vec::new(), now_ms);
        return Ok(RoundStart {
          pending: false,
          outcome: Some(outcome),
        });
      }
      return Err(GameError::precondition("At least two players are required to start."));
    }

    if options.require_all_ready {
      let unready = self
        .players
        .iter()
        .any(|p| p.is_participant() && !p.is_bot && p.current_move.is_none());
      if unready {
        return Err(GameError::precondition("All players must choose a move before starting."));
      }
    }

    let auto_bot_ids: Vec<String> = assign_bot_moves(&mut self.players, &mut self.rng, now_ms)
      .into_iter()
      .filter(|id| self.player(id).is_some_and(|p| p.bot_strategy == Some(BotStrategy::Random)))
      .collect();

    let (ready, inactive): (Vec<&Player>, Vec<&Player>) = self
      .players
      .iter()
      .filter(|p| p.is_participant())
      .partition(|p| p.current_move.is_some());
    let inactive_ids: Vec<String> = inactive.iter().map(|p| p.id.clone()).collect();

    if ready.is_empty() {
      if options.require_all_ready {
        return Err(GameError::precondition("At least one player must choose a move."));
      }
      let penalized = if options.penalize_inactive {
        inactive_ids
      } else {
        Vec::new()
      };
      let outcome = self.skip_round("No players submitted a move. Round skipped.", &options, penalized, now_ms);
      return Ok(RoundStart {
        pending: false,
        outcome: Some(outcome),
      });
    }

    let entrants: Vec<Entrant> = ready.iter().map(|p| Entrant::from_player(p)).collect();
    let ready_moves: Vec<Move> = ready.iter().filter_map(|p| p.current_move).collect();
    let rules = BracketRules {
      bounds: self.config.bounds(),
      tie_break: self.config.tie_break,
    };
    let mut bracket = resolve_bracket(self.round.number, entrants, &rules, &mut self.rng);

    self.round.started = true;
    self.round.triggered_by = Some(options.triggered_by);
    self.round.started_at_ms = Some(now_ms);
    self.round.matchups = std::mem::take(&mut bracket.matchups);
    info!(
      round = self.round.number,
      triggered_by = %options.triggered_by,
      ready = ready_moves.len(),
      inactive = inactive_ids.len(),
      matchups = self.round.matchups.len(),
      "round started"
    );
    self.pending = Some(PendingResolution {
      bracket,
      inactive_ids,
      auto_bot_ids,
      penalize_inactive: options.penalize_inactive,
      ready_moves,
    });

    let step = self.lifecycle.begin(self.round.matchups.len(), now_ms);
    self.round.enter(step);
    if step.phase == Phase::Results {
      let outcome = self.complete_round(now_ms);
      return Ok(RoundStart {
        pending: false,
        outcome: Some(outcome),
      });
    }
    self.schedule_next(now_ms);
    Ok(RoundStart {
      pending: true,
      outcome: None,
    })
  }

  /// Fires due phase transitions and a due automatic round. Returns the
  /// outcomes of every round that finished during the call.
  pub fn advance(&mut self, now_ms: u64) -> Vec<Outcome> {
    let mut finished = self.advance_round(now_ms);

    let due = self.next_round_at_ms.is_some_and(|at| at <= now_ms);
    if due && !self.round.is_pending() {
      let trigger = if self.config.tournament_mode {
        Trigger::Tournament
      } else {
        Trigger::Auto
      };
      match self.start_round(StartRoundOptions::automatic(trigger), now_ms) {
        Ok(start) => finished.extend(start.outcome),
        Err(err) => {
          warn!(round = self.round.number, "automatic round failed: {err}");
          self.schedule_next(now_ms);
        }
      }
    }
    finished
  }

  fn advance_round(&mut self, now_ms: u64) -> Vec<Outcome> {
    let mut finished = Vec::new();
    for step in self.lifecycle.advance(now_ms) {
      self.round.enter(step);
      match step.phase {
        Phase::Duel => {
          debug!(round = self.round.number, matchup = ?step.matchup_index, "duel revealed");
        }
        Phase::Results => finished.push(self.complete_round(now_ms)),
        _ => {
          debug!(round = self.round.number, phase = ?step.phase, "phase entered");
        }
      }
    }
    finished
  }

  /// Earliest moment `advance` has work to do.
  pub fn next_deadline_ms(&self) -> Option<u64> {
    if self.round.is_pending() {
      return self.lifecycle.deadline();
    }
    self.next_round_at_ms
  }

  /// Plays rounds back to back until at most one player is left, driving
  /// phase timers on a simulated clock. Returns the outcome of every round.
  pub fn run_tournament(&mut self, now_ms: u64, max_rounds: usize) -> GameResult<Vec<Outcome>> {
    let mut outcomes = Vec::new();
    let mut clock = now_ms;
    while self.active_player_count() > 1 && outcomes.len() < max_rounds {
      let start = self.start_round(StartRoundOptions::automatic(Trigger::Tournament), clock)?;
      if let Some(outcome) = start.outcome {
        outcomes.push(outcome);
        continue;
      }
      let mut safety = 0;
      while let Some(deadline) = self.lifecycle.deadline() {
        safety += 1;
        if safety > 10_000 {
          warn!(round = self.round.number, "tournament phase safety limit reached");
          break;
        }
        clock = clock.max(deadline);
        outcomes.extend(self.advance_round(clock));
      }
    }
    info!(rounds = outcomes.len(), remaining = self.active_player_count(), "tournament finished");
    Ok(outcomes)
  }

  fn complete_round(&mut self, now_ms: u64) -> Outcome {
    let Some(pending) = self.pending.take() else {
      return Outcome::skipped("No round was in progress.", self.round.number, Trigger::Manual);
    };
    self.lifecycle.cancel();
    self.round.reveal_all();
    let bounds = self.config.bounds();
    let round_number = self.round.number;
    let bracket = pending.bracket;

    for change in &bracket.changes {
      match change {
        StandingChange::Promote(id) => {
          if let Some(player) = self.player_mut(id) {
            player.mark_winner(&bounds);
          }
        }
        StandingChange::Demote(id) => {
          if let Some(player) = self.player_mut(id) {
            player.demote(&bounds);
          }
        }
        StandingChange::Eliminate(id) => {
          if let Some(player) = self.player_mut(id) {
            player.eliminate();
          }
        }
      }
    }
    for id in &bracket.tied_ids {
      if let Some(player) = self.player_mut(id) {
        player.hold();
      }
    }

    let mut eliminated_ids = bracket.eliminated_ids.clone();
    let mut elimination_events: Vec<EliminationEvent> = bracket
      .eliminations
      .iter()
      .map(|e| EliminationEvent {
        player_id: e.player_id.clone(),
        player_name: e.player_name.clone(),
        stage: e.stage,
        round_number,
      })
      .collect();
    let inactive_ids = if pending.penalize_inactive {
      let events = self.penalize_inactive(&pending.inactive_ids, round_number);
      for event in events {
        eliminated_ids.push(event.player_id.clone());
        elimination_events.push(event);
      }
      pending.inactive_ids
    } else {
      Vec::new()
    };
    for id in &pending.auto_bot_ids {
      if let Some(player) = self.player_mut(id) {
        player.clear_auto_move();
      }
    }

    let status = if bracket.moved_anyone() || !inactive_ids.is_empty() {
      OutcomeStatus::Completed
    } else {
      OutcomeStatus::Tie
    };
    let message = self.outcome_message(status, &bracket, &pending.ready_moves);
    let outcome = Outcome {
      status,
      message,
      round_number,
      triggered_by: self.round.triggered_by.unwrap_or_default(),
      winning_moves: bracket.winning_moves.clone(),
      winner_player_ids: bracket.winner_ids.clone(),
      bye_player_ids: bracket.bye_ids.clone(),
      tied_player_ids: bracket.tied_ids.clone(),
      eliminated_player_ids: eliminated_ids,
      inactive_player_ids: inactive_ids,
      demoted_player_steps: bracket.demoted_steps.clone(),
      elimination_events,
      matchups: self.round.matchups.iter().map(|m| m.view()).collect(),
      started_at: self.round.started_at_ms.and_then(iso_from_ms),
      completed_at: iso_from_ms(now_ms),
    };
    info!(
      round = round_number,
      status = ?outcome.status,
      winners = outcome.winner_player_ids.len(),
      eliminated = outcome.eliminated_player_ids.len(),
      "round completed"
    );
    self.finalize_round(outcome, now_ms)
  }

  /// Inactive players take a loss; one already on the bottom stage is out.
  fn penalize_inactive(&mut self, ids: &[String], round_number: u32) -> Vec<EliminationEvent> {
    let bounds = self.config.bounds();
    let mut events = Vec::new();
    for id in ids {
      let Some(player) = self.player_mut(id) else {
        continue;
      };
      if player.layer <= bounds.min {
        events.push(EliminationEvent {
          player_id: player.id.clone(),
          player_name: player.name.clone(),
          stage: player.layer,
          round_number,
        });
        player.eliminate();
      } else {
        player.mark_inactive(&bounds);
      }
    }
    events
  }

  fn outcome_message(&self, status: OutcomeStatus, bracket: &BracketOutcome, ready_moves: &[Move]) -> String {
    if status == OutcomeStatus::Tie {
      return match ready_moves.split_first() {
        Some((first, rest)) if rest.iter().all(|mv| mv == first) => {
          format!("Everyone picked {first}. No one moves layers.")
        }
        _ => "Every duel was tied. No one moves layers.".to_string(),
      };
    }
    if ready_moves.len() == 1 {
      if let Some(solo) = bracket.bye_ids.first().and_then(|id| self.player(id)) {
        return format!("{} wins by default as the only player ready.", solo.name);
      }
    }
    format!(
      "{} advanced, {} dropped a stage, {} eliminated.",
      bracket.winner_ids.len() + bracket.bye_ids.len(),
      bracket.demoted_steps.len(),
      bracket.eliminated_ids.len()
    )
  }

  fn skip_round(
    &mut self,
    message: &str,
    options: &StartRoundOptions,
    penalized: Vec<String>,
    now_ms: u64,
  ) -> Outcome {
    let round_number = self.round.number;
    let mut outcome = Outcome::skipped(message, round_number, options.triggered_by);
    if !penalized.is_empty() {
      outcome.elimination_events = self.penalize_inactive(&penalized, round_number);
      outcome.eliminated_player_ids = outcome
        .elimination_events
        .iter()
        .map(|e| e.player_id.clone())
        .collect();
      outcome.inactive_player_ids = penalized;
    }
    outcome.completed_at = iso_from_ms(now_ms);
    self.round.triggered_by = Some(options.triggered_by);
    info!(round = round_number, triggered_by = %options.triggered_by, "round skipped: {message}");
    self.finalize_round(outcome, now_ms)
  }

  /// Archives the live round and opens the next one in `waiting`.
  fn finalize_round(&mut self, outcome: Outcome, now_ms: u64) -> Outcome {
    self.round.completed = true;
    self.round.completed_at_ms = Some(now_ms);
    self.round.phase_ends_at_ms = None;
    self.round.current_matchup_index = None;
    self.round.outcome = Some(outcome.clone());
    let next = Round::new(self.round.number + 1);
    let archived = std::mem::replace(&mut self.round, next);
    self.history.push(archived);
    self.last_outcome = Some(outcome.clone());
    self.schedule_next(now_ms);
    outcome
  }

  fn schedule_next(&mut self, now_ms: u64) {
    self.next_round_at_ms = if self.config.tournament_mode {
      (self.active_player_count() > 1).then(|| now_ms + self.config.tournament_continue_ms)
    } else if self.config.round_interval_ms > 0 {
      Some(now_ms + self.config.round_interval_ms)
    } else {
      None
    };
  }

  // ── Read & reset ─────────────────────────────────────────────────────

  pub fn public_state(&self, now_ms: u64) -> PublicState {
    PublicState {
      players: self.players.iter().map(Player::serialize).collect(),
      round: self.round.view(),
      last_outcome: self.last_outcome.clone(),
      next_round_starts_at: self.next_round_at_ms.and_then(iso_from_ms),
      round_interval_ms: self.config.round_interval_ms,
      available_moves: Move::ALL.to_vec(),
      tournament_mode: self.config.tournament_mode,
      active_players: self.active_player_count(),
      server_time: iso_from_ms(now_ms),
    }
  }

  /// Drops every player and round, including one mid-duel.
  pub fn reset_game(&mut self, now_ms: u64) {
    self.players.clear();
    self.index.clear();
    self.round = Round::new(1);
    self.history.clear();
    self.last_outcome = None;
    self.pending = None;
    self.lifecycle.cancel();
    self.schedule_next(now_ms);
    info!("game reset");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lifecycle::PhaseDurations;
  use crate::types::{MatchupResult, PlayerStatus, TieBreak};

  fn instant_config() -> EngineConfig {
    EngineConfig {
      round_interval_ms: 0,
      duel_stage_ms: 0,
      process_stage_ms: 0,
      compete_stage_ms: 0,
      seed: Some(42),
      ..EngineConfig::default()
    }
  }

  fn timed_config() -> EngineConfig {
    EngineConfig {
      round_interval_ms: 0,
      duel_stage_ms: 100,
      process_stage_ms: 200,
      compete_stage_ms: 300,
      seed: Some(42),
      ..EngineConfig::default()
    }
  }

  fn join(game: &mut GameState, name: &str) -> String {
    game
      .register_player(
        RegisterPlayer {
          name: name.to_string(),
          ..RegisterPlayer::default()
        },
        0,
      )
      .unwrap()
      .id
  }

  fn join_admin(game: &mut GameState) -> String {
    game
      .register_player(
        RegisterPlayer {
          name: "Admin".to_string(),
          role: Role::Admin,
          ..RegisterPlayer::default()
        },
        0,
      )
      .unwrap()
      .id
  }

  fn join_bot(game: &mut GameState, name: &str, strategy: BotStrategy) -> String {
    game
      .register_player(
        RegisterPlayer {
          name: name.to_string(),
          is_bot: true,
          bot_strategy: Some(strategy),
          ..RegisterPlayer::default()
        },
        0,
      )
      .unwrap()
      .id
  }

  fn manual(admin: &str) -> StartRoundOptions {
    StartRoundOptions {
      admin_id: Some(admin.to_string()),
      ..StartRoundOptions::default()
    }
  }

  #[test]
  fn test_register_validation() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let empty = game.register_player(
      RegisterPlayer {
        name: "   ".to_string(),
        ..RegisterPlayer::default()
      },
      0,
    );
    assert!(matches!(empty, Err(GameError::Validation(_))));

    join(&mut game, "Ada");
    let dup = game.register_player(
      RegisterPlayer {
        name: "ada".to_string(),
        ..RegisterPlayer::default()
      },
      0,
    );
    assert!(matches!(dup, Err(GameError::Validation(_))));

    join_admin(&mut game);
    let second_admin = game.register_player(
      RegisterPlayer {
        name: "Other".to_string(),
        role: Role::Admin,
        ..RegisterPlayer::default()
      },
      0,
    );
    assert_eq!(
      second_admin.unwrap_err(),
      GameError::validation("An admin is already registered for this game.")
    );
    assert_eq!(game.public_state(0).players.len(), 2);
  }

  #[test]
  fn test_set_move_errors() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let admin = join_admin(&mut game);
    let ada = join(&mut game, "Ada");

    assert!(matches!(
      game.set_player_move("missing", Some("rock"), None, 0),
      Err(GameError::NotFound(_))
    ));
    assert!(matches!(
      game.set_player_move(&ada, Some("lizard"), None, 0),
      Err(GameError::Validation(_))
    ));
    assert!(matches!(
      game.set_player_move(&ada, Some("rock"), Some(5), 0),
      Err(GameError::Validation(_))
    ));
    assert!(matches!(
      game.set_player_move(&admin, Some("rock"), None, 0),
      Err(GameError::Precondition(_))
    ));

    let view = game.set_player_move(&ada, Some("Rock"), None, 5).unwrap();
    assert_eq!(view.current_move, Some(Move::Rock));
    assert_eq!(view.status, PlayerStatus::Ready);

    let cleared = game.set_player_move(&ada, None, None, 6).unwrap();
    assert_eq!(cleared.current_move, None);
  }

  #[test]
  fn test_rock_beats_scissors_round() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let admin = join_admin(&mut game);
    let rock = join(&mut game, "Rocky");
    let scissors = join(&mut game, "Snips");
    game.set_player_move(&rock, Some("rock"), None, 1).unwrap();
    game.set_player_move(&scissors, Some("scissors"), None, 1).unwrap();

    let start = game.start_round(manual(&admin), 10).unwrap();
    assert!(!start.pending);
    let outcome = start.outcome.unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.winner_player_ids, vec![rock.clone()]);
    assert_eq!(outcome.demoted_player_steps.get(&scissors), Some(&1));
    assert!(outcome.eliminated_player_ids.is_empty());
    assert_eq!(outcome.round_number, 1);

    let winner = game.player(&rock).unwrap();
    assert_eq!(winner.layer, 0);
    assert_eq!(winner.status, PlayerStatus::Winner);
    let loser = game.player(&scissors).unwrap();
    assert_eq!(loser.layer, -1);
    assert!(loser.active);

    assert_eq!(game.round().number, 2);
    assert_eq!(game.round().phase, Phase::Waiting);
    assert_eq!(game.round_history().len(), 1);
    assert!(game.last_outcome().is_some());
  }

  #[test]
  fn test_four_players_partition() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let admin = join_admin(&mut game);
    let moves = ["rock", "rock", "scissors", "scissors"];
    let ids: Vec<String> = moves
      .iter()
      .enumerate()
      .map(|(i, mv)| {
        let id = join(&mut game, &format!("P{i}"));
        game.set_player_move(&id, Some(mv), None, 0).unwrap();
        id
      })
      .collect();

    let outcome = game.start_round(manual(&admin), 1).unwrap().outcome.unwrap();
    let top = outcome.matchups.iter().filter(|m| m.stage == 0).count();
    assert_eq!(top, 2);
    let classified = outcome.winner_player_ids.len()
      + outcome.bye_player_ids.len()
      + outcome.tied_player_ids.len()
      + outcome.eliminated_player_ids.len()
      + outcome.demoted_player_steps.len();
    assert_eq!(classified, ids.len());
  }

  #[test]
  fn test_single_active_player_auto_round_skipped() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let solo = join(&mut game, "Solo");
    game.set_player_move(&solo, Some("paper"), None, 0).unwrap();
    let before = game.player(&solo).unwrap().clone();

    let start = game
      .start_round(StartRoundOptions::automatic(Trigger::Auto), 5)
      .unwrap();
    let outcome = start.outcome.unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Skipped);
    assert!(outcome.message.contains("Not enough players"));
    assert_eq!(outcome.triggered_by, Trigger::Auto);

    let after = game.player(&solo).unwrap();
    assert_eq!(after.layer, before.layer);
    assert_eq!(after.status, before.status);
    assert_eq!(game.round().number, 2);
  }

  #[test]
  fn test_non_admin_cannot_start() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    join_admin(&mut game);
    let ada = join(&mut game, "Ada");
    let bob = join(&mut game, "Bob");
    game.set_player_move(&ada, Some("rock"), None, 0).unwrap();
    game.set_player_move(&bob, Some("paper"), None, 0).unwrap();

    let err = game.start_round(manual(&ada), 1).unwrap_err();
    assert_eq!(err, GameError::precondition("Only an admin can start the round."));
    assert_eq!(game.round().phase, Phase::Waiting);
    assert!(!game.round().started);
    assert_eq!(game.round().number, 1);

    let missing = game.start_round(StartRoundOptions::default(), 1).unwrap_err();
    assert!(matches!(missing, GameError::Precondition(_)));
    let unknown = game.start_round(manual("nobody"), 1).unwrap_err();
    assert!(matches!(unknown, GameError::NotFound(_)));
  }

  #[test]
  fn test_require_all_ready_leaves_bots_untouched() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let admin = join_admin(&mut game);
    let bot = join_bot(&mut game, "Botty", BotStrategy::Rock);
    join(&mut game, "Idle");

    let err = game.start_round(manual(&admin), 1).unwrap_err();
    assert!(matches!(err, GameError::Precondition(_)));
    assert_eq!(game.player(&bot).unwrap().current_move, None);
  }

  #[test]
  fn test_timed_round_hides_unrevealed_matchups() {
    let mut game = GameState::new(timed_config(), 0).unwrap();
    let admin = join_admin(&mut game);
    for (i, mv) in ["rock", "scissors", "paper", "rock"].iter().enumerate() {
      let id = join(&mut game, &format!("P{i}"));
      game.set_player_move(&id, Some(mv), None, 0).unwrap();
    }

    let start = game.start_round(manual(&admin), 1_000).unwrap();
    assert!(start.pending);
    assert!(start.outcome.is_none());

    let state = game.public_state(1_000);
    assert_eq!(state.round.phase, Phase::Duel);
    assert!(state.round.matchups.len() >= 2);
    assert!(state.round.matchups[0].revealed);
    let hidden = &state.round.matchups[1];
    assert!(!hidden.revealed);
    assert_eq!(hidden.result, MatchupResult::Pending);
    assert!(hidden.winner_id.is_none());
    assert!(hidden.loser_id.is_none());
    assert!(hidden.a_move.is_none());
    assert_eq!(game.next_deadline_ms(), Some(1_100));

    let ada = game.public_state(0).players[1].id.clone();
    assert!(matches!(
      game.set_player_move(&ada, Some("paper"), None, 1_050),
      Err(GameError::Precondition(_))
    ));
    assert!(matches!(
      game.start_round(manual(&admin), 1_050),
      Err(GameError::Precondition(_))
    ));

    assert!(game.advance(1_100).is_empty());
    assert!(game.public_state(1_100).round.matchups[1].revealed);

    let mut finished = Vec::new();
    let mut safety = 0;
    while let Some(deadline) = game.next_deadline_ms() {
      safety += 1;
      assert!(safety < 100);
      finished.extend(game.advance(deadline));
    }
    assert_eq!(finished.len(), 1);
    assert!(finished[0].matchups.iter().all(|m| m.revealed));
    assert_eq!(game.round().number, 2);
    assert_eq!(game.round_history()[0].phase, Phase::Results);
  }

  #[test]
  fn test_reset_is_idempotent() {
    let mut game = GameState::new(timed_config(), 0).unwrap();
    let admin = join_admin(&mut game);
    let a = join(&mut game, "A");
    let b = join(&mut game, "B");
    game.set_player_move(&a, Some("rock"), None, 0).unwrap();
    game.set_player_move(&b, Some("paper"), None, 0).unwrap();
    assert!(game.start_round(manual(&admin), 10).unwrap().pending);

    game.reset_game(20);
    let once = serde_json::to_value(game.public_state(20)).unwrap();
    game.reset_game(20);
    let twice = serde_json::to_value(game.public_state(20)).unwrap();
    assert_eq!(once, twice);

    assert!(game.public_state(20).players.is_empty());
    assert_eq!(game.round().number, 1);
    assert!(!game.round().started);
    assert!(game.last_outcome().is_none());
    assert_eq!(game.next_deadline_ms(), None);
    assert!(game.advance(10_000).is_empty());
  }

  #[test]
  fn test_auto_round_fires_on_schedule() {
    let config = EngineConfig {
      round_interval_ms: 1_000,
      ..instant_config()
    };
    let mut game = GameState::new(config, 0).unwrap();
    let a = join(&mut game, "A");
    let b = join(&mut game, "B");
    game.set_player_move(&a, Some("rock"), None, 0).unwrap();
    game.set_player_move(&b, Some("scissors"), None, 0).unwrap();
    assert_eq!(game.next_deadline_ms(), Some(1_000));

    assert!(game.advance(999).is_empty());
    let finished = game.advance(1_000);
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].triggered_by, Trigger::Auto);
    assert_eq!(game.next_deadline_ms(), Some(2_000));
  }

  #[test]
  fn test_inactive_player_penalized() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let a = join(&mut game, "A");
    let b = join(&mut game, "B");
    let idle = join(&mut game, "Idle");
    game.set_player_move(&a, Some("rock"), None, 0).unwrap();
    game.set_player_move(&b, Some("scissors"), None, 0).unwrap();

    let outcome = game
      .start_round(StartRoundOptions::automatic(Trigger::Auto), 1)
      .unwrap()
      .outcome
      .unwrap();
    assert_eq!(outcome.inactive_player_ids, vec![idle.clone()]);
    let idle = game.player(&idle).unwrap();
    assert_eq!(idle.layer, -1);
    assert_eq!(idle.status, PlayerStatus::Inactive);
  }

  #[test]
  fn test_only_ready_player_wins_by_default() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let a = join(&mut game, "Ada");
    let idle = join(&mut game, "Idle");
    game.set_player_move(&a, Some("rock"), None, 0).unwrap();

    let outcome = game
      .start_round(StartRoundOptions::automatic(Trigger::Auto), 1)
      .unwrap()
      .outcome
      .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.bye_player_ids, vec![a.clone()]);
    assert_eq!(outcome.message, "Ada wins by default as the only player ready.");
    assert_eq!(outcome.inactive_player_ids, vec![idle]);
  }

  #[test]
  fn test_nobody_ready_is_skipped_with_penalty() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let a = join(&mut game, "A");
    join(&mut game, "B");
    let outcome = game
      .start_round(StartRoundOptions::automatic(Trigger::Auto), 1)
      .unwrap()
      .outcome
      .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Skipped);
    assert_eq!(outcome.inactive_player_ids.len(), 2);
    assert_eq!(game.player(&a).unwrap().layer, -1);
  }

  #[test]
  fn test_identical_moves_tie() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let admin = join_admin(&mut game);
    let ids: Vec<String> = (0..3).map(|i| join(&mut game, &format!("P{i}"))).collect();
    for id in &ids {
      game.set_player_move(id, Some("paper"), None, 0).unwrap();
    }
    let outcome = game.start_round(manual(&admin), 1).unwrap().outcome.unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Tie);
    assert_eq!(outcome.message, "Everyone picked paper. No one moves layers.");
    assert_eq!(outcome.tied_player_ids.len(), 3);
    for id in &ids {
      let player = game.player(id).unwrap();
      assert_eq!(player.layer, 0);
      assert_eq!(player.status, PlayerStatus::Ready);
    }
  }

  #[test]
  fn test_random_bot_move_cleared_after_round() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let bot = join_bot(&mut game, "Randy", BotStrategy::Random);
    let human = join(&mut game, "Ada");
    game.set_player_move(&human, Some("rock"), None, 0).unwrap();

    game
      .start_round(StartRoundOptions::automatic(Trigger::Auto), 1)
      .unwrap();
    let bot = game.player(&bot).unwrap();
    assert!(bot.active);
    assert_eq!(bot.current_move, None);
    assert!(bot.stage_strategies.is_empty());
  }

  #[test]
  fn test_fixed_bot_keeps_its_move() {
    let mut game = GameState::new(instant_config(), 0).unwrap();
    let bot = join_bot(&mut game, "Papyrus", BotStrategy::Paper);
    let human = join(&mut game, "Ada");
    game.set_player_move(&human, Some("rock"), None, 0).unwrap();

    let outcome = game
      .start_round(StartRoundOptions::automatic(Trigger::Auto), 1)
      .unwrap()
      .outcome
      .unwrap();
    assert_eq!(outcome.winner_player_ids, vec![bot.clone()]);
    let bot = game.player(&bot).unwrap();
    assert_eq!(bot.layer, 0);
    assert_eq!(bot.current_move, Some(Move::Paper));
    assert_eq!(bot.stage_strategies.get(&0), Some(&Move::Paper));
  }

  #[test]
  fn test_tournament_runs_down_to_one() {
    let config = EngineConfig {
      min_layer: -1,
      tie_break: TieBreak::CoinFlip,
      ..instant_config()
    };
    let mut game = GameState::new(config, 0).unwrap();
    for i in 0..6 {
      join_bot(&mut game, &format!("Bot{i}"), BotStrategy::Random);
    }
    let outcomes = game.run_tournament(0, 500).unwrap();
    assert!(!outcomes.is_empty());
    assert!(game.active_player_count() <= 1);
    assert!(outcomes.iter().all(|o| o.triggered_by == Trigger::Tournament));
  }

  #[test]
  fn test_timed_tournament_drives_its_own_clock() {
    let config = EngineConfig {
      min_layer: -1,
      seed: Some(3),
      ..timed_config()
    };
    let mut game = GameState::new(config, 0).unwrap();
    for (i, strategy) in [BotStrategy::Rock, BotStrategy::Scissors].iter().enumerate() {
      join_bot(&mut game, &format!("Bot{i}"), *strategy);
    }
    let outcomes = game.run_tournament(0, 10).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(game.active_player_count(), 1);
    assert!(!game.round().is_pending());
  }

  #[test]
  fn test_tournament_scheduler_continues_until_one_left() {
    let config = EngineConfig {
      tournament_mode: true,
      tournament_continue_ms: 500,
      min_layer: -1,
      ..instant_config()
    };
    let mut game = GameState::new(config, 0).unwrap();
    let admin = join_admin(&mut game);
    join_bot(&mut game, "Rocky", BotStrategy::Rock);
    join_bot(&mut game, "Snips", BotStrategy::Scissors);
    join_bot(&mut game, "Shears", BotStrategy::Scissors);
    assert_eq!(game.next_deadline_ms(), None);

    let first = game.start_round(manual(&admin), 10).unwrap().outcome.unwrap();
    assert_eq!(first.triggered_by, Trigger::Manual);
    assert!(game.active_player_count() >= 2);
    assert_eq!(game.next_deadline_ms(), Some(510));
    assert!(game.advance(509).is_empty());

    let mut safety = 0;
    while let Some(due) = game.next_deadline_ms() {
      safety += 1;
      assert!(safety < 200);
      let finished = game.advance(due);
      assert_eq!(finished.len(), 1);
      assert_eq!(finished[0].triggered_by, Trigger::Tournament);
      if game.active_player_count() > 1 {
        assert_eq!(game.next_deadline_ms(), Some(due + 500));
      }
    }
    assert_eq!(game.active_player_count(), 1);
    assert!(game.public_state(0).next_round_starts_at.is_none());
    assert!(game.advance(1_000_000).is_empty());
  }

  #[test]
  fn test_public_state_shape() {
    let game = GameState::new(instant_config(), 0).unwrap();
    let state = serde_json::to_value(game.public_state(0)).unwrap();
    assert_eq!(state["round"]["number"], 1);
    assert_eq!(state["round"]["phase"], "waiting");
    assert_eq!(state["availableMoves"], serde_json::json!(["rock", "paper", "scissors"]));
    assert!(state["lastOutcome"].is_null());
    assert!(state["nextRoundStartsAt"].is_null());
  }

  #[test]
  fn test_durations_come_from_config() {
    let game = GameState::new(timed_config(), 0).unwrap();
    assert_eq!(
      game.config().durations(),
      PhaseDurations {
        duel_stage_ms: 100,
        process_stage_ms: 200,
        compete_stage_ms: 300,
      }
    );
  }
}
