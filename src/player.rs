use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::iso_from_ms;
use crate::types::{BotStrategy, LayerBounds, Move, PlayerStatus, Role};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
  pub id: String,
  pub name: String,
  pub role: Role,
  pub is_bot: bool,
  pub bot_strategy: Option<BotStrategy>,
  pub layer: i32,
  #[serde(rename = "move")]
  pub current_move: Option<Move>,
  pub stage_strategies: BTreeMap<i32, Move>,
  pub status: PlayerStatus,
  pub active: bool,
  pub joined_at: Option<String>,
  pub last_move_at: Option<String>,
}

/// Mutable per-player record. `current_move` always mirrors
/// `stage_strategies[layer]`.
#[derive(Clone, Debug)]
pub struct Player {
  pub id: String,
  pub name: String,
  pub role: Role,
  pub is_bot: bool,
  pub bot_strategy: Option<BotStrategy>,
  pub layer: i32,
  pub current_move: Option<Move>,
  pub stage_strategies: BTreeMap<i32, Move>,
  pub status: PlayerStatus,
  pub active: bool,
  pub joined_at_ms: u64,
  pub last_move_at_ms: Option<u64>,
  /// Stage whose move was drawn by the bot assigner rather than chosen.
  auto_stage: Option<i32>,
}

impl Player {
  pub fn new(id: String, name: String, role: Role, start_layer: i32, now_ms: u64) -> Self {
    Player {
      id,
      name,
      role,
      is_bot: false,
      bot_strategy: None,
      layer: start_layer,
      current_move: None,
      stage_strategies: BTreeMap::new(),
      status: PlayerStatus::Waiting,
      active: true,
      joined_at_ms: now_ms,
      last_move_at_ms: None,
      auto_stage: None,
    }
  }

  pub fn new_bot(id: String, name: String, strategy: BotStrategy, start_layer: i32, now_ms: u64) -> Self {
    let mut player = Player::new(id, name, Role::Player, start_layer, now_ms);
    player.is_bot = true;
    player.bot_strategy = Some(strategy);
    player
  }

  /// Active, non-admin players take part in rounds.
  pub fn is_participant(&self) -> bool {
    self.role == Role::Player && self.active
  }

  pub fn is_eliminated(&self) -> bool {
    self.status == PlayerStatus::Eliminated
  }

  pub fn move_for(&self, stage: i32) -> Option<Move> {
    self.stage_strategies.get(&stage).copied()
  }

  pub fn set_move(&mut self, selection: Option<Move>, stage: i32, now_ms: u64) {
    if !self.is_participant() {
      return;
    }
    match selection {
      Some(mv) => {
        self.stage_strategies.insert(stage, mv);
      }
      None => {
        self.stage_strategies.remove(&stage);
      }
    }
    if self.auto_stage == Some(stage) {
      self.auto_stage = None;
    }
    self.last_move_at_ms = Some(now_ms);
    if stage == self.layer {
      self.refresh_move();
      self.status = if self.current_move.is_some() {
        PlayerStatus::Ready
      } else {
        PlayerStatus::Waiting
      };
    }
  }

  /// Bot assigner entry point; remembered so the draw can be discarded
  /// once the round is over.
  pub fn set_auto_move(&mut self, mv: Move, now_ms: u64) {
    let stage = self.layer;
    self.set_move(Some(mv), stage, now_ms);
    self.auto_stage = Some(stage);
  }

  pub fn clear_auto_move(&mut self) {
    let Some(stage) = self.auto_stage.take() else {
      return;
    };
    self.stage_strategies.remove(&stage);
    self.refresh_move();
    if self.status == PlayerStatus::Ready && self.current_move.is_none() {
      self.status = PlayerStatus::Waiting;
    }
  }

  pub fn mark_winner(&mut self, bounds: &LayerBounds) {
    self.status = PlayerStatus::Winner;
    self.layer = (self.layer + 1).min(bounds.max);
    self.refresh_move();
  }

  pub fn eliminate(&mut self) {
    self.status = PlayerStatus::Eliminated;
    self.active = false;
    self.current_move = None;
  }

  pub fn demote(&mut self, bounds: &LayerBounds) {
    self.layer = (self.layer - 1).max(bounds.min);
    self.refresh_move();
    self.status = if self.current_move.is_some() {
      PlayerStatus::Ready
    } else {
      PlayerStatus::Waiting
    };
  }

  /// Fully tied stage: layer kept, status recomputed from the live move.
  pub fn hold(&mut self) {
    self.refresh_move();
    self.status = if self.current_move.is_some() {
      PlayerStatus::Ready
    } else {
      PlayerStatus::Waiting
    };
  }

  pub fn mark_inactive(&mut self, bounds: &LayerBounds) {
    self.demote(bounds);
    self.status = PlayerStatus::Inactive;
  }

  fn refresh_move(&mut self) {
    self.current_move = self.move_for(self.layer);
  }

  pub fn serialize(&self) -> PlayerView {
    PlayerView {
      id: self.id.clone(),
      name: self.name.clone(),
      role: self.role,
      is_bot: self.is_bot,
      bot_strategy: self.bot_strategy,
      layer: self.layer,
      current_move: self.current_move,
      stage_strategies: self.stage_strategies.clone(),
      status: self.status,
      active: self.active,
      joined_at: iso_from_ms(self.joined_at_ms),
      last_move_at: self.last_move_at_ms.and_then(iso_from_ms),
    }
  }
}
