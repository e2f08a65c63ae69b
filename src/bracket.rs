//! Stage bracket resolution.
//!
//! Players are bucketed by layer and processed from the top stage down as a
//! cascading queue: a duel loser drops one layer and is pushed into the bucket
//! below, where it is paired again within the same round. An odd participant
//! takes a bye at its own stage; an odd cascaded loser stays where it landed.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::player::Player;
use crate::rng::GameRng;
use crate::types::{LayerBounds, MatchupResult, Move, TieBreak};

#[derive(Clone, Debug)]
pub struct BracketRules {
  pub bounds: LayerBounds,
  pub tie_break: TieBreak,
}

/// Snapshot of a ready player as the resolver sees it.
#[derive(Clone, Debug)]
pub struct Entrant {
  pub id: String,
  pub name: String,
  pub layer: i32,
  pub strategies: BTreeMap<i32, Move>,
  /// Fixed-strategy bots play the same move on every stage.
  pub fixed: Option<Move>,
}

impl Entrant {
  pub fn from_player(player: &Player) -> Self {
    Entrant {
      id: player.id.clone(),
      name: player.name.clone(),
      layer: player.layer,
      strategies: player.stage_strategies.clone(),
      fixed: player.bot_strategy.and_then(|s| s.fixed_move()),
    }
  }

  fn move_at(&self, stage: i32) -> Option<Move> {
    self.strategies.get(&stage).copied().or(self.fixed)
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupView {
  pub id: String,
  pub stage: i32,
  pub a_id: String,
  pub a_name: String,
  pub b_id: Option<String>,
  pub b_name: Option<String>,
  pub result: MatchupResult,
  pub winner_id: Option<String>,
  pub winner_ids: Vec<String>,
  pub loser_id: Option<String>,
  pub loser_next_layer: Option<i32>,
  pub a_move: Option<Move>,
  pub b_move: Option<Move>,
  pub revealed: bool,
}

#[derive(Clone, Debug)]
struct Resolution {
  result: MatchupResult,
  winner_ids: Vec<String>,
  loser_id: Option<String>,
  loser_next_layer: Option<i32>,
  a_move: Option<Move>,
  b_move: Option<Move>,
}

/// One pairing in a round. The result is computed when the bracket is
/// resolved but only reaches `view()` once `reveal()` has been called.
#[derive(Clone, Debug)]
pub struct Matchup {
  pub id: String,
  pub stage: i32,
  pub a_id: String,
  pub a_name: String,
  pub b_id: Option<String>,
  pub b_name: Option<String>,
  pub revealed: bool,
  resolution: Resolution,
}

impl Matchup {
  pub fn reveal(&mut self) {
    self.revealed = true;
  }

  /// The resolved result, regardless of reveal state. Engine-internal.
  pub fn resolved_result(&self) -> MatchupResult {
    self.resolution.result
  }

  pub fn resolved_loser(&self) -> Option<(&str, Option<i32>)> {
    self
      .resolution
      .loser_id
      .as_deref()
      .map(|id| (id, self.resolution.loser_next_layer))
  }

  pub fn involves(&self, player_id: &str) -> bool {
    self.a_id == player_id || self.b_id.as_deref() == Some(player_id)
  }

  pub fn view(&self) -> MatchupView {
    let mut view = MatchupView {
      id: self.id.clone(),
      stage: self.stage,
      a_id: self.a_id.clone(),
      a_name: self.a_name.clone(),
      b_id: self.b_id.clone(),
      b_name: self.b_name.clone(),
      result: MatchupResult::Pending,
      winner_id: None,
      winner_ids: Vec::new(),
      loser_id: None,
      loser_next_layer: None,
      a_move: None,
      b_move: None,
      revealed: self.revealed,
    };
    if self.revealed {
      let res = &self.resolution;
      view.result = res.result;
      view.winner_id = if res.winner_ids.len() == 1 {
        res.winner_ids.first().cloned()
      } else {
        None
      };
      view.winner_ids = res.winner_ids.clone();
      view.loser_id = res.loser_id.clone();
      view.loser_next_layer = res.loser_next_layer;
      view.a_move = res.a_move;
      view.b_move = res.b_move;
    }
    view
  }
}

/// Layer movement to replay on the real players, in resolution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StandingChange {
  Promote(String),
  Demote(String),
  Eliminate(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Elimination {
  pub player_id: String,
  pub player_name: String,
  pub stage: i32,
}

#[derive(Clone, Debug, Default)]
pub struct BracketOutcome {
  pub matchups: Vec<Matchup>,
  pub changes: Vec<StandingChange>,
  pub winner_ids: Vec<String>,
  pub bye_ids: Vec<String>,
  pub tied_ids: Vec<String>,
  pub eliminated_ids: Vec<String>,
  pub demoted_steps: BTreeMap<String, u32>,
  pub eliminations: Vec<Elimination>,
  pub winning_moves: Vec<Move>,
}

impl BracketOutcome {
  /// True when at least one layer or status changes.
  pub fn moved_anyone(&self) -> bool {
    !self.changes.is_empty()
  }

  pub fn participant_count(&self) -> usize {
    self.winner_ids.len()
      + self.bye_ids.len()
      + self.tied_ids.len()
      + self.eliminated_ids.len()
      + self.demoted_steps.len()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Standing {
  Unresolved,
  Won,
  Bye,
  Held,
  Dropped,
  Eliminated,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
  idx: usize,
  /// Arrived in this bucket by losing a duel this round.
  cascaded: bool,
}

struct BracketRun<'a> {
  round_number: u32,
  rules: &'a BracketRules,
  entrants: Vec<Entrant>,
  standing: Vec<Standing>,
  drops: Vec<u32>,
  queue: BTreeMap<i32, Vec<Slot>>,
  matchups: Vec<Matchup>,
  changes: Vec<StandingChange>,
  eliminations: Vec<Elimination>,
  winning_moves: BTreeSet<Move>,
}

/// Pair and resolve every entrant for one round.
pub fn resolve_bracket(
  round_number: u32,
  entrants: Vec<Entrant>,
  rules: &BracketRules,
  rng: &mut GameRng,
) -> BracketOutcome {
  let mut run = BracketRun::new(round_number, entrants, rules);
  run.execute(rng);
  run.finish()
}

impl<'a> BracketRun<'a> {
  fn new(round_number: u32, entrants: Vec<Entrant>, rules: &'a BracketRules) -> Self {
    let mut queue: BTreeMap<i32, Vec<Slot>> = BTreeMap::new();
    for (idx, entrant) in entrants.iter().enumerate() {
      queue
        .entry(entrant.layer)
        .or_default()
        .push(Slot { idx, cascaded: false });
    }
    let count = entrants.len();
    BracketRun {
      round_number,
      rules,
      entrants,
      standing: vec![Standing::Unresolved; count],
      drops: vec![0; count],
      queue,
      matchups: Vec::new(),
      changes: Vec::new(),
      eliminations: Vec::new(),
      winning_moves: BTreeSet::new(),
    }
  }

  fn execute(&mut self, rng: &mut GameRng) {
    let mut safety = 0;
    while let Some((stage, bucket)) = self.queue.pop_last() {
      safety += 1;
      if safety > 10_000 {
        warn!(round = self.round_number, stage, "bracket safety limit reached, stopping early");
        break;
      }
      self.resolve_stage(stage, bucket, rng);
    }
  }

  fn current_move(&self, idx: usize) -> Option<Move> {
    let entrant = &self.entrants[idx];
    entrant.move_at(entrant.layer)
  }

  fn resolve_stage(&mut self, stage: i32, bucket: Vec<Slot>, rng: &mut GameRng) {
    let (mut armed, stranded): (Vec<Slot>, Vec<Slot>) = bucket
      .into_iter()
      .partition(|slot| self.current_move(slot.idx).is_some());

    // Cascaded losers without a move for their new stage cannot be paired.
    for slot in stranded {
      self.settle_unpaired(stage, slot);
    }
    if armed.is_empty() {
      return;
    }

    rng.shuffle(&mut armed);

    if armed.len() >= 2 && self.all_same_move(&armed) {
      for pair in armed.chunks(2) {
        if let [a, b] = pair {
          self.push_matchup(stage, *a, Some(*b), MatchupResult::Tie, Vec::new());
        }
      }
      for slot in &armed {
        if self.standing[slot.idx] == Standing::Unresolved {
          self.standing[slot.idx] = Standing::Held;
        }
      }
      return;
    }

    let odd = if armed.len() % 2 == 1 { armed.pop() } else { None };
    for pair in armed.chunks(2) {
      if let [a, b] = pair {
        self.duel(stage, *a, *b, rng);
      }
    }
    if let Some(slot) = odd {
      self.place_odd(stage, slot);
    }
  }

  fn all_same_move(&self, slots: &[Slot]) -> bool {
    let mut moves = slots.iter().filter_map(|slot| self.current_move(slot.idx));
    let Some(first) = moves.next() else {
      return false;
    };
    moves.all(|mv| mv == first)
  }

  /// Byes never reach into another stage for an opponent.
  fn place_odd(&mut self, stage: i32, slot: Slot) {
    if slot.cascaded {
      self.settle_unpaired(stage, slot);
      return;
    }
    let winner = self.entrants[slot.idx].id.clone();
    self.push_matchup(stage, slot, None, MatchupResult::Bye, vec![winner]);
    self.promote(slot.idx, Standing::Bye);
  }

  /// A loser left without an opponent: eliminated at the bottom stage,
  /// otherwise it stays where it landed.
  fn settle_unpaired(&mut self, stage: i32, slot: Slot) {
    if slot.cascaded && stage <= self.rules.bounds.min {
      self.eliminate(slot.idx);
    } else if self.standing[slot.idx] == Standing::Unresolved {
      self.standing[slot.idx] = Standing::Held;
    }
  }

  fn duel(&mut self, stage: i32, a: Slot, b: Slot, rng: &mut GameRng) {
    let (Some(move_a), Some(move_b)) = (self.current_move(a.idx), self.current_move(b.idx)) else {
      return;
    };
    let result = if move_a.beats() == move_b {
      MatchupResult::A
    } else if move_b.beats() == move_a {
      MatchupResult::B
    } else {
      match self.rules.tie_break {
        TieBreak::Hold => MatchupResult::Tie,
        TieBreak::CoinFlip => match rng.below(3) {
          0 => MatchupResult::A,
          1 => MatchupResult::B,
          _ => MatchupResult::DoubleWin,
        },
      }
    };

    let id_a = self.entrants[a.idx].id.clone();
    let id_b = self.entrants[b.idx].id.clone();
    match result {
      MatchupResult::A | MatchupResult::B => {
        let (winner, loser, winning_move) = if result == MatchupResult::A {
          (a, b, move_a)
        } else {
          (b, a, move_b)
        };
        let winner_id = if result == MatchupResult::A { id_a } else { id_b };
        self.winning_moves.insert(winning_move);
        // Record before layers move so the stored moves are the ones played.
        let at = self.push_matchup(stage, a, Some(b), result, vec![winner_id]);
        self.promote(winner.idx, Standing::Won);
        let next_layer = self.demote_or_eliminate(loser.idx);
        let loser_id = self.entrants[loser.idx].id.clone();
        let resolution = &mut self.matchups[at].resolution;
        resolution.loser_id = Some(loser_id);
        resolution.loser_next_layer = next_layer;
      }
      MatchupResult::DoubleWin => {
        self.winning_moves.insert(move_a);
        self.push_matchup(stage, a, Some(b), result, vec![id_a, id_b]);
        self.promote(a.idx, Standing::Won);
        self.promote(b.idx, Standing::Won);
      }
      _ => {
        self.push_matchup(stage, a, Some(b), MatchupResult::Tie, Vec::new());
        for slot in [a, b] {
          if self.standing[slot.idx] == Standing::Unresolved {
            self.standing[slot.idx] = Standing::Held;
          }
        }
      }
    }
  }

  fn promote(&mut self, idx: usize, standing: Standing) {
    let entrant = &mut self.entrants[idx];
    entrant.layer = (entrant.layer + 1).min(self.rules.bounds.max);
    self.standing[idx] = standing;
    self.changes.push(StandingChange::Promote(entrant.id.clone()));
  }

  /// Drops the entrant one layer and requeues it, or eliminates it when it is
  /// already at the bottom. Returns the new layer if it survived.
  fn demote_or_eliminate(&mut self, idx: usize) -> Option<i32> {
    let layer = self.entrants[idx].layer;
    if layer <= self.rules.bounds.min {
      self.eliminate(idx);
      return None;
    }
    let next = layer - 1;
    self.entrants[idx].layer = next;
    self.drops[idx] += 1;
    self.standing[idx] = Standing::Dropped;
    self.changes.push(StandingChange::Demote(self.entrants[idx].id.clone()));
    self
      .queue
      .entry(next)
      .or_default()
      .push(Slot { idx, cascaded: true });
    Some(next)
  }

  fn eliminate(&mut self, idx: usize) {
    let entrant = &self.entrants[idx];
    self.standing[idx] = Standing::Eliminated;
    self.changes.push(StandingChange::Eliminate(entrant.id.clone()));
    self.eliminations.push(Elimination {
      player_id: entrant.id.clone(),
      player_name: entrant.name.clone(),
      stage: entrant.layer,
    });
  }

  fn push_matchup(
    &mut self,
    stage: i32,
    a: Slot,
    b: Option<Slot>,
    result: MatchupResult,
    winner_ids: Vec<String>,
  ) -> usize {
    let seq = self.matchups.len() + 1;
    let entrant_a = &self.entrants[a.idx];
    let entrant_b = b.map(|slot| &self.entrants[slot.idx]);
    let matchup = Matchup {
      id: format!("{}-{}-{}", self.round_number, stage, seq),
      stage,
      a_id: entrant_a.id.clone(),
      a_name: entrant_a.name.clone(),
      b_id: entrant_b.map(|e| e.id.clone()),
      b_name: entrant_b.map(|e| e.name.clone()),
      revealed: false,
      resolution: Resolution {
        result,
        winner_ids,
        loser_id: None,
        loser_next_layer: None,
        a_move: self.current_move(a.idx),
        b_move: b.and_then(|slot| self.current_move(slot.idx)),
      },
    };
    self.matchups.push(matchup);
    self.matchups.len() - 1
  }

  fn finish(self) -> BracketOutcome {
    let mut outcome = BracketOutcome {
      matchups: self.matchups,
      changes: self.changes,
      eliminations: self.eliminations,
      winning_moves: self.winning_moves.into_iter().collect(),
      ..BracketOutcome::default()
    };
    for (idx, entrant) in self.entrants.iter().enumerate() {
      let id = entrant.id.clone();
      match self.standing[idx] {
        Standing::Eliminated => outcome.eliminated_ids.push(id),
        Standing::Won => outcome.winner_ids.push(id),
        Standing::Bye => outcome.bye_ids.push(id),
        _ if self.drops[idx] > 0 => {
          outcome.demoted_steps.insert(id, self.drops[idx]);
        }
        _ => outcome.tied_ids.push(id),
      }
    }
    outcome
  }
}
