use tracing::debug;

use crate::player::Player;
use crate::rng::GameRng;
use crate::types::BotStrategy;

/// Fills in a move for every active bot that has none for its current layer.
/// Human moves and a bot's strategies for other stages are left alone.
/// Returns the ids of the bots that received a move.
pub fn assign_bot_moves(players: &mut [Player], rng: &mut GameRng, now_ms: u64) -> Vec<String> {
  let mut filled = Vec::new();
  for player in players.iter_mut() {
    if !player.is_bot || !player.is_participant() {
      continue;
    }
    if player.current_move.is_some() {
      continue;
    }
    let strategy = player.bot_strategy.unwrap_or_default();
    let mv = match strategy.fixed_move() {
      Some(mv) => {
        let stage = player.layer;
        player.set_move(Some(mv), stage, now_ms);
        mv
      }
      None => {
        let mv = rng.random_move();
        player.set_auto_move(mv, now_ms);
        mv
      }
    };
    debug!(player = %player.name, layer = player.layer, %mv, random = strategy == BotStrategy::Random, "bot move assigned");
    filled.push(player.id.clone());
  }
  filled
}
