//! Timer-free simulation: registers a field of players, feeds them
//! alternating move sets and prints the standings after every round.

use rps_stages_lib::config::{env_flag_true, load_env_file, now_ms, EngineConfig};
use rps_stages_lib::game::{GameState, RegisterPlayer, StartRoundOptions};
use rps_stages_lib::types::{Move, Role, Trigger};
use tracing_subscriber::EnvFilter;

const TOTAL_PLAYERS: usize = 20;
const ROUNDS_TO_PLAY: u32 = 5;
/// Cap for `SIM_TOURNAMENT=1`, which plays on until one player is left.
const TOURNAMENT_ROUND_CAP: u32 = 200;
const ROUND_MOVE_SETS: [(Move, Move); 3] = [
  (Move::Rock, Move::Scissors),
  (Move::Scissors, Move::Paper),
  (Move::Paper, Move::Rock),
];

fn main() -> Result<(), String> {
  load_env_file();
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  let config = EngineConfig {
    round_interval_ms: 0,
    duel_stage_ms: 0,
    process_stage_ms: 0,
    compete_stage_ms: 0,
    seed: std::env::var("GAME_SEED").ok().and_then(|raw| raw.trim().parse().ok()),
    ..EngineConfig::default()
  };
  let mut now = now_ms();
  let mut game = GameState::new(config, now)?;

  let admin = game
    .register_player(
      RegisterPlayer {
        name: "Sim Admin".to_string(),
        role: Role::Admin,
        ..RegisterPlayer::default()
      },
      now,
    )
    .map_err(|e| e.to_string())?;
  let mut player_ids = Vec::with_capacity(TOTAL_PLAYERS);
  for index in 1..=TOTAL_PLAYERS {
    let player = game
      .register_player(
        RegisterPlayer {
          name: format!("Player-{index:02}"),
          ..RegisterPlayer::default()
        },
        now,
      )
      .map_err(|e| e.to_string())?;
    player_ids.push(player.id);
  }
  println!("Registered {} simulated players plus admin {}.", player_ids.len(), admin.name);

  let tournament = env_flag_true("SIM_TOURNAMENT");
  let (rounds, trigger) = if tournament {
    (TOURNAMENT_ROUND_CAP, Trigger::Tournament)
  } else {
    (ROUNDS_TO_PLAY, Trigger::Simulation)
  };

  for round in 1..=rounds {
    if game.active_player_count() <= 1 {
      println!("\nOnly one active player remains. Ending simulation early.");
      break;
    }
    println!("\n--- Round {round} ---");

    let (primary, secondary) = ROUND_MOVE_SETS[(round as usize - 1) % ROUND_MOVE_SETS.len()];
    for (idx, id) in player_ids.iter().enumerate() {
      if !game.player(id).is_some_and(|p| p.active) {
        continue;
      }
      let skip_this_round = round % 2 == 1 && idx % 6 == 0;
      let selection = if skip_this_round {
        None
      } else if idx % 2 == 0 {
        Some(primary)
      } else {
        Some(secondary)
      };
      let raw = selection.map(|mv| mv.as_str());
      game
        .set_player_move(id, raw, None, now)
        .map_err(|e| e.to_string())?;
    }

    now += 1;
    let options = StartRoundOptions::automatic(trigger);
    let start = game.start_round(options, now).map_err(|e| e.to_string())?;
    let Some(outcome) = start.outcome else {
      return Err("simulation expects rounds to resolve synchronously".to_string());
    };
    println!(
      "Outcome: status={:?} round={} winners={} eliminated={} inactive={}",
      outcome.status,
      outcome.round_number,
      outcome.winner_player_ids.len() + outcome.bye_player_ids.len(),
      outcome.eliminated_player_ids.len(),
      outcome.inactive_player_ids.len()
    );
    println!("  {}", outcome.message);

    println!("{:<12} {:<9} {:<11} {:>5}  {}", "Name", "Move", "Status", "Stage", "Active");
    for player in game.public_state(now).players.iter().filter(|p| p.role == Role::Player) {
      let mv = player.current_move.map(|mv| mv.as_str()).unwrap_or("-");
      let status = serde_json::to_value(player.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
      println!("{:<12} {:<9} {:<11} {:>5}  {}", player.name, mv, status, player.layer, player.active);
    }
  }

  println!("\nSimulation complete.");
  Ok(())
}
