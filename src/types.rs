use serde::{Deserialize, Serialize};
use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex},
};

use crate::error::GameError;
use crate::game::GameState;

// ── Constants ──────────────────────────────────────────────────────────

pub const ROUND_INTERVAL_MS: u64 = 30_000;
pub const DUEL_STAGE_MS: u64 = 2_000;
pub const PROCESS_STAGE_MS: u64 = 3_000;
pub const COMPETE_STAGE_MS: u64 = 3_000;
pub const TOURNAMENT_CONTINUE_MS: u64 = 5_000;
pub const DEFAULT_MAX_LAYER: i32 = 0;
pub const DEFAULT_MIN_LAYER: i32 = -3;

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedGame = Arc<Mutex<GameState>>;

// ── Moves ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// The move this one defeats.
    pub fn beats(self) -> Move {
        match self {
            Move::Rock => Move::Scissors,
            Move::Paper => Move::Rock,
            Move::Scissors => Move::Paper,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Move {
    type Err = GameError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rock" => Ok(Move::Rock),
            "paper" => Ok(Move::Paper),
            "scissors" => Ok(Move::Scissors),
            _ => Err(GameError::Validation("Invalid move selection.".to_string())),
        }
    }
}

// ── Players ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Player,
    Admin,
}

impl FromStr for Role {
    type Err = GameError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "player" => Ok(Role::Player),
            "admin" => Ok(Role::Admin),
            other => Err(GameError::Validation(format!("Unknown role \"{other}\"."))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Waiting,
    Ready,
    Winner,
    Inactive,
    Eliminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStrategy {
    #[default]
    Random,
    Rock,
    Paper,
    Scissors,
}

impl BotStrategy {
    /// Fixed move for non-random strategies.
    pub fn fixed_move(self) -> Option<Move> {
        match self {
            BotStrategy::Random => None,
            BotStrategy::Rock => Some(Move::Rock),
            BotStrategy::Paper => Some(Move::Paper),
            BotStrategy::Scissors => Some(Move::Scissors),
        }
    }
}

impl FromStr for BotStrategy {
    type Err = GameError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "random" => Ok(BotStrategy::Random),
            "rock" => Ok(BotStrategy::Rock),
            "paper" => Ok(BotStrategy::Paper),
            "scissors" => Ok(BotStrategy::Scissors),
            other => Err(GameError::Validation(format!("Unknown bot strategy \"{other}\"."))),
        }
    }
}

/// Inclusive stage range a player can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerBounds {
    pub min: i32,
    pub max: i32,
}

impl LayerBounds {
    pub fn contains(&self, layer: i32) -> bool {
        layer >= self.min && layer <= self.max
    }
}

// ── Rounds ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Duel,
    Processing,
    Competing,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    #[default]
    Manual,
    Auto,
    Tournament,
    Simulation,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trigger::Manual => "manual",
            Trigger::Auto => "auto",
            Trigger::Tournament => "tournament",
            Trigger::Simulation => "simulation",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchupResult {
    Pending,
    A,
    B,
    Tie,
    Bye,
    DoubleWin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Tie,
    Skipped,
}

/// How a duel between identical moves is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TieBreak {
    /// One third A, one third B, one third both advance.
    #[default]
    CoinFlip,
    /// Both stay where they are.
    Hold,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "coinflip" | "coin-flip" | "coin_flip" => Ok(TieBreak::CoinFlip),
            "hold" => Ok(TieBreak::Hold),
            other => Err(format!("Unknown tie break \"{other}\" (expected coinFlip or hold).")),
        }
    }
}
