use thiserror::Error;

/// Rejections surfaced by the engine. Every check runs before any state is
/// touched, so an `Err` always leaves the game unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
  /// Bad or missing input: empty name, unknown move, stage out of range,
  /// a second admin.
  #[error("{0}")]
  Validation(String),
  /// The call is well-formed but the game is not in a state that allows it.
  #[error("{0}")]
  Precondition(String),
  #[error("{0}")]
  NotFound(String),
}

impl GameError {
  pub fn validation(msg: impl Into<String>) -> Self {
    GameError::Validation(msg.into())
  }

  pub fn precondition(msg: impl Into<String>) -> Self {
    GameError::Precondition(msg.into())
  }

  pub fn not_found(msg: impl Into<String>) -> Self {
    GameError::NotFound(msg.into())
  }
}

pub type GameResult<T> = Result<T, GameError>;
