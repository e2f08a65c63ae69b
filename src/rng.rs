use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::types::Move;

/// The only source of nondeterminism in the engine: pairing shuffles, tie
/// draws and random bot moves all pull from here.
#[derive(Clone, Debug)]
pub struct GameRng {
  inner: StdRng,
}

impl GameRng {
  pub fn new(seed: u64) -> Self {
    GameRng {
      inner: StdRng::seed_from_u64(seed),
    }
  }

  pub fn from_entropy() -> Self {
    GameRng {
      inner: StdRng::from_entropy(),
    }
  }

  pub fn from_seed(seed: Option<u64>) -> Self {
    match seed {
      Some(seed) => GameRng::new(seed),
      None => GameRng::from_entropy(),
    }
  }

  pub fn shuffle<T>(&mut self, items: &mut [T]) {
    items.shuffle(&mut self.inner);
  }

  /// Uniform value in `[0, max)`; `0` when `max` is zero.
  pub fn below(&mut self, max: u32) -> u32 {
    if max == 0 {
      return 0;
    }
    self.inner.gen_range(0..max)
  }

  pub fn random_move(&mut self) -> Move {
    Move::ALL[self.below(Move::ALL.len() as u32) as usize]
  }
}
