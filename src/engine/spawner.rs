use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::config::{CELL, GRID_HEIGHT, GRID_WIDTH, MAX_PLACEMENT_ATTEMPTS};
use super::snake::Point;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpawnError {
    #[error("no free cell found after {0} placement attempts")]
    PlacementExhausted(u32),
}

/// Bounded-retry random placement over the full grid. Owns its RNG so tests
/// can seed it for reproducible sequences.
pub struct Spawner {
    rng: StdRng,
}

impl Spawner {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Spawner { rng }
    }

    /// Sample grid cells until one is free of `occupied`, up to the attempt
    /// cap. The cap bounds worst-case work on a crowded grid instead of
    /// scanning for the provably last free cell.
    pub fn place(&mut self, occupied: &HashSet<Point>) -> Result<Point, SpawnError> {
        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let gx = self.rng.gen_range(0..GRID_WIDTH);
            let gy = self.rng.gen_range(0..GRID_HEIGHT);
            let candidate = Point::new(gx * CELL, gy * CELL);
            if !occupied.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(SpawnError::PlacementExhausted(MAX_PLACEMENT_ATTEMPTS))
    }
}
