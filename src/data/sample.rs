//! Seeded test-set sampling.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::warn;

/// Pick `count` distinct lactation ids, reproducibly for a given seed.
///
/// The result keeps the order of `ids`. With fewer ids than requested, every
/// id is returned.
pub fn select_lactations(ids: &[String], count: usize, seed: u64) -> Vec<String> {
    if ids.len() <= count {
        if ids.len() < count {
            warn!(available = ids.len(), requested = count, "Fewer lactations than the sample size; using all");
        }
        return ids.to_vec();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let positions: Vec<usize> = (0..ids.len()).collect();
    let mut picked: Vec<usize> = positions.choose_multiple(&mut rng, count).copied().collect();
    picked.sort_unstable();
    picked.into_iter().map(|i| ids[i].clone()).collect()
}
