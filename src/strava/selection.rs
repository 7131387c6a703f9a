use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Seeded split of activity ids. The train set is a random sample of
/// `floor(n * train_fraction)` ids in sampled order; the test set is the
/// remainder in original order.
pub fn train_test_split(ids: &[u64], train_fraction: f64, seed: u64) -> (Vec<u64>, Vec<u64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    split_with(&mut rng, ids, train_fraction)
}

/// A training run chosen at random, reproducible for a given seed and id list.
pub fn choose_training_run(ids: &[u64], train_fraction: f64, seed: u64) -> Option<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (train, _) = split_with(&mut rng, ids, train_fraction);
    train.choose(&mut rng).copied()
}

fn split_with(rng: &mut StdRng, ids: &[u64], train_fraction: f64) -> (Vec<u64>, Vec<u64>) {
    let fraction = train_fraction.clamp(0.0, 1.0);
    let k = (ids.len() as f64 * fraction).floor() as usize;
    let train: Vec<u64> = ids.choose_multiple(rng, k).copied().collect();
    let picked: HashSet<u64> = train.iter().copied().collect();
    let test = ids.iter().copied().filter(|id| !picked.contains(id)).collect();
    (train, test)
}
