use std::hash::{DefaultHasher, Hash, Hasher};

/// Folds `value` into a running seed, order dependent.
pub fn combine<T: Hash + ?Sized>(seed: &mut u64, value: &T) {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    value.hash(&mut hasher);
    *seed = hasher.finish();
}

pub fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut seed = 0;
    combine(&mut seed, value);
    seed
}
