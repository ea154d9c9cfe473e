//! Randomized prediction messages appended to each daily report.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Fixed prediction pool
pub const PREDICTIONS: &[&str] = &[
    "Luck will smile on you today!",
    "Be careful on the road.",
    "Expect good news in the evening.",
    "A perfect day to start something new!",
];

/// Picks a prediction uniformly at random. The RNG is injected so tests
/// can seed it for deterministic output.
pub struct PredictionPicker {
    rng: Mutex<StdRng>,
}

impl PredictionPicker {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn pick(&self) -> &'static str {
        let index = self.rng.lock().unwrap().gen_range(0..PREDICTIONS.len());
        PREDICTIONS[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_is_non_empty() {
        assert!(!PREDICTIONS.is_empty());
    }

    #[test]
    fn test_pick_returns_pool_member() {
        let picker = PredictionPicker::from_entropy();
        for _ in 0..50 {
            assert!(PREDICTIONS.contains(&picker.pick()));
        }
    }

    #[test]
    fn test_seeded_picker_is_deterministic() {
        let a = PredictionPicker::from_seed(7);
        let b = PredictionPicker::from_seed(7);
        for _ in 0..20 {
            assert_eq!(a.pick(), b.pick());
        }
    }

    #[test]
    fn test_picker_eventually_covers_pool() {
        // With 200 draws the chance of missing any of 4 entries is negligible
        let picker = PredictionPicker::from_seed(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(picker.pick());
        }
        assert_eq!(seen.len(), PREDICTIONS.len());
    }
}
