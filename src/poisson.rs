use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Poisson process: exponentially distributed gaps between events.
pub struct Poisson<R: Rng + ?Sized> {
    pub rng: Box<R>,
    pub rate: f64,
}

impl Poisson<SmallRng> {
    pub fn new(rate: f64, seed: u64) -> Self {
        Self {
            rng: Box::new(SmallRng::seed_from_u64(seed)),
            rate,
        }
    }
}

impl<R: Rng + ?Sized> Poisson<R> {
    pub fn time_for_next_event(&mut self) -> f64 {
        -(1.0f64 - self.rng.random::<f64>()).ln() / self.rate
    }
}
