//! Seeded RNG driving constellation generation
//!
//! Mulberry32: a 32-bit integer permutation generator. Fast, well mixed,
//! and free of the lattice artifacts a linear congruential generator
//! would paint across the sphere. Same seed, same infinite sequence.

/// Deterministic `[0,1)` stream from a 32-bit seed
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next raw 32-bit draw
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6d2b_79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Next draw in `[0, 1)`
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / 4_294_967_296.0
    }

    /// Next draw in `[0, 1)` at single precision
    pub fn next_f32(&mut self) -> f32 {
        self.next_f64() as f32
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Mulberry32::new(42);
        let mut b = Mulberry32::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = Mulberry32::new(1);
        let mut b = Mulberry32::new(2);
        let differs = (0..100).any(|_| a.next_u32() != b.next_u32());
        assert!(differs);
    }

    #[test]
    fn test_output_range() {
        let mut rng = Mulberry32::new(7);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "draw out of range: {}", v);
        }
    }

    #[test]
    fn test_uniformity_smoke() {
        let mut rng = Mulberry32::new(12345);
        let n = 10_000;
        let mean: f64 = (0..n).map(|_| rng.next_f64()).sum::<f64>() / n as f64;
        assert!(
            (0.48..0.52).contains(&mean),
            "mean of {} draws was {}",
            n,
            mean
        );
    }

    #[test]
    fn test_no_short_cycle() {
        let mut rng = Mulberry32::new(99);
        let head: Vec<u32> = (0..100).map(|_| rng.next_u32()).collect();
        // The next 10k draws must never replay the opening window
        let mut window: Vec<u32> = head.clone();
        for _ in 0..10_000 {
            window.remove(0);
            window.push(rng.next_u32());
            assert_ne!(window, head, "sequence repeated its opening window");
        }
    }
}
