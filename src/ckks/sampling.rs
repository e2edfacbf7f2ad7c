//! Secret, error and uniform samplers.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Centered binomial parameter; standard deviation is `sqrt(eta / 2) ≈ 3.24`.
pub const CBD_ETA: u32 = 21;

pub type Seed = [u8; 32];

pub fn fresh_seed<R: RngCore>(rng: &mut R) -> Seed {
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    seed
}

pub fn seeded_rng(seed: Seed) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(seed)
}

/// Uniform ternary coefficients in `{-1, 0, 1}`.
pub fn ternary<R: Rng>(rng: &mut R, degree: usize) -> Vec<i64> {
    (0..degree).map(|_| rng.gen_range(-1i64..=1)).collect()
}

pub fn centered_binomial<R: RngCore>(rng: &mut R, degree: usize) -> Vec<i64> {
    let mask = (1u64 << CBD_ETA) - 1;
    (0..degree)
        .map(|_| {
            let word = rng.next_u64();
            let a = (word & mask).count_ones() as i64;
            let b = ((word >> 32) & mask).count_ones() as i64;
            a - b
        })
        .collect()
}

pub fn uniform_row<R: Rng>(rng: &mut R, degree: usize, modulus: u64) -> Vec<u64> {
    (0..degree).map(|_| rng.gen_range(0..modulus)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samplers_stay_in_range() {
        let mut rng = seeded_rng([7u8; 32]);
        assert!(ternary(&mut rng, 512).iter().all(|c| (-1..=1).contains(c)));
        let eta = CBD_ETA as i64;
        assert!(centered_binomial(&mut rng, 512)
            .iter()
            .all(|c| (-eta..=eta).contains(c)));
        assert!(uniform_row(&mut rng, 512, 97).iter().all(|&c| c < 97));
    }

    #[test]
    fn seeded_expansion_is_reproducible() {
        let seed = fresh_seed(&mut rand::rngs::OsRng);
        let a = uniform_row(&mut seeded_rng(seed), 64, 1 << 40);
        let b = uniform_row(&mut seeded_rng(seed), 64, 1 << 40);
        assert_eq!(a, b);
    }
}
