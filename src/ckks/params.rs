//! Scheme parameters.

use serde::{Deserialize, Serialize};

use super::arith::{is_prime, ntt_primes};
use super::error::CkksError;

pub const DEFAULT_POLY_DEGREE: usize = 8192;
/// Bit sizes of the ciphertext modulus chain, outermost prime first.
pub const DEFAULT_COEFF_MOD_BITS: [u32; 3] = [60, 40, 40];
pub const DEFAULT_SPECIAL_PRIME_BITS: u32 = 60;
pub const DEFAULT_LOG_SCALE: u32 = 40;
pub const DEFAULT_VECTOR_DIM: usize = 512;

/// The parameter set shared by every key and ciphertext of one deployment.
///
/// `moduli[0]` is the base prime that survives every rescale; the remaining
/// primes are consumed right-to-left, one per multiplication. The special
/// prime only appears inside key-switching keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    degree: usize,
    moduli: Vec<u64>,
    special_prime: u64,
    log_scale: u32,
    vector_dim: usize,
}

impl Parameters {
    /// Deterministically derive NTT-friendly primes for the given bit layout.
    pub fn generate(
        degree: usize,
        coeff_mod_bits: &[u32],
        special_prime_bits: u32,
        log_scale: u32,
        vector_dim: usize,
    ) -> Result<Self, CkksError> {
        if coeff_mod_bits.len() < 2 {
            return Err(CkksError::InvalidParameters(
                "modulus chain needs a base prime and at least one rescale prime".to_string(),
            ));
        }
        if let Some(bits) = coeff_mod_bits
            .iter()
            .chain(std::iter::once(&special_prime_bits))
            .find(|bits| !(20..=61).contains(*bits))
        {
            return Err(CkksError::InvalidParameters(format!(
                "prime size of {bits} bits is outside 20..=61"
            )));
        }

        let mut taken: Vec<u64> = Vec::new();
        let mut moduli = Vec::with_capacity(coeff_mod_bits.len());
        for &bits in coeff_mod_bits {
            let prime = ntt_primes(bits, 1, degree, &taken)
                .pop()
                .ok_or_else(|| CkksError::InvalidParameters(format!("no {bits}-bit NTT prime")))?;
            taken.push(prime);
            moduli.push(prime);
        }
        let special_prime = ntt_primes(special_prime_bits, 1, degree, &taken)
            .pop()
            .ok_or_else(|| CkksError::InvalidParameters("no special prime available".into()))?;

        let params = Self {
            degree,
            moduli,
            special_prime,
            log_scale,
            vector_dim,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn face_embedding() -> Result<Self, CkksError> {
        Self::generate(
            DEFAULT_POLY_DEGREE,
            &DEFAULT_COEFF_MOD_BITS,
            DEFAULT_SPECIAL_PRIME_BITS,
            DEFAULT_LOG_SCALE,
            DEFAULT_VECTOR_DIM,
        )
    }

    /// Check invariants after deserialization.
    pub fn validate(&self) -> Result<(), CkksError> {
        if !self.degree.is_power_of_two() || self.degree < 16 {
            return Err(CkksError::InvalidParameters(format!(
                "degree {} must be a power of two >= 16",
                self.degree
            )));
        }
        if self.vector_dim == 0 || self.vector_dim > self.degree / 2 {
            return Err(CkksError::InvalidParameters(format!(
                "vector dimension {} does not fit in {} slots",
                self.vector_dim,
                self.degree / 2
            )));
        }
        if self.moduli.len() < 2 {
            return Err(CkksError::InvalidParameters(
                "modulus chain is too short".to_string(),
            ));
        }
        let step = 2 * self.degree as u64;
        for (idx, &q) in self
            .moduli
            .iter()
            .chain(std::iter::once(&self.special_prime))
            .enumerate()
        {
            if q >= 1 << 62 || q % step != 1 || !is_prime(q) {
                return Err(CkksError::InvalidParameters(format!(
                    "modulus {q} is not an NTT-friendly prime"
                )));
            }
            let duplicates = self
                .moduli
                .iter()
                .chain(std::iter::once(&self.special_prime))
                .skip(idx + 1)
                .any(|&other| other == q);
            if duplicates {
                return Err(CkksError::InvalidParameters(format!(
                    "modulus {q} appears twice"
                )));
            }
        }
        if self.log_scale == 0 || self.log_scale >= 62 {
            return Err(CkksError::InvalidParameters(format!(
                "log scale {} is out of range",
                self.log_scale
            )));
        }
        Ok(())
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn slots(&self) -> usize {
        self.degree / 2
    }

    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    pub fn max_level(&self) -> usize {
        self.moduli.len()
    }

    pub fn special_prime(&self) -> u64 {
        self.special_prime
    }

    pub fn scale(&self) -> f64 {
        2f64.powi(self.log_scale as i32)
    }

    pub fn log_scale(&self) -> u32 {
        self.log_scale
    }

    pub fn vector_dim(&self) -> usize {
        self.vector_dim
    }

    /// Rotation steps needed to fold `vector_dim` slots into slot 0.
    pub fn sum_rotation_steps(&self) -> Vec<usize> {
        let mut steps = Vec::new();
        let mut step = 1;
        while step < self.vector_dim {
            steps.push(step);
            step <<= 1;
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_embedding_layout() {
        let params = Parameters::face_embedding().unwrap();
        assert_eq!(params.degree(), 8192);
        assert_eq!(params.slots(), 4096);
        assert_eq!(params.moduli().len(), 3);
        let bits: Vec<u32> = params.moduli().iter().map(|q| 64 - q.leading_zeros()).collect();
        assert_eq!(bits, vec![60, 40, 40]);
        assert_ne!(params.special_prime(), params.moduli()[0]);
        assert_eq!(64 - params.special_prime().leading_zeros(), 60);
        assert_eq!(params.scale(), (1u64 << 40) as f64);
        assert_eq!(params.sum_rotation_steps().len(), 9);
    }

    #[test]
    fn generation_is_deterministic() {
        let a = Parameters::generate(1024, &[50, 30], 50, 25, 64).unwrap();
        let b = Parameters::generate(1024, &[50, 30], 50, 25, 64).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_vector_larger_than_slots() {
        assert!(Parameters::generate(64, &[40, 30], 40, 20, 64).is_err());
    }
}
