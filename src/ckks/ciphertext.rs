//! Ciphertexts and their self-describing shape.

use serde::{Deserialize, Serialize};

use super::error::CkksError;
use super::params::Parameters;
use super::poly::RnsPoly;

/// A pair `(c0, c1)` in the NTT domain with `c0 + c1 * s ≈ m`.
///
/// The ciphertext records the ring degree, the primes of its current level,
/// its scale and how many leading slots carry data. It does not record which
/// key produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ciphertext {
    degree: usize,
    moduli: Vec<u64>,
    scale: f64,
    len: usize,
    c0: RnsPoly,
    c1: RnsPoly,
}

impl Ciphertext {
    pub(crate) fn new(moduli: &[u64], scale: f64, len: usize, c0: RnsPoly, c1: RnsPoly) -> Self {
        Self {
            degree: c0.degree(),
            moduli: moduli.to_vec(),
            scale,
            len,
            c0,
            c1,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn level(&self) -> usize {
        self.moduli.len()
    }

    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Number of meaningful leading slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn c0(&self) -> &RnsPoly {
        &self.c0
    }

    pub(crate) fn c1(&self) -> &RnsPoly {
        &self.c1
    }

    pub(crate) fn with_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Verify that this ciphertext was produced under `params`.
    ///
    /// Checks the degree, that the primes are a prefix of the modulus chain,
    /// the shape and range of every row, and that the scale sits within one
    /// bit of the parameter scale (fresh and once-rescaled ciphertexts both do).
    pub fn check_params(&self, params: &Parameters) -> Result<(), CkksError> {
        if self.degree != params.degree() {
            return Err(CkksError::ParameterMismatch(format!(
                "ciphertext degree {} differs from ring degree {}",
                self.degree,
                params.degree()
            )));
        }
        let level = self.moduli.len();
        if level == 0 || level > params.max_level() || params.moduli()[..level] != self.moduli[..] {
            return Err(CkksError::ParameterMismatch(
                "ciphertext modulus chain is not a prefix of the context chain".to_string(),
            ));
        }
        if self.len > params.slots() {
            return Err(CkksError::ParameterMismatch(format!(
                "ciphertext claims {} slots, ring has {}",
                self.len,
                params.slots()
            )));
        }
        if !self.scale.is_finite()
            || self.scale <= 0.0
            || (self.scale.log2() - params.log_scale() as f64).abs() > 1.0
        {
            return Err(CkksError::ParameterMismatch(format!(
                "ciphertext scale 2^{:.2} is incompatible with context scale 2^{}",
                self.scale.log2(),
                params.log_scale()
            )));
        }
        for part in [&self.c0, &self.c1] {
            if part.num_rows() != level {
                return Err(CkksError::ParameterMismatch(
                    "ciphertext component has the wrong number of rows".to_string(),
                ));
            }
            for (row, &q) in part.rows().iter().zip(&self.moduli) {
                if row.len() != self.degree || row.iter().any(|&c| c >= q) {
                    return Err(CkksError::ParameterMismatch(format!(
                        "ciphertext row is not reduced modulo {q}"
                    )));
                }
            }
        }
        Ok(())
    }
}
