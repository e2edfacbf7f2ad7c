//! Key material: ternary secret, public encryption key, and key-switching keys
//! for relinearisation and slot rotations.
//!
//! The uniform halves of public and switching keys are never stored; each key
//! carries the 32-byte seed they were expanded from and is re-expanded after
//! deserialization.

use std::collections::BTreeMap;
use std::fmt;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::arith::{add_mod, mul_mod};
use super::error::CkksError;
use super::poly::RnsPoly;
use super::ring::Ring;
use super::sampling::{centered_binomial, fresh_seed, seeded_rng, ternary, uniform_row, Seed};

#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey {
    coeffs: Vec<i8>,
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("degree", &self.coeffs.len())
            .finish_non_exhaustive()
    }
}

impl SecretKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, degree: usize) -> Self {
        Self {
            coeffs: ternary(rng, degree).into_iter().map(|c| c as i8).collect(),
        }
    }

    pub fn coeffs(&self) -> Vec<i64> {
        self.coeffs.iter().map(|&c| c as i64).collect()
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len()
    }

    /// NTT rows of `s` for every prime of the key-switching basis.
    pub(crate) fn to_ntt(&self, ring: &Ring) -> RnsPoly {
        let indices: Vec<usize> = (0..=ring.special_index()).collect();
        ring.signed_to_ntt(&self.coeffs(), &indices)
    }

    pub(crate) fn validate(&self, degree: usize) -> Result<(), CkksError> {
        if self.coeffs.len() != degree || self.coeffs.iter().any(|c| !(-1..=1).contains(c)) {
            return Err(CkksError::MalformedKey(
                "secret key is not a ternary polynomial of the ring degree".to_string(),
            ));
        }
        Ok(())
    }
}

/// `(b, a)` with `b = -a*s + e` over the ciphertext primes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKey {
    seed: Seed,
    b: RnsPoly,
    #[serde(skip)]
    a: RnsPoly,
}

impl PublicKey {
    pub(crate) fn generate<R: RngCore + CryptoRng>(
        ring: &Ring,
        s_ntt: &RnsPoly,
        rng: &mut R,
    ) -> Self {
        let level = ring.params().max_level();
        let indices: Vec<usize> = (0..level).collect();
        let seed = fresh_seed(rng);
        let a = Self::expand_a(ring, seed);
        let e = ring.signed_to_ntt(&centered_binomial(rng, ring.degree()), &indices);

        let moduli = ring.moduli_at(level);
        let b = a.mul(s_ntt, moduli).neg(moduli).add(&e, moduli);
        Self { seed, b, a }
    }

    fn expand_a(ring: &Ring, seed: Seed) -> RnsPoly {
        let mut rng = seeded_rng(seed);
        let rows = ring
            .moduli_at(ring.params().max_level())
            .iter()
            .map(|&q| uniform_row(&mut rng, ring.degree(), q))
            .collect();
        RnsPoly::from_rows(rows)
    }

    pub(crate) fn expand(&mut self, ring: &Ring) -> Result<(), CkksError> {
        let moduli = ring.moduli_at(ring.params().max_level());
        check_rows(&self.b, moduli, ring.degree(), "public key")?;
        self.a = Self::expand_a(ring, self.seed);
        Ok(())
    }

    pub(crate) fn b(&self) -> &RnsPoly {
        &self.b
    }

    pub(crate) fn a(&self) -> &RnsPoly {
        &self.a
    }
}

/// One `(b_i, a_i)` pair per ciphertext prime, each spanning the ciphertext
/// primes plus the special prime. Digit `i` hides `P * s'` in row `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySwitchKey {
    seed: Seed,
    b: Vec<RnsPoly>,
    #[serde(skip)]
    a: Vec<RnsPoly>,
}

impl KeySwitchKey {
    /// Key that switches ciphertext components multiplied by `target` (NTT rows
    /// over the full key basis) back to multiples of `s`.
    pub(crate) fn generate<R: RngCore + CryptoRng>(
        ring: &Ring,
        s_ntt: &RnsPoly,
        target: &RnsPoly,
        rng: &mut R,
    ) -> Self {
        let basis = ring.key_basis();
        let all_indices: Vec<usize> = (0..basis.len()).collect();
        let special = ring.params().special_prime();
        let seed = fresh_seed(rng);
        let a = Self::expand_a(ring, seed);

        let b = a
            .iter()
            .enumerate()
            .map(|(digit, a_digit)| {
                let e = ring.signed_to_ntt(&centered_binomial(rng, ring.degree()), &all_indices);
                let mut b_digit = a_digit.mul(s_ntt, &basis).neg(&basis).add(&e, &basis);
                let q = basis[digit];
                let factor = special % q;
                for (out, &t) in b_digit.rows_mut()[digit].iter_mut().zip(target.row(digit)) {
                    *out = add_mod(*out, mul_mod(factor, t, q), q);
                }
                b_digit
            })
            .collect();

        Self { seed, b, a }
    }

    fn expand_a(ring: &Ring, seed: Seed) -> Vec<RnsPoly> {
        let mut rng = seeded_rng(seed);
        let basis = ring.key_basis();
        (0..ring.params().max_level())
            .map(|_| {
                let rows = basis
                    .iter()
                    .map(|&q| uniform_row(&mut rng, ring.degree(), q))
                    .collect();
                RnsPoly::from_rows(rows)
            })
            .collect()
    }

    pub(crate) fn expand(&mut self, ring: &Ring) -> Result<(), CkksError> {
        if self.b.len() != ring.params().max_level() {
            return Err(CkksError::MalformedKey(format!(
                "switching key has {} digits, expected {}",
                self.b.len(),
                ring.params().max_level()
            )));
        }
        let basis = ring.key_basis();
        for digit in &self.b {
            check_rows(digit, &basis, ring.degree(), "switching key")?;
        }
        self.a = Self::expand_a(ring, self.seed);
        Ok(())
    }

    pub(crate) fn digit(&self, idx: usize) -> (&RnsPoly, &RnsPoly) {
        (&self.b[idx], &self.a[idx])
    }
}

/// Relinearisation key plus one rotation key per supported step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationKeys {
    relin: KeySwitchKey,
    galois: BTreeMap<usize, KeySwitchKey>,
}

impl EvaluationKeys {
    pub(crate) fn generate<R: RngCore + CryptoRng>(
        ring: &Ring,
        secret: &SecretKey,
        s_ntt: &RnsPoly,
        rng: &mut R,
    ) -> Self {
        let basis = ring.key_basis();
        let all_indices: Vec<usize> = (0..basis.len()).collect();

        let s_squared = s_ntt.mul(s_ntt, &basis);
        let relin = KeySwitchKey::generate(ring, s_ntt, &s_squared, rng);

        let coeffs = secret.coeffs();
        let galois = ring
            .params()
            .sum_rotation_steps()
            .into_iter()
            .map(|step| {
                let g = ring.galois_element(step);
                let rotated = ring.signed_to_ntt(&ring.automorphism_signed(&coeffs, g), &all_indices);
                (step, KeySwitchKey::generate(ring, s_ntt, &rotated, rng))
            })
            .collect();

        Self { relin, galois }
    }

    pub(crate) fn expand(&mut self, ring: &Ring) -> Result<(), CkksError> {
        self.relin.expand(ring)?;
        for key in self.galois.values_mut() {
            key.expand(ring)?;
        }
        Ok(())
    }

    pub fn relin(&self) -> &KeySwitchKey {
        &self.relin
    }

    pub fn rotation(&self, step: usize) -> Result<&KeySwitchKey, CkksError> {
        self.galois
            .get(&step)
            .ok_or(CkksError::MissingRotationKey(step))
    }

    pub fn rotation_steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.galois.keys().copied()
    }
}

fn check_rows(
    poly: &RnsPoly,
    moduli: &[u64],
    degree: usize,
    what: &str,
) -> Result<(), CkksError> {
    if poly.num_rows() != moduli.len() {
        return Err(CkksError::MalformedKey(format!(
            "{what} has {} rows, expected {}",
            poly.num_rows(),
            moduli.len()
        )));
    }
    for (row, &q) in poly.rows().iter().zip(moduli) {
        if row.len() != degree || row.iter().any(|&c| c >= q) {
            return Err(CkksError::MalformedKey(format!(
                "{what} row is not reduced modulo {q}"
            )));
        }
    }
    Ok(())
}
