//! Negacyclic number-theoretic transform over `Z_q[X]/(X^N + 1)`.
//!
//! Forward is Cooley-Tukey with bit-reversed powers of `psi`, inverse is
//! Gentleman-Sande with bit-reversed powers of `psi^-1` followed by `N^-1`.
//! Pointwise products in the transformed domain are negacyclic convolutions.

use super::arith::{
    add_mod, bit_reverse, inv_mod, mul_mod_shoup, pow_mod, primitive_root_2n, shoup_precompute,
    sub_mod,
};
use super::error::CkksError;

#[derive(Debug, Clone)]
pub struct NttTable {
    modulus: u64,
    degree: usize,
    psi_rev: Vec<u64>,
    psi_rev_shoup: Vec<u64>,
    psi_inv_rev: Vec<u64>,
    psi_inv_rev_shoup: Vec<u64>,
    n_inv: u64,
    n_inv_shoup: u64,
}

impl NttTable {
    pub fn new(modulus: u64, degree: usize) -> Result<Self, CkksError> {
        if !degree.is_power_of_two() || degree < 2 {
            return Err(CkksError::InvalidParameters(format!(
                "polynomial degree {degree} is not a power of two"
            )));
        }
        let psi = primitive_root_2n(modulus, degree).ok_or_else(|| {
            CkksError::InvalidParameters(format!(
                "modulus {modulus} has no primitive {}-th root of unity",
                2 * degree
            ))
        })?;
        let psi_inv = inv_mod(psi, modulus);
        let log_n = degree.trailing_zeros();

        let psi_rev: Vec<u64> = (0..degree)
            .map(|i| pow_mod(psi, bit_reverse(i, log_n) as u64, modulus))
            .collect();
        let psi_inv_rev: Vec<u64> = (0..degree)
            .map(|i| pow_mod(psi_inv, bit_reverse(i, log_n) as u64, modulus))
            .collect();
        let psi_rev_shoup = psi_rev
            .iter()
            .map(|&w| shoup_precompute(w, modulus))
            .collect();
        let psi_inv_rev_shoup = psi_inv_rev
            .iter()
            .map(|&w| shoup_precompute(w, modulus))
            .collect();
        let n_inv = inv_mod(degree as u64 % modulus, modulus);

        Ok(Self {
            modulus,
            degree,
            psi_rev,
            psi_rev_shoup,
            psi_inv_rev,
            psi_inv_rev_shoup,
            n_inv,
            n_inv_shoup: shoup_precompute(n_inv, modulus),
        })
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn forward(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.degree);
        let q = self.modulus;
        let n = self.degree;
        let mut t = n;
        let mut m = 1;
        while m < n {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let w = self.psi_rev[m + i];
                let w_shoup = self.psi_rev_shoup[m + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = mul_mod_shoup(a[j + t], w, w_shoup, q);
                    a[j] = add_mod(u, v, q);
                    a[j + t] = sub_mod(u, v, q);
                }
            }
            m <<= 1;
        }
    }

    pub fn inverse(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.degree);
        let q = self.modulus;
        let n = self.degree;
        let mut t = 1;
        let mut m = n;
        while m > 1 {
            let h = m >> 1;
            let mut j1 = 0;
            for i in 0..h {
                let w = self.psi_inv_rev[h + i];
                let w_shoup = self.psi_inv_rev_shoup[h + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = a[j + t];
                    a[j] = add_mod(u, v, q);
                    a[j + t] = mul_mod_shoup(sub_mod(u, v, q), w, w_shoup, q);
                }
                j1 += 2 * t;
            }
            t <<= 1;
            m = h;
        }
        for x in a.iter_mut() {
            *x = mul_mod_shoup(*x, self.n_inv, self.n_inv_shoup, q);
        }
    }
}

/// Schoolbook negacyclic product, used to cross-check the transform.
#[cfg(test)]
pub(crate) fn negacyclic_mul_naive(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
    use super::arith::mul_mod;

    let n = a.len();
    let mut out = vec![0u64; n];
    for i in 0..n {
        for j in 0..n {
            let prod = mul_mod(a[i], b[j], q);
            let k = i + j;
            if k < n {
                out[k] = add_mod(out[k], prod, q);
            } else {
                out[k - n] = sub_mod(out[k - n], prod, q);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ckks::arith::{mul_mod, ntt_primes};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn forward_then_inverse_is_identity() {
        let q = ntt_primes(40, 1, 64, &[])[0];
        let table = NttTable::new(q, 64).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let original: Vec<u64> = (0..64).map(|_| rng.gen_range(0..q)).collect();
        let mut a = original.clone();
        table.forward(&mut a);
        assert_ne!(a, original);
        table.inverse(&mut a);
        assert_eq!(a, original);
    }

    #[test]
    fn pointwise_product_is_negacyclic_convolution() {
        let q = ntt_primes(60, 1, 32, &[])[0];
        let table = NttTable::new(q, 32).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let a: Vec<u64> = (0..32).map(|_| rng.gen_range(0..q)).collect();
        let b: Vec<u64> = (0..32).map(|_| rng.gen_range(0..q)).collect();
        let expected = negacyclic_mul_naive(&a, &b, q);

        let (mut fa, mut fb) = (a.clone(), b.clone());
        table.forward(&mut fa);
        table.forward(&mut fb);
        let mut prod: Vec<u64> = fa.iter().zip(&fb).map(|(x, y)| mul_mod(*x, *y, q)).collect();
        table.inverse(&mut prod);
        assert_eq!(prod, expected);
    }

    #[test]
    fn rejects_non_ntt_friendly_modulus() {
        assert!(NttTable::new(1_000_000_007, 1024).is_err());
    }
}
