//! Precomputed ring context: NTT tables for every prime, the encoder, and
//! the RNS routines shared by encryption, rescaling and key switching.

use num_bigint::{BigInt, BigUint};
use num_traits::{ToPrimitive, Zero};

use super::arith::{add_mod, center, inv_mod, mul_mod, neg_mod, pow_mod, reduce_signed, sub_mod};
use super::encoding::Encoder;
use super::error::CkksError;
use super::keys::KeySwitchKey;
use super::ntt::NttTable;
use super::params::Parameters;
use super::poly::RnsPoly;

/// CRT reconstruction constants for one level of the modulus chain.
#[derive(Debug, Clone)]
struct CrtBasis {
    modulus: BigUint,
    half_modulus: BigUint,
    q_hat: Vec<BigUint>,
    q_hat_inv: Vec<u64>,
}

#[derive(Debug)]
pub struct Ring {
    params: Parameters,
    /// Tables for `moduli[0..L]` followed by the special prime at index `L`.
    tables: Vec<NttTable>,
    encoder: Encoder,
    crt: Vec<CrtBasis>,
}

impl Ring {
    pub fn new(params: Parameters) -> Result<Self, CkksError> {
        params.validate()?;
        let degree = params.degree();
        let tables = params
            .moduli()
            .iter()
            .chain(std::iter::once(&params.special_prime()))
            .map(|&q| NttTable::new(q, degree))
            .collect::<Result<Vec<_>, _>>()?;

        let crt = (1..=params.max_level())
            .map(|level| Self::crt_basis(&params.moduli()[..level]))
            .collect();

        Ok(Self {
            encoder: Encoder::new(degree),
            params,
            tables,
            crt,
        })
    }

    fn crt_basis(primes: &[u64]) -> CrtBasis {
        let modulus = primes
            .iter()
            .fold(BigUint::from(1u8), |acc, &q| acc * BigUint::from(q));
        let q_hat: Vec<BigUint> = primes
            .iter()
            .map(|&q| &modulus / BigUint::from(q))
            .collect();
        let q_hat_inv = q_hat
            .iter()
            .zip(primes)
            .map(|(hat, &q)| {
                let residue = (hat % BigUint::from(q)).to_u64().unwrap_or_default();
                inv_mod(residue, q)
            })
            .collect();
        CrtBasis {
            half_modulus: &modulus / BigUint::from(2u8),
            modulus,
            q_hat,
            q_hat_inv,
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn degree(&self) -> usize {
        self.params.degree()
    }

    /// Index of the special prime in every key-switching basis.
    pub fn special_index(&self) -> usize {
        self.params.max_level()
    }

    pub fn prime(&self, idx: usize) -> u64 {
        self.tables[idx].modulus()
    }

    pub fn moduli_at(&self, level: usize) -> &[u64] {
        &self.params.moduli()[..level]
    }

    /// Every prime a key-switching key carries a row for.
    pub fn key_basis(&self) -> Vec<u64> {
        self.tables.iter().map(NttTable::modulus).collect()
    }

    pub fn forward_row(&self, row: &mut [u64], idx: usize) {
        self.tables[idx].forward(row);
    }

    pub fn inverse_row(&self, row: &[u64], idx: usize) -> Vec<u64> {
        let mut out = row.to_vec();
        self.tables[idx].inverse(&mut out);
        out
    }

    /// Lift signed small coefficients into NTT rows for the given prime indices.
    pub fn signed_to_ntt(&self, coeffs: &[i64], indices: &[usize]) -> RnsPoly {
        let rows = indices
            .iter()
            .map(|&idx| {
                let q = self.prime(idx);
                let mut row: Vec<u64> = coeffs.iter().map(|&c| reduce_signed(c, q)).collect();
                self.forward_row(&mut row, idx);
                row
            })
            .collect();
        RnsPoly::from_rows(rows)
    }

    /// Exact division by the last prime of `indices`, rounding to nearest,
    /// which drops that row.
    pub fn divide_round_last(&self, poly: &RnsPoly, indices: &[usize]) -> RnsPoly {
        let last_pos = indices.len() - 1;
        let last_idx = indices[last_pos];
        let last_q = self.prime(last_idx);
        let last_coeffs: Vec<i64> = self
            .inverse_row(poly.row(last_pos), last_idx)
            .into_iter()
            .map(|c| center(c, last_q))
            .collect();

        let rows = indices[..last_pos]
            .iter()
            .enumerate()
            .map(|(pos, &idx)| {
                let q = self.prime(idx);
                let inv_last = inv_mod(last_q % q, q);
                let mut lifted: Vec<u64> =
                    last_coeffs.iter().map(|&c| reduce_signed(c, q)).collect();
                self.forward_row(&mut lifted, idx);
                poly.row(pos)
                    .iter()
                    .zip(&lifted)
                    .map(|(&x, &y)| mul_mod(sub_mod(x, y, q), inv_last, q))
                    .collect()
            })
            .collect();
        RnsPoly::from_rows(rows)
    }

    /// Galois element `5^step mod 2N` that moves slot `j + step` into slot `j`.
    pub fn galois_element(&self, step: usize) -> usize {
        let m = 2 * self.degree() as u64;
        pow_mod(5, step as u64, m) as usize
    }

    /// Apply `X -> X^g` to coefficient-form signed values.
    pub fn automorphism_signed(&self, coeffs: &[i64], galois_elt: usize) -> Vec<i64> {
        let n = self.degree();
        let mut out = vec![0i64; n];
        for (i, &c) in coeffs.iter().enumerate() {
            let j = (i * galois_elt) % (2 * n);
            if j < n {
                out[j] = c;
            } else {
                out[j - n] = -c;
            }
        }
        out
    }

    /// Apply `X -> X^g` to an NTT-domain polynomial over the first rows of the chain.
    pub fn automorphism(&self, poly: &RnsPoly, galois_elt: usize) -> RnsPoly {
        let n = self.degree();
        let rows = poly
            .rows()
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let q = self.prime(idx);
                let coeffs = self.inverse_row(row, idx);
                let mut out = vec![0u64; n];
                for (i, &c) in coeffs.iter().enumerate() {
                    let j = (i * galois_elt) % (2 * n);
                    if j < n {
                        out[j] = c;
                    } else {
                        out[j - n] = neg_mod(c, q);
                    }
                }
                self.forward_row(&mut out, idx);
                out
            })
            .collect();
        RnsPoly::from_rows(rows)
    }

    /// Switch `d * s'` to `(k0, k1)` with `k0 + k1 * s ≈ d * s'`, where the
    /// key encrypts `P * s'` under `s`. `d` covers the first `level` primes.
    pub fn key_switch(&self, d: &RnsPoly, key: &KeySwitchKey) -> (RnsPoly, RnsPoly) {
        let level = d.num_rows();
        let n = self.degree();
        let basis: Vec<usize> = (0..level)
            .chain(std::iter::once(self.special_index()))
            .collect();
        let mut acc0 = RnsPoly::zero(n, basis.len());
        let mut acc1 = RnsPoly::zero(n, basis.len());

        for digit in 0..level {
            let coeffs = self.inverse_row(d.row(digit), digit);
            let (key_b, key_a) = key.digit(digit);
            for (pos, &idx) in basis.iter().enumerate() {
                let q = self.prime(idx);
                let mut lifted: Vec<u64> = coeffs.iter().map(|&c| c % q).collect();
                self.forward_row(&mut lifted, idx);

                let b_row = key_b.row(idx);
                let a_row = key_a.row(idx);
                let rows0 = &mut acc0.rows_mut()[pos];
                for ((acc, &x), &k) in rows0.iter_mut().zip(&lifted).zip(b_row) {
                    *acc = add_mod(*acc, mul_mod(x, k, q), q);
                }
                let rows1 = &mut acc1.rows_mut()[pos];
                for ((acc, &x), &k) in rows1.iter_mut().zip(&lifted).zip(a_row) {
                    *acc = add_mod(*acc, mul_mod(x, k, q), q);
                }
            }
        }

        (
            self.divide_round_last(&acc0, &basis),
            self.divide_round_last(&acc1, &basis),
        )
    }

    /// CRT-compose coefficient-form rows into centered values scaled down by `scale`.
    pub fn compose_scaled(&self, rows: &[Vec<u64>], scale: f64) -> Vec<f64> {
        let level = rows.len();
        let basis = &self.crt[level - 1];
        let primes = self.moduli_at(level);
        let n = self.degree();

        (0..n)
            .map(|k| {
                let mut acc = BigUint::zero();
                for (i, row) in rows.iter().enumerate() {
                    let term = mul_mod(row[k], basis.q_hat_inv[i], primes[i]);
                    acc += &basis.q_hat[i] * BigUint::from(term);
                }
                acc %= &basis.modulus;
                let signed = if acc > basis.half_modulus {
                    BigInt::from(acc) - BigInt::from(basis.modulus.clone())
                } else {
                    BigInt::from(acc)
                };
                signed.to_f64().unwrap_or(f64::NAN) / scale
            })
            .collect()
    }
}
