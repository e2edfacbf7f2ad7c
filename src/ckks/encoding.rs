//! Canonical-embedding encoder.
//!
//! Slot `j` of a plaintext polynomial `m` holds `m(zeta^(5^j))` where `zeta` is
//! a primitive `2N`-th complex root of unity. The special FFT below evaluates
//! (or interpolates) exactly those `N/2` points, so encode/decode never touch
//! the conjugate half of the embedding.

use num_complex::Complex64;
use std::f64::consts::PI;

use super::arith::bit_reverse;
use super::error::CkksError;

/// Largest coefficient magnitude an encoded plaintext may carry.
const MAX_COEFF: f64 = (1u64 << 62) as f64;

#[derive(Debug, Clone)]
pub struct Encoder {
    degree: usize,
    slots: usize,
    rot_group: Vec<usize>,
    ksi: Vec<Complex64>,
}

impl Encoder {
    pub fn new(degree: usize) -> Self {
        let slots = degree / 2;
        let m = 2 * degree;

        let mut rot_group = Vec::with_capacity(slots);
        let mut five_pow = 1usize;
        for _ in 0..slots {
            rot_group.push(five_pow);
            five_pow = (five_pow * 5) % m;
        }

        let ksi = (0..=m)
            .map(|k| Complex64::from_polar(1.0, 2.0 * PI * k as f64 / m as f64))
            .collect();

        Self {
            degree,
            slots,
            rot_group,
            ksi,
        }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Encode real values into integer polynomial coefficients at `scale`.
    pub fn encode(&self, values: &[f64], scale: f64) -> Result<Vec<i64>, CkksError> {
        if values.len() > self.slots {
            return Err(CkksError::TooManyValues {
                len: values.len(),
                slots: self.slots,
            });
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(CkksError::ValueOutOfRange(*bad));
        }

        let mut slots: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        slots.resize(self.slots, Complex64::new(0.0, 0.0));
        self.fft_special_inv(&mut slots);

        let half = self.slots;
        let mut coeffs = vec![0i64; self.degree];
        for (i, z) in slots.iter().enumerate() {
            let re = (z.re * scale).round();
            let im = (z.im * scale).round();
            if re.abs() >= MAX_COEFF || im.abs() >= MAX_COEFF {
                return Err(CkksError::ValueOutOfRange(re.abs().max(im.abs()) / scale));
            }
            coeffs[i] = re as i64;
            coeffs[i + half] = im as i64;
        }
        Ok(coeffs)
    }

    /// Decode coefficients that were already divided by the plaintext scale.
    pub fn decode(&self, coeffs: &[f64]) -> Vec<Complex64> {
        let half = self.slots;
        let mut slots: Vec<Complex64> = (0..half)
            .map(|i| Complex64::new(coeffs[i], coeffs[i + half]))
            .collect();
        self.fft_special(&mut slots);
        slots
    }

    fn bit_reverse_in_place(values: &mut [Complex64]) {
        let log_size = values.len().trailing_zeros();
        for i in 0..values.len() {
            let j = bit_reverse(i, log_size);
            if i < j {
                values.swap(i, j);
            }
        }
    }

    fn fft_special(&self, values: &mut [Complex64]) {
        let size = values.len();
        let m = 2 * self.degree;
        Self::bit_reverse_in_place(values);
        let mut len = 2;
        while len <= size {
            let len_half = len >> 1;
            let len_quarter = len << 2;
            let gap = m / len_quarter;
            for i in (0..size).step_by(len) {
                for j in 0..len_half {
                    let idx = (self.rot_group[j] % len_quarter) * gap;
                    let u = values[i + j];
                    let v = values[i + j + len_half] * self.ksi[idx];
                    values[i + j] = u + v;
                    values[i + j + len_half] = u - v;
                }
            }
            len <<= 1;
        }
    }

    fn fft_special_inv(&self, values: &mut [Complex64]) {
        let size = values.len();
        let m = 2 * self.degree;
        let mut len = size;
        while len >= 1 {
            let len_half = len >> 1;
            let len_quarter = len << 2;
            let gap = m / len_quarter;
            for i in (0..size).step_by(len) {
                for j in 0..len_half {
                    let idx = (len_quarter - (self.rot_group[j] % len_quarter)) * gap;
                    let u = values[i + j] + values[i + j + len_half];
                    let v = (values[i + j] - values[i + j + len_half]) * self.ksi[idx];
                    values[i + j] = u;
                    values[i + j + len_half] = v;
                }
            }
            len >>= 1;
        }
        Self::bit_reverse_in_place(values);
        let inv = 1.0 / size as f64;
        for v in values.iter_mut() {
            *v *= inv;
        }
    }
}
