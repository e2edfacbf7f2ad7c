//! Polynomials in residue-number-system form, one row per prime.

use serde::{Deserialize, Serialize};

use super::arith::{add_mod, mul_mod, neg_mod, sub_mod};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RnsPoly {
    rows: Vec<Vec<u64>>,
}

impl RnsPoly {
    pub fn zero(degree: usize, num_rows: usize) -> Self {
        Self {
            rows: vec![vec![0u64; degree]; num_rows],
        }
    }

    pub fn from_rows(rows: Vec<Vec<u64>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Vec<u64>] {
        &mut self.rows
    }

    pub fn row(&self, idx: usize) -> &[u64] {
        &self.rows[idx]
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn degree(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn add(&self, other: &Self, moduli: &[u64]) -> Self {
        self.zip_with(other, moduli, add_mod)
    }

    pub fn sub(&self, other: &Self, moduli: &[u64]) -> Self {
        self.zip_with(other, moduli, sub_mod)
    }

    /// Pointwise product; both operands must be in the NTT domain.
    pub fn mul(&self, other: &Self, moduli: &[u64]) -> Self {
        self.zip_with(other, moduli, mul_mod)
    }

    pub fn neg(&self, moduli: &[u64]) -> Self {
        let rows = self
            .rows
            .iter()
            .zip(moduli)
            .map(|(row, &q)| row.iter().map(|&x| neg_mod(x, q)).collect())
            .collect();
        Self { rows }
    }

    fn zip_with(&self, other: &Self, moduli: &[u64], op: fn(u64, u64, u64) -> u64) -> Self {
        let rows = self
            .rows
            .iter()
            .zip(&other.rows)
            .zip(moduli)
            .map(|((a, b), &q)| a.iter().zip(b).map(|(&x, &y)| op(x, y, q)).collect())
            .collect();
        Self { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rowwise_arithmetic_uses_each_rows_modulus() {
        let moduli = [7u64, 11];
        let a = RnsPoly::from_rows(vec![vec![5, 6], vec![10, 1]]);
        let b = RnsPoly::from_rows(vec![vec![4, 1], vec![3, 2]]);
        assert_eq!(a.add(&b, &moduli).rows(), &[vec![2, 0], vec![2, 3]]);
        assert_eq!(a.sub(&b, &moduli).rows(), &[vec![1, 5], vec![7, 10]]);
        assert_eq!(a.mul(&b, &moduli).rows(), &[vec![6, 6], vec![8, 2]]);
        assert_eq!(a.neg(&moduli).rows(), &[vec![2, 1], vec![1, 10]]);
    }
}
