//! The CKKS context: parameters, keys and the homomorphic operations.

use std::sync::Arc;

use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::ciphertext::Ciphertext;
use super::error::CkksError;
use super::keys::{EvaluationKeys, KeySwitchKey, PublicKey, SecretKey};
use super::params::Parameters;
use super::poly::RnsPoly;
use super::ring::Ring;
use super::sampling::{centered_binomial, ternary};

/// Relative tolerance when comparing two ciphertext scales.
const SCALE_TOLERANCE: f64 = 1e-9;

struct SecretState {
    key: SecretKey,
    ntt: RnsPoly,
}

/// Serializable form of a context. `secret` is `None` for a public context.
#[derive(Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub params: Parameters,
    pub secret: Option<SecretKey>,
    pub public_key: PublicKey,
    pub eval_keys: EvaluationKeys,
}

#[derive(Clone)]
pub struct CkksContext {
    ring: Arc<Ring>,
    secret: Option<Arc<SecretState>>,
    public_key: Arc<PublicKey>,
    eval_keys: Arc<EvaluationKeys>,
}

impl std::fmt::Debug for CkksContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CkksContext")
            .field("params", self.ring.params())
            .field("has_secret_key", &self.secret.is_some())
            .finish()
    }
}

impl CkksContext {
    /// Generate fresh keys from operating-system randomness.
    pub fn generate(params: Parameters) -> Result<Self, CkksError> {
        let mut rng = ChaCha20Rng::from_entropy();
        Self::generate_with_rng(params, &mut rng)
    }

    pub fn generate_with_rng<R: RngCore + CryptoRng>(
        params: Parameters,
        rng: &mut R,
    ) -> Result<Self, CkksError> {
        let ring = Ring::new(params)?;
        let key = SecretKey::generate(rng, ring.degree());
        let ntt = key.to_ntt(&ring);
        let public_key = PublicKey::generate(&ring, &ntt, rng);
        let eval_keys = EvaluationKeys::generate(&ring, &key, &ntt, rng);

        Ok(Self {
            ring: Arc::new(ring),
            secret: Some(Arc::new(SecretState { key, ntt })),
            public_key: Arc::new(public_key),
            eval_keys: Arc::new(eval_keys),
        })
    }

    pub fn from_snapshot(snapshot: ContextSnapshot) -> Result<Self, CkksError> {
        let ContextSnapshot {
            params,
            secret,
            mut public_key,
            mut eval_keys,
        } = snapshot;
        let ring = Ring::new(params)?;
        public_key.expand(&ring)?;
        eval_keys.expand(&ring)?;

        let secret = secret
            .map(|key| -> Result<_, CkksError> {
                key.validate(ring.degree())?;
                let ntt = key.to_ntt(&ring);
                Ok(Arc::new(SecretState { key, ntt }))
            })
            .transpose()?;

        Ok(Self {
            ring: Arc::new(ring),
            secret,
            public_key: Arc::new(public_key),
            eval_keys: Arc::new(eval_keys),
        })
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            params: self.ring.params().clone(),
            secret: self.secret.as_ref().map(|state| state.key.clone()),
            public_key: (*self.public_key).clone(),
            eval_keys: (*self.eval_keys).clone(),
        }
    }

    /// The same parameters and evaluation keys with the secret key removed.
    pub fn public_only(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
            secret: None,
            public_key: Arc::clone(&self.public_key),
            eval_keys: Arc::clone(&self.eval_keys),
        }
    }

    pub fn params(&self) -> &Parameters {
        self.ring.params()
    }

    pub fn check(&self, ct: &Ciphertext) -> Result<(), CkksError> {
        ct.check_params(self.params())
    }

    pub fn encrypt(&self, values: &[f64]) -> Result<Ciphertext, CkksError> {
        let mut rng = ChaCha20Rng::from_entropy();
        self.encrypt_with_rng(values, &mut rng)
    }

    pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
        &self,
        values: &[f64],
        rng: &mut R,
    ) -> Result<Ciphertext, CkksError> {
        let ring = &self.ring;
        let level = ring.params().max_level();
        let indices: Vec<usize> = (0..level).collect();
        let moduli = ring.moduli_at(level);
        let scale = ring.params().scale();

        let m = ring.signed_to_ntt(&ring.encoder().encode(values, scale)?, &indices);
        let u = ring.signed_to_ntt(&ternary(rng, ring.degree()), &indices);
        let e0 = ring.signed_to_ntt(&centered_binomial(rng, ring.degree()), &indices);
        let e1 = ring.signed_to_ntt(&centered_binomial(rng, ring.degree()), &indices);

        let c0 = self
            .public_key
            .b()
            .mul(&u, moduli)
            .add(&e0, moduli)
            .add(&m, moduli);
        let c1 = self.public_key.a().mul(&u, moduli).add(&e1, moduli);
        Ok(Ciphertext::new(moduli, scale, values.len(), c0, c1))
    }

    /// Decrypt and decode the meaningful slots of `ct`.
    pub fn decrypt(&self, ct: &Ciphertext) -> Result<Vec<f64>, CkksError> {
        let secret = self.secret.as_ref().ok_or(CkksError::MissingSecretKey)?;
        self.check(ct)?;

        let moduli = ct.moduli();
        let message = ct
            .c1()
            .mul(&secret.ntt, moduli)
            .add(ct.c0(), moduli);
        let rows: Vec<Vec<u64>> = message
            .rows()
            .iter()
            .enumerate()
            .map(|(idx, row)| self.ring.inverse_row(row, idx))
            .collect();

        let coeffs = self.ring.compose_scaled(&rows, ct.scale());
        let slots = self.ring.encoder().decode(&coeffs);
        Ok(slots.into_iter().take(ct.len()).map(|z| z.re).collect())
    }

    fn check_pair(a: &Ciphertext, b: &Ciphertext) -> Result<(), CkksError> {
        if a.level() != b.level() {
            return Err(CkksError::LevelMismatch {
                left: a.level(),
                right: b.level(),
            });
        }
        if ((a.scale() - b.scale()) / a.scale()).abs() > SCALE_TOLERANCE {
            return Err(CkksError::ScaleMismatch {
                left: a.scale(),
                right: b.scale(),
            });
        }
        Ok(())
    }

    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, CkksError> {
        Self::check_pair(a, b)?;
        let moduli = a.moduli();
        Ok(Ciphertext::new(
            moduli,
            a.scale(),
            a.len().max(b.len()),
            a.c0().add(b.c0(), moduli),
            a.c1().add(b.c1(), moduli),
        ))
    }

    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, CkksError> {
        Self::check_pair(a, b)?;
        let moduli = a.moduli();
        Ok(Ciphertext::new(
            moduli,
            a.scale(),
            a.len().max(b.len()),
            a.c0().sub(b.c0(), moduli),
            a.c1().sub(b.c1(), moduli),
        ))
    }

    /// Slot-wise product, relinearised back to two components. The result
    /// carries the product of both scales until it is rescaled.
    pub fn multiply(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, CkksError> {
        if a.level() != b.level() {
            return Err(CkksError::LevelMismatch {
                left: a.level(),
                right: b.level(),
            });
        }
        let moduli = a.moduli();
        let d0 = a.c0().mul(b.c0(), moduli);
        let d1 = a
            .c0()
            .mul(b.c1(), moduli)
            .add(&a.c1().mul(b.c0(), moduli), moduli);
        let d2 = a.c1().mul(b.c1(), moduli);

        let (k0, k1) = self.ring.key_switch(&d2, self.eval_keys.relin());
        Ok(Ciphertext::new(
            moduli,
            a.scale() * b.scale(),
            a.len().min(b.len()),
            d0.add(&k0, moduli),
            d1.add(&k1, moduli),
        ))
    }

    /// Divide by the last prime of the chain, dropping one level.
    pub fn rescale(&self, ct: &Ciphertext) -> Result<Ciphertext, CkksError> {
        let level = ct.level();
        if level < 2 {
            return Err(CkksError::LevelExhausted);
        }
        let indices: Vec<usize> = (0..level).collect();
        let last = ct.moduli()[level - 1];
        Ok(Ciphertext::new(
            &ct.moduli()[..level - 1],
            ct.scale() / last as f64,
            ct.len(),
            self.ring.divide_round_last(ct.c0(), &indices),
            self.ring.divide_round_last(ct.c1(), &indices),
        ))
    }

    /// Rotate slots left by `step`: slot `j` receives slot `j + step`.
    pub fn rotate(&self, ct: &Ciphertext, step: usize) -> Result<Ciphertext, CkksError> {
        let key: &KeySwitchKey = self.eval_keys.rotation(step)?;
        let g = self.ring.galois_element(step);
        let moduli = ct.moduli();
        let c0 = self.ring.automorphism(ct.c0(), g);
        let c1 = self.ring.automorphism(ct.c1(), g);
        let (k0, k1) = self.ring.key_switch(&c1, key);
        Ok(Ciphertext::new(
            moduli,
            ct.scale(),
            ct.len(),
            c0.add(&k0, moduli),
            k1,
        ))
    }

    /// Fold the first `width` slots into slot 0 with log2(width) rotations.
    pub fn sum_slots(&self, ct: &Ciphertext, width: usize) -> Result<Ciphertext, CkksError> {
        let mut acc = ct.clone();
        let mut step = 1;
        while step < width {
            let rotated = self.rotate(&acc, step)?;
            acc = self.add(&acc, &rotated)?;
            step <<= 1;
        }
        Ok(acc.with_len(1))
    }

    /// Encrypted inner product; the result lives in slot 0.
    pub fn dot(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, CkksError> {
        let width = a.len().min(b.len());
        let product = self.rescale(&self.multiply(a, b)?)?;
        self.sum_slots(&product, width)
    }

    /// Encrypted squared Euclidean distance; the result lives in slot 0.
    pub fn squared_distance(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, CkksError> {
        let diff = self.sub(a, b)?;
        let width = a.len().max(b.len());
        let squared = self.rescale(&self.multiply(&diff, &diff)?)?;
        self.sum_slots(&squared, width)
    }

    pub fn rotation_steps(&self) -> Vec<usize> {
        self.eval_keys.rotation_steps().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn small_params() -> Parameters {
        Parameters::generate(1024, &[60, 40, 40], 60, 40, 64).unwrap()
    }

    fn context() -> &'static CkksContext {
        static CONTEXT: OnceLock<CkksContext> = OnceLock::new();
        CONTEXT.get_or_init(|| {
            let mut rng = ChaCha20Rng::seed_from_u64(42);
            CkksContext::generate_with_rng(small_params(), &mut rng).unwrap()
        })
    }

    fn sample_vector(seed: u64, dim: usize) -> Vec<f64> {
        (0..dim)
            .map(|i| ((seed as f64 + 1.0) * (i as f64 + 0.5)).sin() * 0.4)
            .collect()
    }

    fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let ctx = context();
        let v = sample_vector(1, 64);
        let ct = ctx.encrypt(&v).unwrap();
        let decrypted = ctx.decrypt(&ct).unwrap();
        assert_eq!(decrypted.len(), 64);
        for (x, y) in decrypted.iter().zip(&v) {
            assert!((x - y).abs() < 1e-6, "{x} vs {y}");
        }
    }

    #[test]
    fn rotation_shifts_slots_left() {
        let ctx = context();
        let v = sample_vector(2, 64);
        let ct = ctx.encrypt(&v).unwrap();
        let rotated = ctx.rotate(&ct, 4).unwrap();
        let decrypted = ctx.decrypt(&rotated).unwrap();
        for j in 0..60 {
            assert!((decrypted[j] - v[j + 4]).abs() < 1e-6);
        }
    }

    #[test]
    fn dot_product_matches_plaintext() {
        let ctx = context();
        let a = sample_vector(3, 64);
        let b = sample_vector(4, 64);
        let result = ctx
            .dot(&ctx.encrypt(&a).unwrap(), &ctx.encrypt(&b).unwrap())
            .unwrap();
        assert_eq!(result.level(), 2);
        let decrypted = ctx.decrypt(&result).unwrap();
        assert_eq!(decrypted.len(), 1);
        assert!((decrypted[0] - dot(&a, &b)).abs() < 1e-6);
    }

    #[test]
    fn squared_distance_matches_plaintext() {
        let ctx = context();
        let a = sample_vector(5, 64);
        let b = sample_vector(6, 64);
        let expected: f64 = a.iter().zip(&b).map(|(x, y)| (x - y).powi(2)).sum();
        let result = ctx
            .squared_distance(&ctx.encrypt(&a).unwrap(), &ctx.encrypt(&b).unwrap())
            .unwrap();
        let decrypted = ctx.decrypt(&result).unwrap();
        assert!((decrypted[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn public_context_cannot_decrypt() {
        let ctx = context();
        let public = ctx.public_only();
        let ct = public.encrypt(&sample_vector(7, 8)).unwrap();
        assert_eq!(public.decrypt(&ct).unwrap_err(), CkksError::MissingSecretKey);
        assert!(ctx.decrypt(&ct).is_ok());
    }

    #[test]
    fn snapshot_restores_working_keys() {
        let ctx = context();
        let restored = CkksContext::from_snapshot(ctx.snapshot()).unwrap();
        let v = sample_vector(8, 64);
        let ct = restored.encrypt(&v).unwrap();
        let squared = ctx.dot(&ct, &ct).unwrap();
        let decrypted = restored.decrypt(&squared).unwrap();
        assert!((decrypted[0] - dot(&v, &v)).abs() < 1e-6);
    }

    #[test]
    fn rescale_below_base_prime_fails() {
        let ctx = context();
        let ct = ctx.encrypt(&[0.5]).unwrap();
        let once = ctx.rescale(&ct).unwrap();
        let twice = ctx.rescale(&once).unwrap();
        assert_eq!(ctx.rescale(&twice).unwrap_err(), CkksError::LevelExhausted);
    }

    #[test]
    fn missing_rotation_key_is_reported() {
        let ctx = context();
        let ct = ctx.encrypt(&[1.0]).unwrap();
        assert_eq!(
            ctx.rotate(&ct, 3).unwrap_err(),
            CkksError::MissingRotationKey(3)
        );
    }
}
