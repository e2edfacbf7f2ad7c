//! Ciphertext codec.
//!
//! An [`EncryptedVector`] is context-free: it records the scheme parameters
//! it was produced under, but no key. It must be linked to a loaded context
//! before any arithmetic or decryption, and linking checks compatibility.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use super::context::CryptoContext;
use crate::ckks::Ciphertext;
use crate::embedding::FeatureVector;
use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedVector(Ciphertext);

/// Encrypt `vector` under `context`. Either role can encrypt.
pub fn encrypt(context: &CryptoContext, vector: &FeatureVector) -> ServiceResult<EncryptedVector> {
    let expected = context.params().vector_dim();
    if vector.len() != expected {
        return Err(ServiceError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    if !vector.is_finite() {
        return Err(ServiceError::InvalidInput(
            "embedding contains non-finite values".to_string(),
        ));
    }
    let ciphertext = context.ckks().encrypt(vector.values())?;
    Ok(EncryptedVector(ciphertext))
}

impl EncryptedVector {
    pub fn to_bytes(&self) -> ServiceResult<Vec<u8>> {
        Ok(bincode::serialize(&self.0)?)
    }

    /// Parse an opaque blob. Structural checks happen at [`Self::link`].
    pub fn from_bytes(bytes: &[u8]) -> ServiceResult<Self> {
        if bytes.is_empty() {
            return Err(ServiceError::MalformedCiphertext("empty payload".to_string()));
        }
        bincode::deserialize(bytes)
            .map(Self)
            .map_err(|e| ServiceError::MalformedCiphertext(e.to_string()))
    }

    pub fn to_base64(&self) -> ServiceResult<String> {
        Ok(BASE64.encode(self.to_bytes()?))
    }

    pub fn from_base64(text: &str) -> ServiceResult<Self> {
        let bytes = BASE64.decode(text.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Number of meaningful slots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bind to `context`. Fails with `IncompatibleContext` when the
    /// ciphertext was produced under different scheme parameters.
    pub fn link(self, context: &CryptoContext) -> ServiceResult<LinkedVector<'_>> {
        context.ckks().check(&self.0)?;
        Ok(LinkedVector {
            context,
            ciphertext: self.0,
        })
    }
}

/// A ciphertext bound to a loaded context; supports arithmetic and, for a
/// secret context, decryption.
#[derive(Debug, Clone)]
pub struct LinkedVector<'a> {
    context: &'a CryptoContext,
    ciphertext: Ciphertext,
}

impl<'a> LinkedVector<'a> {
    /// Encrypted inner product, in slot 0 of the result.
    pub fn dot(&self, other: &LinkedVector<'_>) -> ServiceResult<LinkedVector<'a>> {
        let ciphertext = self.context.ckks().dot(&self.ciphertext, &other.ciphertext)?;
        Ok(self.derive(ciphertext))
    }

    /// Encrypted squared Euclidean distance, in slot 0 of the result.
    pub fn squared_distance(&self, other: &LinkedVector<'_>) -> ServiceResult<LinkedVector<'a>> {
        let ciphertext = self
            .context
            .ckks()
            .squared_distance(&self.ciphertext, &other.ciphertext)?;
        Ok(self.derive(ciphertext))
    }

    pub fn decrypt(&self) -> ServiceResult<Vec<f64>> {
        self.context.require_secret()?;
        Ok(self.context.ckks().decrypt(&self.ciphertext)?)
    }

    /// First slot of the plaintext, where reductions leave their result.
    pub fn decrypt_scalar(&self) -> ServiceResult<f64> {
        self.decrypt()?.first().copied().ok_or_else(|| {
            ServiceError::MalformedCiphertext("ciphertext carries no slots".to_string())
        })
    }

    pub fn into_unlinked(self) -> EncryptedVector {
        EncryptedVector(self.ciphertext)
    }

    fn derive(&self, ciphertext: Ciphertext) -> LinkedVector<'a> {
        LinkedVector {
            context: self.context,
            ciphertext,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ckks::Parameters;
    use crate::test_support::ckks::{small_parameters, small_secret_context, unit_vector};

    #[test]
    fn serialized_bytes_survive_transport() {
        let context = small_secret_context();
        let vector = unit_vector(context.params().vector_dim(), 3);
        let encrypted = encrypt(context, &vector).unwrap();

        let text = encrypted.to_base64().unwrap();
        let restored = EncryptedVector::from_base64(&text).unwrap();
        assert_eq!(restored.to_bytes().unwrap(), encrypted.to_bytes().unwrap());

        let decrypted = restored.link(context).unwrap().decrypt().unwrap();
        for (got, want) in decrypted.iter().zip(vector.values()) {
            assert!((got - want).abs() < 1e-4, "{got} vs {want}");
        }
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let context = small_secret_context();
        let result = encrypt(context, &FeatureVector::new(vec![0.1; 7]));
        assert!(matches!(
            result,
            Err(ServiceError::DimensionMismatch { expected: 64, actual: 7 })
        ));
    }

    #[test]
    fn linking_to_other_parameters_fails() {
        let context = small_secret_context();
        let encrypted = encrypt(context, &unit_vector(64, 1)).unwrap();

        let other_params = Parameters::generate(2048, &[60, 40, 40], 60, 40, 64).unwrap();
        assert_ne!(&other_params, &small_parameters());
        let other = CryptoContext::generate(other_params).unwrap();
        assert!(matches!(
            encrypted.link(&other),
            Err(ServiceError::IncompatibleContext(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            EncryptedVector::from_bytes(b"\x01\x02\x03"),
            Err(ServiceError::MalformedCiphertext(_))
        ));
        assert!(matches!(
            EncryptedVector::from_bytes(&[]),
            Err(ServiceError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn public_context_computes_but_cannot_decrypt() {
        let secret = small_secret_context();
        let public = secret.to_public();
        let a = encrypt(&public, &unit_vector(64, 5)).unwrap();
        let b = encrypt(&public, &unit_vector(64, 6)).unwrap();

        let score = a
            .link(&public)
            .unwrap()
            .dot(&b.link(&public).unwrap())
            .unwrap();
        assert!(matches!(score.decrypt(), Err(ServiceError::NotASecretContext)));

        let value = score.into_unlinked().link(secret).unwrap().decrypt_scalar().unwrap();
        let expected = unit_vector(64, 5).dot(&unit_vector(64, 6));
        assert!((value - expected).abs() < 1e-3, "{value} vs {expected}");
    }
}
