//! Shared test utilities for integration tests.
//!
//! # Performance Note
//!
//! Generating a full-size context (N = 8192, nine rotation keys) takes a few
//! seconds. The production-sized context is cached with `OnceLock`, so only
//! the first test in a binary pays for it. Tests that do not need production
//! precision should use `face_fhe_service::test_support::ckks` instead.
#![allow(dead_code)]

use std::sync::OnceLock;

use face_fhe_service::ckks::{Parameters, DEFAULT_VECTOR_DIM};
use face_fhe_service::crypto::CryptoContext;
use face_fhe_service::embedding::FeatureVector;
use face_fhe_service::test_support::ckks::unit_vector;

/// Global cache for the production-sized secret context.
static FACE_CONTEXT: OnceLock<CryptoContext> = OnceLock::new();

/// Secret context with the deployed parameters (512-dimensional embeddings).
///
/// # Performance
/// First call generates keys, subsequent calls return the cached context.
pub fn face_context() -> &'static CryptoContext {
    FACE_CONTEXT.get_or_init(|| {
        let params = Parameters::face_embedding().expect("deployed parameters are valid");
        CryptoContext::generate(params).expect("context generation")
    })
}

/// Deterministic unit-length embedding of the deployed dimension.
pub fn face_embedding(seed: u64) -> FeatureVector {
    unit_vector(DEFAULT_VECTOR_DIM, seed)
}

/// Relative error check used for every decrypted inner product.
pub fn assert_close(actual: f64, expected: f64, relative: f64) {
    let tolerance = relative * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance,
        "decrypted {actual} differs from {expected} by more than {tolerance}"
    );
}
