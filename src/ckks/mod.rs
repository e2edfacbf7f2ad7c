//! RNS-CKKS approximate homomorphic encryption.
//!
//! Textbook construction sized for inner products of short real vectors:
//! public-key encryption, one multiplication with relinearisation, rescaling,
//! and power-of-two slot rotations for summing a vector into one slot.

mod arith;
mod ciphertext;
mod context;
mod encoding;
mod error;
mod keys;
mod ntt;
mod params;
mod poly;
mod ring;
mod sampling;

pub use ciphertext::Ciphertext;
pub use context::{CkksContext, ContextSnapshot};
pub use error::CkksError;
pub use keys::{EvaluationKeys, KeySwitchKey, PublicKey, SecretKey};
pub use params::{
    Parameters, DEFAULT_COEFF_MOD_BITS, DEFAULT_LOG_SCALE, DEFAULT_POLY_DEGREE,
    DEFAULT_SPECIAL_PRIME_BITS, DEFAULT_VECTOR_DIM,
};
