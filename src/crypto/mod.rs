//! Crypto layer over the CKKS engine: context artifacts and the ciphertext codec.

mod codec;
mod context;

pub use codec::{encrypt, EncryptedVector, LinkedVector};
pub use context::{
    ContextAuthority, ContextPaths, ContextRole, CryptoContext, EnsureOutcome, DEFAULT_CONTEXT_DIR,
};
