//! Face FHE Service Library
//!
//! Privacy-preserving face enrollment and verification. Face embeddings are
//! encrypted under CKKS by the client role, compared blind by the compute
//! role, and only ever decrypted again as a similarity score.
//!
//! The library is split so integration tests can drive every layer directly.

pub mod analysis;
pub mod app;
pub mod auth;
pub mod capture;
pub mod ckks;
pub mod compute;
pub mod cpu;
pub mod crypto;
pub mod embedding;
pub mod error;
pub mod protocol;
pub mod routes;
pub mod settings;
pub mod store;
pub mod telemetry;
pub mod test_support;
