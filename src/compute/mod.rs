//! Blind compute: similarity between an encrypted probe and the stored
//! templates, evaluated without the secret key.

mod remote;
mod scorer;

use std::fmt;
use std::str::FromStr;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedVector;
use crate::error::ServiceResult;

pub use remote::RemoteComputeClient;
pub use scorer::BlindScorer;

/// Function the compute role evaluates per template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Inner product of unit vectors.
    #[default]
    Cosine,
    /// Squared Euclidean distance.
    SquaredDistance,
}

impl SimilarityMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::SquaredDistance => "squared_distance",
        }
    }

    /// Map a decrypted value onto cosine similarity, so that higher is
    /// better for every metric. Exact for unit vectors: ‖a−b‖² = 2 − 2·cos.
    pub fn to_similarity(self, value: f64) -> f64 {
        match self {
            SimilarityMetric::Cosine => value,
            SimilarityMetric::SquaredDistance => 1.0 - value / 2.0,
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "cosine" | "dot" => Ok(SimilarityMetric::Cosine),
            "squared_distance" | "euclidean" | "l2" => Ok(SimilarityMetric::SquaredDistance),
            other => Err(format!("unknown similarity metric: {other}")),
        }
    }
}

/// One candidate as returned by the compute role. The similarity stays
/// encrypted (base64) until the client decrypts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub user_id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub encrypted_similarity: String,
    #[serde(default)]
    pub metric: SimilarityMetric,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSheet {
    pub results: Vec<ScoreEntry>,
}

pub trait BlindCompute: Send + Sync {
    /// Score `probe` against the candidate templates, in the compute role's order.
    fn score<'a>(
        &'a self,
        session_id: Option<&'a str>,
        probe: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<ScoreSheet>>;

    /// Encrypted inner product of `probe` with itself; used as a round-trip check.
    fn self_similarity<'a>(
        &'a self,
        probe: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<EncryptedVector>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_metric_reads_as_cosine() {
        let entry: ScoreEntry =
            serde_json::from_str(r#"{"user_id":"alice","encrypted_similarity":"AAAA"}"#).unwrap();
        assert_eq!(entry.metric, SimilarityMetric::Cosine);
        assert_eq!(entry.full_name, None);
    }

    #[test]
    fn distance_maps_to_similarity() {
        let metric = SimilarityMetric::SquaredDistance;
        assert_eq!(metric.to_similarity(0.0), 1.0);
        assert_eq!(metric.to_similarity(2.0), 0.0);
        assert_eq!(metric.to_similarity(1.0), 0.5);
        assert_eq!(SimilarityMetric::Cosine.to_similarity(0.7), 0.7);
    }

    #[test]
    fn metric_parses_from_config() {
        assert_eq!(
            "Cosine".parse::<SimilarityMetric>(),
            Ok(SimilarityMetric::Cosine)
        );
        assert_eq!(
            " squared_distance ".parse::<SimilarityMetric>(),
            Ok(SimilarityMetric::SquaredDistance)
        );
        assert!("manhattan".parse::<SimilarityMetric>().is_err());
    }
}
