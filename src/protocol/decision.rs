//! Decryption of candidate scores and the match decision.

use serde::Serialize;
use tracing::{error, info};

use crate::compute::{ScoreEntry, SimilarityMetric};
use crate::crypto::{CryptoContext, EncryptedVector};
use crate::error::{ServiceError, ServiceResult};

/// One candidate after decryption. `similarity` is on the cosine scale
/// whatever metric the compute role used; it is `None` when decryption
/// failed and `decrypt_error` says why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub user_id: String,
    pub full_name: Option<String>,
    pub encrypted_similarity: String,
    pub metric: SimilarityMetric,
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decrypt_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub results: Vec<SimilarityResult>,
    pub highest_similarity: Option<f64>,
    pub best_match: Option<SimilarityResult>,
    pub match_found: bool,
    pub threshold: f64,
}

fn decrypt_value(context: &CryptoContext, encrypted: &str) -> ServiceResult<f64> {
    EncryptedVector::from_base64(encrypted)?
        .link(context)?
        .decrypt_scalar()
}

/// Decrypt one entry. Failures are recorded on the entry, never raised.
pub fn decrypt_entry(context: &CryptoContext, entry: ScoreEntry) -> SimilarityResult {
    let outcome = decrypt_value(context, &entry.encrypted_similarity).and_then(|value| {
        if value.is_finite() {
            Ok(entry.metric.to_similarity(value))
        } else {
            Err(ServiceError::MalformedCiphertext(
                "decrypted to a non-finite value".to_string(),
            ))
        }
    });

    let (similarity, decrypt_error) = match outcome {
        Ok(similarity) => {
            info!(
                user_id = %entry.user_id,
                full_name = entry.full_name.as_deref().unwrap_or(""),
                "Decrypted similarity {similarity:.4}"
            );
            (Some(similarity), None)
        }
        Err(err) => {
            error!(user_id = %entry.user_id, "Error decrypting similarity: {err}");
            (None, Some(err.to_string()))
        }
    };

    SimilarityResult {
        user_id: entry.user_id,
        full_name: entry.full_name,
        encrypted_similarity: entry.encrypted_similarity,
        metric: entry.metric,
        similarity,
        decrypt_error,
    }
}

/// Pick the best candidate in arrival order. A later candidate only wins
/// with a strictly higher similarity, and a match needs a similarity
/// strictly above `threshold`.
pub fn decide(results: Vec<SimilarityResult>, threshold: f64) -> VerificationOutcome {
    let mut best: Option<(usize, f64)> = None;
    for (index, result) in results.iter().enumerate() {
        if let Some(similarity) = result.similarity {
            if best.map_or(true, |(_, highest)| similarity > highest) {
                best = Some((index, similarity));
            }
        }
    }

    let highest_similarity = best.map(|(_, similarity)| similarity);
    let best_match = best.map(|(index, _)| results[index].clone());
    let match_found = highest_similarity.is_some_and(|similarity| similarity > threshold);

    VerificationOutcome {
        results,
        highest_similarity,
        best_match,
        match_found,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(user_id: &str, similarity: Option<f64>) -> SimilarityResult {
        SimilarityResult {
            user_id: user_id.to_string(),
            full_name: None,
            encrypted_similarity: String::new(),
            metric: SimilarityMetric::Cosine,
            similarity,
            decrypt_error: similarity.is_none().then(|| "bad ciphertext".to_string()),
        }
    }

    #[test]
    fn ties_keep_the_earliest_candidate() {
        let outcome = decide(
            vec![
                result("first", Some(0.8)),
                result("second", Some(0.8)),
                result("third", Some(0.3)),
            ],
            0.5,
        );
        assert_eq!(outcome.highest_similarity, Some(0.8));
        assert_eq!(outcome.best_match.unwrap().user_id, "first");
        assert!(outcome.match_found);
    }

    #[test]
    fn threshold_is_strict() {
        let outcome = decide(vec![result("alice", Some(0.5))], 0.5);
        assert_eq!(outcome.highest_similarity, Some(0.5));
        assert!(!outcome.match_found);
    }

    #[test]
    fn failed_entries_do_not_block_the_decision() {
        let outcome = decide(
            vec![result("broken", None), result("alice", Some(0.9))],
            0.5,
        );
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].decrypt_error.is_some());
        assert_eq!(outcome.best_match.unwrap().user_id, "alice");
        assert!(outcome.match_found);
    }

    #[test]
    fn nothing_decrypted_means_no_match() {
        let outcome = decide(vec![result("broken", None)], 0.5);
        assert_eq!(outcome.highest_similarity, None);
        assert!(outcome.best_match.is_none());
        assert!(!outcome.match_found);

        let empty = decide(Vec::new(), 0.5);
        assert!(!empty.match_found);
        assert!(empty.results.is_empty());
    }

    #[test]
    fn undecodable_entry_records_an_error() {
        let context = crate::test_support::ckks::small_secret_context();
        let entry = ScoreEntry {
            user_id: "mallory".to_string(),
            full_name: None,
            encrypted_similarity: "not base64!".to_string(),
            metric: SimilarityMetric::Cosine,
        };
        let result = decrypt_entry(context, entry);
        assert_eq!(result.similarity, None);
        assert!(result.decrypt_error.is_some());
    }
}
