//! Compute-role scorer over the public context and the template store.

use futures_util::future::BoxFuture;
use tracing::{info_span, warn};

use super::{BlindCompute, ScoreEntry, ScoreSheet, SimilarityMetric};
use crate::crypto::{CryptoContext, EncryptedVector, LinkedVector};
use crate::error::{ServiceError, ServiceResult};
use crate::store::{RedbTemplateStore, StoreAck, TemplateRecord, TemplateStore};

/// Evaluates similarities blind. Holds no decryption key. Clone is cheap.
#[derive(Clone)]
pub struct BlindScorer {
    context: CryptoContext,
    store: RedbTemplateStore,
    metric: SimilarityMetric,
}

impl BlindScorer {
    pub fn new(context: CryptoContext, store: RedbTemplateStore, metric: SimilarityMetric) -> Self {
        if context.is_secret() {
            warn!("Blind scorer was handed a secret context; it only needs the public one");
        }
        Self {
            context,
            store,
            metric,
        }
    }

    pub fn store(&self) -> &RedbTemplateStore {
        &self.store
    }

    fn link(&self, bytes: &[u8]) -> ServiceResult<LinkedVector<'_>> {
        EncryptedVector::from_bytes(bytes)?.link(&self.context)
    }

    /// Store a template after checking it links to the public context.
    pub fn register(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        ciphertext: &[u8],
    ) -> ServiceResult<StoreAck> {
        self.link(ciphertext)?;
        self.store.put_template(user_id, full_name, ciphertext)?;
        Ok(StoreAck::registered(user_id))
    }

    /// Score a serialized probe against every stored template.
    ///
    /// Templates that fail to load are skipped with a warning; the remaining
    /// candidates are still scored.
    pub fn score_bytes(&self, probe: &[u8]) -> ServiceResult<ScoreSheet> {
        let _span = info_span!("blind_score", metric = self.metric.as_str()).entered();
        let probe = self.link(probe)?;

        let templates = self.store.templates()?;
        let mut results = Vec::with_capacity(templates.len());
        for record in templates {
            match self.score_one(&probe, &record) {
                Ok(entry) => results.push(entry),
                Err(err) => warn!(user_id = %record.user_id, "skipping template: {err}"),
            }
        }
        Ok(ScoreSheet { results })
    }

    fn score_one(&self, probe: &LinkedVector<'_>, record: &TemplateRecord) -> ServiceResult<ScoreEntry> {
        let template = self.link(&record.ciphertext)?;
        let score = match self.metric {
            SimilarityMetric::Cosine => probe.dot(&template)?,
            SimilarityMetric::SquaredDistance => probe.squared_distance(&template)?,
        };
        Ok(ScoreEntry {
            user_id: record.user_id.clone(),
            full_name: record.full_name.clone(),
            encrypted_similarity: score.into_unlinked().to_base64()?,
            metric: self.metric,
        })
    }

    /// Encrypted squared distance between the probe and one user's template.
    pub fn compare_bytes(&self, user_id: &str, probe: &[u8]) -> ServiceResult<EncryptedVector> {
        let record = self
            .store
            .get_template(user_id)?
            .ok_or_else(|| ServiceError::TemplateNotFound(user_id.to_string()))?;
        let probe = self.link(probe)?;
        let template = self.link(&record.ciphertext)?;
        Ok(template.squared_distance(&probe)?.into_unlinked())
    }

    pub fn self_similarity_bytes(&self, probe: &[u8]) -> ServiceResult<EncryptedVector> {
        let probe = self.link(probe)?;
        Ok(probe.dot(&probe)?.into_unlinked())
    }
}

impl BlindCompute for BlindScorer {
    fn score<'a>(
        &'a self,
        session_id: Option<&'a str>,
        probe: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<ScoreSheet>> {
        Box::pin(async move {
            tracing::debug!(session_id = ?session_id, "scoring probe in process");
            let bytes = probe.to_bytes()?;
            let scorer = self.clone();
            tokio::task::spawn_blocking(move || scorer.score_bytes(&bytes)).await?
        })
    }

    fn self_similarity<'a>(
        &'a self,
        probe: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<EncryptedVector>> {
        Box::pin(async move {
            let bytes = probe.to_bytes()?;
            let scorer = self.clone();
            tokio::task::spawn_blocking(move || scorer.self_similarity_bytes(&bytes)).await?
        })
    }
}

impl TemplateStore for BlindScorer {
    fn put<'a>(
        &'a self,
        user_id: &'a str,
        full_name: Option<&'a str>,
        template: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<StoreAck>> {
        Box::pin(async move {
            let bytes = template.to_bytes()?;
            let scorer = self.clone();
            let user = user_id.to_string();
            let name = full_name.map(str::to_string);
            tokio::task::spawn_blocking(move || scorer.register(&user, name.as_deref(), &bytes))
                .await?
        })
    }
}
