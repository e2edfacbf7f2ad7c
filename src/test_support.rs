//! Test-only helpers that keep production modules lean.
//!
//! Collaborators here are scripted stand-ins for the face analyzer; contexts
//! use a small ring so key generation stays fast.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::analysis::{
    AnalyzerError, DetectOptions, Detection, EmbeddingExtractor, FaceDetector, FaceRegion,
};
use crate::capture::{CaptureImage, CapturePolicy, CaptureValidator};
use crate::compute::{BlindScorer, SimilarityMetric};
use crate::cpu::CpuLimiter;
use crate::crypto::CryptoContext;
use crate::embedding::FeatureVector;
use crate::protocol::FaceProtocol;
use crate::store::RedbTemplateStore;

pub mod images {
    use std::io::Cursor;

    use axum::body::Bytes;
    use image::{ImageFormat, Rgb, RgbImage};

    /// A `width` x `height` PNG with a simple gradient.
    pub fn png_bytes(width: u32, height: u32) -> Bytes {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .expect("PNG encoding into memory");
        Bytes::from(buffer)
    }
}

pub mod ckks {
    use std::sync::OnceLock;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use crate::ckks::Parameters;
    use crate::crypto::CryptoContext;
    use crate::embedding::FeatureVector;

    /// Embedding length of [`small_parameters`].
    pub const SMALL_DIM: usize = 64;

    /// N = 1024 with the production modulus layout. Not secure; tests only.
    pub fn small_parameters() -> Parameters {
        Parameters::generate(1024, &[60, 40, 40], 60, 40, SMALL_DIM)
            .expect("small test parameters")
    }

    /// Secret context over [`small_parameters`], generated once per test binary.
    pub fn small_secret_context() -> &'static CryptoContext {
        static CONTEXT: OnceLock<CryptoContext> = OnceLock::new();
        CONTEXT.get_or_init(|| {
            CryptoContext::generate(small_parameters()).expect("small test context")
        })
    }

    /// Deterministic unit-length vector.
    pub fn unit_vector(dim: usize, seed: u64) -> FeatureVector {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let values: Vec<f64> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        FeatureVector::new(values)
            .normalized()
            .expect("random vector is not zero")
    }
}

/// Face box that passes the default completeness gate in a 200x200 frame.
pub const CENTERED_FACE: FaceRegion = FaceRegion {
    x: 50,
    y: 40,
    width: 100,
    height: 120,
};

pub fn detection(region: FaceRegion, is_real: Option<bool>) -> Detection {
    Detection {
        region,
        confidence: Some(0.99),
        is_real,
        antispoof_score: is_real.map(|real| if real { 0.97 } else { 0.12 }),
    }
}

/// Detector with canned replies for the plain and the anti-spoofing pass.
pub struct FakeDetector {
    plain: Result<Vec<Detection>, AnalyzerError>,
    anti_spoofing: Result<Vec<Detection>, AnalyzerError>,
    calls: AtomicUsize,
    anti_spoofing_calls: AtomicUsize,
}

impl FakeDetector {
    pub fn new(
        plain: Result<Vec<Detection>, AnalyzerError>,
        anti_spoofing: Result<Vec<Detection>, AnalyzerError>,
    ) -> Self {
        Self {
            plain,
            anti_spoofing,
            calls: AtomicUsize::new(0),
            anti_spoofing_calls: AtomicUsize::new(0),
        }
    }

    pub fn live_centered() -> Self {
        Self::with_region(CENTERED_FACE, true)
    }

    pub fn spoof_centered() -> Self {
        Self::with_region(CENTERED_FACE, false)
    }

    pub fn with_region(region: FaceRegion, is_real: bool) -> Self {
        Self::new(
            Ok(vec![detection(region, None)]),
            Ok(vec![detection(region, Some(is_real))]),
        )
    }

    pub fn no_face() -> Self {
        Self::new(Err(AnalyzerError::NoFace), Err(AnalyzerError::NoFace))
    }

    pub fn failing(message: &str) -> Self {
        let err = AnalyzerError::Backend(message.to_string());
        Self::new(Err(err.clone()), Err(err))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn anti_spoofing_calls(&self) -> usize {
        self.anti_spoofing_calls.load(Ordering::SeqCst)
    }
}

impl FaceDetector for FakeDetector {
    fn detect<'a>(
        &'a self,
        _image: &'a CaptureImage,
        options: DetectOptions,
    ) -> BoxFuture<'a, Result<Vec<Detection>, AnalyzerError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = if options.anti_spoofing {
            self.anti_spoofing_calls.fetch_add(1, Ordering::SeqCst);
            self.anti_spoofing.clone()
        } else {
            self.plain.clone()
        };
        Box::pin(async move { reply })
    }
}

/// Extractor that always returns the same reply.
pub struct FixedExtractor {
    reply: Result<FeatureVector, AnalyzerError>,
    calls: AtomicUsize,
}

impl FixedExtractor {
    pub fn returning(values: Vec<f64>) -> Self {
        Self::from_reply(Ok(FeatureVector::new(values)))
    }

    /// A deterministic unit vector sized for [`ckks::small_parameters`].
    pub fn seeded(seed: u64) -> Self {
        Self::from_reply(Ok(ckks::unit_vector(ckks::SMALL_DIM, seed)))
    }

    pub fn failing(err: AnalyzerError) -> Self {
        Self::from_reply(Err(err))
    }

    fn from_reply(reply: Result<FeatureVector, AnalyzerError>) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingExtractor for FixedExtractor {
    fn extract<'a>(
        &'a self,
        _image: &'a CaptureImage,
    ) -> BoxFuture<'a, Result<FeatureVector, AnalyzerError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.clone();
        Box::pin(async move { reply })
    }
}

/// A client-role protocol wired to an in-process compute role.
pub struct ProtocolHarness {
    context: CryptoContext,
    detector: Arc<FakeDetector>,
    extractor: Arc<FixedExtractor>,
    scorer: BlindScorer,
    protocol: FaceProtocol,
}

impl ProtocolHarness {
    /// Over the shared small secret context with the cosine metric.
    pub fn new(detector: FakeDetector, extractor: FixedExtractor) -> Self {
        Self::with_context(
            ckks::small_secret_context().clone(),
            detector,
            extractor,
            SimilarityMetric::Cosine,
        )
    }

    pub fn with_context(
        context: CryptoContext,
        detector: FakeDetector,
        extractor: FixedExtractor,
        metric: SimilarityMetric,
    ) -> Self {
        let store = RedbTemplateStore::open_memory().expect("in-memory template store");
        Self::assemble(
            context,
            Arc::new(detector),
            Arc::new(extractor),
            store,
            metric,
        )
    }

    /// Same collaborators and store, different compute metric.
    pub fn with_metric(self, metric: SimilarityMetric) -> Self {
        let store = self.scorer.store().clone();
        Self::assemble(self.context, self.detector, self.extractor, store, metric)
    }

    fn assemble(
        context: CryptoContext,
        detector: Arc<FakeDetector>,
        extractor: Arc<FixedExtractor>,
        store: RedbTemplateStore,
        metric: SimilarityMetric,
    ) -> Self {
        let scorer = BlindScorer::new(context.to_public(), store, metric);
        let validator = CaptureValidator::new(detector.clone(), CapturePolicy::default());
        let protocol = FaceProtocol::new(
            validator,
            extractor.clone(),
            context.clone(),
            Arc::new(scorer.clone()),
            Arc::new(scorer.clone()),
            CpuLimiter::new(4, Duration::from_secs(60)),
        );
        Self {
            context,
            detector,
            extractor,
            scorer,
            protocol,
        }
    }

    pub fn protocol(&self) -> &FaceProtocol {
        &self.protocol
    }

    pub fn scorer(&self) -> &BlindScorer {
        &self.scorer
    }

    pub fn store(&self) -> &RedbTemplateStore {
        self.scorer.store()
    }

    pub fn detector(&self) -> &FakeDetector {
        &self.detector
    }

    pub fn extractor(&self) -> &FixedExtractor {
        &self.extractor
    }
}
