//! Face FHE Service
//!
//! One binary, two roles. `FACE_SERVICE_ROLE=client` holds the secret CKKS
//! context and serves enrollment and verification; `FACE_SERVICE_ROLE=compute`
//! holds the public context plus the encrypted template store.

use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use face_fhe_service::{
    analysis::{CommandFaceAnalyzer, EmbeddingExtractor, FaceDetector, HttpFaceAnalyzer},
    app::{build_client_router, build_compute_router},
    capture::CaptureValidator,
    ckks::Parameters,
    compute::{BlindScorer, RemoteComputeClient},
    cpu::CpuLimiter,
    crypto::{ContextAuthority, EnsureOutcome},
    protocol::FaceProtocol,
    routes::ComputeState,
    settings::{AnalyzerBackend, ServiceRole, Settings},
    store::RedbTemplateStore,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().map_err(anyhow::Error::msg)?;
    telemetry::init_tracing(settings.role());

    if let Err(message) = settings.validate() {
        tracing::error!("{message}");
        telemetry::shutdown_tracing();
        std::process::exit(1);
    }

    let addr = settings.socket_addr();
    tracing::info!(
        role = %settings.role(),
        addr = %addr,
        cpu_limit = settings.cpu_concurrency_limit(),
        body_limit_mb = settings.body_limit_mb(),
        request_timeout_ms = settings.request_timeout().as_millis() as u64,
        token_required = settings.internal_token_required(),
        "Starting face FHE service"
    );

    let app = match settings.role() {
        ServiceRole::Client => client_app(&settings).await?,
        ServiceRole::Compute => compute_app(&settings).await?,
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    telemetry::shutdown_tracing();
    Ok(())
}

async fn client_app(settings: &Settings) -> anyhow::Result<Router> {
    let authority = ContextAuthority::new(
        settings.context_paths().clone(),
        Parameters::face_embedding()?,
    );
    tracing::info!("Preparing CKKS context (first run generates keys)...");
    let context = tokio::task::spawn_blocking(move || {
        let outcome = authority.ensure_context()?;
        if outcome == EnsureOutcome::Generated {
            tracing::info!(
                secret = %authority.paths().secret().display(),
                public = %authority.paths().public().display(),
                "Generated new context artifacts; copy the public one to the compute role"
            );
        }
        authority.load_secret()
    })
    .await??;

    let (detector, extractor) = build_analyzer(settings)?;
    let compute_url = settings
        .compute_server_url()
        .context("COMPUTE_SERVER_URL is required in the client role")?;
    let remote = Arc::new(RemoteComputeClient::new(
        compute_url,
        settings.upstream_timeout(),
        settings.internal_token(),
    )?);

    let validator = CaptureValidator::new(detector, settings.capture_policy().clone());
    let protocol = FaceProtocol::new(
        validator,
        extractor,
        context,
        remote.clone(),
        remote,
        CpuLimiter::from_settings(settings),
    )
    .with_threshold(settings.match_threshold());

    Ok(build_client_router(settings, protocol))
}

async fn compute_app(settings: &Settings) -> anyhow::Result<Router> {
    let paths = settings.context_paths().clone();
    let db_path = settings.template_db_path().to_path_buf();
    let (context, store) = tokio::task::spawn_blocking(move || {
        let authority = ContextAuthority::new(paths, Parameters::face_embedding()?);
        let context = authority.load_public()?;
        let store = RedbTemplateStore::open(&db_path)?;
        anyhow::Ok((context, store))
    })
    .await??;

    tracing::info!(
        metric = %settings.similarity_metric(),
        templates = store.len().unwrap_or_default(),
        "Template store ready"
    );
    let scorer = BlindScorer::new(context, store, settings.similarity_metric());
    let state = ComputeState::new(scorer, CpuLimiter::from_settings(settings));
    Ok(build_compute_router(settings, state))
}

type Analyzer = (Arc<dyn FaceDetector>, Arc<dyn EmbeddingExtractor>);

fn build_analyzer(settings: &Settings) -> anyhow::Result<Analyzer> {
    let timeout = settings.analyzer_timeout();
    match settings.analyzer() {
        Some(AnalyzerBackend::Http(url)) => {
            let analyzer = Arc::new(HttpFaceAnalyzer::new(url, timeout)?);
            tracing::info!(url = %url, "Using face analyzer sidecar");
            Ok((analyzer.clone(), analyzer))
        }
        Some(AnalyzerBackend::Command(line)) => {
            let analyzer = Arc::new(
                CommandFaceAnalyzer::from_command_line(line, timeout)
                    .context("FACE_ANALYZER_COMMAND is empty")?,
            );
            tracing::info!(command = %line, "Using local face analyzer command");
            Ok((analyzer.clone(), analyzer))
        }
        None => anyhow::bail!("Set FACE_ANALYZER_URL or FACE_ANALYZER_COMMAND"),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
