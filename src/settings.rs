//! Service configuration derived from environment variables.

use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::capture::{CapturePolicy, DEFAULT_EDGE_MARGIN, DEFAULT_MAX_ASPECT, DEFAULT_MIN_ASPECT};
use crate::compute::SimilarityMetric;
use crate::crypto::{ContextPaths, DEFAULT_CONTEXT_DIR};
use crate::protocol::DEFAULT_MATCH_THRESHOLD;

const DEFAULT_CLIENT_PORT: u16 = 8002;
const DEFAULT_COMPUTE_PORT: u16 = 8000;
const DEFAULT_BODY_LIMIT_MB: usize = 16;
const DEFAULT_CONCURRENCY_LIMIT: usize = 4;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 180_000;
const DEFAULT_TEST_TIMEOUT_MS: u64 = 180_000;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 30;
/// Analyzer calls in one verification: detect, liveness detect, extract.
const ANALYZER_CALLS_PER_REQUEST: u32 = 3;
const DEFAULT_TEMPLATE_DB_PATH: &str = "data/templates.redb";

fn env_trim(name: &str) -> String {
    env::var(name).unwrap_or_default().trim().to_string()
}

fn env_lower(name: &str) -> String {
    env_trim(name).to_lowercase()
}

fn env_optional(name: &str) -> Option<String> {
    Some(env_trim(name)).filter(|value| !value.is_empty())
}

fn env_f64(name: &str, default: f64) -> f64 {
    env_trim(name)
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "yes")
}

/// Which half of the protocol this process runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServiceRole {
    /// Holds the secret context; captures, encrypts, decrypts and decides.
    #[default]
    Client,
    /// Holds only the public context and the template store.
    Compute,
}

impl ServiceRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Compute => "compute",
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Self::Client => DEFAULT_CLIENT_PORT,
            Self::Compute => DEFAULT_COMPUTE_PORT,
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "compute" | "server" => Ok(Self::Compute),
            other => Err(format!("unknown service role '{other}'")),
        }
    }
}

/// Where face detection and embedding extraction run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalyzerBackend {
    Http(String),
    Command(String),
}

#[derive(Clone, Debug)]
pub struct Settings {
    role: ServiceRole,
    port: u16,
    host: IpAddr,
    body_limit_mb: usize,
    body_limit_bytes: usize,
    internal_token: Option<String>,
    internal_token_required: bool,
    concurrency_limit: usize,
    cpu_concurrency_limit: usize,
    request_timeout_ms: u64,
    context_paths: ContextPaths,
    compute_server_url: Option<String>,
    upstream_timeout_secs: u64,
    analyzer: Option<AnalyzerBackend>,
    analyzer_timeout_secs: u64,
    capture_policy: CapturePolicy,
    match_threshold: f64,
    template_db_path: PathBuf,
    similarity_metric: SimilarityMetric,
}

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        let role = match env_optional("FACE_SERVICE_ROLE") {
            Some(value) => value.parse::<ServiceRole>()?,
            None => ServiceRole::default(),
        };

        let internal_token = env_optional("INTERNAL_SERVICE_TOKEN");

        let node_env = env_lower("NODE_ENV");
        let app_env = env_lower("APP_ENV");
        let rust_env = env_lower("RUST_ENV");
        let is_production = matches!(node_env.as_str(), "production")
            || matches!(app_env.as_str(), "production")
            || matches!(rust_env.as_str(), "production");

        let internal_token_required =
            is_production || is_truthy(&env_lower("INTERNAL_SERVICE_TOKEN_REQUIRED"));

        let port = env_trim("PORT")
            .parse::<u16>()
            .unwrap_or_else(|_| role.default_port());
        let host = env_trim("HOST")
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        let body_limit_mb = env_trim("FACE_BODY_LIMIT_MB")
            .parse::<usize>()
            .unwrap_or(DEFAULT_BODY_LIMIT_MB);
        let body_limit_bytes = body_limit_mb.saturating_mul(1024 * 1024);
        let concurrency_limit = env_trim("FACE_CONCURRENCY_LIMIT")
            .parse::<usize>()
            .ok()
            .filter(|value| *value > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|value| value.get())
                    .unwrap_or(DEFAULT_CONCURRENCY_LIMIT)
            });
        let cpu_concurrency_limit = env_trim("FACE_CPU_CONCURRENCY_LIMIT")
            .parse::<usize>()
            .ok()
            .filter(|value| *value > 0)
            .unwrap_or(concurrency_limit);
        let request_timeout_ms = env_trim("FACE_REQUEST_TIMEOUT_MS")
            .parse::<u64>()
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);

        let context_dir = env_optional("CONTEXT_DIR").unwrap_or_else(|| DEFAULT_CONTEXT_DIR.into());
        let defaults = ContextPaths::in_dir(Path::new(&context_dir));
        let context_paths = ContextPaths::new(
            env_optional("FHE_SECRET_CONTEXT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| defaults.secret().to_path_buf()),
            env_optional("FHE_PUBLIC_CONTEXT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| defaults.public().to_path_buf()),
        );

        let compute_server_url =
            env_optional("COMPUTE_SERVER_URL").or_else(|| env_optional("SERVER_URL"));
        let upstream_timeout_secs = env_trim("UPSTREAM_TIMEOUT_SECS")
            .parse::<u64>()
            .ok()
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        let analyzer = env_optional("FACE_ANALYZER_URL")
            .map(AnalyzerBackend::Http)
            .or_else(|| env_optional("FACE_ANALYZER_COMMAND").map(AnalyzerBackend::Command));
        let analyzer_timeout_secs = env_trim("FACE_ANALYZER_TIMEOUT_SECS")
            .parse::<u64>()
            .ok()
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_ANALYZER_TIMEOUT_SECS);

        let capture_policy = CapturePolicy::new(
            env_f64("CAPTURE_EDGE_MARGIN", DEFAULT_EDGE_MARGIN),
            env_f64("CAPTURE_MIN_ASPECT", DEFAULT_MIN_ASPECT),
            env_f64("CAPTURE_MAX_ASPECT", DEFAULT_MAX_ASPECT),
            is_truthy(&env_lower("CAPTURE_SINGLE_PASS")),
        );
        let match_threshold = env_f64("MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD);

        let template_db_path = env_optional("TEMPLATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_DB_PATH));
        let similarity_metric = match env_optional("SIMILARITY_METRIC") {
            Some(value) => value.parse::<SimilarityMetric>()?,
            None => SimilarityMetric::default(),
        };

        Ok(Self {
            role,
            port,
            host,
            body_limit_mb,
            body_limit_bytes,
            internal_token,
            internal_token_required,
            concurrency_limit,
            cpu_concurrency_limit,
            request_timeout_ms,
            context_paths,
            compute_server_url,
            upstream_timeout_secs,
            analyzer,
            analyzer_timeout_secs,
            capture_policy,
            match_threshold,
            template_db_path,
            similarity_metric,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            role: ServiceRole::Client,
            port: DEFAULT_CLIENT_PORT,
            host: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            body_limit_mb: DEFAULT_BODY_LIMIT_MB,
            body_limit_bytes: DEFAULT_BODY_LIMIT_MB.saturating_mul(1024 * 1024),
            internal_token: None,
            internal_token_required: false,
            concurrency_limit: 32,
            cpu_concurrency_limit: 32,
            request_timeout_ms: DEFAULT_TEST_TIMEOUT_MS,
            context_paths: ContextPaths::default(),
            compute_server_url: None,
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            analyzer: None,
            analyzer_timeout_secs: DEFAULT_ANALYZER_TIMEOUT_SECS,
            capture_policy: CapturePolicy::default(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            template_db_path: PathBuf::from(DEFAULT_TEMPLATE_DB_PATH),
            similarity_metric: SimilarityMetric::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.internal_token_required && self.internal_token.is_none() {
            return Err("INTERNAL_SERVICE_TOKEN is required in production. \
Set INTERNAL_SERVICE_TOKEN or INTERNAL_SERVICE_TOKEN_REQUIRED=0."
                .to_string());
        }
        self.capture_policy.validate()?;
        if self.role == ServiceRole::Client {
            if self.compute_server_url.is_none() {
                return Err("COMPUTE_SERVER_URL is required in the client role.".to_string());
            }
            if self.analyzer.is_none() {
                return Err("Set FACE_ANALYZER_URL or FACE_ANALYZER_COMMAND \
in the client role."
                    .to_string());
            }
            if self.request_timeout() <= self.collaborator_budget() {
                return Err(format!(
                    "FACE_REQUEST_TIMEOUT_MS ({} ms) must exceed the upstream and analyzer \
timeouts of one verification ({} ms).",
                    self.request_timeout_ms,
                    self.collaborator_budget().as_millis()
                ));
            }
        }
        Ok(())
    }

    /// Worst case spent waiting on collaborators within one client request.
    /// The request timeout must outlast it, or collaborator timeouts never surface.
    pub fn collaborator_budget(&self) -> Duration {
        self.upstream_timeout() + self.analyzer_timeout() * ANALYZER_CALLS_PER_REQUEST
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn internal_token(&self) -> Option<String> {
        self.internal_token.clone()
    }

    pub fn internal_token_required(&self) -> bool {
        self.internal_token_required
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_bytes
    }

    pub fn body_limit_mb(&self) -> usize {
        self.body_limit_mb
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    pub fn cpu_concurrency_limit(&self) -> usize {
        self.cpu_concurrency_limit
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn context_paths(&self) -> &ContextPaths {
        &self.context_paths
    }

    pub fn compute_server_url(&self) -> Option<&str> {
        self.compute_server_url.as_deref()
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn analyzer(&self) -> Option<&AnalyzerBackend> {
        self.analyzer.as_ref()
    }

    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_secs(self.analyzer_timeout_secs)
    }

    pub fn capture_policy(&self) -> &CapturePolicy {
        &self.capture_policy
    }

    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    pub fn template_db_path(&self) -> &Path {
        &self.template_db_path
    }

    pub fn similarity_metric(&self) -> SimilarityMetric {
        self.similarity_metric
    }

    pub fn with_role(mut self, role: ServiceRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_internal_token(mut self, token: Option<String>) -> Self {
        self.internal_token = token;
        self
    }

    pub fn with_body_limit_bytes(mut self, bytes: usize) -> Self {
        self.body_limit_bytes = bytes;
        self.body_limit_mb = bytes / (1024 * 1024);
        self
    }

    pub fn with_compute_server_url(mut self, url: impl Into<String>) -> Self {
        self.compute_server_url = Some(url.into());
        self
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerBackend) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_capture_policy(mut self, policy: CapturePolicy) -> Self {
        self.capture_policy = policy;
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_upstream_timeout_secs(mut self, secs: u64) -> Self {
        self.upstream_timeout_secs = secs.max(1);
        self
    }
}
