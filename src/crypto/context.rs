//! Context Authority: generation, persistence and loading of CKKS contexts.
//!
//! A deployment has exactly one parameter instance. The secret artifact
//! carries the decryption key; the public artifact is derived from the same
//! in-memory instance with the key stripped, so the two always match.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::{info, info_span, warn};

use crate::ckks::{CkksContext, ContextSnapshot, Parameters};
use crate::error::{ServiceError, ServiceResult};

const MAGIC: &[u8; 4] = b"FFHE";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 2;

pub const DEFAULT_CONTEXT_DIR: &str = "context";
const SECRET_FILE_NAME: &str = "secret.txt";
const PUBLIC_FILE_NAME: &str = "public.txt";

/// Serializes `ensure_context` across every authority in the process.
static INIT_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRole {
    Secret,
    Public,
}

impl ContextRole {
    fn to_byte(self) -> u8 {
        match self {
            ContextRole::Secret => 1,
            ContextRole::Public => 2,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(ContextRole::Secret),
            2 => Some(ContextRole::Public),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContextRole::Secret => "secret",
            ContextRole::Public => "public",
        }
    }
}

/// A loaded CKKS context tagged with its role. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct CryptoContext {
    role: ContextRole,
    inner: CkksContext,
}

impl CryptoContext {
    /// Generate a fresh secret context.
    pub fn generate(params: Parameters) -> ServiceResult<Self> {
        let _span = info_span!("generate_context", degree = params.degree()).entered();
        let inner = CkksContext::generate(params)?;
        Ok(Self {
            role: ContextRole::Secret,
            inner,
        })
    }

    pub fn role(&self) -> ContextRole {
        self.role
    }

    pub fn is_secret(&self) -> bool {
        self.role == ContextRole::Secret
    }

    pub fn params(&self) -> &Parameters {
        self.inner.params()
    }

    pub fn ckks(&self) -> &CkksContext {
        &self.inner
    }

    /// The public form of this context: same parameters and evaluation keys,
    /// no decryption key.
    pub fn to_public(&self) -> Self {
        Self {
            role: ContextRole::Public,
            inner: self.inner.public_only(),
        }
    }

    pub fn require_secret(&self) -> ServiceResult<()> {
        if self.is_secret() {
            Ok(())
        } else {
            Err(ServiceError::NotASecretContext)
        }
    }

    /// `FFHE` magic, format version, role byte, then the bincode snapshot.
    pub fn to_native_bytes(&self) -> ServiceResult<Vec<u8>> {
        let payload = bincode::serialize(&self.inner.snapshot())?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.push(self.role.to_byte());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Parse native bytes, insisting on `expected` as the role. Any defect
    /// is reported as an unavailable context.
    pub fn from_native_bytes(bytes: &[u8], expected: ContextRole) -> ServiceResult<Self> {
        if bytes.len() <= HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(ServiceError::ContextUnavailable(
                "artifact has no context header".to_string(),
            ));
        }
        let version = bytes[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(ServiceError::ContextUnavailable(format!(
                "unsupported context format version {version}"
            )));
        }
        let role = ContextRole::from_byte(bytes[MAGIC.len() + 1]).ok_or_else(|| {
            ServiceError::ContextUnavailable("artifact has an unknown role".to_string())
        })?;
        if role != expected {
            return Err(ServiceError::ContextUnavailable(format!(
                "expected a {} context, found a {} context",
                expected.as_str(),
                role.as_str()
            )));
        }

        let snapshot: ContextSnapshot = bincode::deserialize(&bytes[HEADER_LEN..])
            .map_err(|e| ServiceError::ContextUnavailable(format!("corrupt context: {e}")))?;
        if snapshot.secret.is_some() != (role == ContextRole::Secret) {
            return Err(ServiceError::ContextUnavailable(format!(
                "{} context artifact has inconsistent key material",
                role.as_str()
            )));
        }
        let inner = CkksContext::from_snapshot(snapshot)
            .map_err(|e| ServiceError::ContextUnavailable(format!("corrupt context: {e}")))?;
        Ok(Self { role, inner })
    }
}

/// Where the two artifacts live.
#[derive(Debug, Clone)]
pub struct ContextPaths {
    secret: PathBuf,
    public: PathBuf,
}

impl ContextPaths {
    pub fn new(secret: impl Into<PathBuf>, public: impl Into<PathBuf>) -> Self {
        Self {
            secret: secret.into(),
            public: public.into(),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SECRET_FILE_NAME), dir.join(PUBLIC_FILE_NAME))
    }

    pub fn secret(&self) -> &Path {
        &self.secret
    }

    pub fn public(&self) -> &Path {
        &self.public
    }

    fn path_for(&self, role: ContextRole) -> &Path {
        match role {
            ContextRole::Secret => &self.secret,
            ContextRole::Public => &self.public,
        }
    }
}

impl Default for ContextPaths {
    fn default() -> Self {
        Self::in_dir(Path::new(DEFAULT_CONTEXT_DIR))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Existing,
    Generated,
}

#[derive(Debug, Clone)]
pub struct ContextAuthority {
    paths: ContextPaths,
    params: Parameters,
}

impl ContextAuthority {
    pub fn new(paths: ContextPaths, params: Parameters) -> Self {
        Self { paths, params }
    }

    pub fn paths(&self) -> &ContextPaths {
        &self.paths
    }

    /// Make sure both artifacts exist, generating and persisting a fresh pair
    /// when either is missing. Call once at startup, before serving.
    pub fn ensure_context(&self) -> ServiceResult<EnsureOutcome> {
        let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let secret_exists = self.paths.secret.is_file();
        let public_exists = self.paths.public.is_file();
        if secret_exists && public_exists {
            info!(
                secret = %self.paths.secret.display(),
                public = %self.paths.public.display(),
                "Using existing CKKS context artifacts"
            );
            return Ok(EnsureOutcome::Existing);
        }
        if secret_exists || public_exists {
            warn!("Only one CKKS context artifact found; regenerating both");
        }

        info!("Generating CKKS context (this may take a while)...");
        let secret = CryptoContext::generate(self.params.clone())?;
        let public = secret.to_public();

        write_artifact(&self.paths.secret, &secret.to_native_bytes()?)?;
        write_artifact(&self.paths.public, &public.to_native_bytes()?)?;
        info!(
            secret = %self.paths.secret.display(),
            public = %self.paths.public.display(),
            "Persisted CKKS context artifacts"
        );
        Ok(EnsureOutcome::Generated)
    }

    pub fn load_secret(&self) -> ServiceResult<CryptoContext> {
        self.load(ContextRole::Secret)
    }

    pub fn load_public(&self) -> ServiceResult<CryptoContext> {
        self.load(ContextRole::Public)
    }

    fn load(&self, role: ContextRole) -> ServiceResult<CryptoContext> {
        let path = self.paths.path_for(role);
        let _span = info_span!("load_context", role = role.as_str()).entered();

        let text = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::ContextUnavailable(format!("{}: {e}", path.display()))
        })?;
        let bytes = BASE64.decode(text.trim()).map_err(|e| {
            ServiceError::ContextUnavailable(format!("{} is not base64: {e}", path.display()))
        })?;
        let context = CryptoContext::from_native_bytes(&bytes, role)?;
        info!(path = %path.display(), "Loaded {} CKKS context", role.as_str());
        Ok(context)
    }
}

/// Write base64 text to `path` through a sibling temp file and a rename.
fn write_artifact(path: &Path, bytes: &[u8]) -> ServiceResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, BASE64.encode(bytes))?;
    if let Err(error) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(error.into());
    }
    Ok(())
}
