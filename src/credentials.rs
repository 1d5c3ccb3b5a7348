//! Credentials input normalization and loading.
//!
//! A credentials value arrives as an already-built object, a key file path,
//! an inline JSON string, or nothing at all. [`CredentialsLoader`] turns
//! each of those into one authenticated [`AuthCredentials`] object. Building
//! the object itself is delegated to a [`CredentialsProvider`].

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::environment::EnvironmentProbe;
use crate::utils::{looks_like_json, DebuggerError, Result};

/// Scope granting access to every Cloud Platform API.
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Variables holding a key file path, checked during default discovery.
pub const PATH_ENV_VARS: &[&str] = &[
    "DEBUGGER_CREDENTIALS",
    "DEBUGGER_KEYFILE",
    "GOOGLE_CLOUD_CREDENTIALS",
    "GOOGLE_CLOUD_KEYFILE",
    "GCLOUD_KEYFILE",
];

/// Variables holding inline key JSON, checked during default discovery.
pub const JSON_ENV_VARS: &[&str] = &[
    "DEBUGGER_CREDENTIALS_JSON",
    "DEBUGGER_KEYFILE_JSON",
    "GOOGLE_CLOUD_CREDENTIALS_JSON",
    "GOOGLE_CLOUD_KEYFILE_JSON",
    "GCLOUD_KEYFILE_JSON",
];

const ADC_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
const ADC_WELL_KNOWN_FILE: &str = "application_default_credentials.json";

/// An authenticated credentials object, ready to hand to the transport.
///
/// Validation against the token endpoint happens on first use, not here.
pub trait AuthCredentials: fmt::Debug + Send + Sync {
    /// Project embedded in the key material, if any.
    fn project_id(&self) -> Option<&str> {
        None
    }

    /// OAuth scopes requested for this object. `None` means "provider default".
    fn scope(&self) -> Option<&[String]> {
        None
    }
}

/// Not-yet-loaded credentials source.
#[derive(Debug, Clone, Default)]
pub enum CredentialsHandle {
    /// An object the caller already built. Passed through as-is.
    Built(Arc<dyn AuthCredentials>),
    /// Path to a JSON key file.
    FilePath(PathBuf),
    /// Inline JSON key material.
    JsonString(String),
    /// Defer to ambient credential discovery.
    #[default]
    DefaultDiscovery,
}

impl CredentialsHandle {
    /// Classify a keyfile string.
    ///
    /// Blank strings mean default discovery, strings starting with `{` are
    /// inline JSON, anything else is a path.
    pub fn from_keyfile(keyfile: &str) -> Self {
        if keyfile.trim().is_empty() {
            Self::DefaultDiscovery
        } else if looks_like_json(keyfile) {
            Self::JsonString(keyfile.to_string())
        } else {
            Self::FilePath(PathBuf::from(keyfile))
        }
    }

    /// Whether this handle defers to ambient discovery.
    pub fn is_default(&self) -> bool {
        matches!(self, Self::DefaultDiscovery)
    }

    /// `None` when the handle carries nothing: default discovery, an empty
    /// path or blank inline JSON.
    pub fn supplied(self) -> Option<Self> {
        match self {
            Self::DefaultDiscovery => None,
            Self::FilePath(path) if path.as_os_str().is_empty() => None,
            Self::JsonString(json) if json.trim().is_empty() => None,
            handle => Some(handle),
        }
    }
}

impl From<&str> for CredentialsHandle {
    fn from(keyfile: &str) -> Self {
        Self::from_keyfile(keyfile)
    }
}

impl From<String> for CredentialsHandle {
    fn from(keyfile: String) -> Self {
        Self::from_keyfile(&keyfile)
    }
}

impl From<PathBuf> for CredentialsHandle {
    fn from(path: PathBuf) -> Self {
        Self::FilePath(path)
    }
}

impl From<&Path> for CredentialsHandle {
    fn from(path: &Path) -> Self {
        Self::FilePath(path.to_path_buf())
    }
}

impl From<Arc<dyn AuthCredentials>> for CredentialsHandle {
    fn from(credentials: Arc<dyn AuthCredentials>) -> Self {
        Self::Built(credentials)
    }
}

/// Builds authenticated credentials from key material.
pub trait CredentialsProvider: Send + Sync {
    /// Ambient discovery: environment variables, well-known files.
    fn default_credentials(
        &self,
        env: &dyn EnvironmentProbe,
        scope: Option<&[String]>,
    ) -> Result<Arc<dyn AuthCredentials>>;

    /// Build credentials from parsed key JSON.
    fn keyfile_credentials(&self, keyfile: Value, scope: Option<&[String]>) -> Result<Arc<dyn AuthCredentials>>;
}

#[derive(Deserialize)]
struct KeyfileFields {
    #[serde(rename = "type")]
    credential_type: Option<String>,
    project_id: Option<String>,
    quota_project_id: Option<String>,
    client_email: Option<String>,
}

/// Credentials backed by JSON key material.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyfileCredentials {
    keyfile: Value,
    credential_type: Option<String>,
    project_id: Option<String>,
    client_email: Option<String>,
    scope: Option<Vec<String>>,
}

impl KeyfileCredentials {
    /// Wrap parsed key material. Any JSON object is accepted.
    pub fn new(keyfile: Value, scope: Option<&[String]>) -> Result<Self> {
        if !keyfile.is_object() {
            return Err(DebuggerError::InvalidCredentials(
                "key material must be a JSON object".to_string(),
            ));
        }
        let fields: KeyfileFields = serde_json::from_value(keyfile.clone())
            .map_err(|e| DebuggerError::InvalidCredentials(e.to_string()))?;

        Ok(Self {
            keyfile,
            credential_type: fields.credential_type,
            project_id: fields
                .project_id
                .or(fields.quota_project_id)
                .filter(|p| !p.is_empty()),
            client_email: fields.client_email,
            scope: scope.map(<[String]>::to_vec),
        })
    }

    /// The raw key material.
    pub fn keyfile(&self) -> &Value {
        &self.keyfile
    }

    /// The `type` field, e.g. `service_account` or `authorized_user`.
    pub fn credential_type(&self) -> Option<&str> {
        self.credential_type.as_deref()
    }

    pub fn client_email(&self) -> Option<&str> {
        self.client_email.as_deref()
    }
}

impl AuthCredentials for KeyfileCredentials {
    fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    fn scope(&self) -> Option<&[String]> {
        self.scope.as_deref()
    }
}

/// Provider producing [`KeyfileCredentials`].
///
/// Default discovery search order:
/// 1. Path variables (`DEBUGGER_CREDENTIALS`, ...), skipped when the file is absent
/// 2. Inline JSON variables (`DEBUGGER_CREDENTIALS_JSON`, ...)
/// 3. GOOGLE_APPLICATION_CREDENTIALS
/// 4. gcloud `application_default_credentials.json`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCredentialsProvider;

impl DefaultCredentialsProvider {
    fn load_path(&self, path: &Path, scope: Option<&[String]>) -> Result<Arc<dyn AuthCredentials>> {
        let keyfile = read_keyfile(path)?;
        self.keyfile_credentials(keyfile, scope)
    }
}

impl CredentialsProvider for DefaultCredentialsProvider {
    fn default_credentials(
        &self,
        env: &dyn EnvironmentProbe,
        scope: Option<&[String]>,
    ) -> Result<Arc<dyn AuthCredentials>> {
        for key in PATH_ENV_VARS {
            if let Some(path) = env.var(key) {
                let path = PathBuf::from(path);
                if path.is_file() {
                    tracing::debug!(variable = *key, "using credentials file from environment");
                    return self.load_path(&path, scope);
                }
                tracing::debug!(variable = *key, "credentials file from environment does not exist");
            }
        }

        for key in JSON_ENV_VARS {
            if let Some(json) = env.var(key) {
                tracing::debug!(variable = *key, "using inline credentials from environment");
                let keyfile = parse_keyfile(&json, key)?;
                return self.keyfile_credentials(keyfile, scope);
            }
        }

        if let Some(path) = env.var(ADC_ENV_VAR) {
            tracing::debug!(variable = ADC_ENV_VAR, "using application default credentials file");
            return self.load_path(Path::new(&path), scope);
        }

        if let Some(path) = env
            .gcloud_config_dir()
            .map(|dir| dir.join(ADC_WELL_KNOWN_FILE))
            .filter(|path| path.is_file())
        {
            tracing::debug!(path = %path.display(), "using gcloud application default credentials");
            return self.load_path(&path, scope);
        }

        Err(DebuggerError::NoDefaultCredentials)
    }

    fn keyfile_credentials(&self, keyfile: Value, scope: Option<&[String]>) -> Result<Arc<dyn AuthCredentials>> {
        Ok(Arc::new(KeyfileCredentials::new(keyfile, scope)?))
    }
}

/// Normalizes a [`CredentialsHandle`] into authenticated credentials.
pub struct CredentialsLoader<'a> {
    provider: &'a dyn CredentialsProvider,
    env: &'a dyn EnvironmentProbe,
}

impl<'a> CredentialsLoader<'a> {
    pub fn new(provider: &'a dyn CredentialsProvider, env: &'a dyn EnvironmentProbe) -> Self {
        Self { provider, env }
    }

    /// Load credentials. The only I/O is a single read of a key file.
    pub fn load(&self, handle: CredentialsHandle, scope: Option<&[String]>) -> Result<Arc<dyn AuthCredentials>> {
        match handle {
            CredentialsHandle::Built(credentials) => Ok(credentials),
            CredentialsHandle::FilePath(path) => {
                let keyfile = read_keyfile(&path)?;
                self.provider.keyfile_credentials(keyfile, scope)
            }
            CredentialsHandle::JsonString(json) => {
                let keyfile = parse_keyfile(&json, "inline credentials")?;
                self.provider.keyfile_credentials(keyfile, scope)
            }
            CredentialsHandle::DefaultDiscovery => self.provider.default_credentials(self.env, scope),
        }
    }
}

/// Read a key file and parse it as JSON.
fn read_keyfile(path: &Path) -> Result<Value> {
    if !path.is_file() {
        return Err(DebuggerError::CredentialsFile {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "not an existing regular file"),
        });
    }
    let content = fs::read_to_string(path).map_err(|source| DebuggerError::CredentialsFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_keyfile(&content, &path.display().to_string())
}

fn parse_keyfile(json: &str, origin: &str) -> Result<Value> {
    serde_json::from_str(json).map_err(|source| DebuggerError::CredentialsParse {
        origin: origin.to_string(),
        source,
    })
}
