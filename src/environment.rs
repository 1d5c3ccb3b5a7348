//! Ambient environment hints: environment variables and platform discovery.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::{is_valid_project_id, non_empty};

/// Read access to the execution environment.
///
/// `var` is a plain environment variable lookup. The remaining methods are
/// platform auto-discovery; `None` means "unavailable".
pub trait EnvironmentProbe: Send + Sync {
    /// Look up an environment variable. Empty values read as `None`.
    fn var(&self, key: &str) -> Option<String>;

    /// Project id reported by the platform.
    fn project_id(&self) -> Option<String>;

    /// Deployed App Engine service id.
    fn app_engine_service_id(&self) -> Option<String> {
        self.var("GAE_SERVICE")
    }

    /// Deployed App Engine service version.
    fn app_engine_service_version(&self) -> Option<String> {
        self.var("GAE_VERSION")
    }

    /// Directory holding the gcloud CLI configuration, if one is known.
    fn gcloud_config_dir(&self) -> Option<PathBuf> {
        self.var("CLOUDSDK_CONFIG").map(PathBuf::from)
    }
}

/// Probe backed by the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl EnvironmentProbe for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        non_empty(std::env::var(key).ok())
    }

    fn project_id(&self) -> Option<String> {
        discover_project_id(self)
    }

    fn gcloud_config_dir(&self) -> Option<PathBuf> {
        self.var("CLOUDSDK_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|p| p.join("gcloud")))
    }
}

/// Probe backed by a fixed variable map, for tests and embedding.
///
/// Platform values are set explicitly. Without one, `project_id` runs the same
/// discovery as [`ProcessEnvironment`] over the map, reading gcloud files only
/// when `CLOUDSDK_CONFIG` is present.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    vars: HashMap<String, String>,
    project_id: Option<String>,
    service_id: Option<String>,
    service_version: Option<String>,
}

impl StaticEnvironment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given variable map.
    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    /// Set a single variable.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Set the platform-reported project id.
    pub fn with_project_id(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    /// Set the platform-reported service id.
    pub fn with_service_id(mut self, service_id: &str) -> Self {
        self.service_id = Some(service_id.to_string());
        self
    }

    /// Set the platform-reported service version.
    pub fn with_service_version(mut self, service_version: &str) -> Self {
        self.service_version = Some(service_version.to_string());
        self
    }
}

impl EnvironmentProbe for StaticEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        non_empty(self.vars.get(key).cloned())
    }

    fn project_id(&self) -> Option<String> {
        non_empty(self.project_id.clone()).or_else(|| discover_project_id(self))
    }

    fn app_engine_service_id(&self) -> Option<String> {
        non_empty(self.service_id.clone())
    }

    fn app_engine_service_version(&self) -> Option<String> {
        non_empty(self.service_version.clone())
    }
}

/// Platform project discovery without touching the network.
///
/// Detection order:
/// 1. DEVSHELL_PROJECT_ID (Cloud Shell)
/// 2. CLOUDSDK_CORE_PROJECT
/// 3. gcloud `properties` file
/// 4. gcloud active named configuration, `[core] project`
pub fn discover_project_id(env: &dyn EnvironmentProbe) -> Option<String> {
    for key in ["DEVSHELL_PROJECT_ID", "CLOUDSDK_CORE_PROJECT"] {
        if let Some(project) = env.var(key) {
            if is_valid_project_id(&project) {
                return Some(project);
            }
            tracing::warn!(variable = key, "ignoring malformed project id");
        }
    }

    gcloud_project(&env.gcloud_config_dir()?)
}

/// Read the project from a gcloud configuration directory.
fn gcloud_project(config_dir: &Path) -> Option<String> {
    if let Ok(content) = fs::read_to_string(config_dir.join("properties")) {
        if let Some(project) = section_value(&content, None, "project") {
            return Some(project);
        }
    }

    let active = fs::read_to_string(config_dir.join("active_config")).ok()?;
    let name = active.trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("ignoring gcloud active_config with invalid name");
        return None;
    }

    let content = fs::read_to_string(
        config_dir
            .join("configurations")
            .join(format!("config_{}", name)),
    )
    .ok()?;
    section_value(&content, Some("core"), "project")
}

/// Find `key = value` in an INI-style file, optionally inside one section.
fn section_value(content: &str, section: Option<&str>, key: &str) -> Option<String> {
    let mut current: Option<String> = None;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = Some(line[1..line.len() - 1].trim().to_string());
            continue;
        }
        if let Some(wanted) = section {
            if current.as_deref() != Some(wanted) {
                continue;
            }
        }
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        if name.trim() == key {
            let value = value.trim();
            if is_valid_project_id(value) {
                return Some(value.to_string());
            }
        }
    }
    None
}
