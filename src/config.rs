//! Shared and per-service configuration scopes.
//!
//! Precedence for a service field read (highest to lowest):
//! 1. The service scope's own value
//! 2. The shared scope's value
//!
//! `project`/`project_id` and `keyfile`/`credentials` are two names for one
//! stored field. Scopes are meant to be written during startup and read
//! afterwards; concurrent writers are last-writer-wins.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::credentials::CredentialsHandle;
use crate::utils::non_empty;

/// Name under which the debugger scope is registered.
pub const DEBUGGER_SERVICE: &str = "debugger";

const SHARED_OPTIONS: &[&str] = &["project_id", "project", "credentials", "keyfile"];

const SERVICE_OPTIONS: &[&str] = &[
    "project_id",
    "project",
    "credentials",
    "keyfile",
    "scope",
    "timeout",
    "client_config",
    "service_name",
    "service_version",
];

static GLOBAL: OnceLock<Arc<SharedConfig>> = OnceLock::new();

/// The process-wide shared scope, with the debugger scope registered.
pub fn global() -> &'static Arc<SharedConfig> {
    GLOBAL.get_or_init(|| {
        let shared = SharedConfig::new();
        shared.add_service(DEBUGGER_SERVICE);
        shared
    })
}

/// The process-wide debugger scope. Same object as `global().debugger()`.
pub fn debugger_config() -> Arc<ServiceConfig> {
    global().add_service(DEBUGGER_SERVICE)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct SharedFields {
    project_id: Option<String>,
    credentials: Option<CredentialsHandle>,
}

/// Cross-service defaults inherited by every service scope.
#[derive(Debug, Default)]
pub struct SharedConfig {
    fields: RwLock<SharedFields>,
    services: RwLock<BTreeMap<String, Arc<ServiceConfig>>>,
}

impl SharedConfig {
    /// Create an empty, unregistered scope.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run a block of setter calls against this scope.
    pub fn configure<F: FnOnce(&Self)>(&self, f: F) -> &Self {
        f(self);
        self
    }

    pub fn project_id(&self) -> Option<String> {
        read(&self.fields).project_id.clone()
    }

    /// Alias of [`project_id`](Self::project_id).
    pub fn project(&self) -> Option<String> {
        self.project_id()
    }

    pub fn set_project_id(&self, project_id: impl Into<String>) {
        write(&self.fields).project_id = non_empty(Some(project_id.into()));
    }

    /// Alias of [`set_project_id`](Self::set_project_id).
    pub fn set_project(&self, project: impl Into<String>) {
        self.set_project_id(project);
    }

    pub fn credentials(&self) -> Option<CredentialsHandle> {
        read(&self.fields).credentials.clone()
    }

    /// Alias of [`credentials`](Self::credentials).
    pub fn keyfile(&self) -> Option<CredentialsHandle> {
        self.credentials()
    }

    pub fn set_credentials(&self, credentials: impl Into<CredentialsHandle>) {
        write(&self.fields).credentials = credentials.into().supplied();
    }

    /// Alias of [`set_credentials`](Self::set_credentials).
    pub fn set_keyfile(&self, keyfile: impl Into<CredentialsHandle>) {
        self.set_credentials(keyfile);
    }

    /// Register a service scope, or return the existing one with that name.
    pub fn add_service(self: &Arc<Self>, name: &str) -> Arc<ServiceConfig> {
        let mut services = write(&self.services);
        services
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(ServiceConfig {
                    name: name.to_string(),
                    parent: Arc::downgrade(self),
                    fields: RwLock::new(ServiceFields::default()),
                })
            })
            .clone()
    }

    pub fn service(&self, name: &str) -> Option<Arc<ServiceConfig>> {
        read(&self.services).get(name).cloned()
    }

    /// The debugger scope, if registered.
    pub fn debugger(&self) -> Option<Arc<ServiceConfig>> {
        self.service(DEBUGGER_SERVICE)
    }

    /// Whether `name` is a field of this scope or a registered service scope.
    pub fn option(&self, name: &str) -> bool {
        SHARED_OPTIONS.contains(&name) || read(&self.services).contains_key(name)
    }

    /// Clear every field here and in each registered service scope.
    ///
    /// Service scopes stay registered.
    pub fn reset(&self) {
        *write(&self.fields) = SharedFields::default();
        for service in read(&self.services).values() {
            service.reset();
        }
    }
}

#[derive(Debug, Default)]
struct ServiceFields {
    project_id: Option<String>,
    credentials: Option<CredentialsHandle>,
    scope: Option<Vec<String>>,
    timeout: Option<Duration>,
    client_config: Option<Map<String, Value>>,
    service_name: Option<String>,
    service_version: Option<String>,
}

/// Defaults for one service, falling back to its [`SharedConfig`].
#[derive(Debug)]
pub struct ServiceConfig {
    name: String,
    parent: Weak<SharedConfig>,
    fields: RwLock<ServiceFields>,
}

impl ServiceConfig {
    /// A scope with no parent. Reads never fall back.
    pub fn standalone(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            parent: Weak::new(),
            fields: RwLock::new(ServiceFields::default()),
        })
    }

    /// Run a block of setter calls against this scope.
    pub fn configure<F: FnOnce(&Self)>(&self, f: F) -> &Self {
        f(self);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared scope this one falls back to, while it is alive.
    pub fn parent(&self) -> Option<Arc<SharedConfig>> {
        self.parent.upgrade()
    }

    /// Project id set on this scope, else on the shared scope.
    pub fn project_id(&self) -> Option<String> {
        let own = read(&self.fields).project_id.clone();
        own.or_else(|| self.parent().and_then(|p| p.project_id()))
    }

    /// Alias of [`project_id`](Self::project_id).
    pub fn project(&self) -> Option<String> {
        self.project_id()
    }

    pub fn set_project_id(&self, project_id: impl Into<String>) {
        write(&self.fields).project_id = non_empty(Some(project_id.into()));
    }

    /// Alias of [`set_project_id`](Self::set_project_id).
    pub fn set_project(&self, project: impl Into<String>) {
        self.set_project_id(project);
    }

    /// Credentials set on this scope, else on the shared scope.
    pub fn credentials(&self) -> Option<CredentialsHandle> {
        let own = read(&self.fields).credentials.clone();
        own.or_else(|| self.parent().and_then(|p| p.credentials()))
    }

    /// Alias of [`credentials`](Self::credentials).
    pub fn keyfile(&self) -> Option<CredentialsHandle> {
        self.credentials()
    }

    pub fn set_credentials(&self, credentials: impl Into<CredentialsHandle>) {
        write(&self.fields).credentials = credentials.into().supplied();
    }

    /// Alias of [`set_credentials`](Self::set_credentials).
    pub fn set_keyfile(&self, keyfile: impl Into<CredentialsHandle>) {
        self.set_credentials(keyfile);
    }

    pub fn scope(&self) -> Option<Vec<String>> {
        read(&self.fields).scope.clone()
    }

    pub fn set_scope<I, S>(&self, scope: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        write(&self.fields).scope = Some(scope.into_iter().map(Into::into).collect());
    }

    pub fn timeout(&self) -> Option<Duration> {
        read(&self.fields).timeout
    }

    pub fn set_timeout(&self, timeout: Duration) {
        write(&self.fields).timeout = Some(timeout);
    }

    pub fn client_config(&self) -> Option<Map<String, Value>> {
        read(&self.fields).client_config.clone()
    }

    pub fn set_client_config(&self, client_config: Map<String, Value>) {
        write(&self.fields).client_config = Some(client_config);
    }

    pub fn service_name(&self) -> Option<String> {
        read(&self.fields).service_name.clone()
    }

    pub fn set_service_name(&self, service_name: impl Into<String>) {
        write(&self.fields).service_name = non_empty(Some(service_name.into()));
    }

    pub fn service_version(&self) -> Option<String> {
        read(&self.fields).service_version.clone()
    }

    pub fn set_service_version(&self, service_version: impl Into<String>) {
        write(&self.fields).service_version = non_empty(Some(service_version.into()));
    }

    pub fn option(&self, name: &str) -> bool {
        SERVICE_OPTIONS.contains(&name)
    }

    /// Clear this scope's own fields. The shared scope is untouched.
    pub fn reset(&self) {
        *write(&self.fields) = ServiceFields::default();
    }
}
