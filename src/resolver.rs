//! Merges call-site arguments, configuration scopes and the environment into
//! one client configuration.
//!
//! Precedence per field (highest to lowest):
//! 1. Explicit call-site argument
//! 2. Service scope value
//! 3. Shared scope value (through the service scope)
//! 4. Environment: project id, service name and version only
//! 5. Built-in default (empty); project id has none
//!
//! A project id still missing after step 4 is taken from the loaded
//! credentials, if they embed one.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::ServiceConfig;
use crate::credentials::{AuthCredentials, CredentialsHandle, CredentialsLoader, CredentialsProvider};
use crate::environment::EnvironmentProbe;
use crate::utils::{non_empty, DebuggerError, Result};

/// Environment variables naming the project, checked before platform discovery.
pub const PROJECT_ENV_VARS: &[&str] = &["DEBUGGER_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];

/// Call-site arguments. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct DebuggerOptions {
    pub project_id: Option<String>,
    pub credentials: Option<CredentialsHandle>,
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub scope: Option<Vec<String>>,
    pub timeout: Option<Duration>,
    pub client_config: Option<Map<String, Value>>,
}

impl DebuggerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Alias of [`project_id`](Self::project_id).
    pub fn project(self, project: impl Into<String>) -> Self {
        self.project_id(project)
    }

    pub fn credentials(mut self, credentials: impl Into<CredentialsHandle>) -> Self {
        self.credentials = credentials.into().supplied();
        self
    }

    /// Alias of [`credentials`](Self::credentials).
    pub fn keyfile(self, keyfile: impl Into<CredentialsHandle>) -> Self {
        self.credentials(keyfile)
    }

    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn service_version(mut self, service_version: impl Into<String>) -> Self {
        self.service_version = Some(service_version.into());
        self
    }

    pub fn scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = Some(scope.into_iter().map(Into::into).collect());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn client_config(mut self, client_config: Map<String, Value>) -> Self {
        self.client_config = Some(client_config);
        self
    }
}

/// Final client construction parameters.
///
/// `project_id` is never empty and `credentials` is always loaded.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub project_id: String,
    pub credentials: Arc<dyn AuthCredentials>,
    pub service_name: String,
    pub service_version: String,
    pub timeout: Option<Duration>,
    pub client_config: Option<Map<String, Value>>,
}

/// Computes a [`ResolvedConfig`]. Reads its inputs, never writes them.
pub struct Resolver<'a> {
    config: &'a ServiceConfig,
    env: &'a dyn EnvironmentProbe,
    provider: &'a dyn CredentialsProvider,
}

impl<'a> Resolver<'a> {
    pub fn new(
        config: &'a ServiceConfig,
        env: &'a dyn EnvironmentProbe,
        provider: &'a dyn CredentialsProvider,
    ) -> Self {
        Self { config, env, provider }
    }

    pub fn resolve(&self, explicit: DebuggerOptions) -> Result<ResolvedConfig> {
        let project_id = self.project_id(explicit.project_id);
        let handle = self.credentials_handle(explicit.credentials);
        let scope = explicit.scope.or_else(|| self.config.scope());

        let credentials = CredentialsLoader::new(self.provider, self.env).load(handle, scope.as_deref())?;

        let project_id = match project_id {
            Some(project_id) => project_id,
            None => {
                let embedded = credentials
                    .project_id()
                    .filter(|p| !p.is_empty())
                    .ok_or(DebuggerError::MissingProject)?;
                tracing::debug!("project_id resolved from credentials");
                embedded.to_string()
            }
        };

        let service_name = self.service_name(explicit.service_name);
        let service_version = self.service_version(explicit.service_version);

        let timeout = explicit.timeout.or_else(|| self.config.timeout());
        let client_config = explicit.client_config.or_else(|| self.config.client_config());

        Ok(ResolvedConfig {
            project_id,
            credentials,
            service_name,
            service_version,
            timeout,
            client_config,
        })
    }

    /// Project id from steps 1-4. The credentials fallback happens after loading.
    fn project_id(&self, explicit: Option<String>) -> Option<String> {
        if let Some(project_id) = non_empty(explicit) {
            tracing::debug!("project_id resolved from arguments");
            return Some(project_id);
        }
        if let Some(project_id) = self.config.project_id() {
            tracing::debug!(scope = self.config.name(), "project_id resolved from configuration");
            return Some(project_id);
        }
        for key in PROJECT_ENV_VARS {
            if let Some(project_id) = self.env.var(key) {
                tracing::debug!(variable = *key, "project_id resolved from environment");
                return Some(project_id);
            }
        }
        let discovered = non_empty(self.env.project_id());
        if discovered.is_some() {
            tracing::debug!("project_id resolved from platform discovery");
        }
        discovered
    }

    /// Credentials from steps 1-3; no environment step.
    fn credentials_handle(&self, explicit: Option<CredentialsHandle>) -> CredentialsHandle {
        explicit
            .and_then(CredentialsHandle::supplied)
            .or_else(|| self.config.credentials().and_then(CredentialsHandle::supplied))
            .unwrap_or_default()
    }

    fn service_name(&self, explicit: Option<String>) -> String {
        non_empty(explicit)
            .or_else(|| self.config.service_name())
            .or_else(|| non_empty(self.env.app_engine_service_id()))
            .unwrap_or_default()
    }

    fn service_version(&self, explicit: Option<String>) -> String {
        non_empty(explicit)
            .or_else(|| self.config.service_version())
            .or_else(|| non_empty(self.env.app_engine_service_version()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SharedConfig, DEBUGGER_SERVICE};
    use crate::credentials::KeyfileCredentials;
    use crate::environment::StaticEnvironment;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct StubCredentials {
        project_id: Option<String>,
    }

    impl AuthCredentials for StubCredentials {
        fn project_id(&self) -> Option<&str> {
            self.project_id.as_deref()
        }
    }

    /// Records keyfile calls and hands back fixed objects.
    #[derive(Default)]
    struct StubProvider {
        embedded_project: Option<String>,
        keyfiles: Mutex<Vec<(Value, Option<Vec<String>>)>>,
        default_calls: Mutex<usize>,
    }

    impl CredentialsProvider for StubProvider {
        fn default_credentials(
            &self,
            _env: &dyn EnvironmentProbe,
            _scope: Option<&[String]>,
        ) -> Result<Arc<dyn AuthCredentials>> {
            *self.default_calls.lock().unwrap() += 1;
            Ok(Arc::new(StubCredentials { project_id: None }))
        }

        fn keyfile_credentials(&self, keyfile: Value, scope: Option<&[String]>) -> Result<Arc<dyn AuthCredentials>> {
            self.keyfiles.lock().unwrap().push((keyfile, scope.map(<[String]>::to_vec)));
            Ok(Arc::new(StubCredentials {
                project_id: self.embedded_project.clone(),
            }))
        }
    }

    fn scopes() -> (Arc<SharedConfig>, Arc<ServiceConfig>) {
        let shared = SharedConfig::new();
        let service = shared.add_service(DEBUGGER_SERVICE);
        (shared, service)
    }

    #[test]
    fn test_explicit_wins_over_everything() {
        let (shared, service) = scopes();
        shared.set_project_id("shared-project");
        shared.set_credentials("{\"from\":\"shared\"}");
        service.set_project_id("service-project");
        service.set_credentials("{\"from\":\"service\"}");
        let env = StaticEnvironment::new()
            .with_var("GOOGLE_CLOUD_PROJECT", "env-project")
            .with_project_id("platform-project");
        let provider = StubProvider::default();

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(
                DebuggerOptions::new()
                    .project_id("project-id")
                    .credentials("{\"from\":\"explicit\"}"),
            )
            .unwrap();

        assert_eq!(resolved.project_id, "project-id");
        let keyfiles = provider.keyfiles.lock().unwrap();
        assert_eq!(keyfiles.len(), 1);
        assert_eq!(keyfiles[0].0, json!({"from": "explicit"}));
    }

    #[test]
    fn test_service_scope_before_shared() {
        let (shared, service) = scopes();
        shared.set_project_id("shared-project");
        service.set_project_id("service-project");
        let env = StaticEnvironment::new();
        let provider = StubProvider::default();

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new())
            .unwrap();
        assert_eq!(resolved.project_id, "service-project");
    }

    #[test]
    fn test_shared_scope_before_environment() {
        let (shared, service) = scopes();
        shared.set_project("shared-project");
        let env = StaticEnvironment::new().with_var("GOOGLE_CLOUD_PROJECT", "env-project");
        let provider = StubProvider::default();

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new())
            .unwrap();
        assert_eq!(resolved.project_id, "shared-project");
    }

    #[test]
    fn test_project_env_var_order() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new()
            .with_var("GCLOUD_PROJECT", "gcloud-project")
            .with_var("GOOGLE_CLOUD_PROJECT", "google-project")
            .with_project_id("platform-project");
        let provider = StubProvider::default();

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new())
            .unwrap();
        assert_eq!(resolved.project_id, "google-project");

        let env = env.with_var("DEBUGGER_PROJECT", "debugger-project");
        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new())
            .unwrap();
        assert_eq!(resolved.project_id, "debugger-project");
    }

    #[test]
    fn test_project_from_platform() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new().with_project_id("project-id");
        let provider = StubProvider::default();

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new())
            .unwrap();
        assert_eq!(resolved.project_id, "project-id");
        assert_eq!(*provider.default_calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_project_from_credentials_last() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new();
        let provider = StubProvider {
            embedded_project: Some("key-project".to_string()),
            ..Default::default()
        };

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new().credentials("{}"))
            .unwrap();
        assert_eq!(resolved.project_id, "key-project");
        assert_eq!(resolved.credentials.project_id(), Some("key-project"));
    }

    #[test]
    fn test_environment_beats_credentials_project() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new().with_project_id("platform-project");
        let provider = StubProvider {
            embedded_project: Some("key-project".to_string()),
            ..Default::default()
        };

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new().credentials("{}"))
            .unwrap();
        assert_eq!(resolved.project_id, "platform-project");
    }

    #[test]
    fn test_missing_project() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new();
        let provider = StubProvider::default();

        let err = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new())
            .unwrap_err();
        assert!(matches!(err, DebuggerError::MissingProject));
    }

    #[test]
    fn test_empty_explicit_project_falls_through() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new().with_project_id("platform-project");
        let provider = StubProvider::default();

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new().project_id(""))
            .unwrap();
        assert_eq!(resolved.project_id, "platform-project");
    }

    #[test]
    fn test_empty_credentials_fall_through() {
        let (shared, service) = scopes();
        shared.set_credentials("{\"project_id\":\"shared-key-project\"}");
        service.set_credentials("");
        let env = StaticEnvironment::new();
        let provider = StubProvider {
            embedded_project: Some("shared-key-project".to_string()),
            ..Default::default()
        };

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new().credentials(""))
            .unwrap();

        assert_eq!(resolved.project_id, "shared-key-project");
        assert_eq!(*provider.default_calls.lock().unwrap(), 0);
        let keyfiles = provider.keyfiles.lock().unwrap();
        assert_eq!(keyfiles.len(), 1);
        assert_eq!(keyfiles[0].0, json!({"project_id": "shared-key-project"}));
    }

    #[test]
    fn test_empty_explicit_path_falls_through() {
        let (_shared, service) = scopes();
        service.set_keyfile("{\"from\":\"service\"}");
        let env = StaticEnvironment::new().with_project_id("project-id");
        let provider = StubProvider::default();

        let options = DebuggerOptions {
            credentials: Some(CredentialsHandle::FilePath(std::path::PathBuf::new())),
            ..Default::default()
        };
        Resolver::new(&service, &env, &provider).resolve(options).unwrap();

        let keyfiles = provider.keyfiles.lock().unwrap();
        assert_eq!(keyfiles[0].0, json!({"from": "service"}));
    }

    #[test]
    fn test_credentials_ignore_environment_keyfile_vars() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new()
            .with_project_id("project-id")
            .with_var("DEBUGGER_KEYFILE_JSON", "{}");
        let provider = StubProvider::default();

        Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new())
            .unwrap();
        assert!(provider.keyfiles.lock().unwrap().is_empty());
        assert_eq!(*provider.default_calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_built_credentials_pass_through() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new();
        let provider = StubProvider::default();
        let built: Arc<dyn AuthCredentials> =
            Arc::new(KeyfileCredentials::new(json!({"project_id": "built-project"}), None).unwrap());

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new().credentials(built.clone()))
            .unwrap();
        assert!(Arc::ptr_eq(&built, &resolved.credentials));
        assert_eq!(resolved.project_id, "built-project");
        assert!(provider.keyfiles.lock().unwrap().is_empty());
    }

    #[test]
    fn test_scope_forwarded() {
        let (_shared, service) = scopes();
        service.set_scope(["http://example.com/config-scope"]);
        let env = StaticEnvironment::new().with_project_id("project-id");
        let provider = StubProvider::default();

        Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new().credentials("{}"))
            .unwrap();
        Resolver::new(&service, &env, &provider)
            .resolve(
                DebuggerOptions::new()
                    .credentials("{}")
                    .scope(["http://example.com/scope"]),
            )
            .unwrap();

        let keyfiles = provider.keyfiles.lock().unwrap();
        assert_eq!(keyfiles[0].1, Some(vec!["http://example.com/config-scope".to_string()]));
        assert_eq!(keyfiles[1].1, Some(vec!["http://example.com/scope".to_string()]));
    }

    #[test]
    fn test_service_metadata_precedence() {
        let (_shared, service) = scopes();
        let env = StaticEnvironment::new()
            .with_project_id("project-id")
            .with_service_id("default-utest-service")
            .with_service_version("vDefaultUTest");
        let provider = StubProvider::default();
        let resolver = Resolver::new(&service, &env, &provider);

        let resolved = resolver.resolve(DebuggerOptions::new()).unwrap();
        assert_eq!(resolved.service_name, "default-utest-service");
        assert_eq!(resolved.service_version, "vDefaultUTest");

        service.set_service_name("config-service");
        let resolved = resolver.resolve(DebuggerOptions::new()).unwrap();
        assert_eq!(resolved.service_name, "config-service");
        assert_eq!(resolved.service_version, "vDefaultUTest");

        let resolved = resolver
            .resolve(DebuggerOptions::new().service_name("utest-service").service_version("vUTest"))
            .unwrap();
        assert_eq!(resolved.service_name, "utest-service");
        assert_eq!(resolved.service_version, "vUTest");
    }

    #[test]
    fn test_service_metadata_defaults_empty() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new()
            .with_project_id("project-id")
            .with_var("GAE_SERVICE", "ignored-by-static-probe");
        let provider = StubProvider::default();

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new())
            .unwrap();
        assert_eq!(resolved.service_name, "");
        assert_eq!(resolved.service_version, "");
    }

    #[test]
    fn test_timeout_and_client_config() {
        let (_shared, service) = scopes();
        let client_config = json!({"gax": "options"}).as_object().unwrap().clone();
        service.set_timeout(Duration::from_secs(42));
        service.set_client_config(client_config.clone());
        let env = StaticEnvironment::new().with_project_id("project-id");
        let provider = StubProvider::default();
        let resolver = Resolver::new(&service, &env, &provider);

        let resolved = resolver.resolve(DebuggerOptions::new()).unwrap();
        assert_eq!(resolved.timeout, Some(Duration::from_secs(42)));
        assert_eq!(resolved.client_config, Some(client_config));

        let resolved = resolver
            .resolve(DebuggerOptions::new().timeout(Duration::from_secs(60)))
            .unwrap();
        assert_eq!(resolved.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_timeout_not_inherited_from_environment() {
        let service = ServiceConfig::standalone(DEBUGGER_SERVICE);
        let env = StaticEnvironment::new().with_project_id("project-id");
        let provider = StubProvider::default();

        let resolved = Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new())
            .unwrap();
        assert_eq!(resolved.timeout, None);
        assert_eq!(resolved.client_config, None);
    }

    #[test]
    fn test_resolve_does_not_mutate_config() {
        let (shared, service) = scopes();
        let env = StaticEnvironment::new().with_project_id("project-id");
        let provider = StubProvider::default();

        Resolver::new(&service, &env, &provider)
            .resolve(DebuggerOptions::new().project_id("explicit-project").timeout(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(shared.project_id(), None);
        assert_eq!(service.project_id(), None);
        assert_eq!(service.timeout(), None);
    }
}
