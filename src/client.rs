//! Debugger client construction.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{Map, Value};

use crate::config::{self, ServiceConfig};
use crate::credentials::{AuthCredentials, CredentialsHandle, CredentialsProvider, DefaultCredentialsProvider};
use crate::environment::{EnvironmentProbe, ProcessEnvironment};
use crate::resolver::{DebuggerOptions, ResolvedConfig, Resolver};
use crate::utils::{DebuggerError, Result};

const USER_AGENT: &str = concat!("cloud-debugger/", env!("CARGO_PKG_VERSION"));

/// Authenticated transport handle for the debugger API.
///
/// Holds the HTTP client and everything needed to authorize calls. No
/// request is made at construction time.
#[derive(Debug, Clone)]
pub struct Service {
    project_id: String,
    credentials: Arc<dyn AuthCredentials>,
    timeout: Option<Duration>,
    client_config: Option<Map<String, Value>>,
    http: Client,
}

impl Service {
    /// Build the transport. Without a timeout the HTTP client default applies.
    pub fn new(
        project_id: &str,
        credentials: Arc<dyn AuthCredentials>,
        timeout: Option<Duration>,
        client_config: Option<Map<String, Value>>,
    ) -> std::result::Result<Self, reqwest::Error> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            project_id: project_id.to_string(),
            credentials,
            timeout,
            client_config,
            http,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn credentials(&self) -> &Arc<dyn AuthCredentials> {
        &self.credentials
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn client_config(&self) -> Option<&Map<String, Value>> {
        self.client_config.as_ref()
    }

    pub fn http(&self) -> &Client {
        &self.http
    }
}

/// Identity of the application being debugged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debuggee {
    service_name: String,
    service_version: String,
}

impl Debuggee {
    pub fn new(service_name: &str, service_version: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            service_version: service_version.to_string(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_version(&self) -> &str {
        &self.service_version
    }
}

/// A debugger client: transport plus debuggee metadata.
#[derive(Debug, Clone)]
pub struct Debugger {
    service: Service,
    debuggee: Debuggee,
}

impl Debugger {
    /// Build a client from the process-wide configuration and environment.
    pub fn new(options: DebuggerOptions) -> Result<Self> {
        ClientFactory::new().create(options)
    }

    /// The resolved project id.
    pub fn project(&self) -> &str {
        self.service.project_id()
    }

    /// Alias of [`project`](Self::project).
    pub fn project_id(&self) -> &str {
        self.project()
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn debuggee(&self) -> &Debuggee {
        &self.debuggee
    }
}

/// Resolves configuration and builds [`Debugger`] clients.
///
/// Defaults to the process-wide debugger scope, the process environment and
/// [`DefaultCredentialsProvider`]; each can be replaced.
pub struct ClientFactory {
    config: Arc<ServiceConfig>,
    env: Box<dyn EnvironmentProbe>,
    provider: Box<dyn CredentialsProvider>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self {
            config: config::debugger_config(),
            env: Box::new(ProcessEnvironment),
            provider: Box::new(DefaultCredentialsProvider),
        }
    }

    /// Use a different service scope.
    pub fn with_config(mut self, config: Arc<ServiceConfig>) -> Self {
        self.config = config;
        self
    }

    /// Override the environment probe (for testing).
    pub fn with_env(mut self, env: impl EnvironmentProbe + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Override how credentials objects are built.
    pub fn with_credentials_provider(mut self, provider: impl CredentialsProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    /// Resolve without building.
    pub fn resolve(&self, options: DebuggerOptions) -> Result<ResolvedConfig> {
        Resolver::new(&self.config, self.env.as_ref(), self.provider.as_ref()).resolve(options)
    }

    /// Resolve, then build.
    pub fn create(&self, options: DebuggerOptions) -> Result<Debugger> {
        let resolved = self.resolve(options)?;
        self.build(resolved)
    }

    /// Build a client from already-resolved parameters.
    pub fn build(&self, resolved: ResolvedConfig) -> Result<Debugger> {
        let ResolvedConfig {
            project_id,
            credentials,
            service_name,
            service_version,
            timeout,
            client_config,
        } = resolved;

        if project_id.trim().is_empty() {
            return Err(DebuggerError::MissingProject);
        }

        let service = Service::new(&project_id, credentials, timeout, client_config)?;
        let debuggee = Debuggee::new(&service_name, &service_version);

        tracing::info!(
            project = %project_id,
            service_name = %service_name,
            service_version = %service_version,
            "Debugger client initialized"
        );

        Ok(Debugger { service, debuggee })
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Carries a project and keyfile for creating service clients.
#[derive(Debug, Clone, Default)]
pub struct Cloud {
    project_id: Option<String>,
    credentials: Option<CredentialsHandle>,
}

impl Cloud {
    pub fn new(project_id: Option<&str>, keyfile: Option<CredentialsHandle>) -> Self {
        Self {
            project_id: project_id.map(str::to_string),
            credentials: keyfile,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn credentials(&self) -> Option<&CredentialsHandle> {
        self.credentials.as_ref()
    }

    /// Options for a debugger client, filling project and credentials from
    /// this object where `options` leaves them unset.
    pub fn debugger_options(&self, mut options: DebuggerOptions) -> DebuggerOptions {
        if options.project_id.is_none() {
            options.project_id = self.project_id.clone();
        }
        if options.credentials.is_none() {
            options.credentials = self.credentials.clone();
        }
        options
    }

    /// Create a debugger client with the process-wide defaults.
    pub fn debugger(&self, options: DebuggerOptions) -> Result<Debugger> {
        Debugger::new(self.debugger_options(options))
    }
}
