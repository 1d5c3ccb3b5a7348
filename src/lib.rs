//! Configuration and credential resolution for Cloud Debugger clients.
//!
//! Merges call-site arguments, service and shared configuration scopes, and
//! environment hints into one client configuration, loads credentials from an
//! object, key file or inline JSON, and builds the client.

pub mod client;
pub mod config;
pub mod credentials;
pub mod environment;
pub mod resolver;
pub mod utils;

pub use client::{ClientFactory, Cloud, Debuggee, Debugger, Service};
pub use config::{debugger_config, global, ServiceConfig, SharedConfig, DEBUGGER_SERVICE};
pub use credentials::{
    AuthCredentials, CredentialsHandle, CredentialsLoader, CredentialsProvider, DefaultCredentialsProvider,
    KeyfileCredentials, DEFAULT_SCOPES,
};
pub use environment::{EnvironmentProbe, ProcessEnvironment, StaticEnvironment};
pub use resolver::{DebuggerOptions, ResolvedConfig, Resolver};
pub use utils::{DebuggerError, Result};
