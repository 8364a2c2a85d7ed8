//! Narrow interfaces to the services the step executor depends on.
//!
//! Each collaborator is a trait object injected into `StepExecutor`; the
//! default implementations here are what the CLI wires up.

pub mod credentials;
pub mod http;
pub mod sandbox;
pub mod tools;

pub use credentials::{ApiCredential, CredentialResolver, EnvCredentialResolver, StaticCredentialResolver, UserContext};
pub use http::{AuthOptions, AuthType, HttpClient, HttpRequestOptions, HttpResponse, HttpResponseMetadata, ReqwestHttpClient};
pub use sandbox::{CodeLanguage, CodeSandbox, ProcessSandbox, SandboxOutcome, SandboxRequest};
pub use tools::{ToolInvoker, ToolRegistry, ToolResult};
