//! Typed HTTP invocation layer for the edge CLI.
//!
//! # Overview
//! Two façades talk to two REST services: `LocalAgentClient` to the agent API
//! running on this device, `RegistryClient` to the remote registry
//! (exchange) API. Both validate the response code against a caller-supplied
//! acceptable set and decode bodies into a caller-selected shape.
//!
//! # Design
//! - One request per call, blocking, no retries.
//! - `Config` is built once from the global flags and passed in; its
//!   `dry_run` short-circuits every PUT, POST and DELETE before any I/O.
//! - Every verb has a `try_*` form returning `Result` and a fatal form that
//!   prints `Error: ...` and exits with the code from `ExitCode`.
//! - The wire sits behind the `Transport` trait; `UreqTransport` is the
//!   production implementation.
//! - `auth`, `config`, `files` and `ids` hold the plumbing the CLI needs
//!   around those calls: credential resolution, endpoint resolution, input
//!   files and resource id munging.

pub mod agent;
pub mod auth;
pub mod config;
pub mod decode;
pub mod error;
pub mod files;
pub mod http;
pub mod ids;
pub mod logging;
pub mod registry;
pub mod status;
mod test_support;

pub use agent::{GetResponse, LocalAgentClient, WriteResponse};
pub use auth::resolve_exchange_auth;
pub use config::{AgentEndpoint, AnaxFiles, Config, GlobalOptions};
pub use decode::{decode, PrettyString, RawBytes, RawString, ResponseTarget, Typed};
pub use error::{fatal, Error, ExitCode, OrExit, Result};
pub use http::{Body, HttpMethod, HttpRequest, HttpResponse, SendError, Transport, UreqTransport, WriteMethod};
pub use registry::{RegistryClient, RegistryErrorBody};
