//! Client for the local agent API.
//!
//! # Design
//! Calls are anonymous and go to the base URL from `AgentEndpoint`. Each
//! verb has a result-returning `try_*` form and a fatal form that prints the
//! error and exits. GET additionally takes a `quiet` flag for call sites that
//! probe whether the agent is up without wanting the process to die.
//!
//! Mutating verbs consult `Config::dry_run` before a request is even built.

use tracing::debug;

use crate::config::{AgentEndpoint, Config};
use crate::decode::ResponseTarget;
use crate::error::{Error, OrExit, Result};
use crate::http::{
    encode_body, join_url, Body, HttpMethod, HttpRequest, HttpResponse, SendError, TextEncoding,
    Transport, UreqTransport, WriteMethod,
};
use crate::status;

/// Agent response code when a node is already registered.
pub const ANAX_ALREADY_CONFIGURED: u16 = 409;
/// Agent response code when a node is not registered yet.
pub const ANAX_NOT_CONFIGURED_YET: u16 = 424;

/// Result of a GET: the observed code, plus the decoded body when the code
/// was the success code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponse<O> {
    pub code: u16,
    pub body: Option<O>,
}

/// Result of a local agent PUT or POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    pub code: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct LocalAgentClient<T = UreqTransport> {
    endpoint: AgentEndpoint,
    config: Config,
    transport: T,
}

impl LocalAgentClient {
    /// Client for the agent named by `HORIZON_URL`, or the platform default.
    pub fn new(config: Config) -> Self {
        Self::with_transport(AgentEndpoint::from_env(), config, UreqTransport::new())
    }
}

impl<T: Transport> LocalAgentClient<T> {
    pub fn with_transport(endpoint: AgentEndpoint, config: Config, transport: T) -> Self {
        Self {
            endpoint,
            config,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }

    /// GET `suffix` and decode the body into `target`.
    ///
    /// The body is decoded only when the code equals `acceptable[0]`; any
    /// other acceptable code is reported by value alone.
    pub fn try_get<R: ResponseTarget>(
        &self,
        suffix: &str,
        acceptable: &[u16],
        target: &R,
    ) -> Result<GetResponse<R::Output>> {
        let request = HttpRequest::new(HttpMethod::Get, join_url(self.base_url(), suffix));
        let api = request.describe();
        debug!("{api}");
        let response = self.send(&request)?;
        debug!("HTTP code: {}", response.status);

        if !status::accept(response.status, acceptable) {
            return Err(Error::Status {
                api,
                code: response.status,
                detail: None,
            });
        }
        if !status::is_success(response.status, acceptable) {
            return Ok(GetResponse {
                code: response.status,
                body: None,
            });
        }
        let body = target
            .decode(&response.body)
            .map_err(|e| Error::parse(format!("failed to unmarshal body response from {api}"), e))?;
        Ok(GetResponse {
            code: response.status,
            body: Some(body),
        })
    }

    /// GET that exits on failure unless `quiet`, in which case the error is
    /// returned to the caller.
    pub fn get<R: ResponseTarget>(
        &self,
        suffix: &str,
        acceptable: &[u16],
        target: &R,
        quiet: bool,
    ) -> Result<GetResponse<R::Output>> {
        let result = self.try_get(suffix, acceptable, target);
        if quiet {
            result
        } else {
            Ok(result.or_exit())
        }
    }

    /// PUT or POST `body` to `suffix`. Raw bytes and text are uploaded as-is,
    /// structured bodies go as JSON.
    pub fn try_put_post(
        &self,
        method: WriteMethod,
        suffix: &str,
        acceptable: &[u16],
        body: Body,
    ) -> Result<WriteResponse> {
        let url = join_url(self.base_url(), suffix);
        let method = HttpMethod::from(method);
        debug!("{method} {url}");
        if self.config.dry_run {
            return Ok(WriteResponse {
                code: 201,
                body: String::new(),
            });
        }

        let (bytes, headers) = encode_body(body, TextEncoding::Upload);
        let request = HttpRequest {
            method,
            url,
            headers,
            body: Some(bytes),
        };
        let api = request.describe();
        let response = self.send(&request)?;
        debug!("HTTP code: {}", response.status);

        let text = response.text();
        if !status::accept(response.status, acceptable) {
            return Err(Error::Status {
                api,
                code: response.status,
                detail: Some(text),
            });
        }
        Ok(WriteResponse {
            code: response.status,
            body: text,
        })
    }

    pub fn put_post(
        &self,
        method: WriteMethod,
        suffix: &str,
        acceptable: &[u16],
        body: Body,
    ) -> WriteResponse {
        self.try_put_post(method, suffix, acceptable, body).or_exit()
    }

    /// DELETE `suffix`. No body is sent.
    pub fn try_delete(&self, suffix: &str, acceptable: &[u16]) -> Result<u16> {
        let request = HttpRequest::new(HttpMethod::Delete, join_url(self.base_url(), suffix));
        let api = request.describe();
        debug!("{api}");
        if self.config.dry_run {
            return Ok(204);
        }

        let response = self.send(&request)?;
        debug!("HTTP code: {}", response.status);
        if !status::accept(response.status, acceptable) {
            return Err(Error::Status {
                api,
                code: response.status,
                detail: Some(response.text()),
            });
        }
        Ok(response.status)
    }

    pub fn delete(&self, suffix: &str, acceptable: &[u16]) -> u16 {
        self.try_delete(suffix, acceptable).or_exit()
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.transport.send(request).map_err(|err| match err {
            SendError::Connect(reason) => self.unreachable(&request.describe(), &reason),
            SendError::ReadBody(reason) => Error::BodyRead {
                api: request.describe(),
                reason,
            },
        })
    }

    fn unreachable(&self, api: &str, reason: &str) -> Error {
        let hint = if self.endpoint.overridden {
            "Maybe the ssh tunnel associated with that port is down? Or maybe the remote Horizon agent at the other end of that tunnel is down."
        } else {
            "Run 'systemctl status horizon' to check if the Horizon agent is running. Or set HORIZON_URL to connect to another local port that is connected to a remote Horizon agent via a ssh tunnel."
        };
        Error::Transport {
            message: format!(
                "Can't connect to the Horizon REST API to run {api}. {hint} Specific error is: {reason}"
            ),
        }
    }
}
