//! Client for the remote registry (exchange) API.
//!
//! # Design
//! Same verbs as the local agent client, but the base URL is passed on every
//! call and every call carries a credentials string. A non-empty string adds
//! `Authorization: Basic ...`; an empty one makes the call anonymous. There
//! is no quiet mode: the fatal forms always exit.
//!
//! Failed PUT/POST calls try to show the registry's `{code, msg}` error body
//! and fall back to the raw response text.

use serde::Deserialize;
use tracing::debug;

use crate::agent::GetResponse;
use crate::auth::basic_auth_value;
use crate::config::{exchange_url_overridden, Config};
use crate::decode::ResponseTarget;
use crate::error::{Error, OrExit, Result};
use crate::http::{
    encode_body, join_url, Body, HttpMethod, HttpRequest, HttpResponse, SendError, TextEncoding,
    Transport, UreqTransport, WriteMethod,
};
use crate::status;

/// Error body returned by the registry on rejected writes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegistryErrorBody {
    pub code: String,
    pub msg: String,
}

#[derive(Debug, Clone)]
pub struct RegistryClient<T = UreqTransport> {
    url_overridden: bool,
    config: Config,
    transport: T,
}

impl RegistryClient {
    pub fn new(config: Config) -> Self {
        Self::with_transport(exchange_url_overridden(), config, UreqTransport::new())
    }
}

impl<T: Transport> RegistryClient<T> {
    /// `url_overridden` records whether `HZN_EXCHANGE_URL` chose the base
    /// URL; it only changes the wording of connection failures.
    pub fn with_transport(url_overridden: bool, config: Config, transport: T) -> Self {
        Self {
            url_overridden,
            config,
            transport,
        }
    }

    /// GET `suffix` from `base` and decode the body into `target`.
    ///
    /// The body is decoded only for the success code and only when it is
    /// non-empty. The registry's front end answers some auth failures with
    /// an empty body, which comes back as `body: None`.
    pub fn try_get<R: ResponseTarget>(
        &self,
        base: &str,
        suffix: &str,
        credentials: &str,
        acceptable: &[u16],
        target: &R,
    ) -> Result<GetResponse<R::Output>> {
        let mut request = HttpRequest::new(HttpMethod::Get, join_url(base, suffix));
        request
            .headers
            .push(("Accept".to_string(), "application/json".to_string()));
        add_auth(&mut request, credentials);
        let api = request.describe();
        debug!("{api}");

        let response = self.send(&request)?;
        debug!("HTTP code: {}", response.status);
        if !status::accept(response.status, acceptable) {
            return Err(Error::Status {
                api,
                code: response.status,
                detail: Some(format!("output: {}", response.text())),
            });
        }

        let body = if response.body.is_empty() || !status::is_success(response.status, acceptable) {
            None
        } else {
            let decoded = target.decode(&response.body).map_err(|e| {
                Error::parse(format!("failed to unmarshal exchange body response from {api}"), e)
            })?;
            Some(decoded)
        };
        Ok(GetResponse {
            code: response.status,
            body,
        })
    }

    pub fn get<R: ResponseTarget>(
        &self,
        base: &str,
        suffix: &str,
        credentials: &str,
        acceptable: &[u16],
        target: &R,
    ) -> GetResponse<R::Output> {
        self.try_get(base, suffix, credentials, acceptable, target)
            .or_exit()
    }

    /// PUT or POST `body` to `suffix` under `base`. Only raw bytes are
    /// uploaded as-is; text and structured bodies go as JSON.
    pub fn try_put_post(
        &self,
        method: WriteMethod,
        base: &str,
        suffix: &str,
        credentials: &str,
        acceptable: &[u16],
        body: Body,
    ) -> Result<u16> {
        let url = join_url(base, suffix);
        let method = HttpMethod::from(method);
        debug!("{method} {url}");
        if self.config.dry_run {
            return Ok(201);
        }

        let (bytes, headers) = encode_body(body, TextEncoding::Json);
        let mut request = HttpRequest {
            method,
            url,
            headers,
            body: Some(bytes),
        };
        add_auth(&mut request, credentials);
        let api = request.describe();

        let response = self.send(&request)?;
        debug!("HTTP code: {}", response.status);
        if !status::accept(response.status, acceptable) {
            return Err(Error::Status {
                api,
                code: response.status,
                detail: Some(write_failure_detail(&response)),
            });
        }
        Ok(response.status)
    }

    pub fn put_post(
        &self,
        method: WriteMethod,
        base: &str,
        suffix: &str,
        credentials: &str,
        acceptable: &[u16],
        body: Body,
    ) -> u16 {
        self.try_put_post(method, base, suffix, credentials, acceptable, body)
            .or_exit()
    }

    /// DELETE `suffix` under `base`. The registry never returns a body here.
    pub fn try_delete(&self, base: &str, suffix: &str, credentials: &str, acceptable: &[u16]) -> Result<u16> {
        let mut request = HttpRequest::new(HttpMethod::Delete, join_url(base, suffix));
        let api = request.describe();
        debug!("{api}");
        if self.config.dry_run {
            return Ok(204);
        }

        add_auth(&mut request, credentials);
        let response = self.send(&request)?;
        debug!("HTTP code: {}", response.status);
        if !status::accept(response.status, acceptable) {
            return Err(Error::Status {
                api,
                code: response.status,
                detail: None,
            });
        }
        Ok(response.status)
    }

    pub fn delete(&self, base: &str, suffix: &str, credentials: &str, acceptable: &[u16]) -> u16 {
        self.try_delete(base, suffix, credentials, acceptable).or_exit()
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
        let hint = if self.url_overridden {
            "Maybe HZN_EXCHANGE_URL is set incorrectly? Or unset HZN_EXCHANGE_URL to use the Exchange that the Horizon Agent is configured for."
        } else {
            "Set HZN_EXCHANGE_URL to use an Exchange other than the one the Horizon Agent is currently configured for."
        };
        Error::Transport {
            message: format!(
                "Can't connect to the Horizon Exchange REST API to run {api}. {hint} Specific error is: {reason}"
            ),
        }
    }
}

fn add_auth(request: &mut HttpRequest, credentials: &str) {
    if let Some(value) = basic_auth_value(credentials) {
        request.headers.push(("Authorization".to_string(), value));
    }
}

fn write_failure_detail(response: &HttpResponse) -> String {
    match serde_json::from_slice::<RegistryErrorBody>(&response.body) {
        Ok(err) => format!("{}, {}", err.code, err.msg),
        Err(_) => response.text(),
    }
}
