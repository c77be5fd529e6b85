//! HTTP transport types and the blocking wire executor.
//!
//! # Design
//! Requests and responses are plain data. The façades build an
//! `HttpRequest`, hand it to a `Transport`, and interpret the returned
//! `HttpResponse`; nothing else touches the network. `UreqTransport` is the
//! production executor, tests substitute a recording fake.
//!
//! Exactly one request is made per call. No timeout is configured, so a hung
//! connection blocks until the operator interrupts the process.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::error::{Error, Result};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two methods accepted by the create/update path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
    Put,
    Post,
}

impl From<WriteMethod> for HttpMethod {
    fn from(method: WriteMethod) -> Self {
        match method {
            WriteMethod::Put => HttpMethod::Put,
            WriteMethod::Post => HttpMethod::Post,
        }
    }
}

/// Request payload. Exactly one representation is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Uploaded verbatim, like a file.
    Bytes(Vec<u8>),
    /// Uploaded verbatim by the local agent client, sent as JSON by the
    /// registry client.
    Text(String),
    /// Structured value, already marshaled.
    Json(Vec<u8>),
}

impl Body {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_vec(value)
            .map(Body::Json)
            .map_err(|e| Error::parse("failed to marshal request body", e))
    }
}

/// How a `Body::Text` payload goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextEncoding {
    Upload,
    Json,
}

/// Encode `body` and compute the headers that describe it.
pub(crate) fn encode_body(body: Body, text: TextEncoding) -> (Vec<u8>, Vec<(String, String)>) {
    let (bytes, upload) = match body {
        Body::Bytes(bytes) => (bytes, true),
        Body::Text(text_body) => (text_body.into_bytes(), text == TextEncoding::Upload),
        Body::Json(bytes) => (bytes, false),
    };
    let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
    if upload {
        headers.push(("Content-Length".to_string(), bytes.len().to_string()));
    } else {
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
    }
    (bytes, headers)
}

pub(crate) fn join_url(base: &str, suffix: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), suffix)
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `METHOD url`, the form used in log lines and error messages.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure to complete a round-trip.
#[derive(Debug, Error)]
pub enum SendError {
    /// No response was received.
    #[error("{0}")]
    Connect(String),
    /// A response arrived but its body could not be read.
    #[error("{0}")]
    ReadBody(String),
}

/// Executes one request and returns the whole response.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError> {
        (**self).send(request)
    }
}

/// Blocking transport backed by a `ureq` agent.
///
/// Status codes are never turned into errors here; interpreting them is the
/// façade's job.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError> {
        let url = request.url.as_str();
        // ureq derives content-length from the body it is given.
        let headers = request
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("content-length"));

        let result = match request.method {
            HttpMethod::Get | HttpMethod::Delete => {
                let mut builder = if request.method == HttpMethod::Get {
                    self.agent.get(url)
                } else {
                    self.agent.delete(url)
                };
                for (k, v) in headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                builder.call()
            }
            HttpMethod::Put | HttpMethod::Post => {
                let mut builder = if request.method == HttpMethod::Put {
                    self.agent.put(url)
                } else {
                    self.agent.post(url)
                };
                for (k, v) in headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                match &request.body {
                    Some(body) => builder.send(&body[..]),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|e| SendError::Connect(e.to_string()))?;
        let status = response.status().as_u16();
        // ureq caps bodies at 10 MB by default; callers expect the whole body.
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(|e| SendError::ReadBody(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}
