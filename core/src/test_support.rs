#[cfg(test)]
use std::{
    cell::RefCell,
    collections::VecDeque,
    ffi::{OsStr, OsString},
    sync::Mutex,
};

#[cfg(test)]
use crate::http::{HttpRequest, HttpResponse, SendError, Transport};

/// Serializes tests that read or write process environment variables.
#[cfg(test)]
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard for temporarily setting/removing an environment variable in tests.
///
/// Hold `ENV_LOCK` for as long as the guard lives.
#[cfg(test)]
pub struct ScopedEnvVar {
    key: String,
    old: Option<OsString>,
}

#[cfg(test)]
impl ScopedEnvVar {
    pub fn set(key: &str, value: impl AsRef<OsStr>) -> Self {
        let old = std::env::var_os(key);
        std::env::set_var(key, value);
        Self {
            key: key.to_string(),
            old,
        }
    }

    pub fn remove(key: &str) -> Self {
        let old = std::env::var_os(key);
        std::env::remove_var(key);
        Self {
            key: key.to_string(),
            old,
        }
    }
}

#[cfg(test)]
impl Drop for ScopedEnvVar {
    fn drop(&mut self) {
        match &self.old {
            Some(v) => std::env::set_var(&self.key, v),
            None => std::env::remove_var(&self.key),
        }
    }
}

/// Transport double that records every request and replays canned results.
#[cfg(test)]
pub struct RecordingTransport {
    pub requests: RefCell<Vec<HttpRequest>>,
    responses: RefCell<VecDeque<Result<HttpResponse, SendError>>>,
}

#[cfg(test)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            requests: Default::default(),
            responses: Default::default(),
        }
    }

    pub fn respond(self, status: u16, body: &str) -> Self {
        self.responses.borrow_mut().push_back(Ok(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        }));
        self
    }

    pub fn fail(self, err: SendError) -> Self {
        self.responses.borrow_mut().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn last(&self) -> HttpRequest {
        self.requests.borrow().last().cloned().expect("no request was sent")
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, SendError> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .expect("unexpected request: no canned response left")
    }
}
