//! Response body decoding into caller-selected shapes.
//!
//! # Design
//! The caller picks the destination explicitly by passing one of the
//! selectors below; nothing is inferred from the payload. Each selector
//! fixes the output type through `ResponseTarget::Output`, so a GET for
//! `Typed<Node>` hands back a `Node` and a GET for `PrettyString` hands back
//! a `String`.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// A destination shape for a response body.
pub trait ResponseTarget {
    type Output;

    fn decode(&self, body: &[u8]) -> Result<Self::Output, serde_json::Error>;
}

/// The body verbatim. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytes;

/// The body as an opaque string (lossy UTF-8). Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawString;

/// The body parsed as generic JSON and re-serialized with a 2-space indent.
/// Field order is not preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrettyString;

/// The body strictly deserialized into `T`.
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub fn new() -> Self {
        Typed(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Typed<T> {}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Typed<{}>", std::any::type_name::<T>())
    }
}

impl ResponseTarget for RawBytes {
    type Output = Vec<u8>;

    fn decode(&self, body: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
        Ok(body.to_vec())
    }
}

impl ResponseTarget for RawString {
    type Output = String;

    fn decode(&self, body: &[u8]) -> Result<String, serde_json::Error> {
        Ok(String::from_utf8_lossy(body).into_owned())
    }
}

impl ResponseTarget for PrettyString {
    type Output = String;

    fn decode(&self, body: &[u8]) -> Result<String, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        serde_json::to_string_pretty(&value)
    }
}

impl<T: DeserializeOwned> ResponseTarget for Typed<T> {
    type Output = T;

    fn decode(&self, body: &[u8]) -> Result<T, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Decode `body` into the shape chosen by `target`.
pub fn decode<R: ResponseTarget>(body: &[u8], target: &R) -> Result<R::Output> {
    target
        .decode(body)
        .map_err(|e| Error::parse("failed to unmarshal response body", e))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::error::ExitCode;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Agreement {
        id: String,
        archived: bool,
    }

    #[test]
    fn raw_bytes_are_copied_verbatim() {
        let body = b"\x00\x01not json";
        assert_eq!(decode(body, &RawBytes).unwrap(), body.to_vec());
    }

    #[test]
    fn raw_string_keeps_text_unprocessed() {
        assert_eq!(decode(b"{\"a\":1}", &RawString).unwrap(), "{\"a\":1}");
        assert_eq!(decode(b"", &RawString).unwrap(), "");
    }

    #[test]
    fn pretty_string_reindents_json() {
        let out = decode(br#"{"b":1,"a":2}"#, &PrettyString).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["a"], 2);
        assert_eq!(value["b"], 1);
        assert!(out.contains("\n  \""), "expected 2-space indent in {out}");
    }

    #[test]
    fn pretty_string_rejects_invalid_json() {
        let err = decode(b"{bad", &PrettyString).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(err.exit_code(), ExitCode::JsonParsing);
    }

    #[test]
    fn typed_decodes_matching_shape() {
        let agreement = decode(br#"{"id":"ag1","archived":false}"#, &Typed::<Agreement>::new()).unwrap();
        assert_eq!(
            agreement,
            Agreement {
                id: "ag1".into(),
                archived: false
            }
        );
    }

    #[test]
    fn typed_rejects_schema_mismatch() {
        let err = decode(br#"{"id":7}"#, &Typed::<Agreement>::new()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
