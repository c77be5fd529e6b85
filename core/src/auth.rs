//! Registry credentials: resolution, classification and the Basic header.
//!
//! Credentials are `identity:secret` strings. They are never stored; each
//! registry call formats them into an `Authorization` header on the spot.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;

use crate::config::env_value;
use crate::error::{Error, Result};

pub const USER_AUTH_ENV: &str = "HZN_EXCHANGE_USER_AUTH";
pub const NODE_AUTH_ENV: &str = "HZN_EXCHANGE_NODE_AUTH";
pub const USING_API_KEY_ENV: &str = "USING_API_KEY";

/// Split `id:token` (or `user:pw`) at the first `:`. The token is empty when
/// there is no `:`.
pub fn split_id_token(id_token: &str) -> (&str, &str) {
    id_token.split_once(':').unwrap_or((id_token, ""))
}

/// `Basic base64(credentials)`, or `None` for an anonymous call.
pub fn basic_auth_value(credentials: &str) -> Option<String> {
    if credentials.is_empty() {
        return None;
    }
    Some(format!("Basic {}", BASE64.encode(credentials)))
}

/// Pick the credentials for a registry call.
///
/// Precedence: explicit user/password, explicit node id/token, then the
/// `HZN_EXCHANGE_USER_AUTH` and `HZN_EXCHANGE_NODE_AUTH` environment
/// variables.
pub fn resolve_exchange_auth(user_pw: &str, node_id_tok: &str) -> Result<String> {
    resolve_exchange_auth_with(user_pw, node_id_tok, env_value)
}

/// [`resolve_exchange_auth`] with an explicit environment lookup.
pub fn resolve_exchange_auth_with(
    user_pw: &str,
    node_id_tok: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
    let cred = Some(user_pw.to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| Some(node_id_tok.to_string()).filter(|s| !s.is_empty()))
        .or_else(|| non_empty(lookup(USER_AUTH_ENV)))
        .or_else(|| non_empty(lookup(NODE_AUTH_ENV)));

    cred.ok_or_else(|| {
        Error::Credential(format!(
            "exchange authentication must be specified with one of the following: the -u flag, the -n flag, {USER_AUTH_ENV} or {NODE_AUTH_ENV}"
        ))
    })
}

/// Whether `creds` look like an API key (`a-<6 alphanumerics>-...`).
///
/// `USING_API_KEY=0` vetoes the detection.
pub fn is_api_key(creds: &str) -> bool {
    if std::env::var(USING_API_KEY_ENV).as_deref() == Ok("0") {
        return false;
    }
    let detected = looks_like_api_key(creds);
    if detected {
        debug!("using API key");
    }
    detected
}

fn looks_like_api_key(creds: &str) -> bool {
    let bytes = creds.as_bytes();
    bytes.len() >= 9
        && bytes.starts_with(b"a-")
        && bytes[2..8].iter().all(u8::is_ascii_alphanumeric)
        && bytes[8] == b'-'
}

/// `detected`, or forced on by `USING_API_KEY=1`.
pub fn using_api_key(detected: bool) -> bool {
    detected || std::env::var(USING_API_KEY_ENV).as_deref() == Ok("1")
}

/// Prepend `org/` to `creds` unless the id already carries an org or an API
/// key is in use.
pub fn org_and_creds(org: &str, creds: &str, using_api_key: bool) -> String {
    if using_api_key {
        return creds.to_string();
    }
    let (id, _) = split_id_token(creds);
    if id.contains('/') {
        return creds.to_string();
    }
    format!("{org}/{creds}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ExitCode;
    use crate::test_support::{ScopedEnvVar, ENV_LOCK};

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn split_id_token_at_first_colon() {
        assert_eq!(split_id_token("myorg/user:pw:with:colons"), ("myorg/user", "pw:with:colons"));
        assert_eq!(split_id_token("justid"), ("justid", ""));
        assert_eq!(split_id_token(""), ("", ""));
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        assert_eq!(basic_auth_value("id:secret").as_deref(), Some("Basic aWQ6c2VjcmV0"));
        assert_eq!(basic_auth_value(""), None);
    }

    #[test]
    fn explicit_user_wins() {
        let env = env_of(&[(USER_AUTH_ENV, "env:user"), (NODE_AUTH_ENV, "env:node")]);
        assert_eq!(resolve_exchange_auth_with("a:b", "c:d", &env).unwrap(), "a:b");
        assert_eq!(resolve_exchange_auth_with("", "c:d", &env).unwrap(), "c:d");
    }

    #[test]
    fn env_user_auth_before_node_auth() {
        let env = env_of(&[(USER_AUTH_ENV, "env:user"), (NODE_AUTH_ENV, "env:node")]);
        assert_eq!(resolve_exchange_auth_with("", "", &env).unwrap(), "env:user");
    }

    #[test]
    fn env_node_auth_alone() {
        let env = env_of(&[(NODE_AUTH_ENV, "node1:tok")]);
        assert_eq!(resolve_exchange_auth_with("", "", &env).unwrap(), "node1:tok");
    }

    #[test]
    fn no_source_is_a_credential_error() {
        let env = env_of(&[(USER_AUTH_ENV, "")]);
        let err = resolve_exchange_auth_with("", "", &env).unwrap_err();
        assert!(matches!(err, Error::Credential(_)));
        assert_eq!(err.exit_code(), ExitCode::CliInput);
    }

    #[test]
    fn api_key_shape() {
        assert!(looks_like_api_key("a-abc123-rest:xyz"));
        assert!(!looks_like_api_key("a-ab!123-rest"));
        assert!(!looks_like_api_key("a-abc12-"));
        assert!(!looks_like_api_key("myorg/user:pw"));
    }

    #[test]
    fn using_api_key_zero_vetoes_detection() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _env = ScopedEnvVar::remove(USING_API_KEY_ENV);
        assert!(is_api_key("a-abc123-rest:xyz"));

        let _env = ScopedEnvVar::set(USING_API_KEY_ENV, "0");
        assert!(!is_api_key("a-abc123-rest:xyz"));
    }

    #[test]
    fn using_api_key_one_forces_key_mode() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _env = ScopedEnvVar::remove(USING_API_KEY_ENV);
        assert!(!using_api_key(false));
        assert!(using_api_key(true));

        let _env = ScopedEnvVar::set(USING_API_KEY_ENV, "1");
        assert!(using_api_key(false));
    }

    #[test]
    fn org_is_prepended_once() {
        assert_eq!(org_and_creds("myorg", "user:pw", false), "myorg/user:pw");
        assert_eq!(org_and_creds("myorg", "other/user:pw", false), "other/user:pw");
        assert_eq!(org_and_creds("myorg", "user:p/w", false), "myorg/user:p/w");
        assert_eq!(org_and_creds("myorg", "a-abc123-key", true), "a-abc123-key");
    }
}
