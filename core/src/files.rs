//! Input files, stdin, signing key paths and small output helpers.

use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::config::env_value;
use crate::error::{Error, Result};

pub const DONT_SUBST_ENV_VARS_ENV: &str = "HZN_DONT_SUBST_ENV_VARS";

// Relative to $HOME.
pub const DEFAULT_PRIVATE_KEY_FILE: &str = ".hzn/keys/service.private.key";
pub const DEFAULT_PUBLIC_KEY_FILE: &str = ".hzn/keys/service.public.pem";

pub fn read_stdin() -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    io::stdin()
        .read_to_end(&mut bytes)
        .map_err(|e| Error::file_io("reading stdin failed", e))?;
    Ok(bytes)
}

/// Read `path`, or stdin when `path` is `-`.
pub fn read_file(path: &str) -> Result<Vec<u8>> {
    if path == "-" {
        return read_stdin();
    }
    std::fs::read(path).map_err(|e| Error::file_io(format!("reading {path} failed"), e))
}

/// Read a JSON input file, drop `/* ... */` comments and substitute
/// environment variables, unless `HZN_DONT_SUBST_ENV_VARS=1`.
pub fn read_json_file(path: &str) -> Result<Vec<u8>> {
    let bytes = read_file(path)?;
    let text = strip_block_comments(&String::from_utf8_lossy(&bytes));
    if std::env::var(DONT_SUBST_ENV_VARS_ENV).as_deref() == Ok("1") {
        return Ok(text.into_bytes());
    }
    Ok(expand_env(&text).into_bytes())
}

fn strip_block_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        match rest[start + 2..].find("*/") {
            Some(len) => {
                out.push_str(&rest[..start]);
                rest = &rest[start + 2 + len + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Shell-style `$VAR` / `${VAR}` expansion from the process environment,
/// warning about every referenced variable that is not defined.
pub fn expand_env(text: &str) -> String {
    expand_with(text, |name| {
        let value = std::env::var(name).unwrap_or_default();
        if value.is_empty() {
            warn!("environment variable '{name}' is referenced in input file, but not defined in the environment");
        }
        value
    })
}

fn expand_with(text: &str, mut lookup: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if after.is_empty() {
            out.push('$');
            rest = after;
            break;
        }
        let (name, consumed) = shell_name(after);
        match name {
            Some(name) => out.push_str(&lookup(name)),
            // `$` not followed by a name stays as it is.
            None if consumed == 0 => out.push('$'),
            // Malformed `${...`, dropped.
            None => {}
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

fn is_special_var(c: u8) -> bool {
    matches!(c, b'*' | b'#' | b'$' | b'@' | b'!' | b'?' | b'-' | b'0'..=b'9')
}

/// Variable name at the start of `s` and the number of bytes it spans.
fn shell_name(s: &str) -> (Option<&str>, usize) {
    let bytes = s.as_bytes();
    if bytes[0] == b'{' {
        if bytes.len() > 2 && is_special_var(bytes[1]) && bytes[2] == b'}' {
            return (Some(&s[1..2]), 3);
        }
        return match s[1..].find('}') {
            Some(0) => (None, 2),
            Some(end) => (Some(&s[1..end + 1]), end + 2),
            None => (None, 1),
        };
    }
    if is_special_var(bytes[0]) {
        return (Some(&s[..1]), 1);
    }
    let len = bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    if len == 0 {
        (None, 0)
    } else {
        (Some(&s[..len]), len)
    }
}

/// Ask `question` with a `[y/N]` prompt. Anything but `y` exits the process
/// successfully without doing the destructive operation.
pub fn confirm_remove(question: &str) {
    print!("{question} [y/N]: ");
    let _ = io::stdout().flush();
    let mut response = String::new();
    let _ = io::stdin().lock().read_line(&mut response);
    if response.trim() != "y" {
        println!("Exiting.");
        std::process::exit(0);
    }
}

/// Default location of the signing key under `$HOME`.
pub fn default_signing_key_file(public: bool) -> Result<PathBuf> {
    let home = env_value("HOME")
        .ok_or_else(|| Error::General("failed to get the home directory of the current user".to_string()))?;
    let relative = if public {
        DEFAULT_PUBLIC_KEY_FILE
    } else {
        DEFAULT_PRIVATE_KEY_FILE
    };
    Ok(Path::new(&home).join(relative))
}

/// Resolve a signing key path: the default when empty, made absolute, and
/// required to exist.
pub fn verify_signing_key_input(key_file: &str, public: bool) -> Result<PathBuf> {
    let path = if key_file.is_empty() {
        default_signing_key_file(public)?
    } else {
        PathBuf::from(key_file)
    };
    let path = std::path::absolute(&path).map_err(|e| {
        Error::General(format!("failed to get absolute path for file {}. {e}", path.display()))
    })?;
    if !path.exists() {
        return Err(Error::General(format!(
            "{} does not exist. Please create the signing key.",
            path.display()
        )));
    }
    Ok(path)
}

/// Indented JSON (2 spaces).
pub fn marshal_indent<T: Serialize + ?Sized>(value: &T, context: &str) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Error::parse(format!("failed to marshal data type from {context}"), e))
}

pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8], context: &str) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::parse(format!("failed to unmarshal bytes from {context}"), e))
}

/// Local-time rendering of a unix timestamp; 0 means "never" and renders empty.
pub fn convert_time(unix_seconds: u64) -> String {
    if unix_seconds == 0 {
        return String::new();
    }
    i64::try_from(unix_seconds)
        .ok()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S %z %Z").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;
    use crate::error::ExitCode;
    use crate::test_support::{ScopedEnvVar, ENV_LOCK};

    fn expand_map(text: &str, vars: &[(&str, &str)]) -> String {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        expand_with(text, |name| map.get(name).copied().unwrap_or_default().to_string())
    }

    #[test]
    fn strips_block_comments() {
        assert_eq!(
            strip_block_comments("{ /* label */ \"a\": 1 /* multi\nline */ }"),
            "{  \"a\": 1  }"
        );
        assert_eq!(strip_block_comments("{\"a\": \"/* open"), "{\"a\": \"/* open");
    }

    #[test]
    fn expands_names_and_braces() {
        let vars = [("ARCH", "arm64"), ("VERSION", "1.2.3")];
        assert_eq!(expand_map("svc_${VERSION}_$ARCH", &vars), "svc_1.2.3_arm64");
        assert_eq!(expand_map("$UNSET-x", &vars), "-x");
    }

    #[test]
    fn leaves_lone_dollars() {
        assert_eq!(expand_map("cost $ 5 and $", &[]), "cost $ 5 and $");
        assert_eq!(expand_map("bad ${ brace", &[]), "bad  brace");
        assert_eq!(expand_map("empty ${}!", &[]), "empty !");
    }

    #[test]
    fn read_json_file_substitutes_env() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _subst = ScopedEnvVar::remove(DONT_SUBST_ENV_VARS_ENV);
        let _org = ScopedEnvVar::set("EDGE_CORE_TEST_SVC_ORG", "myorg");
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"{ /* comment */ \"org\": \"$EDGE_CORE_TEST_SVC_ORG\" }").unwrap();

        let bytes = read_json_file(f.path().to_str().unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["org"], "myorg");
    }

    #[test]
    fn read_json_file_can_skip_substitution() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _subst = ScopedEnvVar::set(DONT_SUBST_ENV_VARS_ENV, "1");
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"{\"org\": \"$HOME\"}").unwrap();

        let bytes = read_json_file(f.path().to_str().unwrap()).unwrap();
        assert_eq!(bytes, b"{\"org\": \"$HOME\"}");
    }

    #[test]
    fn missing_file_is_file_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");
        let err = read_file(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::FileIo);
    }

    #[test]
    fn signing_key_defaults_under_home() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let home = TempDir::new().unwrap();
        let _home = ScopedEnvVar::set("HOME", home.path());

        let public = default_signing_key_file(true).unwrap();
        assert_eq!(public, home.path().join(DEFAULT_PUBLIC_KEY_FILE));

        let err = verify_signing_key_input("", false).unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::CliGeneral);

        let private = home.path().join(DEFAULT_PRIVATE_KEY_FILE);
        std::fs::create_dir_all(private.parent().unwrap()).unwrap();
        std::fs::write(&private, b"key").unwrap();
        assert_eq!(verify_signing_key_input("", false).unwrap(), private);
    }

    #[test]
    fn convert_time_zero_is_empty() {
        assert_eq!(convert_time(0), "");
        assert!(convert_time(1_500_000_000).starts_with("2017-07-1"));
    }

    #[test]
    fn unmarshal_reports_context() {
        let err = unmarshal::<serde_json::Value>(b"{bad", "agreement list").unwrap_err();
        assert!(err.to_string().starts_with("failed to unmarshal bytes from agreement list"));
        assert_eq!(marshal_indent(&serde_json::json!({"a": 1}), "x").unwrap(), "{\n  \"a\": 1\n}");
    }
}
