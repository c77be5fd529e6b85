//! Process-wide options and endpoint resolution.
//!
//! # Design
//! Global flags are parsed once into an immutable `Config` that every façade
//! receives at construction; nothing reads ambient mutable state during a
//! request. Endpoint resolution reads the environment and, for the registry,
//! the agent's on-device configuration files. File locations are carried in
//! `AnaxFiles` so tests can point them at temporary files.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const HZN_API: &str = "http://localhost";
pub const HZN_API_MAC: &str = "http://localhost:8081";
pub const DEFAULT_EXCHANGE_URL: &str = "https://alpha.edge-fabric.com/v1/";

pub const ANAX_OVERWRITE_FILE: &str = "/etc/default/horizon";
pub const ANAX_CONFIG_FILE: &str = "/etc/horizon/anax.json";

pub const HORIZON_URL_ENV: &str = "HORIZON_URL";
pub const EXCHANGE_URL_ENV: &str = "HZN_EXCHANGE_URL";
pub const ARCH_ENV: &str = "ARCH";

/// Global command-line flags, flattened into the CLI's top-level parser.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalOptions {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Do not perform PUT, POST or DELETE calls, report synthetic success instead
    #[arg(long, global = true)]
    pub dry_run: bool,
}

/// Immutable run configuration, built once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub verbose: bool,
    pub dry_run: bool,
}

impl From<&GlobalOptions> for Config {
    fn from(opts: &GlobalOptions) -> Self {
        Self {
            verbose: opts.verbose,
            dry_run: opts.dry_run,
        }
    }
}

/// Non-empty value of environment variable `key`.
pub(crate) fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Base URL of the local agent API and whether it came from `HORIZON_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub base_url: String,
    pub overridden: bool,
}

impl AgentEndpoint {
    pub fn new(base_url: impl Into<String>, overridden: bool) -> Self {
        Self {
            base_url: base_url.into(),
            overridden,
        }
    }

    pub fn from_env() -> Self {
        Self::resolve(env_value(HORIZON_URL_ENV))
    }

    fn resolve(override_url: Option<String>) -> Self {
        match override_url {
            Some(url) => Self::new(url, true),
            None => Self::new(platform_default_agent_url(), false),
        }
    }
}

fn platform_default_agent_url() -> &'static str {
    if cfg!(target_os = "macos") {
        HZN_API_MAC
    } else {
        HZN_API
    }
}

/// Architecture name as used in service definitions (`amd64`, `arm64`, ...).
pub fn default_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Set `ARCH` to the host architecture unless it is already set.
pub fn set_default_arch() {
    if env_value(ARCH_ENV).is_none() {
        debug!("setting {ARCH_ENV}={}", default_arch());
        std::env::set_var(ARCH_ENV, default_arch());
    }
}

/// Whether the registry URL was overridden through `HZN_EXCHANGE_URL`.
pub fn exchange_url_overridden() -> bool {
    env_value(EXCHANGE_URL_ENV).is_some()
}

/// Agent configuration files consulted for the registry URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnaxFiles {
    pub overwrite_file: PathBuf,
    pub config_file: PathBuf,
}

impl Default for AnaxFiles {
    fn default() -> Self {
        Self {
            overwrite_file: PathBuf::from(ANAX_OVERWRITE_FILE),
            config_file: PathBuf::from(ANAX_CONFIG_FILE),
        }
    }
}

/// The subset of the agent's JSON configuration this tool reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnaxConfig {
    #[serde(rename = "Edge", default)]
    pub edge: EdgeConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EdgeConfig {
    #[serde(rename = "ExchangeURL", default)]
    pub exchange_url: String,
}

/// Look up `key` in a file of `key=value` lines.
///
/// A missing file yields `None`. Lines whose key part contains `#` are
/// skipped. The value is trimmed of whitespace, then single, then double
/// quotes.
pub fn env_var_from_file(path: &Path, key: &str) -> io::Result<Option<String>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.contains(key) {
            continue;
        }
        let mut parts = line.split('=');
        let name = parts.next().unwrap_or_default();
        if name.contains('#') {
            continue;
        }
        return Ok(parts.next().map(|value| {
            value
                .trim()
                .trim_matches('\'')
                .trim_matches('"')
                .to_string()
        }));
    }
    Ok(None)
}

/// Read the agent's JSON configuration. A missing file yields `None`.
pub fn anax_config(path: &Path) -> Result<Option<AnaxConfig>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::file_io(format!("reading {}", path.display()), e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::parse(format!("failed to unmarshal {}", path.display()), e))
}

/// Registry URL from the agent's configuration files, if either has one.
pub fn exchange_url_from_anax(files: &AnaxFiles) -> Option<String> {
    match env_var_from_file(&files.overwrite_file, EXCHANGE_URL_ENV) {
        Ok(Some(value)) if !value.is_empty() => return Some(value),
        Ok(_) => {}
        Err(e) => warn!(
            "error getting {EXCHANGE_URL_ENV} from {}: {e}",
            files.overwrite_file.display()
        ),
    }
    match anax_config(&files.config_file) {
        Ok(Some(config)) => Some(config.edge.exchange_url),
        Ok(None) => None,
        Err(e) => {
            warn!("error getting ExchangeURL from {}: {e}", files.config_file.display());
            None
        }
    }
}

/// Resolve the registry base URL: `HZN_EXCHANGE_URL`, then the agent's
/// configuration files, then the built-in default.
pub fn exchange_url(files: &AnaxFiles, using_api_key: bool) -> String {
    resolve_exchange_url(env_value(EXCHANGE_URL_ENV), files, using_api_key)
}

fn resolve_exchange_url(env_url: Option<String>, files: &AnaxFiles, using_api_key: bool) -> String {
    let url = match env_url {
        Some(url) => url,
        None => {
            debug!("{EXCHANGE_URL_ENV} is not set, reading it from the agent configuration on this node");
            match exchange_url_from_anax(files).filter(|u| !u.is_empty()) {
                Some(url) => url,
                None => {
                    debug!("no exchange url in the agent configuration, using default {DEFAULT_EXCHANGE_URL}");
                    DEFAULT_EXCHANGE_URL.to_string()
                }
            }
        }
    };

    let mut url = url.trim_end_matches('/').to_string();
    if using_api_key {
        if let Some(prefix) = url.strip_suffix("edgenode") {
            url = format!("{prefix}edge");
        }
    }
    debug!("the exchange url: {url}");
    url
}

/// `flag` when non-empty, else the value of `env_name`, else empty.
pub fn with_default_env_var(flag: &str, env_name: &str) -> String {
    if !flag.is_empty() {
        return flag.to_string();
    }
    env_value(env_name).unwrap_or_default()
}

/// Like [`with_default_env_var`] but an empty result is an input error.
pub fn required_with_default_env_var(flag: &str, env_name: &str, err_msg: &str) -> Result<String> {
    let value = with_default_env_var(flag, env_name);
    if value.is_empty() {
        return Err(Error::Input(err_msg.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;
    use crate::test_support::{ScopedEnvVar, ENV_LOCK};

    fn write_file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn missing_files(dir: &TempDir) -> AnaxFiles {
        AnaxFiles {
            overwrite_file: dir.path().join("horizon"),
            config_file: dir.path().join("anax.json"),
        }
    }

    #[test]
    fn config_copies_global_flags() {
        let opts = GlobalOptions {
            verbose: true,
            dry_run: true,
        };
        assert_eq!(
            Config::from(&opts),
            Config {
                verbose: true,
                dry_run: true
            }
        );
    }

    #[test]
    fn agent_endpoint_prefers_override() {
        let ep = AgentEndpoint::resolve(Some("http://localhost:9999".into()));
        assert_eq!(ep, AgentEndpoint::new("http://localhost:9999", true));

        let ep = AgentEndpoint::resolve(None);
        assert!(!ep.overridden);
        assert!(ep.base_url == HZN_API || ep.base_url == HZN_API_MAC);
    }

    #[test]
    fn env_var_from_file_parses_values() {
        let f = write_file(
            "# HZN_EXCHANGE_URL=http://commented\nHZN_EXCHANGE_URL= \"https://exchange.example.com/v1/\" \nHZN_DEVICE_ID=dev1\n",
        );
        assert_eq!(
            env_var_from_file(f.path(), "HZN_EXCHANGE_URL").unwrap().as_deref(),
            Some("https://exchange.example.com/v1/")
        );
        assert_eq!(env_var_from_file(f.path(), "HZN_DEVICE_ID").unwrap().as_deref(), Some("dev1"));
        assert_eq!(env_var_from_file(f.path(), "NOPE").unwrap(), None);
    }

    #[test]
    fn env_var_from_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(env_var_from_file(&dir.path().join("absent"), "KEY").unwrap(), None);
    }

    #[test]
    fn exchange_url_falls_back_to_anax_json() {
        let dir = TempDir::new().unwrap();
        let config = write_file(r#"{"Edge":{"ExchangeURL":"https://exch.example.com/api/v1/"},"AgreementBot":{}}"#);
        let files = AnaxFiles {
            overwrite_file: dir.path().join("horizon"),
            config_file: config.path().to_path_buf(),
        };
        assert_eq!(resolve_exchange_url(None, &files, false), "https://exch.example.com/api/v1");
    }

    #[test]
    fn exchange_url_prefers_overwrite_file() {
        let overwrite = write_file("HZN_EXCHANGE_URL=https://from-default-file/v1\n");
        let config = write_file(r#"{"Edge":{"ExchangeURL":"https://from-anax-json/v1"}}"#);
        let files = AnaxFiles {
            overwrite_file: overwrite.path().to_path_buf(),
            config_file: config.path().to_path_buf(),
        };
        assert_eq!(resolve_exchange_url(None, &files, false), "https://from-default-file/v1");
    }

    #[test]
    fn exchange_url_env_wins_and_defaults_last() {
        let dir = TempDir::new().unwrap();
        let files = missing_files(&dir);
        assert_eq!(
            resolve_exchange_url(Some("https://env/v1/".into()), &files, false),
            "https://env/v1"
        );
        assert_eq!(
            resolve_exchange_url(None, &files, false),
            DEFAULT_EXCHANGE_URL.trim_end_matches('/')
        );
    }

    #[test]
    fn exchange_url_rewrites_edgenode_for_api_keys() {
        let dir = TempDir::new().unwrap();
        let files = missing_files(&dir);
        let url = Some("https://cloud.example.com/api/edgenode/".to_string());
        assert_eq!(
            resolve_exchange_url(url.clone(), &files, true),
            "https://cloud.example.com/api/edge"
        );
        assert_eq!(
            resolve_exchange_url(url, &files, false),
            "https://cloud.example.com/api/edgenode"
        );
    }

    #[test]
    fn default_arch_keeps_an_existing_value() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _env = ScopedEnvVar::set(ARCH_ENV, "riscv64");
        set_default_arch();
        assert_eq!(std::env::var(ARCH_ENV).unwrap(), "riscv64");
    }

    #[test]
    fn default_arch_fills_in_when_unset() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _env = ScopedEnvVar::remove(ARCH_ENV);
        set_default_arch();
        assert_eq!(std::env::var(ARCH_ENV).unwrap(), default_arch());
        assert_ne!(default_arch(), "x86_64");
        assert_ne!(default_arch(), "aarch64");
    }

    #[test]
    fn flag_beats_env_default() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _env = ScopedEnvVar::set("EDGE_CORE_TEST_ORG", "envorg");
        assert_eq!(with_default_env_var("flagorg", "EDGE_CORE_TEST_ORG"), "flagorg");
        assert_eq!(with_default_env_var("", "EDGE_CORE_TEST_ORG"), "envorg");
    }

    #[test]
    fn required_env_default_errors_when_unset() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _env = ScopedEnvVar::remove("EDGE_CORE_TEST_MISSING");
        let err = required_with_default_env_var("", "EDGE_CORE_TEST_MISSING", "organization must be specified")
            .unwrap_err();
        assert!(matches!(err, Error::Input(ref m) if m == "organization must be specified"));
    }
}
