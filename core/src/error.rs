//! Error types and the process exit-code taxonomy.
//!
//! # Design
//! Classification is kept apart from its effect. Every operation returns
//! `Result<T, Error>`; only `fatal` (and the `OrExit` adapter built on it)
//! prints and terminates. Each variant maps onto one `ExitCode` so scripts
//! driving the CLI can branch on the failure category.

use thiserror::Error;

/// Numeric process exit codes, one per failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Also the code clap uses for usage errors.
    CliInput = 1,
    JsonParsing = 3,
    FileIo = 4,
    Http = 5,
    CliGeneral = 7,
    NotFound = 8,
    SignatureInvalid = 9,
    Internal = 99,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Bad flag, argument or input document.
    #[error("{0}")]
    Input(String),

    /// No usable credentials for an authenticated registry call.
    #[error("{0}")]
    Credential(String),

    /// The request never produced a response (refused, unreachable, DNS).
    #[error("{message}")]
    Transport { message: String },

    /// The response code is outside the caller's acceptable set.
    #[error("bad HTTP code {code} from {api}{}", detail_suffix(.detail))]
    Status {
        api: String,
        code: u16,
        detail: Option<String>,
    },

    /// A response arrived but its body could not be read.
    #[error("failed to read body response from {api}: {reason}")]
    BodyRead { api: String, reason: String },

    /// Malformed or schema-mismatched JSON.
    #[error("{context}: {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    FileIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    General(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    SignatureInvalid(String),

    #[error("{0}")]
    Internal(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail.as_deref() {
        Some(d) if !d.is_empty() => format!(": {d}"),
        _ => String::new(),
    }
}

impl Error {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Input(_) | Error::Credential(_) => ExitCode::CliInput,
            Error::Parse { .. } => ExitCode::JsonParsing,
            Error::FileIo { .. } => ExitCode::FileIo,
            Error::Transport { .. } | Error::Status { .. } | Error::BodyRead { .. } => ExitCode::Http,
            Error::General(_) => ExitCode::CliGeneral,
            Error::NotFound(_) => ExitCode::NotFound,
            Error::SignatureInvalid(_) => ExitCode::SignatureInvalid,
            Error::Internal(_) => ExitCode::Internal,
        }
    }

    pub(crate) fn parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Parse {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn file_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::FileIo {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Print `Error: <message>` on stderr and terminate with the error's exit code.
pub fn fatal(err: &Error) -> ! {
    eprintln!("Error: {err}");
    std::process::exit(err.exit_code().code())
}

/// Turns a result-returning call into its fatal counterpart.
pub trait OrExit<T> {
    fn or_exit(self) -> T;
}

impl<T> OrExit<T> for Result<T> {
    fn or_exit(self) -> T {
        self.unwrap_or_else(|err| fatal(&err))
    }
}
