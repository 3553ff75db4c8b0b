use std::{fmt, path::PathBuf};

/// Core error type.
///
/// Adapter crates map their specific errors (HTTP, Telegram) into this type. The
/// poller logs `FeedUnavailable` and `SendFailed` and carries on; anything else
/// reaching the binary ends the process with [`Error::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("missing credential: {0}")]
    MissingCredential(Credential),

    #[error("malformed file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("external error: {0}")]
    External(String),
}

/// Secrets the process needs before it can do anything useful.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Credential {
    ChatToken,
    FeedToken,
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ChatToken => f.write_str("TELEGRAM_BOT_TOKEN"),
            Credential::FeedToken => f.write_str("VK_TOKEN"),
        }
    }
}

impl Error {
    /// Process exit code used when this error terminates the binary.
    ///
    /// - 1: chat token missing
    /// - 2: feed token missing
    /// - 3: configuration or state file is invalid
    /// - 4: anything else
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::MissingCredential(Credential::ChatToken) => 1,
            Error::MissingCredential(Credential::FeedToken) => 2,
            Error::Config(_) | Error::Malformed { .. } => 3,
            _ => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
