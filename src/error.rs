use thiserror::Error;

/// Error type shared by the CalDAV client, the MCP tool surface and the CLI.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid CalDAV server URL: {0}")]
    InvalidUrl(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("authentication rejected by the CalDAV server")]
    Unauthorized,

    #[error("calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("resource changed on the server (etag mismatch)")]
    Conflict,

    #[error("invalid date/time value: {0}")]
    InvalidDateTime(String),

    #[error("invalid event data: {0}")]
    InvalidEventData(String),

    #[error("CalDAV request failed: {0}")]
    Dav(String),

    #[error("calendar data parse error: {0}")]
    Ics(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
