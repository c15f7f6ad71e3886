use thiserror::Error;

/// Failure of a single remote GET.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure, including timeouts.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with something other than 200.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// The body was not the JSON we expected.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Licence key is empty")]
    MissingKey,

    #[error("Missing configuration variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid number for {0}: {1}")]
    InvalidNumber(&'static str, String),
}

/// Errors surfaced by explicit activation and deactivation requests.
///
/// `AlreadyActive` and `NotActive` are returned without touching the network;
/// callers usually treat them as a successful no-op.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("Licence is already activated")]
    AlreadyActive,

    #[error("Licence is not activated")]
    NotActive,

    #[error("Invalid or expired request token")]
    InvalidToken,

    #[error("Licensing server rejected the request: {0}")]
    RemoteRejected(String),

    #[error("Licensing server unreachable: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ActivationError {
    /// True for the variants that mean "nothing to do".
    pub fn is_noop(&self) -> bool {
        matches!(self, ActivationError::AlreadyActive | ActivationError::NotActive)
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
pub type ActivationResult<T> = std::result::Result<T, ActivationError>;
