use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptTunerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status} for {url}: {body}")]
    Server {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Missing field '{field}' in {context}")]
    MissingField { field: String, context: String },

    #[error("Invalid token cache: {0}")]
    InvalidTokenCache(String),

    #[error("Invalid threshold '{0}': must be a number between 0 and 1")]
    InvalidThreshold(String),

    #[error("No threshold provided: input closed")]
    ThresholdInputClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient; the same call may succeed if repeated.
    Retryable,
    /// The current loan, category or prompt cannot be processed; the run continues.
    ItemTerminal,
    /// The run cannot continue.
    Fatal,
}

impl PromptTunerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PromptTunerError::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorKind::Retryable
                } else if e.is_decode() {
                    ErrorKind::ItemTerminal
                } else {
                    match e.status().map(|s| s.as_u16()) {
                        Some(401) | Some(403) => ErrorKind::Fatal,
                        Some(s) if s == 429 || s >= 500 => ErrorKind::Retryable,
                        _ => ErrorKind::ItemTerminal,
                    }
                }
            }
            PromptTunerError::Server { status, .. } => match *status {
                401 | 403 => ErrorKind::Fatal,
                429 => ErrorKind::Retryable,
                s if s >= 500 => ErrorKind::Retryable,
                _ => ErrorKind::ItemTerminal,
            },
            PromptTunerError::MissingField { .. } | PromptTunerError::SerializationError(_) => {
                ErrorKind::ItemTerminal
            }
            // A loan whose extraction file is absent is skipped, not the whole run.
            PromptTunerError::IoError(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::ItemTerminal
            }
            PromptTunerError::AuthenticationFailed(_)
            | PromptTunerError::InvalidTokenCache(_)
            | PromptTunerError::InvalidThreshold(_)
            | PromptTunerError::ThresholdInputClosed
            | PromptTunerError::Config(_)
            | PromptTunerError::CsvError(_)
            | PromptTunerError::IoError(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }

    pub(crate) fn missing(field: &str, context: &str) -> Self {
        PromptTunerError::MissingField {
            field: field.to_string(),
            context: context.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PromptTunerError>;
