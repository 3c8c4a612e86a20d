use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider operation failed: {0}")]
    Provider(String),

    #[error("Stack '{stack}' did not reach a terminal state within {waited_secs}s")]
    ProvisioningTimeout { stack: String, waited_secs: u64 },

    #[error("Stack '{stack}' reported unexpected status '{status}'")]
    UnexpectedStackState { stack: String, status: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Provider(_) => "PROVIDER_ERROR",
            Error::ProvisioningTimeout { .. } => "PROVISIONING_TIMEOUT",
            Error::UnexpectedStackState { .. } => "UNEXPECTED_STACK_STATE",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Archive(_) => "ARCHIVE_ERROR",
            Error::Other(_) => "ERROR",
        }
    }
}
