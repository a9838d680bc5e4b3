use std::path::PathBuf;

/// Fatal conditions detected before the pipeline starts.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Called without input: pass files, directories or inline data, or pipe data on stdin (see {0} -h)")]
    NoInput(String),

    #[error("Invalid configuration for --{flag}: {message}")]
    Config { flag: &'static str, message: String },

    #[error("Could not create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script error: {0}")]
    Script(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl StartupError {
    pub fn config(flag: &'static str, message: impl Into<String>) -> Self {
        StartupError::Config {
            flag,
            message: message.into(),
        }
    }
}

/// A path that could not be turned into a raw unit.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Cannot access '{path}': {source}")]
    Stat {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("[CSV] {0}")]
    Csv(String),

    #[error("[JSON] {0}")]
    Json(String),

    #[error("[Text] {0}")]
    Text(String),
}

/// Failure of one step of the transform chain. The record is dropped.
#[derive(Debug, thiserror::Error)]
#[error("Transform step '{step}' failed: {message}")]
pub struct TransformError {
    pub step: String,
    pub message: String,
}

impl TransformError {
    pub fn new(step: &str, message: impl Into<String>) -> Self {
        TransformError {
            step: step.to_string(),
            message: message.into(),
        }
    }

    /// Flatten an error chain into the message
    pub fn from_error(step: &str, error: anyhow::Error) -> Self {
        TransformError::new(step, format!("{:#}", error))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Validation failed at '{field}': violates '{constraint}' ({message}), actual value: {value}")]
pub struct ValidationError {
    pub field: String,
    pub constraint: String,
    pub message: String,
    pub value: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid document id '{0}' for file output")]
    InvalidId(String),

    #[error("File write to '{path}' failed: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP {verb} {address} failed: {source}")]
    Http {
        verb: String,
        address: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Why a record left the pipeline without being published.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("processing panicked: {0}")]
    Panicked(String),
}

impl RecordError {
    pub fn stage(&self) -> &str {
        match self {
            RecordError::Transform(e) => &e.step,
            RecordError::Validation(_) => "validate",
            RecordError::Publish(_) => "publish",
            RecordError::Panicked(_) => "process",
        }
    }
}
