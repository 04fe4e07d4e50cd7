use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Unknown entry {0:?} for job")]
    UnknownJobOption(String),

    #[error("Environment variable {0:?} is expected to be \"key=value\"")]
    InvalidEnvVar(String),

    #[error("Service account path {0:?} is expected to be \"/etc/<name>/service-account.json\"")]
    InvalidServiceAccount(String),

    #[error("The metadata misses {0} configuration, cannot continue")]
    MissingSection(String),

    #[error("Expected {expected} but found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Repository key {0:?} is expected to be \"org/repo\"")]
    InvalidRepoKey(String),

    #[error("Invalid job {job:?}: {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("Unknown job type {job_type:?} for release dashboard {project:?}")]
    UnsupportedReleaseJob { project: String, job_type: String },

    #[error("Error in template {name}: {message}")]
    Template { name: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("GitHub API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeneratorError {
    /// Wraps a Tera failure, keeping the full cause chain in the message.
    pub fn template(name: &str, err: &tera::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Template {
            name: name.to_string(),
            message,
        }
    }

    pub fn invalid_job(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            job: job.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeneratorError>;
