use reqwest::StatusCode;
use thiserror::Error;

pub const GENERIC_FAILURE: &str = "Something went wrong.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Http {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status(),
            ApiError::Decode(_) => None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        )
    }

    /// Text to put in front of the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            ApiError::Http { status, .. } => match *status {
                StatusCode::UNAUTHORIZED => "Please log in first.".to_string(),
                StatusCode::FORBIDDEN => "Access denied.".to_string(),
                status => format!("Request failed with status code {}", status.as_u16()),
            },
            ApiError::Transport(err) => {
                let text = err.to_string();
                if text.trim().is_empty() {
                    GENERIC_FAILURE.to_string()
                } else {
                    text
                }
            }
            ApiError::Decode(_) => GENERIC_FAILURE.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("{0}")]
    Validation(String),
    #[error("Only the author can change this todo.")]
    NotOwner,
    #[error("Updated {completed} of {total} sub-items before a failure; changes were rolled back.")]
    Cascade {
        completed: usize,
        total: usize,
        #[source]
        source: ApiError,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ViewError {
    pub fn user_message(&self) -> String {
        match self {
            ViewError::Api(err) => err.user_message(),
            ViewError::Cascade { source, .. } => {
                format!("{} ({})", self, source.user_message())
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
