use thiserror::Error;

/// Failures talking to the text-supply collaborator.
///
/// None of these are fatal to a running session: callers degrade them to an
/// empty block via [`crate::supply::fetch_or_empty`].
#[derive(Debug, Error)]
pub enum SupplyError {
    #[error("invalid language code `{0}`")]
    InvalidLanguage(String),

    #[error("no text blocks available for `{0}`")]
    Empty(String),

    #[error("text endpoint answered {status}")]
    Status { status: u16 },

    #[error("text request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures handing a finished session to the result-submission collaborator.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The request never got an answer (connect, timeout, body).
    #[error("result upload failed: {0}")]
    Transport(String),

    /// The collaborator answered and refused the payload.
    #[error("result endpoint answered {status}")]
    Rejected { status: u16 },

    #[error("result store: {0}")]
    Store(#[from] rusqlite::Error),
}

impl SubmitError {
    /// Whether the one-shot submission guard should be released so a manual
    /// retry can go through later.
    pub fn allows_retry(&self) -> bool {
        matches!(self, SubmitError::Transport(_))
    }
}

impl From<reqwest::Error> for SubmitError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SubmitError::Rejected {
                status: status.as_u16(),
            },
            None => SubmitError::Transport(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_release_the_guard() {
        assert!(SubmitError::Transport("connection refused".into()).allows_retry());
        assert!(!SubmitError::Rejected { status: 400 }.allows_retry());
        assert!(!SubmitError::Store(rusqlite::Error::QueryReturnedNoRows).allows_retry());
    }

    #[test]
    fn messages_name_the_offending_value() {
        let err = SupplyError::InvalidLanguage("de".into());
        assert_eq!(err.to_string(), "invalid language code `de`");
        let err = SupplyError::Status { status: 503 };
        assert_eq!(err.to_string(), "text endpoint answered 503");
    }
}
