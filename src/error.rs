use thiserror::Error;

/// Outcome of a failed registry lookup.
///
/// `NotFound` is a real signal (the name is free to claim); `Transient`
/// means the registry could not be asked and says nothing about the name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("package not found in registry")]
    NotFound,

    #[error("transient registry error: {0}")]
    Transient(String),
}

impl LookupError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LookupError::Transient(_))
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        LookupError::Transient(e.to_string())
    }
}

/// A maintainer email domain whose registration status could not be
/// determined. These emails are skipped, never reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("timed out resolving {0}")]
    Timeout(String),

    #[error("could not determine registration of {domain}: {reason}")]
    Inconclusive { domain: String, reason: String },
}
