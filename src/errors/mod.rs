use thiserror::Error;

/// Everything the engine can fail with.
///
/// Only `ProfileUnavailable` ever leaves `Assembler::load`; the rest are
/// absorbed where they happen and show up as smaller output.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Browser launch, navigation or capture failed.
    #[error("page acquisition failed for {url}: {reason}")]
    Acquisition { url: String, reason: String },

    #[error("no extraction strategy matched the markup")]
    ExtractionMiss,

    #[error("unrecognised date text: {0:?}")]
    DateParseMiss(String),

    /// Base profile could not be fetched or parsed. Fatal for the whole call.
    #[error("profile unavailable for {username}: {reason}")]
    ProfileUnavailable { username: String, reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl HarvestError {
    pub fn acquisition(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Acquisition {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn unavailable(username: &str, reason: impl std::fmt::Display) -> Self {
        Self::ProfileUnavailable {
            username: username.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = HarvestError> = std::result::Result<T, E>;
