use thiserror::Error;

/// Failure of a single call against the remote catalog.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The session was rejected (HTTP 401/403).
    #[error("{endpoint}: session rejected ({status})")]
    Unauthorized {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("{endpoint}: unexpected status ({status})")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("{endpoint}: request failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint}: malformed response")]
    Malformed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// True when `err` (or anything in its chain) is a rejected session.
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<ApiError>())
        .any(ApiError::is_unauthorized)
}

/// A catalog row that cannot become a `Book`.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("catalog row is missing `{field}`")]
    MissingField { field: &'static str },

    #[error("catalog row {id} has no title")]
    MissingTitle { id: String },

    #[error("catalog row id `{id}` is not a plain token")]
    InvalidId { id: String },

    #[error("catalog row has an unexpected shape")]
    InvalidRow {
        #[source]
        source: serde_json::Error,
    },
}
