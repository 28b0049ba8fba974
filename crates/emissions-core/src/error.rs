//! Error taxonomy shared by every layer.
//!
//! | Variant | Caller action |
//! |---------|---------------|
//! | [`Error::InvalidFilterParameter`] | fix the request, no retry |
//! | [`Error::InvalidMeasurement`] | fix the import data, no retry |
//! | [`Error::DuplicateImport`] | skip the source file |
//! | [`Error::StorageUnavailable`] | retry the whole request |
//! | [`Error::CacheUnavailable`] | never surfaced; treated as a miss |

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter `{field}`: {message}")]
    InvalidFilterParameter {
        field: &'static str,
        message: String,
    },

    #[error("invalid measurement at index {index}: {message}")]
    InvalidMeasurement { index: usize, message: String },

    #[error("file already imported: {0}")]
    DuplicateImport(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidFilterParameter {
            field,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Error::StorageUnavailable(message.into())
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Error::CacheUnavailable(message.into())
    }

    /// True for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFilterParameter { .. }
                | Error::InvalidMeasurement { .. }
                | Error::DuplicateImport(_)
        )
    }
}
